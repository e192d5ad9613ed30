pub mod auction;
pub mod bidding;
pub mod database;
pub mod handlers;
pub mod lifecycle;
pub mod message_broker;
pub mod query;
pub mod realtime;
pub mod scheduler;
pub mod sync;
