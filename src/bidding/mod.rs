pub mod commands;
pub mod validator;
