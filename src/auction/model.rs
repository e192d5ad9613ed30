use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 상태 (서버가 관리하는 상태는 이 세 가지뿐이다)
pub const STATUS_SCHEDULED: &str = "SCHEDULED";
pub const STATUS_LIVE: &str = "LIVE";
pub const STATUS_COMPLETED: &str = "COMPLETED";

// 경매 모델
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub name: String,
    pub rank_tier: String,
    pub status: String,
    pub starting_price: i64,
    pub current_price: i64,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner_id: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// 입찰 모델 (id 순서 = 제출 순서)
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
}

// 사용자 계정 (잔액은 입찰 수락 트랜잭션 안에서만 변경된다)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub balance: i64,
}

// 경매 출품물 (낙찰자 수령 시 소유권 이전)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Artifact {
    pub id: i64,
    pub auction_id: i64,
    pub name: String,
    pub owner_id: Option<i64>,
}

/// 낙찰 결과
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WinnerInfo {
    pub winner_id: Option<i64>,
    pub winner_username: Option<String>,
    pub final_price: i64,
    pub auction_name: String,
}

/// 입찰 조회용 뷰 (입찰자 이름 포함)
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct BidView {
    pub id: i64,
    pub bidder_id: i64,
    pub username: String,
    pub amount: i64,
    pub bid_time: DateTime<Utc>,
}

/// 폴링용 권위 스냅샷
/// server_time은 항상 포함한다. 클라이언트는 자신의 시계로 마감을 계산하지 않는다.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuctionSnapshot {
    pub auction_id: i64,
    pub status: String,
    pub current_price: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub recent_bids: Vec<BidView>,
    pub last_bid_at: Option<DateTime<Utc>>,
    pub last_bidder_id: Option<i64>,
    pub winner_info: Option<WinnerInfo>,
    pub server_time: DateTime<Utc>,
}
