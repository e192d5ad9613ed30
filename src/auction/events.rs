use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 경매별 토픽으로 발행되는 실시간 이벤트
/// 전달은 best-effort이며 권위 상태는 항상 저장소에 있다.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AuctionEvent {
    // 상태 전이 이벤트
    StatusChange {
        auction_id: i64,
        status: String,
        started_at: Option<DateTime<Utc>>,
    },
    // 입찰 이벤트
    NewBid {
        auction_id: i64,
        bid_id: i64,
        bidder_id: i64,
        username: String,
        amount: i64,
        timestamp: DateTime<Utc>,
    },
    // 종료 이벤트
    AuctionEnded {
        auction_id: i64,
        winner_id: Option<i64>,
        winner_username: Option<String>,
        final_price: i64,
    },
}

/// 전역 토픽으로 발행되는 목록 화면용 공지
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum GlobalNotice {
    // 경매 시작(대기실 진입) 공지
    AuctionOpened {
        auction_id: i64,
        name: String,
        started_at: DateTime<Utc>,
    },
}
