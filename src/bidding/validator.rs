/// 입찰 검증기
/// 순수 판정 함수. 저장소를 건드리지 않으며 수락 여부와 다음 최소 입찰가만 계산한다.
// region:    --- Imports
use crate::auction::model::{Auction, Bid, STATUS_LIVE};
use chrono::{DateTime, Duration, Utc};
// endregion: --- Imports

// region:    --- Constants

/// 최소 입찰 증가폭 (통화 단위)
pub const MIN_INCREMENT: i64 = 100;

/// 스나이핑 방지 구간: 마감까지 남은 시간이 이 값 미만이면 마감을 연장한다
pub const ANTI_SNIPE_WINDOW_SECS: i64 = 30;

/// 연장 시 보장되는 최소 잔여 시간
pub const GRACE_PERIOD_SECS: i64 = 10;

// endregion: --- Constants

// region:    --- Decision Model

/// 거절 사유. 모든 사유는 사용자 메시지로 변환 가능해야 한다.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// 경매가 LIVE 상태가 아님
    NotLive { status: String },
    /// 마감 시각이 지남 (상태가 아직 안 바뀌었어도 사실상 종료)
    AlreadyEnded,
    /// 잔액 부족
    InsufficientFunds { required: i64, available: i64 },
    /// 최소 입찰가 미달. 재시도할 수 있도록 최소가를 알려준다.
    BelowMinimum { minimum: i64 },
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotLive { .. } => "NOT_LIVE",
            RejectReason::AlreadyEnded => "ALREADY_ENDED",
            RejectReason::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            RejectReason::BelowMinimum { .. } => "LOW_BID",
        }
    }

    /// 거절 응답 본문
    pub fn to_body(&self) -> serde_json::Value {
        match self {
            RejectReason::NotLive { status } => serde_json::json!({
                "error": "경매가 진행 중이 아닙니다.",
                "code": self.code(),
                "status": status,
            }),
            RejectReason::AlreadyEnded => serde_json::json!({
                "error": "경매가 이미 종료되었습니다.",
                "code": self.code(),
            }),
            RejectReason::InsufficientFunds {
                required,
                available,
            } => serde_json::json!({
                "error": "잔액이 부족합니다.",
                "code": self.code(),
                "required": required,
                "available": available,
            }),
            RejectReason::BelowMinimum { minimum } => serde_json::json!({
                "error": "입찰 금액이 최소 입찰가보다 낮습니다.",
                "code": self.code(),
                "minimum": minimum,
            }),
        }
    }
}

/// 판정 결과
#[derive(Debug, Clone, PartialEq)]
pub enum BidDecision {
    Accept {
        new_price: i64,
        new_deadline: DateTime<Utc>,
    },
    Reject(RejectReason),
}

// endregion: --- Decision Model

// region:    --- Validator

/// 입찰 판정
/// 규칙은 순서대로 적용된다: 상태 -> 마감 -> 잔액 -> 최소가 -> 수락(+연장)
pub fn validate(
    auction: &Auction,
    highest_bid: Option<&Bid>,
    proposed_amount: i64,
    bidder_balance: i64,
    now: DateTime<Utc>,
) -> BidDecision {
    if auction.status != STATUS_LIVE {
        return BidDecision::Reject(RejectReason::NotLive {
            status: auction.status.clone(),
        });
    }

    // LIVE 경매는 start에서 항상 마감 시각을 받는다. 없으면 입찰 불가로 본다.
    let ended_at = match auction.ended_at {
        Some(t) => t,
        None => return BidDecision::Reject(RejectReason::AlreadyEnded),
    };
    if now >= ended_at {
        return BidDecision::Reject(RejectReason::AlreadyEnded);
    }

    if proposed_amount > bidder_balance {
        return BidDecision::Reject(RejectReason::InsufficientFunds {
            required: proposed_amount,
            available: bidder_balance,
        });
    }

    let minimum = match highest_bid {
        Some(bid) => bid.amount + MIN_INCREMENT,
        None => auction.starting_price,
    };
    if proposed_amount < minimum {
        return BidDecision::Reject(RejectReason::BelowMinimum { minimum });
    }

    BidDecision::Accept {
        new_price: proposed_amount,
        new_deadline: extend_deadline(ended_at, now),
    }
}

/// 스나이핑 방지 연장. 마감을 앞당기는 일은 없다.
fn extend_deadline(ended_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if ended_at - now < Duration::seconds(ANTI_SNIPE_WINDOW_SECS) {
        ended_at.max(now + Duration::seconds(GRACE_PERIOD_SECS))
    } else {
        ended_at
    }
}

// endregion: --- Validator

// region:    --- Tests


// endregion: --- Tests
