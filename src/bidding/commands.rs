/// 입찰 커맨드 처리
/// 읽기 -> 순수 검증 -> 단일 트랜잭션 쓰기(CAS)를 한 단위로 묶는다.
/// 같은 경매에 동시 입찰이 와도 버전 CAS 때문에 한 건만 최고 입찰이 된다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::Bid;
use crate::bidding::validator::{self, BidDecision, RejectReason};
use crate::database::DatabaseManager;
use crate::query::handlers as queries;
use crate::realtime::RealtimePublisher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- Commands

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
}

/// 수락 결과. bid_id는 클라이언트가 낙관적 반영을 중복 제거하는 열쇠다.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BidAccepted {
    pub bid_id: i64,
    pub new_price: i64,
    pub new_deadline: DateTime<Utc>,
}

// 최대 재시도 횟수
const MAX_RETRIES: i32 = 100;

// 가격/마감 CAS. 버전이 바뀌었으면 아무 행도 갱신하지 않는다.
const CAS_PRICE_AND_DEADLINE: &str = r#"
    UPDATE auctions
    SET current_price = $1, ended_at = $2, version = version + 1
    WHERE id = $3 AND version = $4 AND status = 'LIVE'
    RETURNING id
"#;

// 직전 선두 입찰자 환불
const REFUND_PREVIOUS_LEADER: &str = "UPDATE users SET balance = balance + $1 WHERE id = $2";

// 잔액 차감. 잔액이 모자라면 갱신되지 않는다 (음수 잔액 금지).
const DEBIT_BIDDER: &str =
    "UPDATE users SET balance = balance - $1 WHERE id = $2 AND balance >= $1 RETURNING id";

// 입찰 원장 추가
const APPEND_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, amount, bid_time)
    VALUES ($1, $2, $3, $4)
    RETURNING id
"#;

fn infra_error(e: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({"error": e.to_string(), "code": "INTERNAL"})
}

/// 쓸 수 있는 잔액. 직전 선두가 본인이면 트랜잭션이 차감 전에 환불하므로
/// 묶여 있는 선두 금액까지 포함한다.
fn spendable_balance(balance: i64, highest_bid: Option<&Bid>, bidder_id: i64) -> i64 {
    match highest_bid {
        Some(prev) if prev.bidder_id == bidder_id => balance + prev.amount,
        _ => balance,
    }
}

/// 입찰 처리
pub async fn handle_place_bid(
    cmd: PlaceBidCommand,
    db_manager: &DatabaseManager,
    realtime: &dyn RealtimePublisher,
) -> Result<BidAccepted, serde_json::Value> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);
    let mut retries = 0;

    while retries < MAX_RETRIES {
        // 경매 조회
        let auction = queries::get_auction(db_manager, cmd.auction_id)
            .await
            .map_err(infra_error)?
            .ok_or_else(|| {
                serde_json::json!({"error": "경매를 찾을 수 없습니다.", "code": "NOT_FOUND"})
            })?;

        // 최고 입찰 조회
        let highest_bid = queries::get_highest_bid(db_manager, cmd.auction_id)
            .await
            .map_err(infra_error)?;

        // 입찰자 계정 조회
        let account = queries::get_bidder_account(db_manager, cmd.bidder_id)
            .await
            .map_err(infra_error)?
            .ok_or_else(|| {
                serde_json::json!({"error": "입찰자를 찾을 수 없습니다.", "code": "UNKNOWN_BIDDER"})
            })?;

        let now = Utc::now();
        let available = spendable_balance(account.balance, highest_bid.as_ref(), cmd.bidder_id);

        // 순수 검증. 잔액은 환불 예정액을 반영한 값으로 판정한다.
        let (new_price, new_deadline) = match validator::validate(
            &auction,
            highest_bid.as_ref(),
            cmd.amount,
            available,
            now,
        ) {
            BidDecision::Accept {
                new_price,
                new_deadline,
            } => (new_price, new_deadline),
            BidDecision::Reject(reason) => {
                info!(
                    "{:<12} --> 입찰 거절: code={}, auction={}",
                    "Command",
                    reason.code(),
                    cmd.auction_id
                );
                return Err(reason.to_body());
            }
        };

        // 단일 트랜잭션: CAS -> 환불 -> 차감 -> 원장 추가
        let mut tx = db_manager.pool.begin().await.map_err(infra_error)?;

        let cas = sqlx::query(CAS_PRICE_AND_DEADLINE)
            .bind(new_price)
            .bind(new_deadline)
            .bind(cmd.auction_id)
            .bind(auction.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(infra_error)?;

        if cas.is_none() {
            // 다른 입찰이 먼저 버전을 올렸다. 다시 읽고 재검증한다.
            tx.rollback().await.map_err(infra_error)?;
            warn!(
                "{:<12} --> 낙관적 업데이트로 인한 버전 충돌: 재시도 ({}/{})",
                "Command",
                retries + 1,
                MAX_RETRIES
            );
            retries += 1;
            continue;
        }

        // CAS가 성공했으므로 읽어둔 최고 입찰이 여전히 유효하다.
        // 직전 선두를 환불한 뒤 새 입찰자를 차감한다 (본인이 올려 부르는 경우 포함).
        if let Some(prev) = &highest_bid {
            sqlx::query(REFUND_PREVIOUS_LEADER)
                .bind(prev.amount)
                .bind(prev.bidder_id)
                .execute(&mut *tx)
                .await
                .map_err(infra_error)?;
        }

        let debited = sqlx::query(DEBIT_BIDDER)
            .bind(cmd.amount)
            .bind(cmd.bidder_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(infra_error)?;

        if debited.is_none() {
            // 읽기 이후 잔액이 줄었다. 전체 롤백 후 실제 잔액을 다시 읽어서 거절한다.
            tx.rollback().await.map_err(infra_error)?;
            let fresh_available = queries::get_bidder_account(db_manager, cmd.bidder_id)
                .await
                .map_err(infra_error)?
                .map(|a| spendable_balance(a.balance, highest_bid.as_ref(), cmd.bidder_id))
                .unwrap_or(0);
            return Err(RejectReason::InsufficientFunds {
                required: cmd.amount,
                available: fresh_available,
            }
            .to_body());
        }

        let bid_id = sqlx::query_scalar::<_, i64>(APPEND_BID)
            .bind(cmd.auction_id)
            .bind(cmd.bidder_id)
            .bind(cmd.amount)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(infra_error)?;

        tx.commit().await.map_err(infra_error)?;

        info!(
            "{:<12} --> 입찰 수락: auction={}, bid={}, price={}",
            "Command", cmd.auction_id, bid_id, new_price
        );

        // 커밋 이후에만 팬아웃. 발행 실패는 발행자가 삼킨다.
        realtime
            .publish_auction(
                cmd.auction_id,
                &AuctionEvent::NewBid {
                    auction_id: cmd.auction_id,
                    bid_id,
                    bidder_id: cmd.bidder_id,
                    username: account.username.clone(),
                    amount: cmd.amount,
                    timestamp: now,
                },
            )
            .await;

        return Ok(BidAccepted {
            bid_id,
            new_price,
            new_deadline,
        });
    }

    Err(serde_json::json!({"error": "최대 재시도 횟수 초과", "code": "MAX_RETRIES_EXCEEDED"}))
}

/// 원장이 제출 순서대로 단조 증가하는지 확인한다 (진단용)
pub fn ledger_is_strictly_increasing(bids: &[Bid]) -> bool {
    bids.windows(2).all(|w| w[0].amount < w[1].amount)
}

// endregion: --- Commands

// region:    --- Tests


// endregion: --- Tests
