/// 경매 생명주기 서비스
/// SCHEDULED -> LIVE -> COMPLETED 전이의 유일한 작성자.
/// 모든 전이는 상태 조건이 걸린 CAS UPDATE라서 경쟁 호출 중 정확히 하나만 쓴다.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, GlobalNotice};
use crate::auction::model::{
    Auction, Bid, WinnerInfo, STATUS_COMPLETED, STATUS_LIVE, STATUS_SCHEDULED,
};
use crate::database::DatabaseManager;
use crate::query::handlers as queries;
use crate::query::queries::GET_BID_LEDGER;
use crate::realtime::RealtimePublisher;
use chrono::{Duration, Utc};
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- Constants

/// LIVE 진입 후 공개 연출에 쓰이는 시간 (클라이언트 연출 기준)
pub const REVEAL_DELAY_SECS: i64 = 20;

/// 기본 입찰 시간. start가 마감 시각이 없는 레코드에 부여한다.
pub const BIDDING_WINDOW_SECS: i64 = 30;

// endregion: --- Constants

// region:    --- SQL

// SCHEDULED -> LIVE CAS. 이미 LIVE/COMPLETED면 아무 행도 갱신하지 않는다.
const START_CAS: &str = r#"
    UPDATE auctions
    SET status = 'LIVE', started_at = $1, ended_at = COALESCE(ended_at, $2), version = version + 1
    WHERE id = $3 AND status = 'SCHEDULED'
    RETURNING id, name, rank_tier, status, starting_price, current_price, scheduled_at, started_at, ended_at, winner_id, version, created_at
"#;

// LIVE -> COMPLETED CAS. 버전 조건으로 낙찰자 계산과 쓰기 사이의 입찰 유입을 막는다.
const END_CAS: &str = r#"
    UPDATE auctions
    SET status = 'COMPLETED', winner_id = $1, version = version + 1
    WHERE id = $2 AND status = 'LIVE' AND version = $3
    RETURNING id, name, rank_tier, status, starting_price, current_price, scheduled_at, started_at, ended_at, winner_id, version, created_at
"#;

// 출품물 소유권 이전. 이미 낙찰자 소유인 행은 건드리지 않는다 (중복 수령 방지).
const TRANSFER_ARTIFACTS: &str = r#"
    UPDATE artifacts
    SET owner_id = $1
    WHERE auction_id = $2 AND owner_id IS DISTINCT FROM $1
"#;

// endregion: --- SQL

// region:    --- Start

/// 시작 결과
#[derive(Debug)]
pub enum StartOutcome {
    Started(Auction),
    /// 다른 트리거가 먼저 시작했다. 오류가 아니라 보고 대상이다.
    AlreadyLive,
}

fn infra_error(e: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({"error": e.to_string(), "code": "INTERNAL"})
}

/// 경매 시작
pub async fn start(
    db_manager: &DatabaseManager,
    realtime: &dyn RealtimePublisher,
    auction_id: i64,
) -> Result<StartOutcome, serde_json::Value> {
    let now = Utc::now();
    let default_end = now + Duration::seconds(REVEAL_DELAY_SECS + BIDDING_WINDOW_SECS);

    let started = sqlx::query_as::<_, Auction>(START_CAS)
        .bind(now)
        .bind(default_end)
        .bind(auction_id)
        .fetch_optional(&*db_manager.pool)
        .await
        .map_err(infra_error)?;

    let auction = match started {
        Some(auction) => auction,
        None => {
            // CAS 불발. 존재 여부와 현재 상태로 원인을 가른다.
            let existing = queries::get_auction(db_manager, auction_id)
                .await
                .map_err(infra_error)?
                .ok_or_else(|| {
                    serde_json::json!({"error": "경매를 찾을 수 없습니다.", "code": "NOT_FOUND"})
                })?;
            return match existing.status.as_str() {
                STATUS_COMPLETED => Err(serde_json::json!({
                    "error": "종료된 경매는 다시 시작할 수 없습니다.",
                    "code": "ALREADY_COMPLETED",
                })),
                _ => {
                    info!(
                        "{:<12} --> 이미 시작된 경매: id={}",
                        "Lifecycle", auction_id
                    );
                    Ok(StartOutcome::AlreadyLive)
                }
            };
        }
    };

    info!(
        "{:<12} --> 경매 시작: id={}, 마감={:?}",
        "Lifecycle", auction_id, auction.ended_at
    );

    realtime
        .publish_auction(
            auction_id,
            &AuctionEvent::StatusChange {
                auction_id,
                status: STATUS_LIVE.to_string(),
                started_at: auction.started_at,
            },
        )
        .await;
    realtime
        .publish_notice(&GlobalNotice::AuctionOpened {
            auction_id,
            name: auction.name.clone(),
            started_at: now,
        })
        .await;

    Ok(StartOutcome::Started(auction))
}

// endregion: --- Start

// region:    --- End

/// 낙찰자 선정: 최고 금액, 동액이면 먼저 제출된 입찰
pub fn select_winner(bids: &[Bid]) -> Option<&Bid> {
    bids.iter()
        .max_by(|a, b| a.amount.cmp(&b.amount).then_with(|| b.id.cmp(&a.id)))
}

/// 경매 종료. 멱등: 이미 완료된 경매는 저장된 낙찰 결과를 그대로 돌려준다.
pub async fn end(
    db_manager: &DatabaseManager,
    realtime: &dyn RealtimePublisher,
    auction_id: i64,
) -> Result<WinnerInfo, serde_json::Value> {
    loop {
        let auction = queries::get_auction(db_manager, auction_id)
            .await
            .map_err(infra_error)?
            .ok_or_else(|| {
                serde_json::json!({"error": "경매를 찾을 수 없습니다.", "code": "NOT_FOUND"})
            })?;

        match auction.status.as_str() {
            STATUS_COMPLETED => {
                // 다른 호출자가 이미 종료했다. 저장된 결과를 관찰만 한다.
                return winner_info_of(db_manager, &auction).await;
            }
            STATUS_SCHEDULED => {
                return Err(serde_json::json!({
                    "error": "시작되지 않은 경매는 종료할 수 없습니다.",
                    "code": "NOT_LIVE",
                }));
            }
            _ => {}
        }

        // 마감 전 종료 차단. 종료 트리거는 마감이 지난 뒤에만 유효하다.
        let now = Utc::now();
        if let Some(ended_at) = auction.ended_at {
            if now < ended_at {
                return Err(serde_json::json!({
                    "error": "아직 마감 시각이 지나지 않았습니다.",
                    "code": "NOT_DUE",
                    "ended_at": ended_at,
                }));
            }
        }

        // 원장에서 낙찰자 계산 후 같은 버전 조건으로 종료를 쓴다.
        let mut tx = db_manager.pool.begin().await.map_err(infra_error)?;
        let bids = sqlx::query_as::<_, Bid>(GET_BID_LEDGER)
            .bind(auction_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(infra_error)?;
        let winner_id = select_winner(&bids).map(|b| b.bidder_id);

        let completed = sqlx::query_as::<_, Auction>(END_CAS)
            .bind(winner_id)
            .bind(auction_id)
            .bind(auction.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(infra_error)?;

        let completed = match completed {
            Some(a) => a,
            None => {
                // 경쟁 종료 또는 경쟁 입찰. 다시 읽어서 판단한다.
                tx.rollback().await.map_err(infra_error)?;
                warn!(
                    "{:<12} --> 종료 CAS 불발, 재확인: id={}",
                    "Lifecycle", auction_id
                );
                continue;
            }
        };
        tx.commit().await.map_err(infra_error)?;

        let info = winner_info_of(db_manager, &completed).await?;
        info!(
            "{:<12} --> 경매 종료: id={}, 낙찰자={:?}, 최종가={}",
            "Lifecycle", auction_id, info.winner_id, info.final_price
        );

        realtime
            .publish_auction(
                auction_id,
                &AuctionEvent::AuctionEnded {
                    auction_id,
                    winner_id: info.winner_id,
                    winner_username: info.winner_username.clone(),
                    final_price: info.final_price,
                },
            )
            .await;

        return Ok(info);
    }
}

/// 완료된 경매 레코드에서 낙찰 결과 구성
async fn winner_info_of(
    db_manager: &DatabaseManager,
    auction: &Auction,
) -> Result<WinnerInfo, serde_json::Value> {
    let winner_username = match auction.winner_id {
        Some(winner_id) => queries::get_username(db_manager, winner_id)
            .await
            .map_err(infra_error)?,
        None => None,
    };
    Ok(WinnerInfo {
        winner_id: auction.winner_id,
        winner_username,
        final_price: auction.current_price,
        auction_name: auction.name.clone(),
    })
}

// endregion: --- End

// region:    --- Claim

/// 낙찰품 수령. 낙찰자 본인만, 완료된 경매에서만.
/// 소유권이 이미 넘어간 행은 건드리지 않으므로 두 번 불러도 이중 이전이 없다.
pub async fn claim(
    db_manager: &DatabaseManager,
    auction_id: i64,
    caller_id: i64,
) -> Result<serde_json::Value, serde_json::Value> {
    let auction = queries::get_auction(db_manager, auction_id)
        .await
        .map_err(infra_error)?
        .ok_or_else(|| {
            serde_json::json!({"error": "경매를 찾을 수 없습니다.", "code": "NOT_FOUND"})
        })?;

    if auction.status != STATUS_COMPLETED {
        return Err(serde_json::json!({
            "error": "완료되지 않은 경매입니다.",
            "code": "NOT_COMPLETED",
        }));
    }
    if auction.winner_id != Some(caller_id) {
        return Err(serde_json::json!({
            "error": "낙찰자만 수령할 수 있습니다.",
            "code": "NOT_WINNER",
        }));
    }

    let result = sqlx::query(TRANSFER_ARTIFACTS)
        .bind(caller_id)
        .bind(auction_id)
        .execute(&*db_manager.pool)
        .await
        .map_err(infra_error)?;

    info!(
        "{:<12} --> 낙찰품 수령: auction={}, winner={}, 이전 수={}",
        "Lifecycle",
        auction_id,
        caller_id,
        result.rows_affected()
    );

    Ok(serde_json::json!({
        "claimed": true,
        "transferred": result.rows_affected(),
    }))
}

// endregion: --- Claim

// region:    --- Tests


// endregion: --- Tests
