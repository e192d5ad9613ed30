// region:    --- Imports
use super::queries;
use crate::auction::model::{
    Auction, AuctionSnapshot, Bid, BidView, UserAccount, WinnerInfo, STATUS_COMPLETED,
};
use chrono::Utc;
use sqlx::Error as SqlxError;
use sqlx::Row;
use tracing::info;

// endregion: --- Imports

// region:    --- Query Handlers

/// 경매 조회
pub async fn get_auction(
    db_manager: &crate::database::DatabaseManager,
    auction_id: i64,
) -> Result<Option<Auction>, SqlxError> {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// 모든 경매 조회
pub async fn get_all_auctions(
    db_manager: &crate::database::DatabaseManager,
) -> Result<Vec<Auction>, SqlxError> {
    info!("{:<12} --> 모든 경매 조회", "Query");
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(queries::GET_ALL_AUCTIONS)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 최고 입찰 조회
pub async fn get_highest_bid(
    db_manager: &crate::database::DatabaseManager,
    auction_id: i64,
) -> Result<Option<Bid>, SqlxError> {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Bid>(queries::GET_HIGHEST_BID)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// 입찰 원장 조회 (제출 순서)
pub async fn get_bid_ledger(
    db_manager: &crate::database::DatabaseManager,
    auction_id: i64,
) -> Result<Vec<Bid>, SqlxError> {
    info!("{:<12} --> 입찰 원장 조회 id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Bid>(queries::GET_BID_LEDGER)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// 입찰자 계정 조회
pub async fn get_bidder_account(
    db_manager: &crate::database::DatabaseManager,
    bidder_id: i64,
) -> Result<Option<UserAccount>, SqlxError> {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, UserAccount>(queries::GET_BIDDER_ACCOUNT)
                    .bind(bidder_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// 사용자 이름 조회
pub async fn get_username(
    db_manager: &crate::database::DatabaseManager,
    user_id: i64,
) -> Result<Option<String>, SqlxError> {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let row = sqlx::query(queries::GET_USERNAME)
                    .bind(user_id)
                    .fetch_optional(&mut **tx)
                    .await?;
                Ok(row.map(|r| r.get("username")))
            })
        })
        .await
}

/// 권위 스냅샷 조회
/// since 이후의 입찰만 싣고, 서버 시간을 항상 포함한다.
pub async fn get_snapshot(
    db_manager: &crate::database::DatabaseManager,
    auction_id: i64,
    since: i64,
) -> Result<Option<AuctionSnapshot>, SqlxError> {
    info!(
        "{:<12} --> 스냅샷 조회 id: {}, since: {}",
        "Query", auction_id, since
    );
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let auction = sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await?;
                let auction = match auction {
                    Some(a) => a,
                    None => return Ok(None),
                };

                let recent_bids = sqlx::query_as::<_, BidView>(queries::GET_BIDS_SINCE)
                    .bind(auction_id)
                    .bind(since)
                    .fetch_all(&mut **tx)
                    .await?;

                let last_bid = sqlx::query_as::<_, Bid>(queries::GET_LAST_BID)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await?;

                // 완료된 경매면 낙찰 정보를 싣는다
                let winner_info = if auction.status == STATUS_COMPLETED {
                    let winner_username = match auction.winner_id {
                        Some(winner_id) => sqlx::query(queries::GET_USERNAME)
                            .bind(winner_id)
                            .fetch_optional(&mut **tx)
                            .await?
                            .map(|r| r.get("username")),
                        None => None,
                    };
                    Some(WinnerInfo {
                        winner_id: auction.winner_id,
                        winner_username,
                        final_price: auction.current_price,
                        auction_name: auction.name.clone(),
                    })
                } else {
                    None
                };

                Ok(Some(AuctionSnapshot {
                    auction_id: auction.id,
                    status: auction.status,
                    current_price: auction.current_price,
                    started_at: auction.started_at,
                    ended_at: auction.ended_at,
                    recent_bids,
                    last_bid_at: last_bid.as_ref().map(|b| b.bid_time),
                    last_bidder_id: last_bid.as_ref().map(|b| b.bidder_id),
                    winner_info,
                    server_time: Utc::now(),
                }))
            })
        })
        .await
}

// endregion: --- Query Handlers
