// region:    --- Imports
use crate::bidding::commands::{handle_place_bid as command_place_bid, PlaceBidCommand};
use crate::database::DatabaseManager;
use crate::lifecycle::{self, StartOutcome};
use crate::query;
use crate::realtime::RealtimePublisher;
use crate::scheduler;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

/// 공유 상태: DB 매니저 + 실시간 발행자
pub type AppState = (Arc<DatabaseManager>, Arc<dyn RealtimePublisher>);

/// 오류 본문의 code를 HTTP 상태로 변환
fn error_status(body: &serde_json::Value) -> StatusCode {
    match body["code"].as_str() {
        Some("NOT_FOUND") => StatusCode::NOT_FOUND,
        Some("INTERNAL") => StatusCode::INTERNAL_SERVER_ERROR,
        Some("ALREADY_COMPLETED") | Some("NOT_COMPLETED") | Some("NOT_WINNER")
        | Some("NOT_DUE") => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

// region:    --- Command Handlers

/// 입찰 요청 처리
pub async fn handle_bid(
    State((db_manager, realtime)): State<AppState>,
    Json(cmd): Json<PlaceBidCommand>,
) -> impl IntoResponse {
    match command_place_bid(cmd, &db_manager, realtime.as_ref()).await {
        Ok(accepted) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "accepted": true,
                "bid_id": accepted.bid_id,
                "new_price": accepted.new_price,
                "new_deadline": accepted.new_deadline,
            })),
        )
            .into_response(),
        Err(body) => (error_status(&body), Json(body)).into_response(),
    }
}

/// 경매 시작 요청 처리
pub async fn handle_start_auction(
    State((db_manager, realtime)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 시작 요청 id: {}", "Command", auction_id);
    match lifecycle::start(&db_manager, realtime.as_ref(), auction_id).await {
        Ok(StartOutcome::Started(auction)) => (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "auction": auction})),
        )
            .into_response(),
        // 다른 트리거가 먼저 시작한 경우. 예외가 아니라 보고되는 실패다.
        Ok(StartOutcome::AlreadyLive) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "code": "ALREADY_LIVE",
                "reason": "이미 시작된 경매입니다.",
            })),
        )
            .into_response(),
        Err(body) => (error_status(&body), Json(body)).into_response(),
    }
}

/// 경매 종료 요청 처리 (멱등)
pub async fn handle_end_auction(
    State((db_manager, realtime)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 종료 요청 id: {}", "Command", auction_id);
    match lifecycle::end(&db_manager, realtime.as_ref(), auction_id).await {
        Ok(winner_info) => (StatusCode::OK, Json(winner_info)).into_response(),
        Err(body) => (error_status(&body), Json(body)).into_response(),
    }
}

/// 낙찰품 수령 명령
#[derive(Debug, Deserialize)]
pub struct ClaimCommand {
    pub caller_id: i64,
}

/// 낙찰품 수령 요청 처리
pub async fn handle_claim(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(cmd): Json<ClaimCommand>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 수령 요청 auction: {}, caller: {}",
        "Command", auction_id, cmd.caller_id
    );
    match lifecycle::claim(&db_manager, auction_id, cmd.caller_id).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(body) => (error_status(&body), Json(body)).into_response(),
    }
}

/// 기한 도래 경매 스위프 요청 처리 (외부 주기 트리거용)
pub async fn handle_sweep(State((db_manager, realtime)): State<AppState>) -> impl IntoResponse {
    match scheduler::sweep(&db_manager, realtime.as_ref()).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 모든 경매 조회. 목록 읽기 경로에서 기회성 스위프를 함께 돈다.
pub async fn handle_get_auctions(
    State((db_manager, realtime)): State<AppState>,
) -> impl IntoResponse {
    if let Err(e) = scheduler::sweep(&db_manager, realtime.as_ref()).await {
        warn!("{:<12} --> 기회성 스위프 실패 (무시): {:?}", "HandlerQuery", e);
    }
    match query::handlers::get_all_auctions(&db_manager).await {
        Ok(auctions) => Json(auctions).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 경매 조회
pub async fn handle_get_auction(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 조회 id: {}", "HandlerQuery", auction_id);
    match query::handlers::get_auction(&db_manager, auction_id).await {
        Ok(Some(auction)) => Json(auction).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "경매를 찾을 수 없습니다.", "code": "NOT_FOUND"})),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// 입찰 원장 조회
pub async fn handle_get_bids(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    match query::handlers::get_bid_ledger(&db_manager, auction_id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SnapshotParams {
    pub since: Option<i64>,
}

/// 권위 스냅샷 조회 (폴링 엔드포인트)
pub async fn handle_get_snapshot(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
    Query(params): Query<SnapshotParams>,
) -> impl IntoResponse {
    let since = params.since.unwrap_or(0);
    match query::handlers::get_snapshot(&db_manager, auction_id, since).await {
        Ok(Some(snapshot)) => Json(snapshot).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "경매를 찾을 수 없습니다.", "code": "NOT_FOUND"})),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// endregion: --- Query Handlers
