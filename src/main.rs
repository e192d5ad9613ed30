// region:    --- Imports
use live_auction_service::database::DatabaseManager;
use live_auction_service::handlers::{self, AppState};
use live_auction_service::message_broker::KafkaProducer;
use live_auction_service::realtime::{KafkaRealtime, NoopRealtime, RealtimePublisher};
use live_auction_service::scheduler::DueAuctionScheduler;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new().await);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // 실시간 팬아웃 발행자 생성. 브로커 장애는 발행 시점에 삼켜진다.
    let realtime: Arc<dyn RealtimePublisher> = if std::env::var("REALTIME_DISABLED").is_ok() {
        info!("{:<12} --> 실시간 팬아웃 비활성화", "Main");
        Arc::new(NoopRealtime)
    } else {
        let producer = Arc::new(KafkaProducer::from_env());
        info!("{:<12} --> 실시간 발행자 준비 완료", "Main");
        Arc::new(KafkaRealtime::new(producer))
    };

    // 기한 도래 경매 스위퍼 시작
    let sweeper = DueAuctionScheduler::new(Arc::clone(&db_manager), Arc::clone(&realtime));
    sweeper.start();

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let state: AppState = (db_manager, realtime);
    let routes_all = Router::new()
        .route("/bid", post(handlers::handle_bid))
        .route("/auctions", get(handlers::handle_get_auctions))
        .route("/auctions/sweep", post(handlers::handle_sweep))
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route("/auctions/:id/start", post(handlers::handle_start_auction))
        .route("/auctions/:id/end", post(handlers::handle_end_auction))
        .route("/auctions/:id/claim", post(handlers::handle_claim))
        .route("/auctions/:id/bids", get(handlers::handle_get_bids))
        .route("/auctions/:id/snapshot", get(handlers::handle_get_snapshot))
        .layer(cors)
        .with_state(state);

    // 리스너 생성
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
