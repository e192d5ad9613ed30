/// 기한 도래 경매 스위퍼
/// 주기 타이머와 읽기 경로의 기회성 호출 양쪽에서 불린다.
/// 이중 시작 방지는 스위퍼가 아니라 start/end의 CAS 멱등 계약에 기댄다.
// region:    --- Imports
use crate::database::DatabaseManager;
use crate::lifecycle::{self, StartOutcome};
use crate::query::queries::{GET_DUE_SCHEDULED, GET_OVERDUE_LIVE};
use crate::realtime::RealtimePublisher;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, warn};

// endregion: --- Imports

// region:    --- Sweep

/// 스위프 결과
#[derive(Debug, Default, Serialize)]
pub struct SweepOutcome {
    pub started: usize,
    pub ended: usize,
}

/// 기한이 지난 SCHEDULED 경매를 시작하고, 마감이 지난 LIVE 경매를 종료한다.
/// 개별 경매의 실패가 나머지를 막지 않는다.
pub async fn sweep(
    db_manager: &DatabaseManager,
    realtime: &dyn RealtimePublisher,
) -> Result<SweepOutcome, sqlx::Error> {
    let now = Utc::now();
    let mut outcome = SweepOutcome::default();

    let due: Vec<i64> = sqlx::query_scalar(GET_DUE_SCHEDULED)
        .bind(now)
        .fetch_all(&*db_manager.pool)
        .await?;

    for auction_id in due {
        match lifecycle::start(db_manager, realtime, auction_id).await {
            Ok(StartOutcome::Started(_)) => outcome.started += 1,
            // 다른 트리거가 먼저 시작했다. 넘어간다.
            Ok(StartOutcome::AlreadyLive) => {}
            Err(e) => warn!(
                "{:<12} --> 경매 시작 실패 (계속 진행): id={}, err={}",
                "Scheduler", auction_id, e
            ),
        }
    }

    let overdue: Vec<i64> = sqlx::query_scalar(GET_OVERDUE_LIVE)
        .bind(now)
        .fetch_all(&*db_manager.pool)
        .await?;

    for auction_id in overdue {
        match lifecycle::end(db_manager, realtime, auction_id).await {
            Ok(_) => outcome.ended += 1,
            Err(e) => warn!(
                "{:<12} --> 경매 종료 실패 (계속 진행): id={}, err={}",
                "Scheduler", auction_id, e
            ),
        }
    }

    if outcome.started > 0 || outcome.ended > 0 {
        debug!(
            "{:<12} --> 스위프 완료: 시작 {}, 종료 {}",
            "Scheduler", outcome.started, outcome.ended
        );
    }

    Ok(outcome)
}

// endregion: --- Sweep

// region:    --- Periodic Scheduler

/// 주기적 스위퍼
pub struct DueAuctionScheduler {
    db_manager: Arc<DatabaseManager>,
    realtime: Arc<dyn RealtimePublisher>,
}

impl DueAuctionScheduler {
    pub fn new(db_manager: Arc<DatabaseManager>, realtime: Arc<dyn RealtimePublisher>) -> Self {
        Self {
            db_manager,
            realtime,
        }
    }

    /// 1초 간격으로 스위프를 돈다
    pub fn start(&self) {
        let db_manager = Arc::clone(&self.db_manager);
        let realtime = Arc::clone(&self.realtime);
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if let Err(e) = sweep(&db_manager, realtime.as_ref()).await {
                    error!("{:<12} --> 스위프 중 오류 발생: {:?}", "Scheduler", e);
                }
            }
        });
    }
}

// endregion: --- Periodic Scheduler
