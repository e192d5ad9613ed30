/// 클라이언트 동기화 루프
/// 푸시 채널(베스트 에포트)과 주기 폴링(권위 스냅샷)을 같은 로컬 뷰에 합친다.
/// 입찰은 id로 중복 제거하고, 카운트다운은 서버가 보고한 시각으로만 계산한다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{AuctionSnapshot, STATUS_COMPLETED, STATUS_SCHEDULED};
use crate::lifecycle::REVEAL_DELAY_SECS;
use crate::message_broker::KafkaConsumer;
use crate::realtime::auction_topic;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Reveal Phase

/// 대기실 연출 시간 (LIVE 진입 직후)
pub const WAITING_ROOM_SECS: i64 = 10;

/// LIVE 위에 얹힌 연출 단계. 서버 상태가 아니라 경과 시간의 순수 함수다.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevealPhase {
    WaitingRoom,
    Reveal,
    Open,
}

pub fn reveal_phase(started_at: DateTime<Utc>, now: DateTime<Utc>) -> RevealPhase {
    let elapsed = now - started_at;
    if elapsed < Duration::seconds(WAITING_ROOM_SECS) {
        RevealPhase::WaitingRoom
    } else if elapsed < Duration::seconds(REVEAL_DELAY_SECS) {
        RevealPhase::Reveal
    } else {
        RevealPhase::Open
    }
}

// endregion: --- Reveal Phase

// region:    --- Auction View

/// 렌더링되는 입찰 항목
#[derive(Debug, Clone)]
pub struct BidEntry {
    pub bid_id: i64,
    pub bidder_id: i64,
    pub username: String,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

/// 낙찰 표시 정보
#[derive(Debug, Clone, PartialEq)]
pub struct ViewWinner {
    pub winner_id: Option<i64>,
    pub winner_username: Option<String>,
    pub final_price: i64,
}

/// 서버 시계 표본. 로컬에서는 표본 사이를 단조 시계로 보간만 한다.
#[derive(Debug, Clone, Copy)]
struct ServerClock {
    server_time: DateTime<Utc>,
    received_at: Instant,
}

/// 경매 하나에 대한 로컬 뷰
pub struct AuctionView {
    pub auction_id: i64,
    pub status: String,
    pub current_price: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<ViewWinner>,
    bids: Vec<BidEntry>,
    seen: HashSet<i64>,
    clock: Option<ServerClock>,
    needs_refresh: bool,
}

impl AuctionView {
    pub fn new(auction_id: i64) -> Self {
        Self {
            auction_id,
            status: STATUS_SCHEDULED.to_string(),
            current_price: 0,
            started_at: None,
            ended_at: None,
            winner: None,
            bids: Vec::new(),
            seen: HashSet::new(),
            clock: None,
            needs_refresh: false,
        }
    }

    /// 입찰 목록 (bid id 순서 = 제출 순서)
    pub fn bids(&self) -> &[BidEntry] {
        &self.bids
    }

    /// 현재 선두 입찰자
    pub fn leading_bidder(&self) -> Option<i64> {
        self.bids
            .iter()
            .max_by(|a, b| a.amount.cmp(&b.amount).then_with(|| b.bid_id.cmp(&a.bid_id)))
            .map(|b| b.bidder_id)
    }

    /// id 중복을 걸러서 정렬 삽입. 같은 입찰은 정확히 한 번만 렌더링된다.
    fn insert_bid(&mut self, entry: BidEntry) {
        if !self.seen.insert(entry.bid_id) {
            return;
        }
        let pos = self
            .bids
            .partition_point(|existing| existing.bid_id < entry.bid_id);
        self.bids.insert(pos, entry);
    }

    /// 푸시 이벤트 반영. 서버 시계 표본은 건드리지 않는다 (폴링 전용).
    pub fn apply_push(&mut self, event: &AuctionEvent) {
        match event {
            AuctionEvent::NewBid {
                bid_id,
                bidder_id,
                username,
                amount,
                timestamp,
                ..
            } => {
                self.insert_bid(BidEntry {
                    bid_id: *bid_id,
                    bidder_id: *bidder_id,
                    username: username.clone(),
                    amount: *amount,
                    timestamp: *timestamp,
                });
                self.current_price = self.current_price.max(*amount);
            }
            AuctionEvent::StatusChange {
                status, started_at, ..
            } => {
                self.status = status.clone();
                if started_at.is_some() {
                    self.started_at = *started_at;
                }
            }
            AuctionEvent::AuctionEnded {
                winner_id,
                winner_username,
                final_price,
                ..
            } => {
                self.status = STATUS_COMPLETED.to_string();
                self.current_price = self.current_price.max(*final_price);
                self.winner = Some(ViewWinner {
                    winner_id: *winner_id,
                    winner_username: winner_username.clone(),
                    final_price: *final_price,
                });
            }
        }
    }

    /// 권위 스냅샷 반영. 타이밍 필드는 항상 스냅샷이 이긴다.
    pub fn apply_snapshot(&mut self, snapshot: &AuctionSnapshot, received_at: Instant) {
        self.status = snapshot.status.clone();
        self.current_price = snapshot.current_price;
        self.started_at = snapshot.started_at;
        self.ended_at = snapshot.ended_at;
        if let Some(info) = &snapshot.winner_info {
            self.winner = Some(ViewWinner {
                winner_id: info.winner_id,
                winner_username: info.winner_username.clone(),
                final_price: info.final_price,
            });
        }
        for bid in &snapshot.recent_bids {
            self.insert_bid(BidEntry {
                bid_id: bid.id,
                bidder_id: bid.bidder_id,
                username: bid.username.clone(),
                amount: bid.amount,
                timestamp: bid.bid_time,
            });
        }
        self.clock = Some(ServerClock {
            server_time: snapshot.server_time,
            received_at,
        });
        self.needs_refresh = false;
    }

    /// 내 입찰의 낙관적 반영. 서버가 돌려준 bid id를 등록해 두면
    /// 같은 입찰이 푸시/폴링으로 되돌아와도 중복되지 않는다.
    pub fn record_local_bid(
        &mut self,
        entry: BidEntry,
        new_price: i64,
        new_deadline: DateTime<Utc>,
    ) {
        self.insert_bid(entry);
        self.current_price = self.current_price.max(new_price);
        self.ended_at = Some(new_deadline);
    }

    /// 마지막 서버 시계 표본 기준의 현재 서버 시각
    pub fn server_now(&self, now: Instant) -> Option<DateTime<Utc>> {
        let clock = self.clock?;
        let elapsed = Duration::from_std(now.duration_since(clock.received_at))
            .unwrap_or_else(|_| Duration::zero());
        Some(clock.server_time + elapsed)
    }

    /// 마감까지 남은 시간. 서버 표본이 없으면 계산하지 않는다.
    /// 로컬 벽시계는 절대 쓰지 않는다.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let ended_at = self.ended_at?;
        Some(ended_at - self.server_now(now)?)
    }

    /// 푸시 채널이 끊겼다. 다음 폴링은 전체 상태를 다시 받아야 한다.
    pub fn on_disconnect(&mut self) {
        self.needs_refresh = true;
    }

    pub fn needs_full_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// 다음 폴링의 since 값. 재접속 직후에는 0으로 전체를 다시 받는다.
    pub fn poll_since(&self) -> i64 {
        if self.needs_refresh {
            0
        } else {
            self.bids.last().map(|b| b.bid_id).unwrap_or(0)
        }
    }
}

// endregion: --- Auction View

// region:    --- Sync Loop

/// 뷰 하나를 푸시 + 폴링으로 수렴시키는 드라이버
pub struct SyncLoop {
    view: Arc<Mutex<AuctionView>>,
    base_url: String,
    auction_id: i64,
}

impl SyncLoop {
    pub fn new(auction_id: i64, base_url: String) -> Self {
        Self {
            view: Arc::new(Mutex::new(AuctionView::new(auction_id))),
            base_url,
            auction_id,
        }
    }

    pub fn view(&self) -> Arc<Mutex<AuctionView>> {
        Arc::clone(&self.view)
    }

    /// 푸시 채널 구독. 끊기면 뷰에 재접속 신호를 남기고 다시 구독한다.
    pub fn spawn_push_channel(&self, brokers: String, group_id: String) {
        let view = Arc::clone(&self.view);
        let auction_id = self.auction_id;
        tokio::spawn(async move {
            let topic = auction_topic(auction_id);
            loop {
                let consumer = KafkaConsumer::new(&brokers, &group_id);
                let handler_view = Arc::clone(&view);
                let result = consumer
                    .consume_json::<AuctionEvent, _, _>(&topic, move |event| {
                        let view = Arc::clone(&handler_view);
                        async move {
                            view.lock().await.apply_push(&event);
                        }
                    })
                    .await;

                if let Err(e) = result {
                    warn!("{:<12} --> 푸시 채널 끊김, 재접속 예정: {:?}", "Sync", e);
                }
                // 끊긴 동안 놓친 이벤트는 가정하지 않는다. 전체 재조회를 표시한다.
                view.lock().await.on_disconnect();
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });
    }

    /// 폴링 루프. 고정 간격으로 권위 스냅샷을 받아 뷰에 합친다.
    pub async fn run_poll_loop(&self, poll_interval: std::time::Duration) {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(poll_interval);
        info!(
            "{:<12} --> 폴링 시작: auction={}, 간격={:?}",
            "Sync", self.auction_id, poll_interval
        );
        loop {
            ticker.tick().await;
            let since = self.view.lock().await.poll_since();
            let url = format!(
                "{}/auctions/{}/snapshot?since={}",
                self.base_url, self.auction_id, since
            );
            match client.get(&url).send().await {
                Ok(response) => match response.json::<AuctionSnapshot>().await {
                    Ok(snapshot) => {
                        self.view
                            .lock()
                            .await
                            .apply_snapshot(&snapshot, Instant::now());
                    }
                    Err(e) => warn!("{:<12} --> 스냅샷 파싱 실패: {:?}", "Sync", e),
                },
                Err(e) => warn!("{:<12} --> 폴링 실패: {:?}", "Sync", e),
            }
        }
    }
}

// endregion: --- Sync Loop

// region:    --- Tests


// endregion: --- Tests
