/// 실시간 팬아웃
/// best-effort 발행. 실패는 로그만 남기고 삼킨다.
/// 권위 상태는 저장소에 있으므로 전달 실패가 정합성을 깨지 않는다.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, GlobalNotice};
use crate::message_broker::KafkaProducer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

// endregion: --- Imports

// region:    --- Topics

/// 경매별 토픽 (입찰, 상태 전이)
pub fn auction_topic(auction_id: i64) -> String {
    format!("auction-events-{}", auction_id)
}

/// 전역 토픽 (목록 화면용 시작 공지)
pub const NOTICE_TOPIC: &str = "auction-notices";

// endregion: --- Topics

// region:    --- Publisher Trait

/// 팬아웃 발행자. 어느 구현도 호출자의 트랜잭션을 중단시키지 않는다.
#[async_trait]
pub trait RealtimePublisher: Send + Sync {
    /// 경매별 토픽으로 발행
    async fn publish_auction(&self, auction_id: i64, event: &AuctionEvent);
    /// 전역 토픽으로 발행
    async fn publish_notice(&self, notice: &GlobalNotice);
}

// endregion: --- Publisher Trait

// region:    --- Kafka Publisher

pub struct KafkaRealtime {
    producer: Arc<KafkaProducer>,
}

impl KafkaRealtime {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self { producer }
    }

    async fn send(&self, topic: &str, key: &str, payload: &serde_json::Value) {
        if let Err(e) = self
            .producer
            .send_message(topic, key, &payload.to_string())
            .await
        {
            // 팬아웃 실패는 삼킨다
            warn!(
                "{:<12} --> 팬아웃 발행 실패 (무시): topic={}, err={}",
                "Realtime", topic, e
            );
        }
    }
}

#[async_trait]
impl RealtimePublisher for KafkaRealtime {
    async fn publish_auction(&self, auction_id: i64, event: &AuctionEvent) {
        match serde_json::to_value(event) {
            Ok(payload) => {
                self.send(&auction_topic(auction_id), &auction_id.to_string(), &payload)
                    .await
            }
            Err(e) => warn!("{:<12} --> 이벤트 직렬화 실패 (무시): {:?}", "Realtime", e),
        }
    }

    async fn publish_notice(&self, notice: &GlobalNotice) {
        match serde_json::to_value(notice) {
            Ok(payload) => self.send(NOTICE_TOPIC, "notice", &payload).await,
            Err(e) => warn!("{:<12} --> 공지 직렬화 실패 (무시): {:?}", "Realtime", e),
        }
    }
}

// endregion: --- Kafka Publisher

// region:    --- Noop Publisher

/// 브로커 없이 돌리는 테스트용 발행자
pub struct NoopRealtime;

#[async_trait]
impl RealtimePublisher for NoopRealtime {
    async fn publish_auction(&self, _auction_id: i64, _event: &AuctionEvent) {}
    async fn publish_notice(&self, _notice: &GlobalNotice) {}
}

// endregion: --- Noop Publisher
