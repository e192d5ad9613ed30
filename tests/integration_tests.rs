use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use live_auction_service::auction::model::{Auction, UserAccount};
use live_auction_service::database::DatabaseManager;
use live_auction_service::query;
use live_auction_service::sync::SyncLoop;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

const BASE_URL: &str = "http://localhost:3000";

/// 트레이싱 초기화
#[allow(dead_code)]
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("트레이싱 구독자 설정 실패");
}

/// 데이터베이스 매니저 설정
async fn setup() -> Arc<DatabaseManager> {
    Arc::new(DatabaseManager::new().await)
}

/// 테스트용 사용자 생성
async fn create_test_user(
    db_manager: &DatabaseManager,
    username: String,
    balance: i64,
) -> UserAccount {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, UserAccount>(
                    "INSERT INTO users (username, balance) VALUES ($1, $2) RETURNING id, username, balance",
                )
                .bind(&username)
                .bind(balance)
                .fetch_one(&mut **tx)
                .await
            })
        })
        .await
        .unwrap()
}

/// 테스트용 경매 생성
async fn create_test_auction(
    db_manager: &DatabaseManager,
    name: String,
    starting_price: i64,
    status: &'static str,
    scheduled_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
) -> Auction {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Auction>(
                    "INSERT INTO auctions (name, rank_tier, status, starting_price, current_price, scheduled_at, started_at, ended_at)
                     VALUES ($1, 'BRONZE', $2, $3, $3, $4, $5, $6)
                     RETURNING id, name, rank_tier, status, starting_price, current_price, scheduled_at, started_at, ended_at, winner_id, version, created_at",
                )
                .bind(&name)
                .bind(status)
                .bind(starting_price)
                .bind(scheduled_at)
                .bind(if status == "LIVE" { Some(Utc::now()) } else { None })
                .bind(ended_at)
                .fetch_one(&mut **tx)
                .await
            })
        })
        .await
        .unwrap()
}

/// 테스트용 출품물 생성
async fn create_test_artifact(db_manager: &DatabaseManager, auction_id: i64, name: String) {
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO artifacts (auction_id, name) VALUES ($1, $2)")
                    .bind(auction_id)
                    .bind(&name)
                    .execute(&mut **tx)
                    .await
            })
        })
        .await
        .unwrap();
}

async fn place_bid(client: &Client, auction_id: i64, bidder_id: i64, amount: i64) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}/bid", BASE_URL))
        .json(&json!({
            "auction_id": auction_id,
            "bidder_id": bidder_id,
            "amount": amount,
        }))
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status();
    let body: Value = response.json().await.expect("본문 파싱 실패");
    (StatusCode::from_u16(status.as_u16()).unwrap(), body)
}

/// 입찰 및 최소 입찰가 테스트
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_place_bid_and_minimum_enforcement() {
    let db_manager = setup().await;
    let client = Client::new();

    let bidder_a = create_test_user(&db_manager, "입찰자A".to_string(), 100_000).await;
    let bidder_b = create_test_user(&db_manager, "입찰자B".to_string(), 100_000).await;
    let auction = create_test_auction(
        &db_manager,
        "최소가 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(10),
        Some(Utc::now() + Duration::minutes(5)),
    )
    .await;

    // A가 시작가로 첫 입찰 -> 수락
    let (status, body) = place_bid(&client, auction.id, bidder_a.id, 5000).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_price"], 5000);

    // B가 5050 입찰 -> 최소가 5100 미달로 거절
    let (status, body) = place_bid(&client, auction.id, bidder_b.id, 5050).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "LOW_BID");
    assert_eq!(body["minimum"], 5100);

    // B가 5100 입찰 -> 수락
    let (status, body) = place_bid(&client, auction.id, bidder_b.id, 5100).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_price"], 5100);

    // 원장은 제출 순서대로 단조 증가한다
    let ledger = query::handlers::get_bid_ledger(&db_manager, auction.id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.windows(2).all(|w| w[0].amount < w[1].amount));
}

/// 선두 교체 시 잔액 원장 테스트: 차감은 수락당 정확히 한 번, 밀려난 선두는 즉시 환불
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_refund_on_outbid_balances() {
    let db_manager = setup().await;
    let client = Client::new();

    let bidder_a = create_test_user(&db_manager, "환불A".to_string(), 100_000).await;
    let bidder_b = create_test_user(&db_manager, "환불B".to_string(), 100_000).await;
    let auction = create_test_auction(
        &db_manager,
        "환불 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(10),
        Some(Utc::now() + Duration::minutes(5)),
    )
    .await;

    // A가 5000 입찰 -> A의 잔액에서 5000 차감
    let (status, _) = place_bid(&client, auction.id, bidder_a.id, 5000).await;
    assert_eq!(status, StatusCode::OK);
    let a_after_bid = query::handlers::get_bidder_account(&db_manager, bidder_a.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a_after_bid.balance, 95_000);

    // B가 5100으로 선두 교체 -> A는 전액 환불, B는 정확히 5100 차감
    let (status, _) = place_bid(&client, auction.id, bidder_b.id, 5100).await;
    assert_eq!(status, StatusCode::OK);

    let a_final = query::handlers::get_bidder_account(&db_manager, bidder_a.id)
        .await
        .unwrap()
        .unwrap();
    let b_final = query::handlers::get_bidder_account(&db_manager, bidder_b.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a_final.balance, 100_000);
    assert_eq!(b_final.balance, 94_900);
}

/// 잔액 가드 테스트
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_balance_guard() {
    let db_manager = setup().await;
    let client = Client::new();

    let poor_bidder = create_test_user(&db_manager, "잔액부족".to_string(), 4999).await;
    let auction = create_test_auction(
        &db_manager,
        "잔액 가드 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(10),
        Some(Utc::now() + Duration::minutes(5)),
    )
    .await;

    let (status, body) = place_bid(&client, auction.id, poor_bidder.id, 5000).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");
    assert_eq!(body["required"], 5000);
    assert_eq!(body["available"], 4999);
}

/// 스나이핑 방지 연장 테스트
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_anti_snipe_extension() {
    let db_manager = setup().await;
    let client = Client::new();

    let bidder = create_test_user(&db_manager, "스나이퍼".to_string(), 100_000).await;
    // 마감까지 8초 남은 경매
    let auction = create_test_auction(
        &db_manager,
        "스나이핑 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(60),
        Some(Utc::now() + Duration::seconds(8)),
    )
    .await;

    let before = auction.ended_at.unwrap();
    let bid_time = Utc::now();
    let (status, body) = place_bid(&client, auction.id, bidder.id, 5000).await;
    assert_eq!(status, StatusCode::OK);

    // 새 마감은 입찰 시각 + 10초 이상이고 이전 마감보다 이르지 않다
    let new_deadline: DateTime<Utc> =
        serde_json::from_value(body["new_deadline"].clone()).unwrap();
    assert!(new_deadline >= bid_time + Duration::seconds(10));
    assert!(new_deadline >= before);
}

/// 스위프 및 중복 시작 테스트
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_sweep_and_idempotent_start_failure() {
    let db_manager = setup().await;
    let client = Client::new();

    // 시작 시간이 이미 지난 SCHEDULED 경매
    let auction = create_test_auction(
        &db_manager,
        "스위프 테스트 경매".to_string(),
        5000,
        "SCHEDULED",
        Utc::now() - Duration::seconds(30),
        None,
    )
    .await;

    let response = client
        .post(format!("{}/auctions/sweep", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let started = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(started.status, "LIVE");
    let first_started_at = started.started_at;

    // 이미 LIVE인 경매를 다시 시작 -> 보고되는 실패, started_at은 그대로
    let response = client
        .post(format!("{}/auctions/{}/start", BASE_URL, auction.id))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "ALREADY_LIVE");

    let after = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.started_at, first_started_at);
}

/// 멱등 종료 테스트: 두 트리거가 경쟁해도 결과는 하나
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_idempotent_end() {
    let db_manager = setup().await;
    let client = Client::new();

    let bidder_a = create_test_user(&db_manager, "종료A".to_string(), 100_000).await;
    let bidder_b = create_test_user(&db_manager, "종료B".to_string(), 100_000).await;
    let auction = create_test_auction(
        &db_manager,
        "멱등 종료 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(60),
        Some(Utc::now() + Duration::seconds(3)),
    )
    .await;

    let (status, _) = place_bid(&client, auction.id, bidder_a.id, 5000).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = place_bid(&client, auction.id, bidder_b.id, 5100).await;
    assert_eq!(status, StatusCode::OK);

    // 마감 대기 (마지막 입찰로 연장됐을 수 있다)
    tokio::time::sleep(tokio::time::Duration::from_secs(15)).await;

    // 두 호출자가 동시에 종료를 요청한다
    let end_url = format!("{}/auctions/{}/end", BASE_URL, auction.id);
    let first = client.post(&end_url).send();
    let second = client.post(&end_url).send();
    let (first, second) = tokio::join!(first, second);

    let first: Value = first.unwrap().json().await.unwrap();
    let second: Value = second.unwrap().json().await.unwrap();

    // 양쪽 모두 같은 낙찰 결과를 본다
    assert_eq!(first, second);
    assert_eq!(first["winner_id"], bidder_b.id);
    assert_eq!(first["final_price"], 5100);

    let completed = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.status, "COMPLETED");
    assert_eq!(completed.winner_id, Some(bidder_b.id));
}

/// 입찰 없는 경매는 낙찰자 없이 완료된다
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_no_bid_completion() {
    let db_manager = setup().await;
    let client = Client::new();

    let auction = create_test_auction(
        &db_manager,
        "유찰 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(60),
        Some(Utc::now() - Duration::seconds(1)),
    )
    .await;

    let response = client
        .post(format!("{}/auctions/{}/end", BASE_URL, auction.id))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["winner_id"], Value::Null);
    assert_eq!(body["final_price"], 5000);
}

/// 수령 멱등성 테스트
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_claim_is_idempotent() {
    let db_manager = setup().await;
    let client = Client::new();

    let winner = create_test_user(&db_manager, "낙찰자".to_string(), 100_000).await;
    let other = create_test_user(&db_manager, "구경꾼".to_string(), 100_000).await;
    let auction = create_test_auction(
        &db_manager,
        "수령 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(60),
        Some(Utc::now() + Duration::seconds(2)),
    )
    .await;
    create_test_artifact(&db_manager, auction.id, "고대 유물".to_string()).await;

    let (status, _) = place_bid(&client, auction.id, winner.id, 5000).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(tokio::time::Duration::from_secs(13)).await;
    let response = client
        .post(format!("{}/auctions/{}/end", BASE_URL, auction.id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let claim_url = format!("{}/auctions/{}/claim", BASE_URL, auction.id);

    // 낙찰자가 아니면 거부된다
    let response = client
        .post(&claim_url)
        .json(&json!({"caller_id": other.id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // 첫 수령: 출품물 1건 이전
    let response = client
        .post(&claim_url)
        .json(&json!({"caller_id": winner.id}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transferred"], 1);

    // 두 번째 수령: 이전할 것이 없다 (이중 이전 금지)
    let response = client
        .post(&claim_url)
        .json(&json!({"caller_id": winner.id}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["transferred"], 0);
}

/// 동시성 입찰 테스트: 경쟁 입찰 속에서도 원장은 단조 증가한다
#[tokio::test]
#[ignore = "로컬 Postgres와 실행 중인 서버가 필요하다"]
async fn test_concurrent_bidding() {
    init_tracing();
    let db_manager = setup().await;

    let auction = create_test_auction(
        &db_manager,
        "동시성 입찰 테스트 경매".to_string(),
        10_000,
        "LIVE",
        Utc::now() - Duration::seconds(10),
        Some(Utc::now() + Duration::minutes(10)),
    )
    .await;

    // 50명의 입찰자를 만들어 동시에 입찰시킨다
    let mut bidders = Vec::with_capacity(50);
    for i in 1..=50i64 {
        bidders.push(
            create_test_user(&db_manager, format!("동시입찰자{}", i), 10_000_000).await,
        );
    }

    let mut handles = vec![];
    for (i, bidder) in bidders.iter().enumerate() {
        let client = Client::new();
        let auction_id = auction.id;
        let bidder_id = bidder.id;
        let amount = 10_000 + (i as i64 + 1) * 1000;

        let handle = tokio::spawn(async move {
            place_bid(&client, auction_id, bidder_id, amount).await
        });
        handles.push(handle);
    }

    let mut successful_bids = 0;
    let mut failed_bids = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::OK {
            successful_bids += 1;
        } else {
            assert_ne!(body["code"], "MAX_RETRIES_EXCEEDED", "재시도 한도 초과: {:?}", body);
            failed_bids += 1;
        }
    }
    info!(
        "성공한 입찰 수: {}, 실패한 입찰 수: {}",
        successful_bids, failed_bids
    );
    assert!(successful_bids >= 1);

    // 원장은 제출 순서대로 단조 증가해야 한다
    let ledger = query::handlers::get_bid_ledger(&db_manager, auction.id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), successful_bids);
    assert!(ledger.windows(2).all(|w| w[0].amount < w[1].amount));

    // 현재 가격은 마지막으로 수락된 입찰 금액이다
    let updated = query::handlers::get_auction(&db_manager, auction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.current_price, ledger.last().unwrap().amount);

    // 잔액 원장: 밀려난 선두는 모두 환불되므로
    // 전체 차감 합계는 현재 선두 금액과 정확히 일치한다
    let mut total_debited = 0;
    for bidder in &bidders {
        let account = query::handlers::get_bidder_account(&db_manager, bidder.id)
            .await
            .unwrap()
            .unwrap();
        total_debited += 10_000_000 - account.balance;
    }
    assert_eq!(total_debited, updated.current_price);
}

/// 동기화 루프 수렴 테스트: 푸시와 폴링을 합쳐도 입찰은 한 번씩만 렌더링된다
#[tokio::test]
#[ignore = "로컬 Postgres/Kafka와 실행 중인 서버가 필요하다"]
async fn test_sync_loop_converges() {
    let db_manager = setup().await;
    let client = Client::new();

    let bidder_a = create_test_user(&db_manager, "관전A".to_string(), 100_000).await;
    let bidder_b = create_test_user(&db_manager, "관전B".to_string(), 100_000).await;
    let auction = create_test_auction(
        &db_manager,
        "동기화 테스트 경매".to_string(),
        5000,
        "LIVE",
        Utc::now() - Duration::seconds(10),
        Some(Utc::now() + Duration::minutes(5)),
    )
    .await;

    // 관전자 동기화 루프 구동 (푸시 채널 + 폴링)
    let sync = SyncLoop::new(auction.id, BASE_URL.to_string());
    let brokers =
        std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
    sync.spawn_push_channel(brokers, format!("sync-test-{}", auction.id));
    let view = sync.view();
    tokio::spawn(async move {
        sync.run_poll_loop(std::time::Duration::from_millis(500)).await;
    });

    // 구독이 자리잡을 시간을 준 뒤 입찰 두 건
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    let (status, _) = place_bid(&client, auction.id, bidder_a.id, 5000).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = place_bid(&client, auction.id, bidder_b.id, 5100).await;
    assert_eq!(status, StatusCode::OK);

    // 몇 번의 폴링 틱이 지나면 뷰는 서버 상태로 수렴한다
    tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
    let converged = view.lock().await;

    // 같은 입찰이 푸시와 폴링 양쪽으로 도착해도 정확히 한 번씩
    assert_eq!(converged.bids().len(), 2);
    assert_eq!(converged.current_price, 5100);
    assert_eq!(converged.leading_bidder(), Some(bidder_b.id));
    assert_eq!(converged.status, "LIVE");

    // 카운트다운은 서버 시계 표본으로 계산된다
    let remaining = converged.remaining(std::time::Instant::now());
    assert!(remaining.is_some());
    assert!(remaining.unwrap() > Duration::zero());
}
