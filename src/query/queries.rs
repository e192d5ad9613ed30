/// 경매 조회
pub const GET_AUCTION: &str = "SELECT id, name, rank_tier, status, starting_price, current_price, scheduled_at, started_at, ended_at, winner_id, version, created_at FROM auctions WHERE id = $1";

/// 모든 경매 조회
pub const GET_ALL_AUCTIONS: &str = "SELECT id, name, rank_tier, status, starting_price, current_price, scheduled_at, started_at, ended_at, winner_id, version, created_at FROM auctions ORDER BY scheduled_at DESC";

/// 최고 입찰 조회 (동액이면 먼저 제출된 입찰이 우선)
pub const GET_HIGHEST_BID: &str = r#"
    SELECT id, auction_id, bidder_id, amount, bid_time
    FROM bids
    WHERE auction_id = $1
    ORDER BY amount DESC, id ASC
    LIMIT 1
"#;

/// 입찰 원장 조회 (제출 순서대로)
pub const GET_BID_LEDGER: &str = r#"
    SELECT id, auction_id, bidder_id, amount, bid_time
    FROM bids
    WHERE auction_id = $1
    ORDER BY id ASC
"#;

/// 특정 입찰 id 이후의 입찰 조회 (스냅샷 폴링용, 입찰자 이름 포함)
pub const GET_BIDS_SINCE: &str = r#"
    SELECT b.id, b.bidder_id, u.username, b.amount, b.bid_time
    FROM bids b
    JOIN users u ON u.id = b.bidder_id
    WHERE b.auction_id = $1 AND b.id > $2
    ORDER BY b.id ASC
"#;

/// 마지막 입찰 조회
pub const GET_LAST_BID: &str = r#"
    SELECT id, auction_id, bidder_id, amount, bid_time
    FROM bids
    WHERE auction_id = $1
    ORDER BY id DESC
    LIMIT 1
"#;

/// 입찰자 계정 조회
pub const GET_BIDDER_ACCOUNT: &str = "SELECT id, username, balance FROM users WHERE id = $1";

/// 사용자 이름 조회
pub const GET_USERNAME: &str = "SELECT username FROM users WHERE id = $1";

/// 시작 시각이 지난 SCHEDULED 경매 조회
pub const GET_DUE_SCHEDULED: &str =
    "SELECT id FROM auctions WHERE status = 'SCHEDULED' AND scheduled_at <= $1 ORDER BY id ASC";

/// 마감 시각이 지난 LIVE 경매 조회
pub const GET_OVERDUE_LIVE: &str =
    "SELECT id FROM auctions WHERE status = 'LIVE' AND ended_at <= $1 ORDER BY id ASC";
