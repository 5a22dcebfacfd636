//! Offline unit tests for promopilot-db pool configuration and row types.
//! These tests do not require a live database connection.

use promopilot_core::{AppConfig, Environment};
use promopilot_db::{CampaignRow, MetricTotals, PoolConfig, ScheduleRow, WorkerRunRow};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

fn test_app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        seller_id: 123,
        api_keys: Vec::new(),
        market_token: "token".to_string(),
        market_base_url: None,
        market_timeout_secs: 30,
        market_max_retries: 3,
        market_backoff_base_ms: 1000,
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        schedule_max_failures: 5,
        suggestion_retention_days: 30,
        metrics_lookback_days: 7,
        prediction_horizon_days: 7,
        prediction_min_history_days: 90,
        worker_deadline_secs: 300,
        schedule_tick_cron: "0 */5 * * * *".to_string(),
        metrics_cron: "0 5 * * * *".to_string(),
        suggest_cron: "0 0 3 * * *".to_string(),
        predict_cron: "0 30 3 * * *".to_string(),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&test_app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn pool_config_default_is_sane() {
    let pool_config = PoolConfig::default();
    assert!(pool_config.max_connections >= pool_config.min_connections);
    assert!(pool_config.acquire_timeout_secs > 0);
}

/// Compile-time smoke test: confirm that [`CampaignRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn campaign_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let now = Utc::now();
    let row = CampaignRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        seller_id: 123_i64,
        item_id: "MLB123".to_string(),
        campaign_name: "Winter clearance".to_string(),
        discount_percentage: Decimal::new(1500, 2),
        timezone: "America/Sao_Paulo".to_string(),
        start_date: now,
        end_date: now,
        state: "draft".to_string(),
        state_source: "system".to_string(),
        state_updated_at: now,
        total_clicks: 0_i64,
        total_impressions: 0_i64,
        total_conversions: 0_i64,
        total_sales_amount: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    };

    assert_eq!(row.id, 1);
    assert_eq!(row.item_id, "MLB123");
    assert_eq!(row.state, "draft");
    assert_eq!(row.state_source, "system");
    assert_eq!(row.discount_percentage, Decimal::new(1500, 2));
    assert_eq!(row.total_clicks, 0);
}

/// Compile-time smoke test: confirm that [`ScheduleRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn schedule_row_has_expected_fields() {
    use chrono::{NaiveTime, Utc};

    let now = Utc::now();
    let row = ScheduleRow {
        id: 7_i64,
        campaign_id: 1_i64,
        day_of_week: 0_i16,
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        action: "activate".to_string(),
        status: "pending".to_string(),
        failure_count: 0_i32,
        last_executed: None,
        next_execution: now,
        created_at: now,
        updated_at: now,
    };

    assert_eq!(row.day_of_week, 0);
    assert_eq!(row.action, "activate");
    assert_eq!(row.status, "pending");
    assert!(row.last_executed.is_none());
    assert_eq!(row.failure_count, 0);
}

/// Compile-time smoke test: confirm that [`WorkerRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn worker_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = WorkerRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        worker: "schedule_tick".to_string(),
        trigger_source: "cron".to_string(),
        status: "queued".to_string(),
        items_processed: None,
        items_failed: None,
        error: None,
        started_at: None,
        completed_at: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.worker, "schedule_tick");
    assert_eq!(row.trigger_source, "cron");
    assert_eq!(row.status, "queued");
    assert!(row.items_processed.is_none());
    assert!(row.started_at.is_none());
    assert!(row.completed_at.is_none());
}

#[test]
fn metric_totals_default_is_zero() {
    let totals = MetricTotals::default();
    assert_eq!(totals.clicks, 0);
    assert_eq!(totals.impressions, 0);
    assert_eq!(totals.conversions, 0);
    assert_eq!(totals.sales_amount, Decimal::ZERO);
}
