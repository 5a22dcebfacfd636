use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub seller_id: i64,
    pub api_keys: Vec<String>,
    pub market_token: String,
    pub market_base_url: Option<String>,
    pub market_timeout_secs: u64,
    pub market_max_retries: u32,
    pub market_backoff_base_ms: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub schedule_max_failures: i32,
    pub suggestion_retention_days: i64,
    pub metrics_lookback_days: i64,
    pub prediction_horizon_days: i64,
    pub prediction_min_history_days: i64,
    pub worker_deadline_secs: u64,
    pub schedule_tick_cron: String,
    pub metrics_cron: String,
    pub suggest_cron: String,
    pub predict_cron: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("seller_id", &self.seller_id)
            .field("api_keys", &format_args!("[{} redacted]", self.api_keys.len()))
            .field("database_url", &"[redacted]")
            .field("market_token", &"[redacted]")
            .field("market_base_url", &self.market_base_url)
            .field("market_timeout_secs", &self.market_timeout_secs)
            .field("market_max_retries", &self.market_max_retries)
            .field("market_backoff_base_ms", &self.market_backoff_base_ms)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("schedule_max_failures", &self.schedule_max_failures)
            .field("suggestion_retention_days", &self.suggestion_retention_days)
            .field("metrics_lookback_days", &self.metrics_lookback_days)
            .field("prediction_horizon_days", &self.prediction_horizon_days)
            .field(
                "prediction_min_history_days",
                &self.prediction_min_history_days,
            )
            .field("worker_deadline_secs", &self.worker_deadline_secs)
            .field("schedule_tick_cron", &self.schedule_tick_cron)
            .field("metrics_cron", &self.metrics_cron)
            .field("suggest_cron", &self.suggest_cron)
            .field("predict_cron", &self.predict_cron)
            .finish()
    }
}
