pub mod app_config;
pub mod campaign;
pub mod clock;
pub mod config;
pub mod validate;

pub use app_config::{AppConfig, Environment};
pub use campaign::{CampaignState, ScheduleAction, StateError, StateEvent, StateSource};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_app_config, load_app_config_from_env};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
