use promopilot_db::DbError;
use promopilot_market::MarketError;
use thiserror::Error;

/// Failures that abort a whole worker run.
///
/// Per-item trouble (one campaign's counters unreadable, one promotion call
/// rejected) never surfaces here; the batch loops log it, count it in the
/// run's failure tally, and move on. What does surface is the systemic
/// stuff: the database being unreachable, a batch-level marketplace fetch
/// failing after retries, or an attempt to start a worker that is already
/// running.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another instance of this worker holds the run lock.
    #[error("worker '{0}' is already running")]
    AlreadyRunning(&'static str),

    #[error(transparent)]
    Db(#[from] DbError),

    /// A marketplace call the whole batch depends on failed after retries.
    #[error("marketplace call failed: {0}")]
    Market(#[from] MarketError),
}
