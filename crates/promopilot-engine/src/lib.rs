//! Background workers for promopilot.
//!
//! Four workers share one execution harness: suggestion scoring, the
//! schedule tick, counter collection, and performance forecasting. Callers
//! (cron, API, CLI) all go through [`run_worker`], which enforces one run
//! per worker at a time and books every run in `worker_runs`. The modules
//! underneath hold the pure decision logic; everything that talks to
//! Postgres or the marketplace lives behind the [`EngineContext`] handles
//! so tests can swap in fixed clocks and mock servers.

mod error;
pub mod metrics;
pub mod predict;
pub mod schedule;
pub mod suggest;
pub mod worker;

pub use error::EngineError;
pub use worker::{run_worker, EngineContext, EnginePolicy, TriggerSource, Worker, WorkerReport};
