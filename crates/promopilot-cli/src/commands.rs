//! Command handlers for the CLI.
//!
//! These are called from `main` after the database pool and engine context
//! are established. Worker commands print the same batch summary the API
//! returns; inspection commands print one line per row.

use promopilot_engine::{run_worker, EngineContext, TriggerSource, Worker};

pub(crate) async fn run_worker_command(
    engine: &EngineContext,
    worker: Worker,
) -> anyhow::Result<()> {
    let report = run_worker(engine, worker, TriggerSource::Cli).await?;
    println!(
        "{} run {} finished: {} processed, {} failed",
        worker.name(),
        report.run_id,
        report.items_processed,
        report.items_failed
    );
    Ok(())
}

pub(crate) async fn show_suggestions(pool: &sqlx::PgPool, seller_id: i64) -> anyhow::Result<()> {
    let rows = promopilot_db::latest_suggestions(pool, seller_id).await?;

    if rows.is_empty() {
        println!("no suggestions stored; run `promopilot-cli suggest` to score the catalog");
        return Ok(());
    }

    for row in &rows {
        println!(
            "{:<16} score {:.2}  trend {:<8} clicks {:>6}  sold {:>5}  stock {:>5}  price {:>10}  {}",
            row.item_id,
            row.potential_score,
            row.engagement_trend,
            row.recent_clicks,
            row.recent_sold,
            row.available_stock,
            row.current_price,
            row.title
        );
    }
    Ok(())
}

pub(crate) async fn show_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let rows = promopilot_db::list_worker_runs(pool, limit.clamp(1, 200)).await?;

    if rows.is_empty() {
        println!("no worker runs recorded yet");
        return Ok(());
    }

    for run in &rows {
        let started = run
            .started_at
            .map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        let completed = run
            .completed_at
            .map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        println!(
            "{:<16} {:<5} {:<10} processed {:>5}  failed {:>4}  started {}  completed {}",
            run.worker,
            run.trigger_source,
            run.status,
            run.items_processed.unwrap_or(0),
            run.items_failed.unwrap_or(0),
            started,
            completed
        );
        if let Some(error) = &run.error {
            println!("  error: {error}");
        }
    }
    Ok(())
}
