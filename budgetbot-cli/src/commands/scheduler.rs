//! Materialization commands: a single tick, or the polling loop

use anyhow::Result;
use budgetbot_engine::PoolStats;
use chrono::Local;
use tokio_util::sync::CancellationToken;

use super::Engine;
use crate::ui;

/// Materialize everything due today, wait for it, then exit
pub async fn tick(engine: &Engine) -> Result<()> {
    ui::header("Materializing due charges");

    let pool = engine.scheduler.start_pool();
    let polled = engine.scheduler.poll_due_once(&pool, Local::now()).await;
    pool.shutdown().await;
    let accepted = polled?;

    if accepted == 0 {
        ui::info("Nothing due today.");
    }
    print_stats(&pool.stats());
    Ok(())
}

/// Poll for due charges until Ctrl-C
pub async fn run(engine: &Engine) -> Result<()> {
    let config = engine.scheduler.config();
    ui::header("Subscription scheduler");
    ui::key_value("Poll interval", &format!("{:?}", config.poll_interval()));
    ui::key_value("Workers", &config.workers.to_string());
    ui::info("Press Ctrl-C to stop.");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    let stats = engine.scheduler.run_materialization_loop(cancel).await?;
    ui::success("Scheduler stopped.");
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &PoolStats) {
    ui::key_value("Submitted", &stats.submitted.to_string());
    ui::key_value("Deduplicated", &stats.deduplicated.to_string());
    ui::key_value("Succeeded", &stats.succeeded.to_string());
    if stats.failed > 0 {
        ui::warning(&format!(
            "{} charge(s) failed and stay scheduled for retry",
            stats.failed
        ));
    }
}
