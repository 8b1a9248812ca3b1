//! Accounting export queue commands

use anyhow::Result;
use chrono::{TimeZone, Utc};
use fanledger_business::{spawn_sweeper, AccountingExporter, ServiceContext};
use std::sync::Arc;

use crate::QueueAction;

/// Handle queue subcommands
pub async fn handle(ctx: ServiceContext, action: QueueAction) -> Result<()> {
    match action {
        QueueAction::Status => {
            let stats = AccountingExporter::new(&ctx).queue_stats().await?;
            println!("📬 Accounting export queue");
            println!("   Pending:    {}", stats.pending);
            println!("   Processing: {}", stats.processing);
            println!("   Completed:  {}", stats.completed);
            println!("   Failed:     {}", stats.failed);
        }

        QueueAction::List { status } => {
            let entries = AccountingExporter::new(&ctx)
                .list_by_status(status.to_core_type())
                .await?;
            if entries.is_empty() {
                println!("No {} entries", status.to_core_type().as_str());
            }
            for entry in entries {
                let next = Utc
                    .timestamp_opt(entry.next_retry_at, 0)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| entry.next_retry_at.to_string());
                println!(
                    "{}  payment {}  attempts {}  next {}  {}",
                    entry.id,
                    entry.payment_id,
                    entry.attempts,
                    next,
                    entry.last_error.unwrap_or_default()
                );
            }
        }

        QueueAction::Sweep => {
            if ctx.accounting().is_none() {
                println!("⚠️  No accounting endpoint configured; only expired leases are recovered");
            }
            let report = AccountingExporter::new(&ctx).process_queue(Utc::now()).await?;
            println!(
                "✅ Sweep: {} attempted, {} completed, {} rescheduled, {} failed, {} requeued",
                report.attempted, report.completed, report.rescheduled, report.failed, report.requeued
            );
        }

        QueueAction::Run => {
            let every = std::time::Duration::from_secs(ctx.config().accounting.sweep_interval_secs);
            let ctx = Arc::new(ctx);
            let sweeper = spawn_sweeper(Arc::clone(&ctx), every);
            let cleanup_every =
                std::time::Duration::from_secs(ctx.config().rate_limit.cleanup_interval_secs);
            let cleanups = [
                ctx.spend_limiter().spawn_cleanup(cleanup_every),
                ctx.registration_limiter().spawn_cleanup(cleanup_every),
            ];
            tracing::info!(interval_secs = every.as_secs(), "accounting sweeper running; Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            sweeper.abort();
            for cleanup in cleanups {
                cleanup.abort();
            }
            tracing::info!("accounting sweeper stopped");
        }
    }

    Ok(())
}
