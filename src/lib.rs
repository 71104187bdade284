// src/lib.rs

//! Task scheduling and execution engine for social-blogging automation.
//!
//! The library is organised leaves first:
//! - [`context`]: the per-run resources (browser session, settings, security,
//!   comment generator) and the collaborator traits behind them.
//! - [`task`]: the task abstraction and the kind → constructor factory.
//! - [`tasks`]: the built-in task kinds.
//! - [`events`]: the lifecycle event bus and ready-made sinks.
//! - [`engine`]: the scheduler.
//! - [`config`]: TOML run plans.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod logging;
pub mod task;
pub mod tasks;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::PlanFile;
use crate::config::loader::load_and_validate;
use crate::context::{DetachedBrowser, SecurityContext, StaticContextProvider};
use crate::engine::{RunStatus, RunSummary, Scheduler, TaskOutcome};
use crate::events::{EventBus, JsonLinesLog, RunStatistics, StatisticsSnapshot};
use crate::task::TaskFactory;

/// High-level entry point used by `main.rs`.
///
/// Wires together plan loading, the built-in task factory, the event sinks,
/// the scheduler and Ctrl-C handling.
pub async fn run(args: CliArgs) -> Result<()> {
    let plan_path = PathBuf::from(&args.plan);
    let mut plan = load_and_validate(&plan_path)?;
    if let Some(concurrency) = args.concurrency {
        plan = plan.with_concurrency(usize::from(concurrency));
    }

    let factory = Arc::new(TaskFactory::with_builtins());

    if args.dry_run {
        print_dry_run(&plan, &factory);
        factory.validate(&plan.specs())?;
        return Ok(());
    }

    let security = SecurityContext::for_current_host();
    info!(host = %security.redact(security.fingerprint().as_str()), "host fingerprint computed");

    // No concrete browser ships with this binary; session-bound tasks fail
    // with a fatal `Disconnected` error and stop the run.
    warn!("no browser provider attached; session-bound tasks will fail");
    let provider = StaticContextProvider::new(
        Arc::new(DetachedBrowser),
        Arc::new(plan.config_store()),
        security,
    );

    let bus = Arc::new(EventBus::new());
    let stats = Arc::new(RunStatistics::new());
    stats.attach(&bus);
    if let Some(path) = &args.run_log {
        let log = Arc::new(JsonLinesLog::open(path)?);
        log.attach(&bus);
        info!(path = %log.path().display(), "writing run log");
    }

    info!("no license verifier configured; skipping license check");
    let scheduler = Scheduler::new(factory, Arc::new(provider), plan.engine_options())
        .with_event_bus(bus);

    // Ctrl-C → cancel the run.
    {
        let token = scheduler.cancellation_token();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            token.cancel();
        });
    }

    let summary = scheduler.start(plan.specs()).await?;
    print_summary(&summary, &stats.snapshot());

    match summary.status() {
        RunStatus::Completed | RunStatus::Cancelled => Ok(()),
        RunStatus::Failed => anyhow::bail!(
            "run {} stopped after a fatal task failure",
            summary.run_id()
        ),
    }
}

/// Print engine settings and the task list without running anything.
fn print_dry_run(plan: &PlanFile, factory: &TaskFactory) {
    let options = plan.engine_options();
    println!("blogpilot dry-run");
    println!("  engine.concurrency = {}", options.concurrency);
    println!("  engine.task_timeout = {:?}", options.task_timeout);
    println!("  engine.inter_task_delay = {:?}", options.inter_task_delay);
    println!("  engine.retry = {:?}", options.retry);
    if !plan.settings().is_empty() {
        println!("  settings: {:?}", plan.settings().keys().collect::<Vec<_>>());
    }
    println!();

    let specs = plan.specs();
    println!("tasks ({}):", specs.len());
    for spec in &specs {
        let known = if factory.is_registered(&spec.kind) {
            ""
        } else {
            "  (unknown kind)"
        };
        println!("  {}. {} [{}]{known}", spec.order + 1, spec.display_name(), spec.kind);
        for (key, value) in spec.parameters.iter() {
            println!("      {key}: {value}");
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(summary: &RunSummary, stats: &StatisticsSnapshot) {
    println!(
        "run {} {:?}: {} succeeded, {} failed, {} skipped in {:.1}s",
        summary.run_id(),
        summary.status(),
        summary.succeeded(),
        summary.failed(),
        summary.skipped(),
        summary.elapsed().as_secs_f64()
    );
    for report in summary.reports() {
        let line = match report.outcome() {
            TaskOutcome::Completed(result) if result.is_success() => {
                format!("ok      {}", result.message())
            }
            TaskOutcome::Completed(result) => format!(
                "failed  [{}] {}",
                result
                    .error_kind()
                    .map(|k| k.as_str())
                    .unwrap_or("unknown"),
                result.message()
            ),
            TaskOutcome::Skipped { reason } => format!("skipped {reason}"),
        };
        println!(
            "  {}. {} (attempts: {}) {line}",
            report.index() + 1,
            report.name(),
            report.attempts()
        );
    }
    if stats.retries > 0 {
        println!("  retries: {}", stats.retries);
    }
}
