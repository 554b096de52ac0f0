mod args;
mod schedule;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use solver_manager_core::config::SolverManagerConfig;
use solver_manager_core::engine::{EngineLimits, SteppingEngine};
use solver_manager_core::logging;
use solver_manager_core::models::{ManagerError, SolverStatus};
use solver_manager_core::orchestration::SolverManager;

use crate::args::{DemoArgs, USAGE};
use crate::schedule::{Schedule, greedy_step};

#[derive(Serialize)]
struct TenantReport {
    tenant: u64,
    status: SolverStatus,
    score: Option<String>,
    improvements: u64,
    loads: Vec<u64>,
    failure: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let args = match DemoArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("solver-manager: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: DemoArgs) -> Result<(), ManagerError> {
    let config = SolverManagerConfig::from_env()?;
    let neighbourhood = args.tasks.saturating_mul(args.employees).saturating_mul(4);
    let limits = EngineLimits {
        time_limit: Some(args.time_limit),
        unimproved_step_limit: Some(u64::try_from(neighbourhood).unwrap_or(u64::MAX)),
        ..EngineLimits::default()
    };
    let step = greedy_step();
    let manager = SolverManager::new(config, move |_tenant: &u64| {
        SteppingEngine::new(limits, step.clone())
    })?;
    tracing::info!(
        workers = manager.config().worker_count,
        tenants = args.tenants,
        "solving generated schedules"
    );

    let mut counters = Vec::new();
    for tenant in 0..args.tenants {
        let improvements = Arc::new(AtomicU64::new(0));
        let counted = improvements.clone();
        manager
            .submit(
                tenant,
                Schedule::generate(tenant, args.tasks, args.employees),
                Some(Arc::new(move |_: &Schedule| {
                    counted.fetch_add(1, Ordering::Relaxed);
                })),
                Some(Box::new(move |best: Schedule| {
                    tracing::info!(tenant, loads = ?best.loads(), "schedule finished");
                })),
            )
            .await?;
        counters.push((tenant, improvements));
    }

    let mut reports = Vec::new();
    for (tenant, improvements) in counters {
        let snapshot = manager.wait_for_terminal(&tenant, None).await?;
        let best = manager.best_solution(&tenant).await?;
        reports.push(TenantReport {
            tenant,
            status: snapshot.status,
            score: snapshot.best_score.map(|score| score.to_string()),
            improvements: improvements.load(Ordering::Relaxed),
            loads: best.loads(),
            failure: snapshot.failure.map(|failure| failure.message),
        });
    }
    manager.shutdown().await?;

    match serde_json::to_string_pretty(&reports) {
        Ok(json) => println!("{json}"),
        Err(error) => eprintln!("failed to render report: {error}"),
    }
    Ok(())
}
