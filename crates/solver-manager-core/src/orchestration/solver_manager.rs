use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::SolverManagerConfig;
use crate::engine::{BestSolutionChanged, BestSolutionEvents, ScoreOf, SolverEngine};
use crate::models::{ManagerError, ManagerErrorKind, PlanningSolution, SolverStatus};
use crate::orchestration::{
    EndedCallback, EngineFactory, ImprovementCallback, ManagerResult, SnapshotOf, SolvingTask,
    TenantOf,
};

/// Registry of one solving task per tenant, running on a bounded worker pool.
///
/// Cloning yields another handle to the same registry and pool.
pub struct SolverManager<E>
where
    E: SolverEngine + BestSolutionEvents<<E as SolverEngine>::Solution>,
{
    config: SolverManagerConfig,
    factory: EngineFactory<E>,
    registry: Arc<Mutex<Registry<E>>>,
    workers: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
}

struct Registry<E: SolverEngine> {
    tasks: HashMap<TenantOf<E>, Arc<SolvingTask<E>>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl<E> Clone for SolverManager<E>
where
    E: SolverEngine + BestSolutionEvents<<E as SolverEngine>::Solution>,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            factory: self.factory.clone(),
            registry: self.registry.clone(),
            workers: self.workers.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<E> SolverManager<E>
where
    E: SolverEngine + BestSolutionEvents<<E as SolverEngine>::Solution>,
{
    pub fn new(
        config: SolverManagerConfig,
        factory: impl Fn(&TenantOf<E>) -> E + Send + Sync + 'static,
    ) -> ManagerResult<Self> {
        config.validate()?;
        let workers = Arc::new(Semaphore::new(config.worker_count));

        Ok(Self {
            config,
            factory: Arc::new(factory),
            registry: Arc::new(Mutex::new(Registry {
                tasks: HashMap::new(),
                worker_handles: Vec::new(),
            })),
            workers,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &SolverManagerConfig {
        &self.config
    }

    /// Registers a new solving task for `tenant` and schedules it on the pool.
    /// Returns as soon as the task is registered.
    pub async fn submit(
        &self,
        tenant: TenantOf<E>,
        problem: E::Solution,
        on_improved: Option<ImprovementCallback<E::Solution>>,
        on_ended: Option<EndedCallback<E::Solution>>,
    ) -> ManagerResult<()> {
        if problem.tenant() != &tenant {
            return Err(ManagerError::for_tenant(
                &tenant,
                ManagerErrorKind::TenantMismatch,
                format!(
                    "problem belongs to tenant '{:?}' but was submitted as '{tenant:?}'",
                    problem.tenant()
                ),
            ));
        }

        let mut registry = self.registry.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(ManagerError::for_tenant(
                &tenant,
                ManagerErrorKind::ManagerClosed,
                "solver manager has been shut down",
            ));
        }
        if let Some(existing) = registry.tasks.get(&tenant) {
            let status = existing.status()?;
            if !status.is_terminal() {
                return Err(ManagerError::for_tenant(
                    &tenant,
                    ManagerErrorKind::TenantBusy,
                    format!("tenant '{tenant:?}' already has a task in status {status:?}"),
                ));
            }
        }

        let engine = (self.factory)(&tenant);
        if let Some(on_improved) = on_improved {
            engine.add_best_solution_listener(Arc::new(
                move |event: &BestSolutionChanged<E::Solution>| on_improved(&event.solution),
            ));
        }

        let task = Arc::new(SolvingTask::new(tenant.clone(), engine, problem, on_ended));
        registry.tasks.insert(tenant.clone(), task.clone());
        registry.worker_handles.retain(|handle| !handle.is_finished());
        registry.worker_handles.push(tokio::spawn(execute(
            task,
            self.workers.clone(),
            self.config.solve_deadline,
        )));

        tracing::info!(tenant = ?tenant, "solving task submitted");
        Ok(())
    }

    pub async fn best_solution(&self, tenant: &TenantOf<E>) -> ManagerResult<E::Solution> {
        self.task(tenant).await?.best_solution()
    }

    pub async fn best_score(&self, tenant: &TenantOf<E>) -> ManagerResult<ScoreOf<E::Solution>> {
        self.task(tenant).await?.best_score()
    }

    pub async fn status(&self, tenant: &TenantOf<E>) -> ManagerResult<SolverStatus> {
        self.task(tenant).await?.status()
    }

    pub async fn snapshot(&self, tenant: &TenantOf<E>) -> ManagerResult<SnapshotOf<E>> {
        self.task(tenant).await?.snapshot()
    }

    /// Failure recorded by the tenant's last run, if it failed.
    pub async fn failure(&self, tenant: &TenantOf<E>) -> ManagerResult<Option<ManagerError>> {
        self.task(tenant).await?.failure()
    }

    pub async fn tenants(&self) -> Vec<TenantOf<E>> {
        let registry = self.registry.lock().await;
        registry.tasks.keys().cloned().collect()
    }

    /// Requests early termination of one tenant's run.
    pub async fn cancel(&self, tenant: &TenantOf<E>) -> ManagerResult<bool> {
        self.task(tenant).await?.request_termination()
    }

    /// Removes a stopped task and returns its final snapshot.
    pub async fn evict(&self, tenant: &TenantOf<E>) -> ManagerResult<SnapshotOf<E>> {
        let mut registry = self.registry.lock().await;
        let task = registry
            .tasks
            .get(tenant)
            .cloned()
            .ok_or_else(|| ManagerError::unknown_tenant(tenant))?;

        let snapshot = task.snapshot()?;
        if !snapshot.status.is_terminal() {
            return Err(ManagerError::for_tenant(
                tenant,
                ManagerErrorKind::TenantBusy,
                format!("cannot evict tenant '{tenant:?}' in status {:?}", snapshot.status),
            ));
        }

        registry.tasks.remove(tenant);
        tracing::debug!(tenant = ?tenant, "solving task evicted");
        Ok(snapshot)
    }

    pub async fn wait_for_terminal(
        &self,
        tenant: &TenantOf<E>,
        timeout_duration: Option<Duration>,
    ) -> ManagerResult<SnapshotOf<E>> {
        let task = self.task(tenant).await?;

        match timeout_duration {
            Some(duration) => timeout(duration, task.stopped()).await.map_err(|_| {
                ManagerError::for_tenant(
                    tenant,
                    ManagerErrorKind::Timeout,
                    format!("timed out waiting for tenant '{tenant:?}' to stop"),
                )
            })??,
            None => task.stopped().await?,
        }

        task.snapshot()
    }

    /// Stops every task and drains the worker pool.
    ///
    /// Safe to call more than once. When the configured grace period runs out
    /// first, returns `ShutdownInterrupted`; calling again resumes the wait.
    pub async fn shutdown(&self) -> ManagerResult<()> {
        let tasks: Vec<Arc<SolvingTask<E>>> = {
            let registry = self.registry.lock().await;
            if !self.closed.swap(true, Ordering::SeqCst) {
                tracing::info!(tasks = registry.tasks.len(), "solver manager shutting down");
            }
            registry.tasks.values().cloned().collect()
        };

        for task in &tasks {
            if let Err(error) = task.request_termination() {
                tracing::warn!(
                    tenant = ?task.tenant(),
                    kind = ?error.kind,
                    message = %error.message,
                    "failed to request early termination during shutdown"
                );
            }
        }

        let drain = async {
            for task in &tasks {
                task.stopped().await?;
            }
            Ok::<(), ManagerError>(())
        };
        match self.config.shutdown_grace {
            Some(grace) => timeout(grace, drain).await.map_err(|_| {
                ManagerError::new(
                    ManagerErrorKind::ShutdownInterrupted,
                    format!("solving tasks did not stop within {grace:?}"),
                )
            })??,
            None => drain.await?,
        }

        self.workers.close();
        let handles = std::mem::take(&mut self.registry.lock().await.worker_handles);
        for handle in handles {
            if let Err(join_error) = handle.await {
                tracing::warn!(error = %join_error, "solver worker did not exit cleanly");
            }
        }

        tracing::info!("solver manager shut down");
        Ok(())
    }

    async fn task(&self, tenant: &TenantOf<E>) -> ManagerResult<Arc<SolvingTask<E>>> {
        let registry = self.registry.lock().await;
        registry
            .tasks
            .get(tenant)
            .cloned()
            .ok_or_else(|| ManagerError::unknown_tenant(tenant))
    }
}

async fn execute<E: SolverEngine>(
    task: Arc<SolvingTask<E>>,
    workers: Arc<Semaphore>,
    solve_deadline: Option<Duration>,
) {
    let Ok(permit) = workers.acquire_owned().await else {
        // The pool only closes once every task has stopped.
        return;
    };

    let runner = task.clone();
    let mut run = tokio::task::spawn_blocking(move || runner.run());
    let joined = match solve_deadline {
        Some(deadline) => {
            tokio::select! {
                joined = &mut run => joined,
                () = tokio::time::sleep(deadline) => {
                    tracing::info!(
                        tenant = ?task.tenant(),
                        deadline = ?deadline,
                        "solve deadline reached"
                    );
                    if let Err(error) = task.request_termination() {
                        tracing::warn!(
                            tenant = ?task.tenant(),
                            message = %error.message,
                            "failed to request early termination at deadline"
                        );
                    }
                    run.await
                }
            }
        }
        None => run.await,
    };
    drop(permit);

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            tracing::error!(
                tenant = ?task.tenant(),
                kind = ?error.kind,
                message = %error.message,
                "solving task bookkeeping failed"
            );
            if let Err(error) = task.fail(error.message) {
                tracing::error!(
                    tenant = ?task.tenant(),
                    message = %error.message,
                    "could not mark task failed"
                );
            }
        }
        Err(join_error) => {
            if let Err(error) = task.fail(format!("solving worker join failure: {join_error}")) {
                tracing::error!(
                    tenant = ?task.tenant(),
                    message = %error.message,
                    "could not mark task failed"
                );
            }
        }
    }
}
