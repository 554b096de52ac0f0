use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tokio::sync::watch;

use crate::engine::{ScoreOf, SolverEngine};
use crate::models::error::tenant_label;
use crate::models::{ManagerError, ManagerErrorKind, PlanningSolution, SolverStatus};
use crate::orchestration::{EndedCallback, ManagerResult, SnapshotOf, TenantOf};
use crate::task_context;

#[derive(Clone, Debug, PartialEq)]
pub struct TaskSnapshot<K, Sc> {
    pub tenant: K,
    pub status: SolverStatus,
    pub best_score: Option<Sc>,
    pub submitted_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub terminated_early: bool,
    pub failure: Option<ManagerError>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum TaskPhase {
    Pending,
    Running,
    Stopped,
}

/// One engine run for one tenant.
///
/// The engine is only held while the task can still run. Once stopped, the
/// task keeps the final best solution and score and drops the engine.
pub struct SolvingTask<E: SolverEngine> {
    tenant: TenantOf<E>,
    submitted_at: SystemTime,
    state: Mutex<TaskState<E>>,
    phase: Arc<watch::Sender<TaskPhase>>,
}

struct TaskState<E: SolverEngine> {
    phase: TaskPhase,
    engine: Option<Arc<E>>,
    problem: Option<E::Solution>,
    on_ended: Option<EndedCallback<E::Solution>>,
    final_solution: Option<E::Solution>,
    final_score: Option<ScoreOf<E::Solution>>,
    termination_requested: bool,
    terminated_early: bool,
    solve_returned: bool,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    failure: Option<ManagerError>,
}

enum LiveView<E: SolverEngine> {
    Pending(E::Solution),
    Running(Arc<E>),
    Stopped(Option<E::Solution>, Option<ScoreOf<E::Solution>>),
}

impl<E: SolverEngine> SolvingTask<E> {
    pub(crate) fn new(
        tenant: TenantOf<E>,
        engine: E,
        problem: E::Solution,
        on_ended: Option<EndedCallback<E::Solution>>,
    ) -> Self {
        let (phase, _) = watch::channel(TaskPhase::Pending);
        Self {
            tenant,
            submitted_at: SystemTime::now(),
            state: Mutex::new(TaskState {
                phase: TaskPhase::Pending,
                engine: Some(Arc::new(engine)),
                problem: Some(problem),
                on_ended,
                final_solution: None,
                final_score: None,
                termination_requested: false,
                terminated_early: false,
                solve_returned: false,
                started_at: None,
                finished_at: None,
                failure: None,
            }),
            phase: Arc::new(phase),
        }
    }

    pub fn tenant(&self) -> &TenantOf<E> {
        &self.tenant
    }

    pub fn status(&self) -> ManagerResult<SolverStatus> {
        Ok(self.lock_state()?.status())
    }

    /// Live best solution while pending or running, the final one once stopped.
    pub fn best_solution(&self) -> ManagerResult<E::Solution> {
        let solution = match self.live_view()? {
            LiveView::Pending(problem) => Some(problem),
            LiveView::Running(engine) => engine.best_solution(),
            LiveView::Stopped(solution, _) => solution,
        };
        solution.ok_or_else(|| self.no_solution())
    }

    pub fn best_score(&self) -> ManagerResult<ScoreOf<E::Solution>> {
        let score = match self.live_view()? {
            LiveView::Pending(problem) => problem.score(),
            LiveView::Running(engine) => engine.best_score(),
            LiveView::Stopped(_, score) => score,
        };
        score.ok_or_else(|| self.no_solution())
    }

    pub fn failure(&self) -> ManagerResult<Option<ManagerError>> {
        Ok(self.lock_state()?.failure.clone())
    }

    /// Status, score, timestamps and failure read under one lock.
    pub fn snapshot(&self) -> ManagerResult<SnapshotOf<E>> {
        let state = self.lock_state()?;
        let best_score = match state.phase {
            TaskPhase::Pending => state.problem.as_ref().and_then(PlanningSolution::score),
            TaskPhase::Running => state.engine.as_ref().and_then(|engine| engine.best_score()),
            TaskPhase::Stopped => state.final_score.clone(),
        };
        Ok(TaskSnapshot {
            tenant: self.tenant.clone(),
            status: state.status(),
            best_score,
            submitted_at: self.submitted_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
            terminated_early: state.terminated_early,
            failure: state.failure.clone(),
        })
    }

    /// Asks the task to stop. A pending task stops without ever running and
    /// reports the submitted problem as its result. Returns `false` when
    /// there is nothing left to stop or a stop was already requested.
    pub fn request_termination(&self) -> ManagerResult<bool> {
        let mut state = self.lock_state()?;
        if state.termination_requested
            || state.solve_returned
            || state.phase == TaskPhase::Stopped
        {
            return Ok(false);
        }
        state.termination_requested = true;
        state.terminated_early = true;

        let phase = state.phase;
        match phase {
            TaskPhase::Pending => {
                let problem = state.problem.take();
                state.final_score = problem.as_ref().and_then(PlanningSolution::score);
                state.final_solution = problem.clone();
                state.engine = None;
                state.phase = TaskPhase::Stopped;
                state.finished_at = Some(SystemTime::now());
                let on_ended = state.on_ended.take();
                drop(state);

                tracing::info!(tenant = ?self.tenant, "solving task stopped before it started");
                self.end_off_runtime(on_ended, problem);
            }
            TaskPhase::Running => {
                let engine = state.engine.clone();
                drop(state);

                tracing::info!(tenant = ?self.tenant, "requesting early termination");
                if let Some(engine) = engine {
                    engine.request_early_termination();
                }
            }
            TaskPhase::Stopped => {}
        }

        Ok(true)
    }

    /// Worker body. Blocks for the whole engine run.
    pub(crate) fn run(&self) -> ManagerResult<()> {
        let Some((engine, problem)) = self.begin()? else {
            return Ok(());
        };

        tracing::info!(tenant = ?self.tenant, "solving task started");
        let outcome = task_context::with_tenant(tenant_label(&self.tenant), || {
            panic::catch_unwind(AssertUnwindSafe(|| engine.solve(problem)))
        });
        self.mark_solve_returned()?;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(self.execution_failure(format!("engine run failed: {error}"))),
            Err(payload) => Some(self.execution_failure(format!(
                "engine run panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };
        let best_solution = engine.best_solution();
        let best_score = engine.best_score();
        drop(engine);

        self.finish(best_solution, best_score, failure)
    }

    pub(crate) fn fail(&self, message: String) -> ManagerResult<()> {
        let failure = self.execution_failure(message);
        self.finish(None, None, Some(failure))
    }

    pub(crate) async fn stopped(&self) -> ManagerResult<()> {
        let mut receiver = self.phase.subscribe();
        receiver
            .wait_for(|phase| *phase == TaskPhase::Stopped)
            .await
            .map(|_| ())
            .map_err(|_| {
                ManagerError::for_tenant(
                    &self.tenant,
                    ManagerErrorKind::Internal,
                    "solving task phase channel closed",
                )
            })
    }

    fn begin(&self) -> ManagerResult<Option<(Arc<E>, E::Solution)>> {
        let mut state = self.lock_state()?;
        if state.phase != TaskPhase::Pending {
            return Ok(None);
        }

        let (Some(engine), Some(problem)) = (state.engine.clone(), state.problem.take()) else {
            return Err(ManagerError::for_tenant(
                &self.tenant,
                ManagerErrorKind::Internal,
                "pending solving task lost its engine or problem",
            ));
        };
        state.phase = TaskPhase::Running;
        state.started_at = Some(SystemTime::now());
        drop(state);

        self.phase.send_replace(TaskPhase::Running);
        Ok(Some((engine, problem)))
    }

    fn mark_solve_returned(&self) -> ManagerResult<()> {
        self.lock_state()?.solve_returned = true;
        Ok(())
    }

    fn finish(
        &self,
        best_solution: Option<E::Solution>,
        best_score: Option<ScoreOf<E::Solution>>,
        failure: Option<ManagerError>,
    ) -> ManagerResult<()> {
        let mut state = self.lock_state()?;
        if state.phase == TaskPhase::Stopped {
            return Ok(());
        }

        let final_solution = best_solution.or_else(|| state.problem.take());
        state.final_score =
            best_score.or_else(|| final_solution.as_ref().and_then(PlanningSolution::score));
        state.final_solution = final_solution.clone();
        state.engine = None;
        state.problem = None;
        state.phase = TaskPhase::Stopped;
        state.finished_at = Some(SystemTime::now());
        state.failure = failure.clone();
        let on_ended = state.on_ended.take();
        let final_score = state.final_score.clone();
        drop(state);

        match (&failure, final_solution) {
            (Some(error), _) => {
                tracing::error!(
                    tenant = ?self.tenant,
                    kind = ?error.kind,
                    message = %error.message,
                    "solving task failed"
                );
            }
            (None, Some(solution)) => {
                tracing::info!(tenant = ?self.tenant, score = ?final_score, "solving task stopped");
                invoke_on_ended(&self.tenant, on_ended, solution);
            }
            (None, None) => {
                tracing::warn!(tenant = ?self.tenant, "solving task stopped without a solution");
            }
        }

        self.phase.send_replace(TaskPhase::Stopped);
        Ok(())
    }

    /// Runs `on_ended` for a task stopped from async code. The callback goes to
    /// the blocking pool so it never runs on a runtime worker, and waiters are
    /// released only after it returns.
    fn end_off_runtime(
        &self,
        on_ended: Option<EndedCallback<E::Solution>>,
        problem: Option<E::Solution>,
    ) {
        let (Some(on_ended), Some(problem)) = (on_ended, problem) else {
            self.phase.send_replace(TaskPhase::Stopped);
            return;
        };

        let tenant = self.tenant.clone();
        let phase = self.phase.clone();
        let deliver = move || {
            invoke_on_ended(&tenant, Some(on_ended), problem);
            phase.send_replace(TaskPhase::Stopped);
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(deliver);
            }
            Err(_) => deliver(),
        }
    }

    fn live_view(&self) -> ManagerResult<LiveView<E>> {
        let state = self.lock_state()?;
        Ok(match state.phase {
            TaskPhase::Pending => match &state.problem {
                Some(problem) => LiveView::Pending(problem.clone()),
                None => return Err(self.no_solution()),
            },
            TaskPhase::Running => match &state.engine {
                Some(engine) => LiveView::Running(engine.clone()),
                None => return Err(self.no_solution()),
            },
            TaskPhase::Stopped => {
                LiveView::Stopped(state.final_solution.clone(), state.final_score.clone())
            }
        })
    }

    fn lock_state(&self) -> ManagerResult<MutexGuard<'_, TaskState<E>>> {
        self.state.lock().map_err(|_| {
            ManagerError::for_tenant(
                &self.tenant,
                ManagerErrorKind::Internal,
                "solving task mutex poisoned",
            )
        })
    }

    fn execution_failure(&self, message: String) -> ManagerError {
        ManagerError::for_tenant(&self.tenant, ManagerErrorKind::TaskExecutionFailure, message)
    }

    fn no_solution(&self) -> ManagerError {
        ManagerError::for_tenant(
            &self.tenant,
            ManagerErrorKind::NoSolution,
            format!("tenant '{:?}' has no best solution yet", self.tenant),
        )
    }
}

impl<E: SolverEngine> TaskState<E> {
    fn status(&self) -> SolverStatus {
        match self.phase {
            TaskPhase::Pending => SolverStatus::Pending,
            TaskPhase::Running => {
                let engine_terminating = self
                    .engine
                    .as_ref()
                    .is_some_and(|engine| engine.is_terminating_early());
                if self.termination_requested || engine_terminating {
                    SolverStatus::TerminatingEarly
                } else {
                    SolverStatus::Solving
                }
            }
            TaskPhase::Stopped => SolverStatus::Stopped,
        }
    }
}

fn invoke_on_ended<K: Debug, S>(tenant: &K, on_ended: Option<EndedCallback<S>>, solution: S) {
    let Some(on_ended) = on_ended else {
        return;
    };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || on_ended(solution))) {
        tracing::error!(
            tenant = ?tenant,
            message = %panic_message(payload.as_ref()),
            "solving ended callback panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
