use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::engine::{
    BestSolutionChanged, BestSolutionEvents, BestSolutionListener, EngineError, EngineResult,
    ListenerId, ScoreOf, SolverEngine,
};
use crate::models::PlanningSolution;

/// Proposes the next candidate from the current one. `Ok(None)` means the
/// neighbourhood is exhausted and the run ends.
pub type StepFn<S> = Arc<dyn Fn(&S, &StepScope) -> EngineResult<Option<S>> + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StepScope {
    pub step_index: u64,
    pub time_spent: Duration,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EngineLimits {
    pub step_limit: Option<u64>,
    pub time_limit: Option<Duration>,
    pub unimproved_step_limit: Option<u64>,
}

impl EngineLimits {
    pub fn steps(step_limit: u64) -> Self {
        Self {
            step_limit: Some(step_limit),
            ..Self::default()
        }
    }

    fn reached(&self, step_index: u64, time_spent: Duration, unimproved_steps: u64) -> bool {
        self.step_limit.is_some_and(|limit| step_index >= limit)
            || self.time_limit.is_some_and(|limit| time_spent >= limit)
            || self
                .unimproved_step_limit
                .is_some_and(|limit| unimproved_steps >= limit)
    }
}

/// Engine that walks from candidate to candidate with a caller-supplied step
/// function and keeps the best scored solution seen.
pub struct SteppingEngine<S: PlanningSolution> {
    step: StepFn<S>,
    limits: EngineLimits,
    solving: AtomicBool,
    terminate_early: AtomicBool,
    best: Mutex<BestState<S>>,
    listeners: Mutex<Vec<(ListenerId, BestSolutionListener<S>)>>,
    next_listener_id: AtomicU64,
}

struct BestState<S: PlanningSolution> {
    solution: Option<S>,
    score: Option<ScoreOf<S>>,
}

impl<S: PlanningSolution> SteppingEngine<S> {
    pub fn new(limits: EngineLimits, step: StepFn<S>) -> Self {
        Self {
            step,
            limits,
            solving: AtomicBool::new(false),
            terminate_early: AtomicBool::new(false),
            best: Mutex::new(BestState {
                solution: None,
                score: None,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    pub fn from_fn<F>(limits: EngineLimits, step: F) -> Self
    where
        F: Fn(&S, &StepScope) -> EngineResult<Option<S>> + Send + Sync + 'static,
    {
        Self::new(limits, Arc::new(step))
    }

    fn run_steps(&self, problem: S, started: Instant) -> EngineResult<()> {
        {
            let mut best = lock(&self.best);
            best.score = problem.score();
            best.solution = Some(problem.clone());
        }

        let mut current = problem;
        let mut step_index = 0_u64;
        let mut unimproved_steps = 0_u64;

        loop {
            if self.terminate_early.load(Ordering::SeqCst) {
                tracing::debug!(step_index, "stepping engine terminating early");
                break;
            }
            if self
                .limits
                .reached(step_index, started.elapsed(), unimproved_steps)
            {
                break;
            }

            let scope = StepScope {
                step_index,
                time_spent: started.elapsed(),
            };
            let Some(candidate) = (self.step)(&current, &scope)? else {
                tracing::debug!(step_index, "stepping engine converged");
                break;
            };

            if self.offer_best(&candidate, started.elapsed()) {
                unimproved_steps = 0;
            } else {
                unimproved_steps = unimproved_steps.saturating_add(1);
            }
            current = candidate;
            step_index = step_index.saturating_add(1);
        }

        Ok(())
    }

    fn offer_best(&self, candidate: &S, time_spent: Duration) -> bool {
        let Some(score) = candidate.score() else {
            return false;
        };

        {
            let mut best = lock(&self.best);
            let improved = match &best.score {
                Some(current) => score.partial_cmp(current) == Some(CmpOrdering::Greater),
                None => true,
            };
            if !improved {
                return false;
            }
            best.solution = Some(candidate.clone());
            best.score = Some(score.clone());
        }

        let listeners: Vec<BestSolutionListener<S>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            return true;
        }

        let event = BestSolutionChanged {
            solution: candidate.clone(),
            score,
            time_spent,
        };
        for listener in listeners {
            listener(&event);
        }
        true
    }
}

impl<S: PlanningSolution> SolverEngine for SteppingEngine<S> {
    type Solution = S;

    fn solve(&self, problem: S) -> EngineResult<()> {
        if self.solving.swap(true, Ordering::SeqCst) {
            return Err(EngineError::new("engine is already solving"));
        }

        let result = self.run_steps(problem, Instant::now());
        self.solving.store(false, Ordering::SeqCst);
        self.terminate_early.store(false, Ordering::SeqCst);
        result
    }

    fn request_early_termination(&self) -> bool {
        !self.terminate_early.swap(true, Ordering::SeqCst)
    }

    fn is_solving(&self) -> bool {
        self.solving.load(Ordering::SeqCst)
    }

    fn is_terminating_early(&self) -> bool {
        self.is_solving() && self.terminate_early.load(Ordering::SeqCst)
    }

    fn best_solution(&self) -> Option<S> {
        lock(&self.best).solution.clone()
    }

    fn best_score(&self) -> Option<ScoreOf<S>> {
        lock(&self.best).score.clone()
    }
}

impl<S: PlanningSolution> BestSolutionEvents<S> for SteppingEngine<S> {
    fn add_best_solution_listener(&self, listener: BestSolutionListener<S>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.listeners).push((id, listener));
        id
    }

    fn remove_best_solution_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

// Listener panics are caught at the task boundary; the guarded data stays
// consistent across them.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
