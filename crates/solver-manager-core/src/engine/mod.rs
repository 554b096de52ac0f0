//! Contract between the manager and an optimization engine.
//!
//! The manager never looks inside an engine: it only drives the blocking
//! [`SolverEngine::solve`] call from a worker thread, polls the live queries and
//! subscribes to improvements through [`BestSolutionEvents`].

pub mod stepping;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::models::PlanningSolution;

pub use stepping::{EngineLimits, StepFn, StepScope, SteppingEngine};

pub type EngineResult<T> = Result<T, EngineError>;

pub type ScoreOf<S> = <S as PlanningSolution>::Score;

pub type BestSolutionListener<S> = Arc<dyn Fn(&BestSolutionChanged<S>) + Send + Sync>;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BestSolutionChanged<S: PlanningSolution> {
    pub solution: S,
    pub score: ScoreOf<S>,
    pub time_spent: Duration,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ListenerId(pub u64);

pub trait SolverEngine: Send + Sync + 'static {
    type Solution: PlanningSolution;

    /// Blocks until the run terminates, naturally or after
    /// [`request_early_termination`](Self::request_early_termination).
    fn solve(&self, problem: Self::Solution) -> EngineResult<()>;

    /// Returns `true` if this call raised the flag. A request made before
    /// `solve` starts makes that run return at its first checkpoint.
    fn request_early_termination(&self) -> bool;

    fn is_solving(&self) -> bool;

    fn is_terminating_early(&self) -> bool;

    fn best_solution(&self) -> Option<Self::Solution>;

    fn best_score(&self) -> Option<ScoreOf<Self::Solution>>;
}

/// Improvement subscription. Listeners run on the solving thread, in discovery
/// order, and must return quickly.
pub trait BestSolutionEvents<S: PlanningSolution> {
    fn add_best_solution_listener(&self, listener: BestSolutionListener<S>) -> ListenerId;

    fn remove_best_solution_listener(&self, id: ListenerId) -> bool;
}
