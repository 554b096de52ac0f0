pub mod solver_manager;
pub mod solving_task;

pub use solver_manager::SolverManager;
pub use solving_task::{SolvingTask, TaskSnapshot};

use std::sync::Arc;

use crate::engine::{ScoreOf, SolverEngine};
use crate::models::{ManagerError, PlanningSolution};

pub type ManagerResult<T> = Result<T, ManagerError>;

pub type TenantOf<E> = <<E as SolverEngine>::Solution as PlanningSolution>::Tenant;

pub type SnapshotOf<E> = TaskSnapshot<TenantOf<E>, ScoreOf<<E as SolverEngine>::Solution>>;

/// Invoked on the worker thread for every strictly better solution.
pub type ImprovementCallback<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Invoked once with the final best solution of a run that did not fail.
pub type EndedCallback<S> = Box<dyn FnOnce(S) + Send>;

pub type EngineFactory<E> = Arc<dyn Fn(&TenantOf<E>) -> E + Send + Sync>;
