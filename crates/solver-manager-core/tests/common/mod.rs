#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use solver_manager_core::config::SolverManagerConfig;
use solver_manager_core::engine::{EngineLimits, EngineResult, StepFn, StepScope, SteppingEngine};
use solver_manager_core::models::{HardSoftScore, PlanningSolution, SolverStatus};
use solver_manager_core::orchestration::{EndedCallback, ImprovementCallback, SolverManager};

pub type PlanEngine = SteppingEngine<Plan>;
pub type PlanManager = SolverManager<PlanEngine>;

/// `total` tasks to assign plus a soft penalty to work off, one unit per step.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub tenant: u64,
    pub assigned: u32,
    pub total: u32,
    pub penalty: i64,
}

impl Plan {
    pub fn new(tenant: u64, total: u32, penalty: i64) -> Self {
        Self {
            tenant,
            assigned: 0,
            total,
            penalty,
        }
    }
}

impl PlanningSolution for Plan {
    type Tenant = u64;
    type Score = HardSoftScore;

    fn tenant(&self) -> &u64 {
        &self.tenant
    }

    fn score(&self) -> Option<HardSoftScore> {
        let unassigned = i32::try_from(self.total - self.assigned).unwrap_or(i32::MAX);
        Some(HardSoftScore::uninitialized(unassigned, 0, -self.penalty))
    }
}

pub fn improve(current: &Plan) -> Option<Plan> {
    if current.assigned < current.total {
        Some(Plan {
            assigned: current.assigned + 1,
            ..current.clone()
        })
    } else if current.penalty > 0 {
        Some(Plan {
            penalty: current.penalty - 1,
            ..current.clone()
        })
    } else {
        None
    }
}

pub fn converging_step() -> StepFn<Plan> {
    Arc::new(|current: &Plan, _scope: &StepScope| Ok(improve(current)))
}

/// Never improves and never converges; only termination ends the run.
pub fn endless_step(delay: Duration) -> StepFn<Plan> {
    Arc::new(move |current: &Plan, _scope: &StepScope| {
        std::thread::sleep(delay);
        Ok(Some(current.clone()))
    })
}

/// Improves like `converging_step` but blocks inside step `blocked_step`
/// until the gate opens, ignoring termination requests meanwhile.
pub fn gated_step(gate: Gate, blocked_step: u64) -> StepFn<Plan> {
    Arc::new(move |current: &Plan, scope: &StepScope| {
        if scope.step_index == blocked_step {
            gate.wait();
        }
        Ok(improve(current))
    })
}

pub fn step_from<F>(step: F) -> StepFn<Plan>
where
    F: Fn(&Plan, &StepScope) -> EngineResult<Option<Plan>> + Send + Sync + 'static,
{
    Arc::new(step)
}

pub fn config(workers: usize) -> SolverManagerConfig {
    SolverManagerConfig::default()
        .with_worker_count(workers)
        .with_shutdown_grace(Some(Duration::from_secs(10)))
}

pub fn manager_with(config: SolverManagerConfig, step: StepFn<Plan>) -> PlanManager {
    SolverManager::new(config, move |_tenant: &u64| {
        SteppingEngine::new(EngineLimits::default(), step.clone())
    })
    .unwrap()
}

pub fn manager(workers: usize, step: StepFn<Plan>) -> PlanManager {
    manager_with(config(workers), step)
}

#[derive(Clone, Default)]
pub struct Gate {
    open: Arc<AtomicBool>,
}

impl Gate {
    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn wait(&self) {
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Improved(HardSoftScore),
    Ended(HardSoftScore),
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn on_improved(&self) -> Option<ImprovementCallback<Plan>> {
        let events = self.events.clone();
        Some(Arc::new(move |plan: &Plan| {
            events
                .lock()
                .unwrap()
                .push(Event::Improved(plan.score().unwrap()));
        }))
    }

    pub fn on_ended(&self) -> Option<EndedCallback<Plan>> {
        let events = self.events.clone();
        Some(Box::new(move |plan: Plan| {
            events
                .lock()
                .unwrap()
                .push(Event::Ended(plan.score().unwrap()));
        }))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn ended_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Ended(_)))
            .count()
    }

    pub fn improved_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Improved(_)))
            .count()
    }
}

pub async fn wait_for_status(manager: &PlanManager, tenant: u64, expected: SolverStatus) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if manager.status(&tenant).await.ok() == Some(expected) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    false
}
