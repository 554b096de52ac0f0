use std::sync::Arc;

use serde::Serialize;
use solver_manager_core::engine::{StepFn, StepScope};
use solver_manager_core::models::{HardSoftScore, PlanningSolution};

/// Tasks with durations, each assigned to one employee. The makespan (the
/// busiest employee's load) is the soft cost.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schedule {
    pub tenant: u64,
    pub durations: Vec<u32>,
    pub employees: usize,
    pub assignment: Vec<Option<usize>>,
}

impl Schedule {
    /// Deterministic durations in `1..=9` seeded by the tenant.
    pub fn generate(tenant: u64, tasks: usize, employees: usize) -> Self {
        let mut seed = tenant.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let durations = (0..tasks)
            .map(|_| {
                seed = seed
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                u32::try_from((seed >> 33) % 9).unwrap_or(0) + 1
            })
            .collect();

        Self {
            tenant,
            durations,
            employees: employees.max(1),
            assignment: vec![None; tasks],
        }
    }

    pub fn loads(&self) -> Vec<u64> {
        let mut loads = vec![0_u64; self.employees];
        for (task, employee) in self.assignment.iter().enumerate() {
            if let Some(employee) = employee {
                loads[*employee] += u64::from(self.durations[task]);
            }
        }
        loads
    }

    fn makespan(&self) -> i64 {
        let busiest = self.loads().into_iter().max().unwrap_or(0);
        i64::try_from(busiest).unwrap_or(i64::MAX)
    }

    fn least_loaded(&self) -> usize {
        self.loads()
            .iter()
            .enumerate()
            .min_by_key(|(_, load)| **load)
            .map_or(0, |(employee, _)| employee)
    }
}

impl PlanningSolution for Schedule {
    type Tenant = u64;
    type Score = HardSoftScore;

    fn tenant(&self) -> &u64 {
        &self.tenant
    }

    fn score(&self) -> Option<HardSoftScore> {
        let unassigned = self.assignment.iter().filter(|slot| slot.is_none()).count();
        Some(HardSoftScore::uninitialized(
            i32::try_from(unassigned).unwrap_or(i32::MAX),
            0,
            -self.makespan(),
        ))
    }
}

/// Greedy construction first, then single-task moves that never worsen the
/// makespan.
pub fn greedy_step() -> StepFn<Schedule> {
    Arc::new(|current: &Schedule, scope: &StepScope| {
        if let Some(task) = current.assignment.iter().position(Option::is_none) {
            let mut next = current.clone();
            next.assignment[task] = Some(current.least_loaded());
            return Ok(Some(next));
        }

        let tasks = current.durations.len();
        if tasks == 0 {
            return Ok(None);
        }
        let step = usize::try_from(scope.step_index).unwrap_or(usize::MAX);
        let task = step % tasks;
        let employee = (step / tasks) % current.employees;

        let mut candidate = current.clone();
        candidate.assignment[task] = Some(employee);
        if candidate.score() >= current.score() {
            Ok(Some(candidate))
        } else {
            Ok(Some(current.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use solver_manager_core::engine::{EngineLimits, SolverEngine, SteppingEngine};
    use solver_manager_core::models::PlanningScore;

    use super::*;

    #[test]
    fn generated_schedules_are_unassigned_and_tenant_scoped() {
        let schedule = Schedule::generate(3, 12, 4);

        assert_eq!(schedule.tenant(), &3);
        assert_eq!(schedule.durations.len(), 12);
        assert!(schedule.durations.iter().all(|duration| (1..=9).contains(duration)));
        assert!(!schedule.score().unwrap().is_solution_initialized());
        assert_eq!(schedule, Schedule::generate(3, 12, 4));
    }

    #[test]
    fn greedy_engine_assigns_every_task() {
        let engine = SteppingEngine::new(
            EngineLimits {
                step_limit: Some(500),
                unimproved_step_limit: Some(100),
                ..EngineLimits::default()
            },
            greedy_step(),
        );
        engine.solve(Schedule::generate(1, 10, 3)).unwrap();

        let best = engine.best_solution().unwrap();
        assert!(best.assignment.iter().all(Option::is_some));
        let score = engine.best_score().unwrap();
        assert!(score.is_feasible());
        let total: u64 = best.durations.iter().map(|duration| u64::from(*duration)).sum();
        assert!(u64::try_from(-score.soft).unwrap() * 3 >= total);
    }
}
