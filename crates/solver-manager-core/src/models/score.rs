use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use crate::models::{ManagerError, ManagerErrorKind};

/// Ordered solution quality. Greater is better.
pub trait PlanningScore: Clone + PartialOrd + Debug + Send + Sync + 'static {
    /// False while some planning variables are still unassigned.
    fn is_solution_initialized(&self) -> bool;
}

/// Two-level score where any hard improvement outweighs every soft one.
///
/// `init_score` counts unassigned variables as a negative number and is
/// compared first, so every uninitialized score ranks below every
/// initialized one.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct HardSoftScore {
    pub init_score: i32,
    pub hard: i64,
    pub soft: i64,
}

impl HardSoftScore {
    pub fn of(hard: i64, soft: i64) -> Self {
        Self {
            init_score: 0,
            hard,
            soft,
        }
    }

    pub fn uninitialized(init_score: i32, hard: i64, soft: i64) -> Self {
        Self {
            init_score: -init_score.saturating_abs(),
            hard,
            soft,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.is_solution_initialized() && self.hard >= 0
    }
}

impl PlanningScore for HardSoftScore {
    fn is_solution_initialized(&self) -> bool {
        self.init_score >= 0
    }
}

impl Display for HardSoftScore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.init_score != 0 {
            write!(f, "{}init/", self.init_score)?;
        }
        write!(f, "{}hard/{}soft", self.hard, self.soft)
    }
}

impl FromStr for HardSoftScore {
    type Err = ManagerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.trim().split('/').collect();
        let (init_part, hard_part, soft_part) = match parts.as_slice() {
            [hard, soft] => (None, *hard, *soft),
            [init, hard, soft] => (Some(*init), *hard, *soft),
            _ => return Err(parse_error(value)),
        };

        let init_score = match init_part {
            Some(part) => level(part, "init", value)?,
            None => 0,
        };

        Ok(Self {
            init_score: i32::try_from(init_score).map_err(|_| parse_error(value))?,
            hard: level(hard_part, "hard", value)?,
            soft: level(soft_part, "soft", value)?,
        })
    }
}

fn level(part: &str, suffix: &str, whole: &str) -> Result<i64, ManagerError> {
    part.strip_suffix(suffix)
        .and_then(|number| number.parse::<i64>().ok())
        .ok_or_else(|| parse_error(whole))
}

fn parse_error(value: &str) -> ManagerError {
    ManagerError::new(
        ManagerErrorKind::InvalidConfig,
        format!("'{value}' is not a hard/soft score"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_scores_rank_below_initialized_ones() {
        let uninitialized = HardSoftScore::uninitialized(1, 0, 0);
        let infeasible = HardSoftScore::of(-100, -100);

        assert!(uninitialized < infeasible);
        assert!(!uninitialized.is_solution_initialized());
        assert!(infeasible.is_solution_initialized());
        assert!(!infeasible.is_feasible());
    }

    #[test]
    fn uninitialized_accepts_the_most_negative_count() {
        let score = HardSoftScore::uninitialized(i32::MIN, 0, 0);

        assert_eq!(score.init_score, -i32::MAX);
        assert!(!score.is_solution_initialized());
    }

    #[test]
    fn hard_level_outweighs_soft_level() {
        assert!(HardSoftScore::of(0, -1_000) > HardSoftScore::of(-1, 0));
        assert!(HardSoftScore::of(0, -1) > HardSoftScore::of(0, -2));
    }

    #[test]
    fn display_omits_init_level_once_initialized() {
        assert_eq!(HardSoftScore::of(-3, -10).to_string(), "-3hard/-10soft");
        assert_eq!(
            HardSoftScore::uninitialized(2, 0, -4).to_string(),
            "-2init/0hard/-4soft"
        );
    }

    #[test]
    fn parses_both_string_forms() {
        let initialized: HardSoftScore = "0hard/-7soft".parse().unwrap();
        assert_eq!(initialized, HardSoftScore::of(0, -7));

        let uninitialized: HardSoftScore = "-3init/-1hard/0soft".parse().unwrap();
        assert_eq!(uninitialized, HardSoftScore::uninitialized(3, -1, 0));
    }

    #[test]
    fn rejects_malformed_scores() {
        let error = "12points".parse::<HardSoftScore>().unwrap_err();
        assert_eq!(error.kind, ManagerErrorKind::InvalidConfig);
        assert!("1hard/xsoft".parse::<HardSoftScore>().is_err());
    }
}
