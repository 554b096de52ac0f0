//! Manager configuration.
//!
//! Durations are expressed in milliseconds in every external form (JSON and
//! environment). `0` disables the corresponding bound.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{ManagerError, ManagerErrorKind};
use crate::orchestration::ManagerResult;

pub const WORKERS_ENV: &str = "SOLVER_MANAGER_WORKERS";
pub const SHUTDOWN_GRACE_ENV: &str = "SOLVER_MANAGER_SHUTDOWN_GRACE_MS";
pub const SOLVE_DEADLINE_ENV: &str = "SOLVER_MANAGER_SOLVE_DEADLINE_MS";

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverManagerConfig {
    /// Runs that may execute at the same time. Each occupies one blocking
    /// thread for its whole duration.
    pub worker_count: usize,

    /// Upper bound on how long `shutdown` waits for runs to unwind.
    /// `None` waits indefinitely.
    #[serde(rename = "shutdown_grace_ms", with = "optional_millis")]
    pub shutdown_grace: Option<Duration>,

    /// Early termination is requested once a run has been solving this long.
    #[serde(rename = "solve_deadline_ms", with = "optional_millis")]
    pub solve_deadline: Option<Duration>,
}

impl Default for SolverManagerConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            shutdown_grace: Some(DEFAULT_SHUTDOWN_GRACE),
            solve_deadline: None,
        }
    }
}

impl SolverManagerConfig {
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Option<Duration>) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub fn with_solve_deadline(mut self, solve_deadline: Option<Duration>) -> Self {
        self.solve_deadline = solve_deadline;
        self
    }

    pub fn from_env() -> ManagerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whichever variables `lookup` resolves.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ManagerResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(WORKERS_ENV) {
            config.worker_count = parse_number(WORKERS_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SHUTDOWN_GRACE_ENV) {
            config.shutdown_grace = millis(parse_number(SHUTDOWN_GRACE_ENV, &raw)?);
        }
        if let Some(raw) = lookup(SOLVE_DEADLINE_ENV) {
            config.solve_deadline = millis(parse_number(SOLVE_DEADLINE_ENV, &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> ManagerResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|error| {
            ManagerError::new(
                ManagerErrorKind::InvalidConfig,
                format!("invalid solver manager config: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ManagerResult<()> {
        if self.worker_count == 0 {
            return Err(ManagerError::new(
                ManagerErrorKind::InvalidConfig,
                "worker_count must be at least 1",
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> ManagerResult<T> {
    raw.trim().parse::<T>().map_err(|_| {
        ManagerError::new(
            ManagerErrorKind::InvalidConfig,
            format!("{key} must be a non-negative integer, got '{raw}'"),
        )
    })
}

fn millis(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_millis(value))
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let millis = value.map_or(0, |duration| {
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
        });
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(super::millis(millis.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_have_at_least_one_worker_and_a_grace_period() {
        let config = SolverManagerConfig::default();
        assert!(config.worker_count >= 1);
        assert_eq!(config.shutdown_grace, Some(Duration::from_secs(30)));
        assert_eq!(config.solve_deadline, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = SolverManagerConfig::from_lookup(lookup(&[
            (WORKERS_ENV, "3"),
            (SHUTDOWN_GRACE_ENV, "0"),
            (SOLVE_DEADLINE_ENV, "1500"),
        ]))
        .unwrap();

        assert_eq!(config.worker_count, 3);
        assert_eq!(config.shutdown_grace, None);
        assert_eq!(config.solve_deadline, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn environment_rejects_garbage_and_zero_workers() {
        let garbage = SolverManagerConfig::from_lookup(lookup(&[(WORKERS_ENV, "many")]));
        assert_eq!(garbage.unwrap_err().kind, ManagerErrorKind::InvalidConfig);

        let zero = SolverManagerConfig::from_lookup(lookup(&[(WORKERS_ENV, "0")]));
        assert_eq!(zero.unwrap_err().kind, ManagerErrorKind::InvalidConfig);
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config =
            SolverManagerConfig::from_json_str(r#"{"worker_count": 2, "solve_deadline_ms": 250}"#)
                .unwrap();

        assert_eq!(config.worker_count, 2);
        assert_eq!(config.shutdown_grace, Some(Duration::from_secs(30)));
        assert_eq!(config.solve_deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn json_round_trips_disabled_durations_as_zero() {
        let config = SolverManagerConfig::default()
            .with_worker_count(4)
            .with_shutdown_grace(None);
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["shutdown_grace_ms"], 0);
        assert_eq!(json["solve_deadline_ms"], 0);
        let parsed = SolverManagerConfig::from_json_str(&json.to_string()).unwrap();
        assert_eq!(parsed, config);
    }
}
