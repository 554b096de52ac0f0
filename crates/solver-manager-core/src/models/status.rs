use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverStatus {
    /// Registered, waiting for a worker.
    Pending,
    Solving,
    /// A stop was requested and the engine has not unwound yet.
    TerminatingEarly,
    Stopped,
}

impl SolverStatus {
    pub fn is_terminal(self) -> bool {
        self == SolverStatus::Stopped
    }
}
