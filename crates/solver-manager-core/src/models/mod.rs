pub mod error;
pub mod score;
pub mod solution;
pub mod status;

pub use error::{ManagerError, ManagerErrorKind};
pub use score::{HardSoftScore, PlanningScore};
pub use solution::{PlanningSolution, TenantKey};
pub use status::SolverStatus;
