use std::fmt::Debug;
use std::hash::Hash;

use crate::models::PlanningScore;

/// Identifier of one independent submission slot.
pub trait TenantKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> TenantKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// A planning problem, and later a (partial) solution to it.
///
/// Every solution carries the tenant it belongs to so the manager can reject a
/// problem submitted under the wrong key.
pub trait PlanningSolution: Clone + Send + Sync + 'static {
    type Tenant: TenantKey;
    type Score: PlanningScore;

    fn tenant(&self) -> &Self::Tenant;

    /// `None` until the solution has been scored.
    fn score(&self) -> Option<Self::Score>;
}
