use std::fmt::Debug;

use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ManagerErrorKind {
    UnknownTenant,
    TenantBusy,
    TenantMismatch,
    ShutdownInterrupted,
    ManagerClosed,
    TaskExecutionFailure,
    NoSolution,
    Timeout,
    InvalidConfig,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct ManagerError {
    pub tenant: Option<String>,
    pub kind: ManagerErrorKind,
    pub message: String,
}

impl ManagerError {
    pub fn new(kind: ManagerErrorKind, message: impl Into<String>) -> Self {
        Self {
            tenant: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_tenant(
        tenant: &impl Debug,
        kind: ManagerErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tenant: Some(tenant_label(tenant)),
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tenant(tenant: &impl Debug) -> Self {
        Self::for_tenant(
            tenant,
            ManagerErrorKind::UnknownTenant,
            format!("no solving task is registered for tenant '{tenant:?}'"),
        )
    }
}

pub(crate) fn tenant_label(tenant: &impl Debug) -> String {
    format!("{tenant:?}")
}
