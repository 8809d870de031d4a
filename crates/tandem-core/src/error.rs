use tandem_types::Dependency;

use crate::{readiness::ReadinessError, service::ServiceError, service::ServiceStatus};

pub type Result<R, E = LifecycleError> = std::result::Result<R, E>;

/// Failures surfaced to the caller of a lifecycle operation.
///
/// Recoverable service statuses never show up here; they are remediated
/// inside the state machine unless the remediation itself fails.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("service `{service}` reported an unrecognised status: {raw:?}")]
    StatusDecode { service: String, raw: String },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("failed to spawn {dependency}: {message}")]
    Spawn {
        dependency: Dependency,
        message: String,
    },

    #[error("{dependency} exited with code {code:?} before becoming ready")]
    ExitedBeforeReady {
        dependency: Dependency,
        code: Option<i32>,
    },

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error("service `{service}` stopped unexpectedly again after being removed")]
    RemediationFailed { service: String },

    #[error("service `{service}` did not settle within {limit} transitions (last status: {last:?})")]
    TransitionLimit {
        service: String,
        limit: usize,
        last: ServiceStatus,
    },

    #[error("{dependency} needs {required} to be running first")]
    RequirementNotRunning {
        dependency: Dependency,
        required: Dependency,
    },

    #[error("{dependency} is already being started or stopped")]
    InProgress { dependency: Dependency },

    #[error("failed to stop {dependency}: {message}")]
    Stop {
        dependency: Dependency,
        message: String,
    },
}

impl LifecycleError {
    /// Short stable label for logs.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleError::StatusDecode { .. } => "status_decode",
            LifecycleError::Service(ServiceError::ElevationDenied { .. }) => "elevation_denied",
            LifecycleError::Service(_) => "service_control",
            LifecycleError::Spawn { .. } => "spawn_failure",
            LifecycleError::ExitedBeforeReady { .. } => "exited_before_ready",
            LifecycleError::Readiness(_) => "readiness",
            LifecycleError::RemediationFailed { .. } => "remediation_failed",
            LifecycleError::TransitionLimit { .. } => "transition_limit",
            LifecycleError::RequirementNotRunning { .. } => "requirement_not_running",
            LifecycleError::InProgress { .. } => "in_progress",
            LifecycleError::Stop { .. } => "stop_failure",
        }
    }

    #[must_use]
    pub fn is_elevation_denied(&self) -> bool {
        matches!(
            self,
            LifecycleError::Service(ServiceError::ElevationDenied { .. })
        )
    }
}
