use std::{fmt, sync::Arc};

use tandem_types::Dependency;

/// Runtime state of one dependency, owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Failed(String),
}

impl LifecycleState {
    /// Whether a start or stop sequence currently owns the dependency.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Stopping)
    }
}

/// Human-readable status update for the UI layer.
///
/// `wait` only changes the copy shown to the user ("this may take several
/// minutes"); orchestration never branches on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Progress {
    pub text: Option<String>,
    pub detail: Option<String>,
    pub wait: bool,
}

impl Progress {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn waiting(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            detail: None,
            wait: true,
        }
    }
}

/// Callback invoked zero or more times with progress updates.
#[derive(Clone)]
pub struct ProgressSink(Arc<dyn Fn(Progress) + Send + Sync>);

impl ProgressSink {
    pub fn new(f: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, progress: Progress) {
        (self.0)(progress);
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressSink")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    Progress {
        dependency: Dependency,
        progress: Progress,
    },
    /// One line of process-mode output, already appended to the application log.
    Output {
        dependency: Dependency,
        line: String,
    },
    Exited {
        dependency: Dependency,
        code: Option<i32>,
        fatal: bool,
    },
}
