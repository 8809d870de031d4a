mod error;
mod orchestrator;
mod port;
mod process_manager;
mod readiness;
mod service;
mod supervisor;
mod types;

pub use error::{LifecycleError, Result};
pub use orchestrator::{
    BuildIdentity, Collaborators, Orchestrator, StampFileIdentity, StartOutcome, StatusReport,
    MAX_TRANSITIONS,
};
pub use port::{PortInspector, PortReclaimer, ReclaimError, ReclaimReport, SystemPortInspector};
pub use process_manager::{
    BoxStream, CommandSpec, ProcId, ProcessManager, Spawned, SystemProcessManager,
};
#[cfg(unix)]
pub use process_manager::UnixProcessManager;
#[cfg(windows)]
pub use process_manager::WindowsProcessManager;
pub use readiness::{
    Readiness, ReadinessError, ReadinessMarker, ReadinessWatcher, WatchSession,
    APPLICATION_MARKER, DATABASE_MARKER,
};
pub use service::{
    classify, decode, platform, CodePage, CommandOutput, CommandRunner, Invocation, Platform,
    ServiceBackend, ServiceControlTool, ServiceError, ServiceStatus, TokioCommandRunner, Verb,
};
pub use supervisor::{AppLog, ProcessSupervisor, SupervisedChild};
pub use types::{LifecycleState, OrchestratorEvent, Progress, ProgressSink};
