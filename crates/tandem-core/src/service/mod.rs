mod command;
mod control_tool;
#[cfg(test)]
mod mock;
pub mod platform;
mod status;

use async_trait::async_trait;
use tandem_types::ServiceDescriptor;

pub use command::{CommandOutput, CommandRunner, Invocation, TokioCommandRunner};
pub use control_tool::{ServiceControlTool, Verb};
#[cfg(test)]
pub(crate) use mock::MockServiceBackend;
pub use platform::Platform;
pub use status::{classify, decode, CodePage, ServiceStatus};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to run `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("elevation for `{verb}` on service `{service}` was declined")]
    ElevationDenied { verb: Verb, service: String },

    #[error("`{verb}` on service `{service}` failed with code {code:?}: {output}")]
    Command {
        verb: Verb,
        service: String,
        code: Option<i32>,
        output: String,
    },
}

/// Control surface of the OS service manager, one implementation per
/// platform.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// Query the current status. Never elevates.
    async fn probe(&self, service: &str) -> Result<ServiceStatus, ServiceError>;
    /// Register the service.
    async fn install(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError>;
    /// Point the service's stdout and stderr at its log file.
    async fn configure_logging(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError>;
    /// Start the service. `elevate` is set when it was installed during the
    /// same startup attempt.
    async fn start(
        &self,
        descriptor: &ServiceDescriptor,
        elevate: bool,
    ) -> Result<ServiceStatus, ServiceError>;
    async fn stop(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError>;
    async fn restart(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError>;
    /// Remove the service registration.
    async fn remove(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError>;
}
