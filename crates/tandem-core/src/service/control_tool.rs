use std::{fmt, path::PathBuf};

use async_trait::async_trait;
use tandem_types::ServiceDescriptor;
use tokio::sync::OnceCell;

use crate::service::{
    command::{CommandOutput, CommandRunner, Invocation, TokioCommandRunner},
    platform::{self, Platform},
    status::{classify, decode, CodePage, ServiceStatus},
    ServiceBackend, ServiceError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Status,
    Install,
    Set,
    Start,
    Stop,
    Restart,
    Remove,
}

impl Verb {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Status => "status",
            Verb::Install => "install",
            Verb::Set => "set",
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::Restart => "restart",
            Verb::Remove => "remove",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend driving a native control tool: `<tool> <verb> <service> [args...]`.
#[derive(Debug)]
pub struct ServiceControlTool<R = TokioCommandRunner> {
    tool: PathBuf,
    runner: R,
    platform: Box<dyn Platform>,
    code_page: OnceCell<CodePage>,
}

impl ServiceControlTool {
    /// Control tool for the current platform using real subprocesses.
    pub fn system(tool: impl Into<PathBuf>) -> Self {
        Self::new(tool, TokioCommandRunner, platform::current())
    }
}

impl<R: CommandRunner> ServiceControlTool<R> {
    pub fn new(tool: impl Into<PathBuf>, runner: R, platform: Box<dyn Platform>) -> Self {
        tracing::debug!("Service control backend for {}", platform.name());

        Self {
            tool: tool.into(),
            runner,
            platform,
            code_page: OnceCell::new(),
        }
    }

    async fn code_page(&self) -> CodePage {
        *self
            .code_page
            .get_or_init(|| async {
                let Some(query) = self.platform.code_page_query() else {
                    return CodePage::UTF8;
                };
                match self.runner.run(&query).await {
                    Ok(output) => {
                        let text = String::from_utf8_lossy(&output.stdout);
                        let page = CodePage::parse_chcp(&text).unwrap_or(CodePage::UTF8);
                        tracing::debug!("Active code page: {}", page.0);
                        page
                    }
                    Err(err) => {
                        tracing::warn!("Cannot query code page, assuming UTF-8: {err}");
                        CodePage::UTF8
                    }
                }
            })
            .await
    }

    async fn text(&self, output: &CommandOutput) -> String {
        decode(&output.combined(), self.code_page().await)
    }

    async fn invoke(
        &self,
        verb: Verb,
        service: &str,
        extra: &[String],
        elevate: bool,
    ) -> Result<CommandOutput, ServiceError> {
        let mut args = Vec::with_capacity(extra.len() + 2);
        args.push(verb.as_str().to_owned());
        args.push(service.to_owned());
        args.extend_from_slice(extra);

        let mut invocation = Invocation::new(self.tool.clone(), args);
        if elevate {
            invocation = self.platform.elevate(invocation);
        }
        tracing::debug!("Service control: {invocation}");

        self.runner
            .run(&invocation)
            .await
            .map_err(|source| ServiceError::Io {
                program: invocation.program.display().to_string(),
                source,
            })
    }

    /// Run a state-changing verb and classify whatever it printed.
    async fn control(
        &self,
        verb: Verb,
        service: &str,
        extra: &[String],
        elevate: bool,
    ) -> Result<ServiceStatus, ServiceError> {
        let output = self.invoke(verb, service, extra, elevate).await?;
        let text = self.text(&output).await;

        if !output.success() {
            if elevate && self.platform.elevation_cancelled(&output) {
                tracing::warn!("Elevation for `{verb}` on `{service}` was declined");
                return Err(ServiceError::ElevationDenied {
                    verb,
                    service: service.to_owned(),
                });
            }
            return Err(ServiceError::Command {
                verb,
                service: service.to_owned(),
                code: output.code,
                output: text,
            });
        }

        tracing::info!("Service `{service}` {verb}: {text}");
        Ok(classify(&text))
    }
}

#[async_trait]
impl<R: CommandRunner> ServiceBackend for ServiceControlTool<R> {
    async fn probe(&self, service: &str) -> Result<ServiceStatus, ServiceError> {
        // The tool exits non-zero for several valid statuses, so only the
        // text decides.
        let output = self.invoke(Verb::Status, service, &[], false).await?;
        let text = self.text(&output).await;
        let status = classify(&text);
        tracing::debug!("Service `{service}` status: {status}");
        Ok(status)
    }

    async fn install(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        let mut extra = Vec::with_capacity(descriptor.args.len() + 1);
        extra.push(descriptor.executable.display().to_string());
        extra.extend(descriptor.args.iter().cloned());
        self.control(Verb::Install, &descriptor.name, &extra, true)
            .await
    }

    async fn configure_logging(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        let log = descriptor.log_file.display().to_string();
        for key in ["AppStdout", "AppStderr"] {
            self.control(
                Verb::Set,
                &descriptor.name,
                &[key.to_owned(), log.clone()],
                true,
            )
            .await?;
        }
        Ok(())
    }

    async fn start(
        &self,
        descriptor: &ServiceDescriptor,
        elevate: bool,
    ) -> Result<ServiceStatus, ServiceError> {
        self.control(Verb::Start, &descriptor.name, &[], elevate)
            .await
    }

    async fn stop(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.control(Verb::Stop, &descriptor.name, &[], false).await
    }

    async fn restart(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.control(Verb::Restart, &descriptor.name, &[], true)
            .await
    }

    async fn remove(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.control(Verb::Remove, &descriptor.name, &[], true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::service::{
        mock::MockCommandRunner,
        platform::{Linux, Windows},
    };

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "tandem-db".to_owned(),
            executable: PathBuf::from("/opt/db/mysqld"),
            args: vec!["--port=3307".to_owned()],
            log_file: PathBuf::from("/var/log/db.log"),
        }
    }

    #[tokio::test]
    async fn probe_classifies_output_without_elevation() {
        let runner = MockCommandRunner::default();
        runner.respond("status", 3, "Service tandem-db is not installed\n");
        let tool = ServiceControlTool::new("svcctl", runner.clone(), Box::new(Linux));

        let status = tool.probe("tandem-db").await.unwrap();

        assert_eq!(status, ServiceStatus::NotInstalled);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, PathBuf::from("svcctl"));
        assert_eq!(calls[0].args, vec!["status", "tandem-db"]);
    }

    #[tokio::test]
    async fn probe_reports_unknown_text() {
        let runner = MockCommandRunner::default();
        runner.respond("status", 0, "something odd happened");
        let tool = ServiceControlTool::new("svcctl", runner, Box::new(Linux));

        let status = tool.probe("tandem-db").await.unwrap();
        assert_eq!(
            status,
            ServiceStatus::Unknown("something odd happened".to_owned())
        );
    }

    #[tokio::test]
    async fn install_is_elevated_and_passes_launch_args() {
        let runner = MockCommandRunner::default();
        runner.respond("install", 0, "Service tandem-db installed");
        let tool = ServiceControlTool::new("svcctl", runner.clone(), Box::new(Linux));

        tool.install(&descriptor()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program, PathBuf::from("pkexec"));
        assert_eq!(
            calls[0].args,
            vec!["svcctl", "install", "tandem-db", "/opt/db/mysqld", "--port=3307"]
        );
    }

    #[tokio::test]
    async fn declined_elevation_is_terminal_error() {
        let runner = MockCommandRunner::default();
        runner.respond("remove", 126, "");
        let tool = ServiceControlTool::new("svcctl", runner, Box::new(Linux));

        let err = tool.remove(&descriptor()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::ElevationDenied {
                verb: Verb::Remove,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_stop_reports_command_error() {
        let runner = MockCommandRunner::default();
        runner.respond("stop", 1, "Access is denied.");
        let tool = ServiceControlTool::new("svcctl", runner.clone(), Box::new(Linux));

        let err = tool.stop(&descriptor()).await.unwrap_err();
        match err {
            ServiceError::Command { code, output, .. } => {
                assert_eq!(code, Some(1));
                assert_eq!(output, "Access is denied.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Stop never elevates.
        assert_eq!(runner.calls()[0].program, PathBuf::from("svcctl"));
    }

    #[tokio::test]
    async fn configure_logging_sets_both_streams() {
        let runner = MockCommandRunner::default();
        runner.respond("set", 0, "Set parameter");
        let tool = ServiceControlTool::new("svcctl", runner.clone(), Box::new(Linux));

        tool.configure_logging(&descriptor()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args[4], "/var/log/db.log");
        assert_eq!(calls[1].args[3], "AppStderr");
    }

    #[tokio::test]
    async fn code_page_is_queried_once() {
        let runner = MockCommandRunner::default();
        runner.respond("/C", 0, "Active code page: 437");
        runner.respond("status", 0, "tandem-db is running");
        let tool = ServiceControlTool::new("svcctl.exe", runner.clone(), Box::new(Windows));

        assert_eq!(tool.probe("tandem-db").await.unwrap(), ServiceStatus::Running);
        assert_eq!(tool.probe("tandem-db").await.unwrap(), ServiceStatus::Running);

        let chcp_calls = runner
            .calls()
            .iter()
            .filter(|c| c.program == PathBuf::from("cmd.exe"))
            .count();
        assert_eq!(chcp_calls, 1);
    }
}
