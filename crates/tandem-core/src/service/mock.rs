use std::{
    collections::{HashMap, VecDeque},
    io::Write,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tandem_types::ServiceDescriptor;

use crate::service::{
    command::{CommandOutput, CommandRunner, Invocation},
    control_tool::Verb,
    ServiceBackend, ServiceError, ServiceStatus,
};

#[derive(Debug, Default)]
struct RunnerState {
    responses: Vec<(String, CommandOutput)>,
    calls: Vec<Invocation>,
}

/// Canned subprocess results keyed by any argument of the invocation.
#[derive(Debug, Default, Clone)]
pub(crate) struct MockCommandRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl MockCommandRunner {
    pub fn respond(&self, arg: &str, code: i32, stdout: &str) {
        self.state.lock().unwrap().responses.push((
            arg.to_owned(),
            CommandOutput {
                code: Some(code),
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
            },
        ));
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(invocation.clone());
        let output = state
            .responses
            .iter()
            .find(|(key, _)| invocation.args.iter().any(|a| a == key))
            .map(|(_, out)| out.clone())
            .unwrap_or(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            });
        Ok(output)
    }
}

#[derive(Debug, Default)]
pub(crate) struct BackendState {
    pub statuses: HashMap<String, ServiceStatus>,
    /// Probe results returned before falling back to `statuses`.
    pub scripted: VecDeque<ServiceStatus>,
    pub calls: Vec<String>,
    pub deny_elevation: bool,
    /// Line appended to the service's log on start and restart.
    pub marker: Option<String>,
}

/// In-memory service manager that behaves like a well-mannered tool.
#[derive(Debug, Default, Clone)]
pub(crate) struct MockServiceBackend {
    pub state: Arc<Mutex<BackendState>>,
}

impl MockServiceBackend {
    pub fn with_status(self, service: &str, status: ServiceStatus) -> Self {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(service.to_owned(), status);
        self
    }

    pub fn with_script(self, statuses: impl IntoIterator<Item = ServiceStatus>) -> Self {
        self.state.lock().unwrap().scripted.extend(statuses);
        self
    }

    pub fn with_marker(self, line: &str) -> Self {
        self.state.lock().unwrap().marker = Some(line.to_owned());
        self
    }

    pub fn denying_elevation(self) -> Self {
        self.state.lock().unwrap().deny_elevation = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls().iter().filter(|c| *c == verb).count()
    }

    fn transition(
        &self,
        verb: Verb,
        descriptor: &ServiceDescriptor,
        elevated: bool,
        next: ServiceStatus,
    ) -> Result<ServiceStatus, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(verb.as_str().to_owned());
        if elevated && state.deny_elevation {
            return Err(ServiceError::ElevationDenied {
                verb,
                service: descriptor.name.clone(),
            });
        }
        state
            .statuses
            .insert(descriptor.name.clone(), next.clone());

        if matches!(verb, Verb::Start | Verb::Restart) {
            if let Some(marker) = &state.marker {
                if let Some(parent) = descriptor.log_file.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&descriptor.log_file)
                    .unwrap();
                writeln!(file, "{marker}").unwrap();
            }
        }
        Ok(next)
    }
}

#[async_trait]
impl ServiceBackend for MockServiceBackend {
    async fn probe(&self, service: &str) -> Result<ServiceStatus, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("status".to_owned());
        if let Some(status) = state.scripted.pop_front() {
            return Ok(status);
        }
        Ok(state
            .statuses
            .get(service)
            .cloned()
            .unwrap_or(ServiceStatus::NotInstalled))
    }

    async fn install(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.transition(Verb::Install, descriptor, true, ServiceStatus::Stopped)
    }

    async fn configure_logging(&self, descriptor: &ServiceDescriptor) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("set".to_owned());
        if state.deny_elevation {
            return Err(ServiceError::ElevationDenied {
                verb: Verb::Set,
                service: descriptor.name.clone(),
            });
        }
        Ok(())
    }

    async fn start(
        &self,
        descriptor: &ServiceDescriptor,
        elevate: bool,
    ) -> Result<ServiceStatus, ServiceError> {
        self.transition(Verb::Start, descriptor, elevate, ServiceStatus::Running)
    }

    async fn stop(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.transition(Verb::Stop, descriptor, false, ServiceStatus::Stopped)
    }

    async fn restart(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.transition(Verb::Restart, descriptor, true, ServiceStatus::Running)
    }

    async fn remove(&self, descriptor: &ServiceDescriptor) -> Result<ServiceStatus, ServiceError> {
        self.transition(Verb::Remove, descriptor, true, ServiceStatus::NotInstalled)
    }
}
