mod identity;
mod machine;

use std::{collections::HashMap, sync::Arc};

use tandem_config::Config;
use tandem_types::{Dependency, Mode};
use tokio::sync::{mpsc, Mutex};

pub use identity::{BuildIdentity, StampFileIdentity};
pub use machine::MAX_TRANSITIONS;

use crate::{
    error::{LifecycleError, Result},
    port::{PortInspector, PortReclaimer, SystemPortInspector},
    process_manager::{ProcessManager, SystemProcessManager},
    readiness::{Readiness, ReadinessMarker, ReadinessWatcher, WatchSession},
    service::{ServiceBackend, ServiceControlTool, ServiceStatus},
    supervisor::{AppLog, ProcessSupervisor},
    types::{LifecycleState, OrchestratorEvent, Progress, ProgressSink},
};

/// Everything the orchestrator talks to besides its configuration.
pub struct Collaborators<P> {
    pub backend: Arc<dyn ServiceBackend>,
    pub process_manager: P,
    pub inspector: Arc<dyn PortInspector>,
    pub identity: Arc<dyn BuildIdentity>,
    pub watcher: ReadinessWatcher,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub dependency: Dependency,
    /// `None` when an already running instance was reused.
    pub readiness: Option<Readiness>,
    pub url: Option<String>,
    /// Status probes spent; always 0 in process mode.
    pub transitions: usize,
}

impl StartOutcome {
    fn new(dependency: Dependency, readiness: Option<Readiness>, transitions: usize) -> Self {
        let url = match &readiness {
            Some(Readiness::Matched { url, .. }) => url.clone(),
            _ => None,
        };
        Self {
            dependency,
            readiness,
            url,
            transitions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub dependency: Dependency,
    pub mode: Mode,
    pub state: LifecycleState,
    /// Fresh probe result in service mode.
    pub service: Option<ServiceStatus>,
    /// Whether a supervised child is alive in process mode.
    pub process_running: bool,
}

/// Brings the database and the application up and down.
pub struct Orchestrator<P> {
    config: Config,
    backend: Arc<dyn ServiceBackend>,
    supervisor: ProcessSupervisor<P>,
    reclaimer: PortReclaimer,
    identity: Arc<dyn BuildIdentity>,
    watcher: ReadinessWatcher,
    states: Mutex<HashMap<Dependency, LifecycleState>>,
    app_url: Mutex<Option<String>>,
    events: mpsc::UnboundedSender<OrchestratorEvent>,
}

impl Orchestrator<SystemProcessManager> {
    /// Orchestrator backed by the real service manager, processes and ports.
    #[must_use]
    pub fn system(config: Config) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let collaborators = Collaborators {
            backend: Arc::new(ServiceControlTool::system(&config.control.tool)),
            process_manager: SystemProcessManager::new(),
            inspector: Arc::new(SystemPortInspector),
            identity: Arc::new(StampFileIdentity::from_config(&config)),
            watcher: ReadinessWatcher::default(),
        };
        Self::new(config, collaborators)
    }
}

impl<P: ProcessManager + 'static> Orchestrator<P> {
    pub fn new(
        config: Config,
        collaborators: Collaborators<P>,
    ) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();

        let supervisor = ProcessSupervisor::new(
            collaborators.process_manager,
            AppLog::new(&config.control.app_log),
            events.clone(),
            config.control.stop_grace,
        );
        let reclaimer = PortReclaimer::new(collaborators.inspector, config.control.reclaim_grace);

        (
            Self {
                config,
                backend: collaborators.backend,
                supervisor,
                reclaimer,
                identity: collaborators.identity,
                watcher: collaborators.watcher,
                states: Mutex::new(HashMap::new()),
                app_url: Mutex::new(None),
                events,
            },
            events_rx,
        )
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn state(&self, dependency: Dependency) -> LifecycleState {
        self.states
            .lock()
            .await
            .get(&dependency)
            .cloned()
            .unwrap_or_default()
    }

    /// URL announced by the application when it became ready.
    pub async fn app_url(&self) -> Option<String> {
        self.app_url.lock().await.clone()
    }

    /// Bring `dependency` to running.
    ///
    /// # Errors
    /// Returns an error if a start or stop is already in flight for the
    /// dependency, if the dependency it requires is not running, or if it
    /// cannot be brought up.
    pub async fn start(&self, dependency: Dependency) -> Result<StartOutcome> {
        self.begin(dependency, LifecycleState::Starting).await?;
        tracing::info!("Starting {dependency}");

        let result = match self.ensure_requirement(dependency).await {
            Ok(()) => match self.config.dependency(dependency).mode {
                Mode::Service => self.start_service(dependency).await,
                Mode::Process => self.start_process(dependency).await,
            },
            Err(err) => Err(err),
        };

        match &result {
            Ok(outcome) => {
                if let Some(url) = &outcome.url {
                    *self.app_url.lock().await = Some(url.clone());
                }
                if outcome.readiness == Some(Readiness::TimedOut) {
                    tracing::warn!("{dependency} did not report readiness in time, proceeding");
                }
                self.settle(dependency, LifecycleState::Running).await;
                self.progress(dependency, Progress::text(format!("{dependency} is running")));
            }
            Err(err) => {
                tracing::error!("Failed to start {dependency}: {err}");
                self.settle(dependency, LifecycleState::Failed(err.to_string()))
                    .await;
            }
        }
        result
    }

    /// Start and hand the single result to `on_complete`.
    pub async fn start_with_callback<F>(&self, dependency: Dependency, on_complete: F)
    where
        F: FnOnce(Result<StartOutcome>) + Send,
    {
        on_complete(self.start(dependency).await);
    }

    /// Start the given dependencies in dependency order, stopping at the
    /// first failure.
    ///
    /// # Errors
    /// Returns the first start error.
    pub async fn start_many(&self, dependencies: &[Dependency]) -> Result<Vec<StartOutcome>> {
        let mut ordered = dependencies.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut outcomes = Vec::with_capacity(ordered.len());
        for dependency in ordered {
            outcomes.push(self.start(dependency).await?);
        }
        Ok(outcomes)
    }

    /// # Errors
    /// Returns the first start error.
    pub async fn start_all(&self) -> Result<Vec<StartOutcome>> {
        self.start_many(&Dependency::ALL).await
    }

    /// Bring `dependency` down.
    ///
    /// # Errors
    /// Returns an error if the service refuses to stop or the child cannot
    /// be terminated.
    pub async fn stop(&self, dependency: Dependency) -> Result<()> {
        self.begin(dependency, LifecycleState::Stopping).await?;
        tracing::info!("Stopping {dependency}");
        self.progress(dependency, Progress::text(format!("Stopping {dependency}")));

        let cfg = self.config.dependency(dependency);
        let result = match cfg.mode {
            Mode::Service => self.stop_service(dependency).await,
            Mode::Process => {
                let stopped = self.supervisor.stop(dependency).await.map(|_| ());
                if let Err(err) = self.reclaimer.reclaim(cfg.port).await {
                    tracing::warn!("{err}");
                }
                stopped
            }
        };

        if dependency == Dependency::Application {
            *self.app_url.lock().await = None;
        }
        match &result {
            Ok(()) => self.settle(dependency, LifecycleState::Idle).await,
            Err(err) => {
                tracing::error!("Failed to stop {dependency}: {err}");
                self.settle(dependency, LifecycleState::Failed(err.to_string()))
                    .await;
            }
        }
        result
    }

    /// Stop the application, then the database. Both are attempted.
    ///
    /// # Errors
    /// Returns the first stop error.
    pub async fn stop_all(&self) -> Result<()> {
        let mut first_err = None;
        for dependency in Dependency::ALL.into_iter().rev() {
            if let Err(err) = self.stop(dependency).await {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// # Errors
    /// Returns an error if the service status cannot be probed or decoded.
    pub async fn status(&self, dependency: Dependency) -> Result<StatusReport> {
        let cfg = self.config.dependency(dependency);
        let service = match cfg.mode {
            Mode::Service => Some(self.backend.probe(&cfg.descriptor.name).await?),
            Mode::Process => None,
        };

        Ok(StatusReport {
            dependency,
            mode: cfg.mode,
            state: self.state(dependency).await,
            service,
            process_running: self.supervisor.is_running(dependency).await,
        })
    }

    /// Stop and unregister the OS service. No-op in process mode.
    ///
    /// # Errors
    /// Returns an error if stopping or removing the service fails.
    pub async fn uninstall(&self, dependency: Dependency) -> Result<()> {
        let cfg = self.config.dependency(dependency);
        if cfg.mode == Mode::Process {
            tracing::info!("{dependency} runs as a process, nothing to uninstall");
            return Ok(());
        }

        self.begin(dependency, LifecycleState::Stopping).await?;
        let result = self.uninstall_service(dependency).await;
        match &result {
            Ok(()) => self.settle(dependency, LifecycleState::Idle).await,
            Err(err) => {
                self.settle(dependency, LifecycleState::Failed(err.to_string()))
                    .await;
            }
        }
        result
    }

    /// Fold a supervisor event into the lifecycle state.
    pub async fn handle_event(&self, event: &OrchestratorEvent) {
        let OrchestratorEvent::Exited {
            dependency,
            code,
            fatal,
        } = event
        else {
            return;
        };

        let mut states = self.states.lock().await;
        let state = states.entry(*dependency).or_default();
        if *state != LifecycleState::Running {
            return;
        }
        *state = if *fatal {
            LifecycleState::Failed(format!("exited with code {code:?}"))
        } else {
            LifecycleState::Idle
        };
    }

    async fn ensure_requirement(&self, dependency: Dependency) -> Result<()> {
        let Some(required) = dependency.requires() else {
            return Ok(());
        };
        if self.state(required).await == LifecycleState::Running {
            return Ok(());
        }

        // Started outside this orchestrator, e.g. by an earlier `up`.
        let cfg = self.config.dependency(required);
        let running = match cfg.mode {
            Mode::Service => matches!(
                self.backend.probe(&cfg.descriptor.name).await?,
                ServiceStatus::Running | ServiceStatus::Started
            ),
            Mode::Process => self.supervisor.is_running(required).await,
        };
        if running {
            Ok(())
        } else {
            Err(LifecycleError::RequirementNotRunning {
                dependency,
                required,
            })
        }
    }

    async fn stop_service(&self, dependency: Dependency) -> Result<()> {
        let descriptor = &self.config.dependency(dependency).descriptor;
        match self.backend.probe(&descriptor.name).await? {
            ServiceStatus::Running | ServiceStatus::Started | ServiceStatus::Paused => {
                self.backend.stop(descriptor).await?;
            }
            ServiceStatus::Unknown(raw) => {
                return Err(LifecycleError::StatusDecode {
                    service: descriptor.name.clone(),
                    raw,
                });
            }
            status => tracing::debug!("{dependency} is {status}, nothing to stop"),
        }
        Ok(())
    }

    async fn uninstall_service(&self, dependency: Dependency) -> Result<()> {
        let descriptor = &self.config.dependency(dependency).descriptor;
        match self.backend.probe(&descriptor.name).await? {
            ServiceStatus::NotInstalled => {
                tracing::info!("{dependency} service is not installed");
                return Ok(());
            }
            ServiceStatus::Running | ServiceStatus::Started | ServiceStatus::Paused => {
                self.backend.stop(descriptor).await?;
            }
            ServiceStatus::Unknown(raw) => {
                return Err(LifecycleError::StatusDecode {
                    service: descriptor.name.clone(),
                    raw,
                });
            }
            _ => {}
        }
        self.backend.remove(descriptor).await?;
        tracing::info!("{dependency} service removed");
        Ok(())
    }

    async fn begin(&self, dependency: Dependency, next: LifecycleState) -> Result<()> {
        let mut states = self.states.lock().await;
        let state = states.entry(dependency).or_default();
        // A stop may preempt an abandoned start; nothing else overlaps.
        let blocked = match next {
            LifecycleState::Stopping => *state == LifecycleState::Stopping,
            _ => state.is_busy(),
        };
        if blocked {
            return Err(LifecycleError::InProgress { dependency });
        }
        *state = next;
        Ok(())
    }

    async fn settle(&self, dependency: Dependency, state: LifecycleState) {
        self.states.lock().await.insert(dependency, state);
    }

    fn attach(&self, dependency: Dependency) -> WatchSession {
        let cfg = self.config.dependency(dependency);
        let marker = ReadinessMarker::for_dependency(dependency, cfg.ready_timeout);
        self.watcher
            .attach(&cfg.descriptor.log_file, marker, self.progress_sink(dependency))
    }

    fn progress(&self, dependency: Dependency, progress: Progress) {
        let _ = self.events.send(OrchestratorEvent::Progress {
            dependency,
            progress,
        });
    }

    fn progress_sink(&self, dependency: Dependency) -> ProgressSink {
        let events = self.events.clone();
        ProgressSink::new(move |progress| {
            let _ = events.send(OrchestratorEvent::Progress {
                dependency,
                progress,
            });
        })
    }
}
