use tandem_types::Dependency;

use super::{Orchestrator, StartOutcome};
use crate::{
    error::{LifecycleError, Result},
    process_manager::ProcessManager,
    readiness::Readiness,
    service::ServiceStatus,
    types::Progress,
};

/// Probes allowed per start attempt before giving up on a flapping
/// service manager.
pub const MAX_TRANSITIONS: usize = 8;

impl<P: ProcessManager + 'static> Orchestrator<P> {
    /// Drive the OS service to running, re-probing after every action.
    pub(super) async fn start_service(&self, dependency: Dependency) -> Result<StartOutcome> {
        let cfg = self.config.dependency(dependency);
        let descriptor = &cfg.descriptor;

        let mut installed = false;
        let mut removed = false;
        let mut restarted = false;
        let mut readiness: Option<Readiness> = None;
        let mut last = ServiceStatus::Unknown(String::new());

        for transition in 1..=MAX_TRANSITIONS {
            let status = self.backend.probe(&descriptor.name).await?;
            tracing::debug!("{dependency} [{transition}/{MAX_TRANSITIONS}]: {status}");

            match &status {
                ServiceStatus::Unknown(raw) => {
                    return Err(LifecycleError::StatusDecode {
                        service: descriptor.name.clone(),
                        raw: raw.clone(),
                    });
                }
                ServiceStatus::NotInstalled => {
                    self.progress(
                        dependency,
                        Progress::text(format!("Installing {dependency} service")),
                    );
                    self.backend.install(descriptor).await?;
                    self.backend.configure_logging(descriptor).await?;
                    installed = true;
                }
                ServiceStatus::AlreadyInstalled
                | ServiceStatus::Stopped
                | ServiceStatus::Paused => {
                    let session = self.attach(dependency);
                    self.progress(dependency, starting_progress(dependency));
                    self.backend.start(descriptor, installed).await?;
                    let outcome = session.wait().await?;
                    return Ok(StartOutcome::new(dependency, Some(outcome), transition));
                }
                ServiceStatus::UnexpectedlyStopped => {
                    if removed {
                        return Err(LifecycleError::RemediationFailed {
                            service: descriptor.name.clone(),
                        });
                    }
                    tracing::warn!("{dependency} service stopped unexpectedly, removing it");
                    self.progress(
                        dependency,
                        Progress::text(format!("Repairing {dependency} service")),
                    );
                    self.backend.remove(descriptor).await?;
                    removed = true;
                }
                ServiceStatus::Running | ServiceStatus::Started => {
                    if restarted || self.identity.matches(dependency).await {
                        return Ok(StartOutcome::new(dependency, readiness, transition));
                    }
                    tracing::info!("{dependency} runs a different build, restarting");
                    let session = self.attach(dependency);
                    self.progress(dependency, starting_progress(dependency));
                    self.backend.restart(descriptor).await?;
                    readiness = Some(session.wait().await?);
                    restarted = true;
                }
            }

            last = status;
        }

        Err(LifecycleError::TransitionLimit {
            service: descriptor.name.clone(),
            limit: MAX_TRANSITIONS,
            last,
        })
    }

    /// Reclaim the port, spawn, and wait for readiness or an early exit.
    pub(super) async fn start_process(&self, dependency: Dependency) -> Result<StartOutcome> {
        let cfg = self.config.dependency(dependency);
        if self.supervisor.is_running(dependency).await {
            tracing::info!("{dependency} is already running");
            return Ok(StartOutcome::new(dependency, None, 0));
        }

        match self.reclaimer.reclaim(cfg.port).await {
            Ok(report) if !report.attempted.is_empty() => {
                tracing::info!("Reclaimed port {} from {:?}", cfg.port, report.attempted);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("{err}"),
        }

        let session = self.attach(dependency);
        self.progress(dependency, starting_progress(dependency));
        let mut child = self.supervisor.spawn(dependency, &cfg.descriptor).await?;

        tokio::select! {
            biased;

            outcome = session.wait() => Ok(StartOutcome::new(dependency, Some(outcome?), 0)),
            code = child.exited() => Err(LifecycleError::ExitedBeforeReady { dependency, code }),
        }
    }
}

fn starting_progress(dependency: Dependency) -> Progress {
    let text = format!("Starting {dependency}");
    match dependency {
        // First start of the database initialises its data directory.
        Dependency::Database => Progress::waiting(text),
        Dependency::Application => Progress::text(text),
    }
}
