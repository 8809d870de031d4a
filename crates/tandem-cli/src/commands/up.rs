use std::sync::Arc;

use anyhow::Result;
use tandem_core::{Orchestrator, OrchestratorEvent, Readiness};
use tandem_types::{Dependency, Mode};
use tokio::signal;

use crate::{commands::load_config, logger::Logger};

pub async fn up(file: Option<String>, mut dependencies: Vec<Dependency>) -> Result<()> {
    let config = load_config(file.as_deref())?;
    if dependencies.is_empty() {
        dependencies = Dependency::ALL.to_vec();
    }
    let supervising = dependencies
        .iter()
        .any(|dep| config.dependency(*dep).mode == Mode::Process);

    let (orchestrator, mut events) = Orchestrator::system(config);
    let orchestrator = Arc::new(orchestrator);

    let mut startup = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.start_many(&dependencies).await })
    };
    let mut starting = true;
    let mut shutting_down = false;
    let mut logger = Logger::default();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                if shutting_down {
                    tracing::warn!("Second Ctrl+C: exiting immediately");
                    return Ok(());
                }

                shutting_down = true;
                if starting {
                    startup.abort();
                }
                tracing::info!("Ctrl+C: stopping dependencies");
                logger.system("Stopping dependencies...");

                orchestrator.stop_all().await?;
                logger.system("All dependencies stopped");
                return Ok(());
            }

            joined = &mut startup, if starting => {
                starting = false;
                match joined? {
                    Ok(outcomes) => {
                        for outcome in outcomes {
                            let note = match outcome.readiness {
                                Some(Readiness::TimedOut) => " (no readiness marker seen)",
                                _ => "",
                            };
                            logger.system(&format!("{} is ready{note}", outcome.dependency));
                        }
                        if let Some(url) = orchestrator.app_url().await {
                            logger.system(&format!("Application available at {url}"));
                        }
                        if !supervising {
                            return Ok(());
                        }
                    }
                    Err(err) => {
                        logger.error(&err.to_string());
                        if let Err(stop_err) = orchestrator.stop_all().await {
                            tracing::warn!("Cleanup after failed start: {stop_err}");
                        }
                        return Err(err.into());
                    }
                }
            }

            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    tracing::info!("Event stream ended");
                    return Ok(());
                };
                orchestrator.handle_event(&event).await;

                match event {
                    OrchestratorEvent::Progress { dependency, progress } => {
                        if let Some(text) = progress.text {
                            logger.progress(dependency, &text, progress.wait);
                        }
                        if let Some(detail) = progress.detail {
                            tracing::debug!("[{dependency}] {detail}");
                        }
                    }
                    OrchestratorEvent::Output { dependency, line } => {
                        logger.log(dependency, &line);
                    }
                    OrchestratorEvent::Exited { dependency, code, fatal } => {
                        if fatal && !shutting_down {
                            logger.error(&format!("{dependency} exited with code {code:?}"));
                            if let Err(err) = orchestrator.stop_all().await {
                                tracing::warn!("Cleanup after fatal exit: {err}");
                            }
                            anyhow::bail!("{dependency} exited unexpectedly");
                        }
                        logger.system(&format!("{dependency} exited with code {code:?}"));
                    }
                }
            }
        }
    }
}
