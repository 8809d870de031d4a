mod app_log;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::StreamExt;
use tandem_types::{Dependency, ServiceDescriptor};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};

pub use app_log::AppLog;

use crate::{
    error::{LifecycleError, Result},
    process_manager::{BoxStream, CommandSpec, ProcId, ProcessManager},
    types::OrchestratorEvent,
};

#[derive(Debug)]
struct Supervised {
    id: ProcId,
    exit_expected: Arc<AtomicBool>,
    exit: watch::Receiver<Option<i32>>,
    handler: JoinHandle<()>,
}

/// Handle to a freshly spawned dependency.
#[derive(Debug, Clone)]
pub struct SupervisedChild {
    pub id: ProcId,
    pub pid: Option<u32>,
    exit: watch::Receiver<Option<i32>>,
}

impl SupervisedChild {
    /// Resolves once the child has exited. `None` if the exit status was
    /// lost.
    pub async fn exited(&mut self) -> Option<i32> {
        match self.exit.wait_for(Option::is_some).await {
            Ok(code) => *code,
            Err(_) => None,
        }
    }
}

/// Runs dependencies as direct children, one per dependency.
#[derive(Debug)]
pub struct ProcessSupervisor<P> {
    manager: Arc<Mutex<P>>,
    app_log: AppLog,
    events: mpsc::UnboundedSender<OrchestratorEvent>,
    children: Arc<Mutex<HashMap<Dependency, Supervised>>>,
    stop_grace: Duration,
}

impl<P: ProcessManager + 'static> ProcessSupervisor<P> {
    pub fn new(
        manager: P,
        app_log: AppLog,
        events: mpsc::UnboundedSender<OrchestratorEvent>,
        stop_grace: Duration,
    ) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            app_log,
            events,
            children: Arc::new(Mutex::new(HashMap::new())),
            stop_grace,
        }
    }

    pub async fn is_running(&self, dependency: Dependency) -> bool {
        self.children
            .lock()
            .await
            .get(&dependency)
            .is_some_and(|child| child.exit.borrow().is_none())
    }

    /// Spawn `descriptor` and start forwarding its output.
    pub async fn spawn(
        &self,
        dependency: Dependency,
        descriptor: &ServiceDescriptor,
    ) -> Result<SupervisedChild> {
        if self.is_running(dependency).await {
            return Err(LifecycleError::InProgress { dependency });
        }

        let mut cmd = Vec::with_capacity(descriptor.args.len() + 1);
        cmd.push(descriptor.executable.display().to_string());
        cmd.extend(descriptor.args.iter().cloned());
        let spec = CommandSpec {
            name: dependency.to_string(),
            cmd,
            cwd: descriptor.executable.parent().map(ToOwned::to_owned),
            env: Vec::new(),
        };

        tracing::info!("Spawning {dependency}: {:?}", spec.cmd);
        let spawned = self
            .manager
            .lock()
            .await
            .spawn(spec)
            .await
            .map_err(|err| LifecycleError::Spawn {
                dependency,
                message: format!("{err:#}"),
            })?;

        self.forward(dependency, spawned.stdout);
        self.forward(dependency, spawned.stderr);

        let exit_expected = Arc::new(AtomicBool::new(false));
        let handler = self.exit_handler(
            dependency,
            spawned.id,
            spawned.exit.clone(),
            Arc::clone(&exit_expected),
        );

        self.children.lock().await.insert(
            dependency,
            Supervised {
                id: spawned.id,
                exit_expected,
                exit: spawned.exit.clone(),
                handler,
            },
        );

        Ok(SupervisedChild {
            id: spawned.id,
            pid: spawned.pid,
            exit: spawned.exit,
        })
    }

    /// Stop gracefully, escalating to a kill after the grace period.
    ///
    /// Returns the exit code, or `None` when nothing was running.
    pub async fn stop(&self, dependency: Dependency) -> Result<Option<i32>> {
        let Some(child) = self.children.lock().await.remove(&dependency) else {
            return Ok(None);
        };
        let stop_err = |err: anyhow::Error| LifecycleError::Stop {
            dependency,
            message: format!("{err:#}"),
        };

        child.exit_expected.store(true, Ordering::SeqCst);
        tracing::info!("Stopping {dependency}");

        let code = {
            let mut manager = self.manager.lock().await;
            if let Err(err) = manager.shutdown(child.id).await {
                tracing::warn!("Graceful shutdown of {dependency} failed: {err:#}");
            }
            match manager.wait(child.id, self.stop_grace).await.map_err(stop_err)? {
                Some(code) => Some(code),
                None => {
                    tracing::warn!(
                        "{dependency} still running after {:?}, killing",
                        self.stop_grace
                    );
                    manager.kill(child.id).await.map_err(stop_err)?;
                    manager
                        .wait(child.id, self.stop_grace)
                        .await
                        .map_err(stop_err)?
                }
            }
        };

        if let Err(err) = child.handler.await {
            tracing::debug!("Exit handler for {dependency} ended abnormally: {err}");
        }
        // The exit was observed; a later exit is a real crash again.
        child.exit_expected.store(false, Ordering::SeqCst);

        Ok(code)
    }

    fn forward(&self, dependency: Dependency, mut lines: BoxStream<String>) {
        let app_log = self.app_log.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(line) = lines.next().await {
                if let Err(err) = app_log.append(dependency, &line).await {
                    tracing::warn!("Cannot write {}: {err}", app_log.path().display());
                }
                tracing::debug!("[{dependency}] {line}");
                let _ = events.send(OrchestratorEvent::Output { dependency, line });
            }
        });
    }

    fn exit_handler(
        &self,
        dependency: Dependency,
        id: ProcId,
        mut exit: watch::Receiver<Option<i32>>,
        exit_expected: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let events = self.events.clone();
        let children = Arc::clone(&self.children);
        tokio::spawn(async move {
            let code = match exit.wait_for(Option::is_some).await {
                Ok(code) => *code,
                Err(_) => None,
            };

            let expected = exit_expected.swap(false, Ordering::SeqCst);
            let fatal = dependency == Dependency::Database && !expected;
            if expected {
                tracing::info!("{dependency} exited with code {code:?}");
            } else {
                tracing::warn!("{dependency} exited unexpectedly with code {code:?}");
            }

            {
                let mut children = children.lock().await;
                if children.get(&dependency).is_some_and(|c| c.id == id) {
                    children.remove(&dependency);
                }
            }

            let _ = events.send(OrchestratorEvent::Exited {
                dependency,
                code,
                fatal,
            });
        })
    }
}
