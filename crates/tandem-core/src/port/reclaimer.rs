use std::{fmt, sync::Arc, time::Duration};

use tokio::time::Instant;

use super::inspector::{PortInspector, SystemPortInspector};

const DEFAULT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    pub port: u16,
    /// Pids that were asked to exit.
    pub attempted: Vec<u32>,
}

/// Termination failures for one port, as text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to reclaim port {port}: {message}")]
pub struct ReclaimError {
    pub port: u16,
    pub message: String,
}

/// Frees a TCP port held by a stale process.
#[derive(Clone)]
pub struct PortReclaimer {
    inspector: Arc<dyn PortInspector>,
    grace: Duration,
    poll: Duration,
}

impl fmt::Debug for PortReclaimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortReclaimer")
            .field("grace", &self.grace)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl PortReclaimer {
    pub fn new(inspector: Arc<dyn PortInspector>, grace: Duration) -> Self {
        Self {
            inspector,
            grace,
            poll: DEFAULT_POLL,
        }
    }

    #[must_use]
    pub fn system(grace: Duration) -> Self {
        Self::new(Arc::new(SystemPortInspector), grace)
    }

    #[must_use]
    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Interrupt every process bound to `port` and wait for them to go.
    ///
    /// Succeeds only when every owner is gone within the grace period.
    pub async fn reclaim(&self, port: u16) -> Result<ReclaimReport, ReclaimError> {
        let fail = |message: String| ReclaimError { port, message };

        let owners = self.inspector.owners(port).await.map_err(fail)?;
        if owners.is_empty() {
            tracing::debug!("Port {port} is free");
            return Ok(ReclaimReport {
                port,
                attempted: Vec::new(),
            });
        }

        tracing::info!("Reclaiming port {port} from {owners:?}");

        if self.inspector.blunt_only() {
            self.inspector.kill_port(port).await.map_err(fail)?;
            return Ok(ReclaimReport {
                port,
                attempted: owners,
            });
        }

        let mut errors = Vec::new();
        for pid in &owners {
            if let Err(err) = self.inspector.interrupt(*pid).await {
                tracing::warn!("Cannot interrupt pid {pid}: {err}");
                errors.push(err);
            }
        }

        let deadline = Instant::now() + self.grace;
        loop {
            let mut alive = Vec::new();
            for pid in &owners {
                if self.inspector.is_alive(*pid).await {
                    alive.push(*pid);
                }
            }
            if alive.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for pid in alive {
                    errors.push(format!("pid {pid} still running after {:?}", self.grace));
                }
                break;
            }
            tokio::time::sleep(self.poll).await;
        }

        if errors.is_empty() {
            tracing::info!("Port {port} reclaimed");
            Ok(ReclaimReport {
                port,
                attempted: owners,
            })
        } else {
            Err(fail(errors.join("; ")))
        }
    }
}
