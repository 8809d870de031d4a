use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use tandem_config::Config;
use tandem_types::Dependency;

/// Compares the running instance's build with the one bundled locally.
#[async_trait]
pub trait BuildIdentity: Send + Sync {
    /// `true` if the running instance can be reused as is.
    async fn matches(&self, dependency: Dependency) -> bool;
}

#[derive(Debug, Clone, Default)]
struct Stamp {
    running_file: Option<PathBuf>,
    bundled: Option<String>,
}

/// Reads the running build from a stamp file the dependency writes at
/// startup.
///
/// Without a bundled build there is nothing to compare and the instance is
/// reused. A missing or unreadable stamp counts as a mismatch.
#[derive(Debug, Clone, Default)]
pub struct StampFileIdentity {
    stamps: HashMap<Dependency, Stamp>,
}

impl StampFileIdentity {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let stamps = Dependency::ALL
            .into_iter()
            .map(|dependency| {
                let cfg = config.dependency(dependency);
                (
                    dependency,
                    Stamp {
                        running_file: cfg.running_build_file.clone(),
                        bundled: cfg.bundled_build.clone(),
                    },
                )
            })
            .collect();
        Self { stamps }
    }
}

#[async_trait]
impl BuildIdentity for StampFileIdentity {
    async fn matches(&self, dependency: Dependency) -> bool {
        let Some(stamp) = self.stamps.get(&dependency) else {
            return true;
        };
        let Some(bundled) = stamp.bundled.as_deref() else {
            return true;
        };
        let Some(path) = &stamp.running_file else {
            tracing::warn!("{dependency}: bundled build set but no running_build_file");
            return false;
        };

        match tokio::fs::read_to_string(path).await {
            Ok(running) => {
                let running = running.trim();
                if running == bundled {
                    true
                } else {
                    tracing::info!(
                        "{dependency}: running build {running:?} differs from bundled {bundled:?}"
                    );
                    false
                }
            }
            Err(err) => {
                tracing::warn!("{dependency}: cannot read {}: {err}", path.display());
                false
            }
        }
    }
}
