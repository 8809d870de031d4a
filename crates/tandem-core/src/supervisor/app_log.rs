use std::{io, path::PathBuf, sync::Arc};

use tandem_types::Dependency;
use tokio::{fs::File, io::AsyncWriteExt, sync::Mutex};

/// Append-only application log shared by every supervised dependency.
#[derive(Debug, Clone)]
pub struct AppLog {
    path: PathBuf,
    file: Arc<Mutex<Option<File>>>,
}

impl AppLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one line prefixed with the dependency name. Lines from
    /// different dependencies never interleave mid-line.
    pub async fn append(&self, dependency: Dependency, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }

        if let Some(file) = guard.as_mut() {
            file.write_all(format!("[{dependency}] {line}\n").as_bytes())
                .await?;
            file.flush().await?;
        }
        Ok(())
    }
}
