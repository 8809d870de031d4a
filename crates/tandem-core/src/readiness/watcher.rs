use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use super::{marker::ReadinessMarker, tail::LogTail};
use crate::types::{Progress, ProgressSink};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How a readiness wait ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Matched { line: String, url: Option<String> },
    /// No marker within the window. Callers proceed anyway.
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("failed to tail {}: {source}", path.display())]
    Tail {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("readiness watch ended without a result")]
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct ReadinessWatcher {
    poll_interval: Duration,
}

impl Default for ReadinessWatcher {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReadinessWatcher {
    #[must_use]
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Start watching `path` for `marker`. The timeout starts now.
    ///
    /// Content already in the file is skipped; a file that appears later is
    /// read from its first byte. Must be called within a tokio runtime.
    pub fn attach(
        &self,
        path: &Path,
        marker: ReadinessMarker,
        progress: ProgressSink,
    ) -> WatchSession {
        let deadline = Instant::now() + marker.timeout;
        let offset = std::fs::metadata(path).map_or(0, |meta| meta.len());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let fs_watcher = path
            .parent()
            .and_then(|parent| Self::watch_parent(parent, events_tx));

        let tail = LogTail::new(path, offset);
        let poll_interval = self.poll_interval;
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            // Held for the lifetime of the session.
            let _fs_watcher = fs_watcher;
            let outcome = watch(tail, &marker, &progress, events_rx, deadline, poll_interval).await;
            let _ = outcome_tx.send(outcome);
        });

        WatchSession {
            outcome: outcome_rx,
            task,
        }
    }

    /// Attach and wait in one step.
    pub async fn wait_for_ready(
        &self,
        path: &Path,
        marker: ReadinessMarker,
        progress: ProgressSink,
    ) -> Result<Readiness, ReadinessError> {
        self.attach(path, marker, progress).wait().await
    }

    fn watch_parent(
        parent: &Path,
        events: mpsc::UnboundedSender<Event>,
    ) -> Option<RecommendedWatcher> {
        // The file itself may not exist yet, so watch its directory.
        if let Err(err) = std::fs::create_dir_all(parent) {
            tracing::warn!("Cannot create log directory {}: {err}", parent.display());
            return None;
        }

        let mut watcher = match RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = events.send(event);
                }
            },
            notify::Config::default(),
        ) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!("File watcher unavailable, polling only: {err}");
                return None;
            }
        };

        if let Err(err) = watcher.watch(parent, RecursiveMode::NonRecursive) {
            tracing::warn!("Failed to watch {}: {err}", parent.display());
            return None;
        }
        Some(watcher)
    }
}

/// One readiness attempt. Dropping it stops the watch.
#[derive(Debug)]
pub struct WatchSession {
    outcome: oneshot::Receiver<Result<Readiness, ReadinessError>>,
    task: JoinHandle<()>,
}

impl WatchSession {
    pub async fn wait(mut self) -> Result<Readiness, ReadinessError> {
        (&mut self.outcome)
            .await
            .unwrap_or(Err(ReadinessError::Abandoned))
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch(
    mut tail: LogTail,
    marker: &ReadinessMarker,
    progress: &ProgressSink,
    mut events: mpsc::UnboundedReceiver<Event>,
    deadline: Instant,
    poll_interval: Duration,
) -> Result<Readiness, ReadinessError> {
    let file_name: Option<OsString> = tail.path().file_name().map(ToOwned::to_owned);
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let timeout = tokio::time::sleep_until(deadline);
    tokio::pin!(timeout);
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;

            () = &mut timeout => {
                tracing::info!(
                    "No `{}` in {} after {:?}, proceeding",
                    marker.needle,
                    tail.path().display(),
                    marker.timeout
                );
                return Ok(Readiness::TimedOut);
            }
            event = events.recv(), if events_open => {
                let Some(event) = event else {
                    events_open = false;
                    continue;
                };
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == file_name.as_deref());
                if !ours {
                    continue;
                }
                if matches!(event.kind, EventKind::Create(_)) {
                    tracing::debug!("{} created, reading from the start", tail.path().display());
                    tail.rewind();
                }
            }
            _ = ticker.tick() => {}
        }

        let lines = tail.poll().await.map_err(|source| ReadinessError::Tail {
            path: tail.path().to_path_buf(),
            source,
        })?;
        for line in lines {
            progress.emit(Progress::detail(line.clone()));
            if marker.matches(&line) {
                tracing::debug!("Readiness marker seen: {line}");
                let url = marker.extract_url(&line);
                return Ok(Readiness::Matched { line, url });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::{Arc, Mutex},
    };

    use super::*;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn times_out_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.log");
        let marker = ReadinessMarker::database(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let outcome = ReadinessWatcher::default()
            .wait_for_ready(&path, marker, ProgressSink::silent())
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(outcome, Readiness::TimedOut);
        assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(150), "{elapsed:?}");
    }

    #[tokio::test]
    async fn matches_marker_in_file_created_after_attach() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("db.log");
        let marker = ReadinessMarker::database(Duration::from_secs(5));

        let session = ReadinessWatcher::default().attach(&path, marker, ProgressSink::silent());
        append(&path, "starting\nready, waiting for connections on 3307\n");

        let outcome = session.wait().await.unwrap();
        assert_eq!(
            outcome,
            Readiness::Matched {
                line: "ready, waiting for connections on 3307".to_owned(),
                url: None,
            }
        );
    }

    #[tokio::test]
    async fn stale_marker_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.log");
        append(&path, "old run: waiting for connections\n");

        let marker = ReadinessMarker::database(Duration::from_millis(400));
        let outcome = ReadinessWatcher::default()
            .wait_for_ready(&path, marker.clone(), ProgressSink::silent())
            .await
            .unwrap();
        assert_eq!(outcome, Readiness::TimedOut);

        let session = ReadinessWatcher::default().attach(&path, marker, ProgressSink::silent());
        append(&path, "new run: waiting for connections\n");
        match session.wait().await.unwrap() {
            Readiness::Matched { line, .. } => assert_eq!(line, "new run: waiting for connections"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recreated_log_is_read_from_the_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.log");
        append(&path, &"previous run noise\n".repeat(10));

        let marker = ReadinessMarker::database(Duration::from_secs(2));
        let session = ReadinessWatcher::default().attach(&path, marker, ProgressSink::silent());

        std::fs::remove_file(&path).unwrap();
        let mut fresh = String::from("mysqld: ready, waiting for connections\n");
        fresh.push_str(&"InnoDB: buffer pool warming up\n".repeat(10));
        std::fs::write(&path, fresh).unwrap();

        match session.wait().await.unwrap() {
            Readiness::Matched { line, .. } => {
                assert_eq!(line, "mysqld: ready, waiting for connections");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolves_on_first_marker_and_reports_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            ProgressSink::new(move |p: Progress| seen.lock().unwrap().push(p.detail.unwrap()))
        };
        let marker = ReadinessMarker::application(Duration::from_secs(5));

        let session = ReadinessWatcher::with_poll_interval(Duration::from_millis(20))
            .attach(&path, marker, sink);
        append(
            &path,
            "booting\nWeb server listening at: http://localhost:8080\nWeb server listening at: http://localhost:9090\n",
        );

        let outcome = session.wait().await.unwrap();
        assert_eq!(
            outcome,
            Readiness::Matched {
                line: "Web server listening at: http://localhost:8080".to_owned(),
                url: Some("http://localhost:8080".to_owned()),
            }
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["booting", "Web server listening at: http://localhost:8080"]
        );
    }

    #[tokio::test]
    async fn partial_marker_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.log");
        let marker = ReadinessMarker::database(Duration::from_millis(300));

        let session = ReadinessWatcher::with_poll_interval(Duration::from_millis(20))
            .attach(&path, marker, ProgressSink::silent());
        append(&path, "waiting for connections");

        assert_eq!(session.wait().await.unwrap(), Readiness::TimedOut);
    }
}
