use std::{
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    time::timeout,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::process_manager::{CommandSpec, ProcId, ProcessManager, Spawned};

#[derive(Default)]
pub struct MockState {
    pub storage: Vec<CommandSpec>,
    pub shutdowns: Vec<ProcId>,
    pub kills: Vec<ProcId>,
    /// Keep running when asked to shut down gracefully.
    pub ignore_shutdown: bool,
    /// Line appended to a log file right after every spawn.
    pub spawn_output: Option<(PathBuf, String)>,
    stdout: Vec<mpsc::Sender<String>>,
    exits: Vec<watch::Sender<Option<i32>>>,
}

/// Process manager double. Clones share state so a test can keep a handle
/// after moving the manager into a supervisor.
#[derive(Clone, Default)]
pub struct MockProcessManager {
    state: Arc<Mutex<MockState>>,
}

impl MockProcessManager {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn with_spawn_output(self, path: PathBuf, line: &str) -> Self {
        self.state().spawn_output = Some((path, line.to_owned()));
        self
    }

    pub fn emit(&self, id: ProcId, line: &str) {
        let state = self.state();
        let tx = &state.stdout[usize::try_from(id.0).unwrap()];
        tx.try_send(line.to_owned()).unwrap();
    }

    pub fn exit(&self, id: ProcId, code: i32) {
        let state = self.state();
        let _ = state.exits[usize::try_from(id.0).unwrap()].send(Some(code));
    }
}

#[async_trait]
impl ProcessManager for MockProcessManager {
    async fn spawn(&mut self, spec: CommandSpec) -> anyhow::Result<Spawned> {
        let mut state = self.state();
        state.storage.push(spec);

        if let Some((path, line)) = &state.spawn_output {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "{line}")?;
        }

        let (stdout_tx, stdout) = mpsc::channel(16);
        let (_, stderr) = mpsc::channel(1);
        let (exit_tx, exit) = watch::channel(None);
        let id = ProcId(state.exits.len() as u64);
        state.stdout.push(stdout_tx);
        state.exits.push(exit_tx);

        Ok(Spawned {
            id,
            pid: Some(4000 + u32::try_from(id.0).unwrap()),
            stdout: Box::pin(ReceiverStream::new(stdout)),
            stderr: Box::pin(ReceiverStream::new(stderr)),
            exit,
        })
    }

    async fn shutdown(&mut self, id: ProcId) -> anyhow::Result<()> {
        let mut state = self.state();
        state.shutdowns.push(id);
        if !state.ignore_shutdown {
            let _ = state.exits[usize::try_from(id.0)?].send(Some(0));
        }
        Ok(())
    }

    async fn wait(&mut self, id: ProcId, d: Duration) -> anyhow::Result<Option<i32>> {
        let mut exit = self.state().exits[usize::try_from(id.0)?].subscribe();
        let code = match timeout(d, exit.wait_for(Option::is_some)).await {
            Ok(Ok(code)) => *code,
            Ok(Err(_)) => anyhow::bail!("exit channel closed"),
            Err(_) => None,
        };
        Ok(code)
    }

    async fn kill(&mut self, id: ProcId) -> anyhow::Result<()> {
        let mut state = self.state();
        state.kills.push(id);
        let _ = state.exits[usize::try_from(id.0)?].send(Some(137));
        Ok(())
    }
}
