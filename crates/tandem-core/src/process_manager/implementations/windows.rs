use std::{process::Stdio, time::Duration};

use anyhow::Context;
use tokio::{process::Command, sync::watch, time::timeout};

use crate::process_manager::{
    base::ProcessManager,
    types::{output_lines, CommandSpec, ProcId, Spawned},
};

#[derive(Debug)]
struct ChildRec {
    pid: u32,
    exit: watch::Receiver<Option<i32>>,
}

/// Windows process manager. There is no process-group interrupt, so a
/// graceful shutdown is a `taskkill` without `/F`.
#[derive(Debug, Default)]
pub struct WindowsProcessManager {
    processes: Vec<Option<ChildRec>>,
}

impl WindowsProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: ProcId) -> anyhow::Result<&ChildRec> {
        let index = usize::try_from(id.0).context("cannot convert process id to usize")?;
        self.processes
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("unknown process id {id:?}"))?
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("already exited process id {id:?}"))
    }

    async fn taskkill(&self, id: ProcId, force: bool) -> anyhow::Result<()> {
        let pid = self.record(id)?.pid.to_string();
        let mut cmd = Command::new("taskkill");
        cmd.args(["/T", "/PID", pid.as_str()]);
        if force {
            cmd.arg("/F");
        }
        let output = cmd.output().await.context("cannot run taskkill")?;
        if !output.status.success() {
            tracing::debug!(
                "taskkill for pid {pid} reported: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProcessManager for WindowsProcessManager {
    async fn spawn(&mut self, spec: CommandSpec) -> anyhow::Result<Spawned> {
        let Some((program, args)) = spec.cmd.split_first() else {
            anyhow::bail!("empty cmd for `{}`", spec.name);
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("cannot spawn `{program}` for `{}`", spec.name))?;
        let pid = child
            .id()
            .ok_or_else(|| anyhow::anyhow!("spawned process has no pid"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("stdout not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("stderr not piped"))?;

        let (exit_tx, exit_rx) = watch::channel(None);
        let name = spec.name.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    tracing::error!("Failed to wait for `{name}`: {err}");
                    -1
                }
            };
            let _ = exit_tx.send(Some(code));
        });

        let id = ProcId(self.processes.len() as u64);
        self.processes.push(Some(ChildRec {
            pid,
            exit: exit_rx.clone(),
        }));

        Ok(Spawned {
            id,
            pid: Some(pid),
            stdout: output_lines(stdout),
            stderr: output_lines(stderr),
            exit: exit_rx,
        })
    }

    async fn shutdown(&mut self, id: ProcId) -> anyhow::Result<()> {
        self.taskkill(id, false).await
    }

    async fn wait(&mut self, id: ProcId, d: Duration) -> anyhow::Result<Option<i32>> {
        let mut exit = self.record(id)?.exit.clone();

        let code = match timeout(d, exit.wait_for(Option::is_some)).await {
            Ok(Ok(code)) => *code,
            Ok(Err(_)) => anyhow::bail!("exit status of {id:?} was lost"),
            Err(_) => return Ok(None),
        };

        if let Some(slot) = usize::try_from(id.0)
            .ok()
            .and_then(|index| self.processes.get_mut(index))
        {
            *slot = None;
        }

        Ok(code)
    }

    async fn kill(&mut self, id: ProcId) -> anyhow::Result<()> {
        self.taskkill(id, true).await
    }
}
