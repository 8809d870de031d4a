use std::{os::unix::process::ExitStatusExt, process::Stdio, time::Duration};

use anyhow::Context;
use libc::{killpg, setsid, SIGINT, SIGKILL};
use tokio::{process::Command, sync::watch, time::timeout};

use crate::process_manager::{
    base::ProcessManager,
    types::{output_lines, CommandSpec, ProcId, Spawned},
};

#[derive(Debug)]
struct ChildRec {
    pgid: libc::pid_t,
    exit: watch::Receiver<Option<i32>>,
}

/// Unix-specific process manager.
///
/// Every child leads its own session so signals reach the whole process
/// group, including helpers the dependency forks.
#[derive(Debug, Default)]
pub struct UnixProcessManager {
    processes: Vec<Option<ChildRec>>,
}

impl UnixProcessManager {
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

    fn signal(&self, id: ProcId, signal: libc::c_int) -> anyhow::Result<()> {
        let proc = self.record(id)?;

        #[allow(unsafe_code)]
        let rc = unsafe { killpg(proc.pgid, signal) };
        if rc == -1 {
            let err = std::io::Error::last_os_error();
            // The group is already gone; nothing left to signal.
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err.into());
        }

        Ok(())
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl ProcessManager for UnixProcessManager {
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

        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                if setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("cannot spawn `{program}` for `{}`", spec.name))?;

        let pid = child.id();
        let pgid = libc::pid_t::try_from(
            pid.ok_or_else(|| anyhow::anyhow!("spawned process has no pid"))?,
        )
        .context("pid does not fit pid_t")?;

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
                Ok(status) => exit_code(status),
                Err(err) => {
                    tracing::error!("Failed to wait for `{name}`: {err}");
                    -1
                }
            };
            tracing::debug!("Process `{name}` exited with code {code}");
            let _ = exit_tx.send(Some(code));
        });

        let id = ProcId(self.processes.len() as u64);
        self.processes.push(Some(ChildRec {
            pgid,
            exit: exit_rx.clone(),
        }));

        Ok(Spawned {
            id,
            pid,
            stdout: output_lines(stdout),
            stderr: output_lines(stderr),
            exit: exit_rx,
        })
    }

    async fn shutdown(&mut self, id: ProcId) -> anyhow::Result<()> {
        self.signal(id, SIGINT)
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
        self.signal(id, SIGKILL)
    }
}
