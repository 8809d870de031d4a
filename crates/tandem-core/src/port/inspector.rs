use async_trait::async_trait;

/// OS view of TCP listeners and the processes behind them.
///
/// Errors are plain text: they are collected into a reclaim report and
/// never branched on.
#[async_trait]
pub trait PortInspector: Send + Sync {
    /// Pids listening on `port`, excluding this process.
    async fn owners(&self, port: u16) -> Result<Vec<u32>, String>;
    /// Ask a process to exit gracefully.
    async fn interrupt(&self, pid: u32) -> Result<(), String>;
    async fn is_alive(&self, pid: u32) -> bool;
    /// Terminate whatever holds `port` in one step.
    async fn kill_port(&self, port: u16) -> Result<(), String>;

    /// Whether `kill_port` is the only usable termination primitive.
    fn blunt_only(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortInspector;

#[async_trait]
impl PortInspector for SystemPortInspector {
    async fn owners(&self, port: u16) -> Result<Vec<u32>, String> {
        let listeners =
            tokio::task::spawn_blocking(|| listeners::get_all().map_err(|e| e.to_string()))
                .await
                .map_err(|e| e.to_string())??;

        let own = std::process::id();
        let mut pids: Vec<u32> = listeners
            .into_iter()
            .filter(|listener| listener.socket.port() == port)
            .map(|listener| listener.process.pid)
            .filter(|pid| *pid != own)
            .collect();
        pids.sort_unstable();
        pids.dedup();

        tracing::debug!("Port {port} owners: {pids:?}");
        Ok(pids)
    }

    #[cfg(unix)]
    async fn interrupt(&self, pid: u32) -> Result<(), String> {
        signal(pid, libc::SIGINT)
    }

    #[cfg(windows)]
    async fn interrupt(&self, pid: u32) -> Result<(), String> {
        Err(format!("cannot interrupt pid {pid} individually on Windows"))
    }

    #[cfg(unix)]
    async fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(windows)]
    async fn is_alive(&self, pid: u32) -> bool {
        let output = tokio::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH"])
            .output()
            .await;
        match output {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
            Err(_) => false,
        }
    }

    #[cfg(unix)]
    async fn kill_port(&self, port: u16) -> Result<(), String> {
        let errors: Vec<String> = self
            .owners(port)
            .await?
            .into_iter()
            .filter_map(|pid| signal(pid, libc::SIGKILL).err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }

    #[cfg(windows)]
    async fn kill_port(&self, port: u16) -> Result<(), String> {
        let script = format!(
            "Get-NetTCPConnection -LocalPort {port} -State Listen -ErrorAction SilentlyContinue \
             | ForEach-Object {{ Stop-Process -Id $_.OwningProcess -Force -ErrorAction Stop }}"
        );
        let output = tokio::process::Command::new("powershell.exe")
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .await
            .map_err(|e| e.to_string())?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if output.status.success() && stderr.is_empty() {
            Ok(())
        } else if stderr.is_empty() {
            Err(format!("powershell exited with {}", output.status))
        } else {
            Err(stderr)
        }
    }

    fn blunt_only(&self) -> bool {
        cfg!(windows)
    }
}

#[cfg(unix)]
fn signal(pid: u32, signal: libc::c_int) -> Result<(), String> {
    let target = libc::pid_t::try_from(pid).map_err(|e| e.to_string())?;
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(target, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone.
        Ok(())
    } else {
        Err(format!("pid {pid}: {err}"))
    }
}
