use std::{fmt, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;

/// A program invocation, before or after elevation wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr, the way a terminal would show them.
    #[must_use]
    pub fn combined(&self) -> Vec<u8> {
        let mut bytes = self.stdout.clone();
        if !self.stdout.is_empty() && !self.stderr.is_empty() {
            bytes.push(b'\n');
        }
        bytes.extend_from_slice(&self.stderr);
        bytes
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion and capture its output.
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        tracing::trace!("Running {invocation}");

        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
