use std::fmt::Debug;

use crate::service::command::{CommandOutput, Invocation};

/// The per-OS half of service control: privilege elevation and the text
/// encoding of tool output. Selected once when the backend is built.
pub trait Platform: Send + Sync + Debug {
    fn name(&self) -> &'static str;
    /// Wrap an invocation so it runs with elevated privileges.
    fn elevate(&self, invocation: Invocation) -> Invocation;
    /// Whether a failed elevated call means the user declined the prompt.
    fn elevation_cancelled(&self, output: &CommandOutput) -> bool;
    /// Command printing the active code page, if the platform has one.
    fn code_page_query(&self) -> Option<Invocation> {
        None
    }
}

fn output_mentions(output: &CommandOutput, needles: &[&str]) -> bool {
    let text = String::from_utf8_lossy(&output.combined()).to_lowercase();
    needles.iter().any(|needle| text.contains(needle))
}

/// POSIX single-quote quoting.
fn sh_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return arg.to_owned();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// PowerShell single-quoted literal.
fn ps_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "''"))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Windows;

const ERROR_CANCELLED: i32 = 1223;

impl Platform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn elevate(&self, invocation: Invocation) -> Invocation {
        let program = ps_quote(&invocation.program.to_string_lossy());
        let mut script = format!("$p = Start-Process -FilePath {program}");
        if !invocation.args.is_empty() {
            let args = invocation
                .args
                .iter()
                .map(|a| ps_quote(a))
                .collect::<Vec<_>>()
                .join(",");
            script.push_str(&format!(" -ArgumentList @({args})"));
        }
        script.push_str(" -Verb RunAs -Wait -PassThru -WindowStyle Hidden; exit $p.ExitCode");

        Invocation::new(
            "powershell.exe",
            vec![
                "-NoProfile".to_owned(),
                "-NonInteractive".to_owned(),
                "-Command".to_owned(),
                script,
            ],
        )
    }

    fn elevation_cancelled(&self, output: &CommandOutput) -> bool {
        output.code == Some(ERROR_CANCELLED)
            || output_mentions(output, &["canceled by the user", "cancelled by the user"])
    }

    fn code_page_query(&self) -> Option<Invocation> {
        Some(Invocation::new(
            "cmd.exe",
            vec!["/C".to_owned(), "chcp".to_owned()],
        ))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MacOs;

impl Platform for MacOs {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn elevate(&self, invocation: Invocation) -> Invocation {
        let mut command = sh_quote(&invocation.program.to_string_lossy());
        for arg in &invocation.args {
            command.push(' ');
            command.push_str(&sh_quote(arg));
        }
        let escaped = command.replace('\\', r"\\").replace('"', "\\\"");

        Invocation::new(
            "/usr/bin/osascript",
            vec![
                "-e".to_owned(),
                format!("do shell script \"{escaped}\" with administrator privileges"),
            ],
        )
    }

    fn elevation_cancelled(&self, output: &CommandOutput) -> bool {
        output_mentions(output, &["user canceled", "(-128)"])
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Linux;

impl Platform for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn elevate(&self, invocation: Invocation) -> Invocation {
        let mut args = Vec::with_capacity(invocation.args.len() + 1);
        args.push(invocation.program.to_string_lossy().into_owned());
        args.extend(invocation.args);
        Invocation::new("pkexec", args)
    }

    fn elevation_cancelled(&self, output: &CommandOutput) -> bool {
        // 126: the dialog was dismissed, 127: not authorized.
        matches!(output.code, Some(126 | 127))
    }
}

/// The platform this binary runs on.
#[must_use]
pub fn current() -> Box<dyn Platform> {
    if cfg!(windows) {
        Box::new(Windows)
    } else if cfg!(target_os = "macos") {
        Box::new(MacOs)
    } else {
        Box::new(Linux)
    }
}
