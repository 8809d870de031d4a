use std::{fmt, path::PathBuf, str::FromStr};

use serde::Deserialize;

/// One of the two supervised long-running processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    Database,
    Application,
}

impl Dependency {
    /// Startup order: the application needs the database port bound.
    pub const ALL: [Dependency; 2] = [Dependency::Database, Dependency::Application];

    /// The dependency that must be running before this one starts.
    #[must_use]
    pub fn requires(self) -> Option<Dependency> {
        match self {
            Dependency::Database => None,
            Dependency::Application => Some(Dependency::Database),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Dependency::Database => "database",
            Dependency::Application => "application",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dependency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" => Ok(Dependency::Database),
            "application" | "app" => Ok(Dependency::Application),
            other => Err(format!("unknown dependency `{other}`")),
        }
    }
}

/// How a dependency is run on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Registered with and controlled by the OS service manager.
    #[default]
    Service,
    /// Spawned directly as a child process.
    Process,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub log_file: PathBuf,
}
