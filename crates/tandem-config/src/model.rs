use std::{path::PathBuf, time::Duration};

use tandem_types::{Dependency, Mode, ServiceDescriptor};

use crate::{
    raw::{RawConfig, RawControl, RawDependency},
    ConfigError,
};

const DATABASE_READY_TIMEOUT: Duration = Duration::from_secs(180);
const APPLICATION_READY_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RECLAIM_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub control: ControlConfig,
    pub database: DependencyConfig,
    pub application: DependencyConfig,
}

impl Config {
    #[must_use]
    pub fn dependency(&self, dependency: Dependency) -> &DependencyConfig {
        match dependency {
            Dependency::Database => &self.database,
            Dependency::Application => &self.application,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// Native service-control executable.
    pub tool: PathBuf,
    /// Shared application log that process-mode output is appended to.
    pub app_log: PathBuf,
    pub reclaim_grace: Duration,
    pub stop_grace: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DependencyConfig {
    pub mode: Mode,
    pub descriptor: ServiceDescriptor,
    pub port: u16,
    pub ready_timeout: Duration,
    pub running_build_file: Option<PathBuf>,
    pub bundled_build: Option<String>,
}

fn seconds(value: Option<u64>, default: Duration, field: &str) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Validation(format!("{field} must be positive"))),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

impl TryFrom<RawControl> for ControlConfig {
    type Error = ConfigError;

    fn try_from(raw: RawControl) -> Result<Self, Self::Error> {
        if raw.tool.as_os_str().is_empty() {
            return Err(ConfigError::Validation("control: tool is empty".into()));
        }
        if raw.app_log.as_os_str().is_empty() {
            return Err(ConfigError::Validation("control: app_log is empty".into()));
        }

        Ok(ControlConfig {
            tool: raw.tool,
            app_log: raw.app_log,
            reclaim_grace: seconds(
                raw.reclaim_grace_secs,
                DEFAULT_RECLAIM_GRACE,
                "control: reclaim_grace_secs",
            )?,
            stop_grace: seconds(
                raw.stop_grace_secs,
                DEFAULT_STOP_GRACE,
                "control: stop_grace_secs",
            )?,
        })
    }
}

impl DependencyConfig {
    fn from_raw(dependency: Dependency, raw: RawDependency) -> Result<Self, ConfigError> {
        if raw.service_name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{dependency}: service_name is empty"
            )));
        }
        if raw.executable.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{dependency}: executable is empty"
            )));
        }
        if raw.args.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "{dependency}: args contains empty element"
            )));
        }
        if raw.log_file.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{dependency}: log_file is empty"
            )));
        }
        if raw.port == 0 {
            return Err(ConfigError::Validation(format!(
                "{dependency}: port must be non-zero"
            )));
        }

        let default_timeout = match dependency {
            Dependency::Database => DATABASE_READY_TIMEOUT,
            Dependency::Application => APPLICATION_READY_TIMEOUT,
        };

        Ok(DependencyConfig {
            mode: raw.mode,
            descriptor: ServiceDescriptor {
                name: raw.service_name,
                executable: raw.executable,
                args: raw.args,
                log_file: raw.log_file,
            },
            port: raw.port,
            ready_timeout: seconds(
                raw.ready_timeout_secs,
                default_timeout,
                &format!("{dependency}: ready_timeout_secs"),
            )?,
            running_build_file: raw.running_build_file,
            bundled_build: raw
                .bundled_build
                .map(|b| b.trim().to_owned())
                .filter(|b| !b.is_empty()),
        })
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let control = ControlConfig::try_from(raw.control)?;
        let database = DependencyConfig::from_raw(Dependency::Database, raw.database)?;
        let application = DependencyConfig::from_raw(Dependency::Application, raw.application)?;

        if database.port == application.port {
            return Err(ConfigError::Validation(format!(
                "database and application share port {}",
                database.port
            )));
        }
        if database.descriptor.name == application.descriptor.name {
            return Err(ConfigError::Validation(format!(
                "database and application share service name `{}`",
                database.descriptor.name
            )));
        }

        Ok(Config {
            control,
            database,
            application,
        })
    }
}
