use std::path::PathBuf;

use serde::Deserialize;
use tandem_types::Mode;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfig {
    pub control: RawControl,
    pub database: RawDependency,
    pub application: RawDependency,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawControl {
    pub tool: PathBuf,
    pub app_log: PathBuf,
    pub reclaim_grace_secs: Option<u64>,
    pub stop_grace_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawDependency {
    #[serde(default)]
    pub mode: Mode,
    pub service_name: String,
    pub executable: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    pub log_file: PathBuf,
    pub port: u16,
    pub ready_timeout_secs: Option<u64>,
    pub running_build_file: Option<PathBuf>,
    pub bundled_build: Option<String>,
}
