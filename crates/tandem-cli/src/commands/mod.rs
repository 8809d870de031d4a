mod down;
mod reclaim;
mod status;
mod uninstall;
mod up;

use anyhow::{Context, Result};
use tandem_config::{load_from_path, resolve_path, Config};

pub use down::down;
pub use reclaim::reclaim;
pub use status::status;
pub use uninstall::uninstall;
pub use up::up;

fn load_config(file: Option<&str>) -> Result<Config> {
    let path = resolve_path(file);
    tracing::debug!("Loading configuration from {}", path.display());
    load_from_path(&path).with_context(|| format!("cannot load {}", path.display()))
}
