use anyhow::Result;
use tandem_core::Orchestrator;
use tandem_types::Dependency;

use crate::{commands::load_config, logger::Logger};

pub async fn uninstall(file: Option<String>, dependency: Dependency) -> Result<()> {
    let config = load_config(file.as_deref())?;
    let (orchestrator, _events) = Orchestrator::system(config);
    let mut logger = Logger::default();

    match orchestrator.uninstall(dependency).await {
        Ok(()) => {
            logger.system(&format!("{dependency} uninstalled"));
            Ok(())
        }
        Err(err) if err.is_elevation_denied() => {
            logger.error("Administrator permission was not granted");
            Err(err.into())
        }
        Err(err) => {
            logger.error(&err.to_string());
            Err(err.into())
        }
    }
}
