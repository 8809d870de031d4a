use anyhow::Result;
use tandem_core::Orchestrator;

use crate::{commands::load_config, logger::Logger};

pub async fn down(file: Option<String>) -> Result<()> {
    let config = load_config(file.as_deref())?;
    let (orchestrator, _events) = Orchestrator::system(config);
    let mut logger = Logger::default();

    if let Err(err) = orchestrator.stop_all().await {
        logger.error(&format!("Failed to stop dependencies: {err}"));
        return Err(err.into());
    }

    logger.system("All dependencies stopped");
    Ok(())
}
