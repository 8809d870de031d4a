use std::time::Duration;

use anyhow::Result;
use tandem_core::PortReclaimer;

use crate::logger::Logger;

pub async fn reclaim(port: u16, grace_secs: u64) -> Result<()> {
    let reclaimer = PortReclaimer::system(Duration::from_secs(grace_secs));
    let mut logger = Logger::default();

    match reclaimer.reclaim(port).await {
        Ok(report) if report.attempted.is_empty() => {
            logger.system(&format!("Port {port} is free"));
            Ok(())
        }
        Ok(report) => {
            logger.system(&format!(
                "Port {port} reclaimed from {:?}",
                report.attempted
            ));
            Ok(())
        }
        Err(err) => {
            logger.error(&err.message);
            Err(err.into())
        }
    }
}
