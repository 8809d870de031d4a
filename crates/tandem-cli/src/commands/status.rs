use anyhow::Result;
use tandem_core::{Orchestrator, PortInspector, SystemPortInspector};
use tandem_types::{Dependency, Mode};

use crate::commands::load_config;

pub async fn status(file: Option<String>) -> Result<()> {
    let config = load_config(file.as_deref())?;
    let (orchestrator, _events) = Orchestrator::system(config);

    for dependency in Dependency::ALL {
        let port = orchestrator.config().dependency(dependency).port;
        let listening = match SystemPortInspector.owners(port).await {
            Ok(pids) if pids.is_empty() => "free".to_owned(),
            Ok(pids) => format!("held by {pids:?}"),
            Err(err) => format!("unknown ({err})"),
        };

        match orchestrator.status(dependency).await {
            Ok(report) => {
                let state = match (report.mode, report.service) {
                    (Mode::Service, Some(status)) => format!("service {status}"),
                    _ => "process".to_owned(),
                };
                println!("{dependency:<12} {state:<24} port {port} {listening}");
            }
            Err(err) => println!("{dependency:<12} error: {err}"),
        }
    }

    Ok(())
}
