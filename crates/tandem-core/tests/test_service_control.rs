use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tandem_core::{
    CommandOutput, CommandRunner, Invocation, Platform, ServiceBackend, ServiceControlTool,
    ServiceStatus,
};
use tandem_types::ServiceDescriptor;

/// Elevates by prefixing `doas`.
#[derive(Debug)]
struct Doas;

impl Platform for Doas {
    fn name(&self) -> &'static str {
        "doas"
    }

    fn elevate(&self, invocation: Invocation) -> Invocation {
        let mut args = vec![invocation.program.display().to_string()];
        args.extend(invocation.args);
        Invocation::new("doas", args)
    }

    fn elevation_cancelled(&self, output: &CommandOutput) -> bool {
        output.code == Some(1)
    }
}

#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<Invocation>>>,
}

#[async_trait]
impl CommandRunner for Recorder {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok(CommandOutput {
            code: Some(0),
            stdout: b"tandem-db is running".to_vec(),
            stderr: Vec::new(),
        })
    }
}

fn descriptor() -> ServiceDescriptor {
    ServiceDescriptor {
        name: "tandem-db".to_owned(),
        executable: PathBuf::from("/opt/db/bin/mysqld"),
        args: vec![],
        log_file: PathBuf::from("/var/log/tandem/db.log"),
    }
}

#[tokio::test]
async fn test_service_control_custom_platform() {
    let recorder = Recorder::default();
    let tool = ServiceControlTool::new("servicectl", recorder.clone(), Box::new(Doas));

    assert_eq!(tool.probe("tandem-db").await.unwrap(), ServiceStatus::Running);
    assert_eq!(tool.restart(&descriptor()).await.unwrap(), ServiceStatus::Running);

    let calls = recorder.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            Invocation::new("servicectl", vec!["status".to_owned(), "tandem-db".to_owned()]),
            Invocation::new(
                "doas",
                vec![
                    "servicectl".to_owned(),
                    "restart".to_owned(),
                    "tandem-db".to_owned()
                ]
            ),
        ]
    );
}
