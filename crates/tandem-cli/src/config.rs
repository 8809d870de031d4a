use clap::{Parser, Subcommand};
use tandem_types::Dependency;

/// CLI for tandem
#[derive(Parser, Debug)]
#[command(
    name = "tandem",
    version,
    about = "Brings a local database and application server up and down"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start dependencies and follow their output until Ctrl+C
    Up {
        /// File path to the configuration file (TOML)
        #[arg(short, long)]
        file: Option<String>,

        /// Dependencies to start (`database`, `application`); all if empty
        dependencies: Vec<Dependency>,
    },
    /// Stop every dependency
    Down {
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Show the state of every dependency
    Status {
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Stop and unregister a dependency's OS service
    Uninstall {
        #[arg(short, long)]
        file: Option<String>,

        dependency: Dependency,
    },
    /// Terminate whatever process holds a TCP port
    Reclaim {
        port: u16,

        /// Seconds to wait for the processes to exit
        #[arg(long, default_value_t = 5)]
        grace_secs: u64,
    },
}
