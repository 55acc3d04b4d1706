use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::daemon::DaemonArgs;
use crate::config::inspect::ShowCheckpointArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the SR-IOV DRA node daemon
    Daemon(Box<DaemonArgs>),
    /// Load, verify and print the prepared-claims checkpoint
    #[command(name = "show-checkpoint")]
    ShowCheckpoint(ShowCheckpointArgs),
}
