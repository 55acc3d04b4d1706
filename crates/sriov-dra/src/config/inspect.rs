use std::path::PathBuf;

use clap::Parser;

use crate::consts::DEFAULT_PLUGIN_DATA_DIR;

#[derive(Parser, Debug)]
pub struct ShowCheckpointArgs {
    #[arg(
        long,
        env = "PLUGIN_DATA_DIR",
        value_hint = clap::ValueHint::DirPath,
        default_value = DEFAULT_PLUGIN_DATA_DIR,
        help = "Directory holding the prepared-claims checkpoint"
    )]
    pub plugin_data_dir: PathBuf,
}
