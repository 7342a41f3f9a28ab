mod process;

use clap::Subcommand;

pub use process::{ProcessArgs, SceneJob};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process Landsat 8 imagery.
    Process(ProcessArgs),
}
