use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use crate::pipeline::Process;

#[derive(Debug, Parser)]
pub struct ProcessArgs {
    /// Path to the compressed LC8 file or to a folder containing the
    /// uncompressed files
    path: PathBuf,

    /// Create only an RGB image from the imagery
    #[arg(long)]
    rgb: bool,

    /// Create only an NDVI image from the imagery
    #[arg(long)]
    ndvi: bool,

    /// Write the change detection as a GeoJSON file instead of a TIF image
    #[arg(long)]
    polygonize: bool,

    /// Directory where the processed images will be stored
    #[arg(long)]
    dir: Option<PathBuf>,
}

/// The products one scene can be turned into.
pub trait SceneJob {
    fn make_rgb(&self) -> Result<PathBuf>;
    fn make_ndvi(&self) -> Result<PathBuf>;
    fn full(&self, polygonize: bool) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Rgb,
    Ndvi,
    Full { polygonize: bool },
}

impl ProcessArgs {
    /// `--rgb` takes precedence over `--ndvi`; without either, the full
    /// pipeline runs.
    pub fn operation(&self) -> Operation {
        if self.rgb {
            Operation::Rgb
        } else if self.ndvi {
            Operation::Ndvi
        } else {
            Operation::Full {
                polygonize: self.polygonize,
            }
        }
    }

    pub fn run(&self) -> Result<()> {
        self.run_with(Process::new)
    }

    fn run_with<J, F>(&self, open: F) -> Result<()>
    where
        J: SceneJob,
        F: FnOnce(&Path, Option<&Path>) -> Result<J>,
    {
        let job = open(&self.path, self.dir.as_deref())?;

        match self.operation() {
            Operation::Rgb => {
                let path = job.make_rgb()?;
                let path = path.display();
                tracing::info!(%path, "wrote RGB composite");
            }
            Operation::Ndvi => {
                let path = job.make_ndvi()?;
                let path = path.display();
                tracing::info!(%path, "wrote NDVI");
            }
            Operation::Full { polygonize } => job.full(polygonize)?,
        }

        Ok(())
    }
}
