mod commands;
mod gdal_ext;
mod landsat;
mod pipeline;

use std::{io, process};

use anyhow::Result;
use clap::Parser;
use commands::Command;
use tracing_subscriber::EnvFilter;

const LONG_ABOUT: &str = "\
Processes Landsat 8 imagery.

The `process` command creates an RGB composite, an NDVI image and a raster of
the vegetation lost since the NDVI of the same scene acquired 16 days earlier:

    $ indicar process path

Use --polygonize to get the change detection as a GeoJSON file instead of a
raster:

    $ indicar process path --polygonize

--rgb creates only the RGB composite of bands 6, 5 and 4, which emphasizes
areas without vegetation:

    $ indicar process --rgb path

--ndvi creates only the NDVI image. Pixels covered by clouds or cirrus are 0:

    $ indicar process --ndvi path

Processed images are stored in `landsat` under the home directory unless
another directory is given with --dir:

    $ indicar process path --dir directory_path";

#[derive(Debug, Parser)]
#[command(name = "indicar", author, version, about, long_about = LONG_ABOUT)]
/// Landsat 8 geoprocessing tools.
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Prints `message` and terminates with `code`; non-zero codes go to stderr.
fn exit(message: &str, code: i32) -> ! {
    if code == 0 {
        println!("{message}");
    } else {
        eprintln!("{message}");
    }
    process::exit(code)
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Some(Command::Process(args)) => args.run(),
        None => Ok(()),
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        exit(&format!("error: {e:#}"), 1);
    }
}
