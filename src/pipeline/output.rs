use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use gdal::{
    raster::{GdalType, RasterCreationOptions},
    Dataset, DriverManager,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::landsat::SceneId;

/// Product file naming inside the output directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Product {
    Rgb,
    Ndvi,
    ChangeRaster,
    ChangeVector,
}

impl Product {
    pub const NDVI_SUFFIX: &'static str = "_NDVI.TIF";

    fn suffix(self) -> &'static str {
        match self {
            Product::Rgb => "_RGB.TIF",
            Product::Ndvi => Self::NDVI_SUFFIX,
            Product::ChangeRaster => "_CHANGE.TIF",
            Product::ChangeVector => "_CHANGE.geojson",
        }
    }

    pub fn path(self, dir: &Path, id: &SceneId) -> PathBuf {
        dir.join(format!("{id}{}", self.suffix()))
    }
}

/// Creates a tiled, compressed GeoTIFF on the same grid as `reference`.
pub fn create_geotiff<T: GdalType>(
    path: &Path,
    reference: &Dataset,
    bands: usize,
    extra_options: &[&str],
) -> Result<Dataset> {
    remove_existing(path)?;

    let (width, height) = reference.raster_size();
    let options = ["TILED=YES", "COMPRESS=DEFLATE"]
        .into_iter()
        .chain(extra_options.iter().copied())
        .collect::<Vec<_>>();
    let mut output = DriverManager::get_driver_by_name("GTiff")?
        .create_with_band_type_with_options::<T, _>(
            path,
            width,
            height,
            bands,
            &RasterCreationOptions::from_iter(options),
        )
        .with_context(|| format!("unable to create {}", path.display()))?;
    copy_georeference(reference, &mut output)?;
    Ok(output)
}

/// Creates an in-memory raster on the same grid as `reference`.
pub fn create_in_memory<T: GdalType>(reference: &Dataset) -> Result<Dataset> {
    let (width, height) = reference.raster_size();
    let mut output = DriverManager::get_driver_by_name("MEM")?
        .create_with_band_type::<T, _>("", width, height, 1)?;
    copy_georeference(reference, &mut output)?;
    Ok(output)
}

fn copy_georeference(reference: &Dataset, output: &mut Dataset) -> Result<()> {
    let projection = reference.projection();
    if !projection.is_empty() {
        output.set_projection(&projection)?;
    }
    if let Ok(geo_transform) = reference.geo_transform() {
        output.set_geo_transform(&geo_transform)?;
    }
    Ok(())
}

/// Drivers like GeoJSON refuse to overwrite, so stale outputs go first.
pub fn remove_existing(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            let path = path.display();
            tracing::debug!(%path, "removed previous output");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("unable to remove {}", path.display())),
    }
}

pub fn progress_bar(len: usize, message: &'static str) -> Result<ProgressBar> {
    let style = ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len}")?;
    Ok(ProgressBar::new(len as u64)
        .with_style(style)
        .with_message(message))
}
