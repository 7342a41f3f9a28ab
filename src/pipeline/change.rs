use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gdal::{
    raster::Buffer,
    vector::{FieldDefn, LayerOptions, OGRFieldType, OGRwkbGeometryType},
    Dataset, DriverManager,
};
use rayon::iter::{
    IndexedParallelIterator as _, IntoParallelRefMutIterator as _, ParallelIterator as _,
};
use walkdir::WalkDir;

use super::{
    output::{create_geotiff, create_in_memory, progress_bar, remove_existing, Product},
    ProcessConfig,
};
use crate::{
    gdal_ext::{strips, PolygonizeExt as _, RasterBandExt as _, Window},
    landsat::SceneId,
};

/// Matching pixel regions of two rasters on the same grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overlap {
    pub current: Window,
    pub previous: Window,
}

/// Locates the region of `previous` that falls on `current`. Both grids must
/// be north-up with the same pixel size; the offset between them is rounded
/// to whole pixels.
pub fn overlap(
    current: (&[f64; 6], (usize, usize)),
    previous: (&[f64; 6], (usize, usize)),
) -> Result<Option<Overlap>> {
    let (current_gt, current_size) = current;
    let (previous_gt, previous_size) = previous;

    let rotated = |gt: &[f64; 6]| gt[2] != 0.0 || gt[4] != 0.0;
    if rotated(current_gt) || rotated(previous_gt) {
        bail!("rotated rasters are not supported");
    }
    let same_size = |a: f64, b: f64| (a - b).abs() <= 1e-6 * a.abs().max(b.abs());
    if !same_size(current_gt[1], previous_gt[1]) || !same_size(current_gt[5], previous_gt[5]) {
        bail!(
            "pixel sizes differ: {}x{} and {}x{}",
            current_gt[1],
            current_gt[5],
            previous_gt[1],
            previous_gt[5]
        );
    }

    // position of the previous raster's first pixel on the current grid
    let col = ((previous_gt[0] - current_gt[0]) / current_gt[1]).round() as i64;
    let row = ((previous_gt[3] - current_gt[3]) / current_gt[5]).round() as i64;

    let x0 = col.max(0);
    let y0 = row.max(0);
    let x1 = (col + previous_size.0 as i64).min(current_size.0 as i64);
    let y1 = (row + previous_size.1 as i64).min(current_size.1 as i64);
    if x1 <= x0 || y1 <= y0 {
        return Ok(None);
    }

    let size = ((x1 - x0) as usize, (y1 - y0) as usize);
    Ok(Some(Overlap {
        current: Window::new((x0 as usize, y0 as usize), size),
        previous: Window::new(((x0 - col) as usize, (y0 - row) as usize), size),
    }))
}

pub fn is_loss(previous: f32, current: f32, threshold: f32) -> bool {
    previous != 0.0 && current != 0.0 && previous - current >= threshold
}

/// Finds the NDVI of the same footprint written `revisit_days` before `id`.
pub fn find_previous_ndvi(
    dir: &Path,
    id: &SceneId,
    revisit_days: u64,
) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(prefix) = name.strip_suffix(Product::NDVI_SUFFIX) else {
            continue;
        };
        match prefix.parse::<SceneId>() {
            Ok(previous) if id.is_revisit_of(&previous, revisit_days) => {
                return Ok(Some(entry.into_path()));
            }
            _ => {}
        }
    }

    Ok(None)
}

/// Marks vegetation loss between two NDVI rasters into band 1 of `output`,
/// which shares the current raster's grid. Returns the number of loss pixels.
fn fill_loss(
    current: &Dataset,
    previous: &Dataset,
    output: &mut Dataset,
    config: &ProcessConfig,
) -> Result<usize> {
    let current_srs = current.spatial_ref()?;
    let previous_srs = previous.spatial_ref()?;
    if current_srs != previous_srs {
        bail!("the NDVI rasters use different spatial references");
    }

    let current_band = current.rasterband(1)?;
    let previous_band = previous.rasterband(1)?;
    let Some(region) = overlap(
        (&current.geo_transform()?, current_band.size()),
        (&previous.geo_transform()?, previous_band.size()),
    )?
    else {
        tracing::warn!("the NDVI rasters do not overlap");
        return Ok(0);
    };

    let mut output_band = output.rasterband(1)?;
    let windows = strips(region.current.size, config.strip_height).collect::<Vec<_>>();
    let bar = progress_bar(windows.len(), "change detection")?;
    let mut losses = 0;
    for strip in windows {
        let shift = |origin: Window| {
            Window::new(
                (origin.offset.0 + strip.offset.0, origin.offset.1 + strip.offset.1),
                strip.size,
            )
        };
        let current_window = shift(region.current);
        let current_ndvi = current_band.read_window::<f32>(current_window)?;
        let previous_ndvi = previous_band.read_window::<f32>(shift(region.previous))?;

        let mut buffer = Buffer::new(strip.size, vec![0u8; strip.pixel_count()]);
        buffer
            .data_mut()
            .par_iter_mut()
            .zip(current_ndvi.data())
            .zip(previous_ndvi.data())
            .for_each(|((out, &current), &previous)| {
                *out = is_loss(previous, current, config.loss_threshold) as u8;
            });
        losses += buffer.data().iter().filter(|&&v| v != 0).count();
        output_band.write_window(current_window, &mut buffer)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(losses)
}

pub fn write_change_raster(
    current: &Path,
    previous: &Path,
    config: &ProcessConfig,
    path: &Path,
) -> Result<usize> {
    let current = Dataset::open(current)?;
    let previous = Dataset::open(previous)?;

    let mut output = create_geotiff::<u8>(path, &current, 1, &[])?;
    output.rasterband(1)?.set_no_data_value(Some(0.0))?;
    fill_loss(&current, &previous, &mut output, config)
}

pub fn write_change_vector(
    current: &Path,
    previous: &Path,
    config: &ProcessConfig,
    path: &Path,
) -> Result<usize> {
    let current = Dataset::open(current)?;
    let previous = Dataset::open(previous)?;

    let mut raster = create_in_memory::<u8>(&current)?;
    let losses = fill_loss(&current, &previous, &mut raster, config)?;

    remove_existing(path)?;
    let mut vector = DriverManager::get_driver_by_name("GeoJSON")?
        .create_vector_only(path)
        .with_context(|| format!("unable to create {}", path.display()))?;
    let srs = current.spatial_ref()?;
    let layer = vector.create_layer(LayerOptions {
        name: "change",
        srs: Some(&srs),
        ty: OGRwkbGeometryType::wkbPolygon,
        options: None,
    })?;
    FieldDefn::new("loss", OGRFieldType::OFTInteger)?.add_to_layer(&layer)?;

    let band = raster.rasterband(1)?;
    band.polygonize_into(Some(&band), &layer, 0)?;

    Ok(losses)
}
