use std::path::Path;

use anyhow::{bail, Result};
use gdal::{raster::Buffer, Dataset};
use rayon::iter::{
    IndexedParallelIterator as _, IntoParallelRefMutIterator as _, ParallelIterator as _,
};

use super::{
    output::{create_geotiff, progress_bar},
    ProcessConfig,
};
use crate::{
    gdal_ext::{strips, RasterBandExt as _},
    landsat::{Band, QualityBand, Scene, SceneId},
};

/// Maps stored pixel values to the quantity NDVI is computed on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Calibration {
    /// Level-1 digital numbers, used as they are.
    DigitalNumber,
    /// Level-2 surface reflectance stored as `(reflectance - offset) / scale`.
    SurfaceReflectance { scale: f32, offset: f32 },
}

impl Calibration {
    pub const LEVEL_2: Calibration = Calibration::SurfaceReflectance {
        scale: 2.75e-5,
        offset: -0.2,
    };

    pub fn for_scene(id: &SceneId) -> Self {
        if id.is_surface_reflectance() {
            Self::LEVEL_2
        } else {
            Self::DigitalNumber
        }
    }

    pub fn apply(self, value: u16) -> f32 {
        match self {
            Calibration::DigitalNumber => value as f32,
            Calibration::SurfaceReflectance { scale, offset } => value as f32 * scale + offset,
        }
    }
}

pub fn ndvi(red: f32, nir: f32) -> f32 {
    let sum = red + nir;
    if sum == 0.0 {
        0.0
    } else {
        (nir - red) / sum
    }
}

fn ndvi_strip(
    red: &[u16],
    nir: &[u16],
    qa: &[u16],
    quality: QualityBand,
    calibration: Calibration,
    output: &mut [f32],
) {
    output
        .par_iter_mut()
        .zip(red)
        .zip(nir)
        .zip(qa)
        .for_each(|(((out, &red), &nir), &qa)| {
            *out = if quality.is_clear(qa) {
                ndvi(calibration.apply(red), calibration.apply(nir))
            } else {
                0.0
            };
        });
}

pub fn write_ndvi(scene: &Scene, config: &ProcessConfig, path: &Path) -> Result<()> {
    let red_ds = Dataset::open(scene.band_path(Band::RED)?)?;
    let nir_ds = Dataset::open(scene.band_path(Band::NIR)?)?;
    let qa_ds = Dataset::open(scene.band_path(Band::Quality)?)?;
    let quality = QualityBand::for_scene(scene.id());
    let calibration = Calibration::for_scene(scene.id());

    let red = red_ds.rasterband(1)?;
    let nir = nir_ds.rasterband(1)?;
    let qa = qa_ds.rasterband(1)?;
    let size = red.size();
    if nir.size() != size || qa.size() != size {
        bail!(
            "band sizes differ: red {:?}, NIR {:?}, QA {:?}",
            size,
            nir.size(),
            qa.size()
        );
    }

    let mut output = create_geotiff::<f32>(path, &red_ds, 1, &[])?;
    let mut output_band = output.rasterband(1)?;

    let windows = strips(size, config.strip_height).collect::<Vec<_>>();
    let bar = progress_bar(windows.len(), "NDVI")?;
    for window in windows {
        let red = red.read_window::<u16>(window)?;
        let nir = nir.read_window::<u16>(window)?;
        let qa = qa.read_window::<u16>(window)?;

        let mut buffer = Buffer::new(window.size, vec![0.0f32; window.pixel_count()]);
        ndvi_strip(
            red.data(),
            nir.data(),
            qa.data(),
            quality,
            calibration,
            buffer.data_mut(),
        );
        output_band.write_window(window, &mut buffer)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    Ok(())
}
