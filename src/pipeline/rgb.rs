use std::path::Path;

use anyhow::{bail, Result};
use gdal::{raster::Buffer, Dataset};
use rayon::{
    iter::{
        IndexedParallelIterator as _, IntoParallelRefMutIterator as _, ParallelIterator as _,
    },
    slice::ParallelSlice as _,
};

use super::{
    output::{create_geotiff, progress_bar},
    ProcessConfig,
};
use crate::{
    gdal_ext::{strips, RasterBandExt as _},
    landsat::{Band, Scene},
};

/// Red, green and blue channels of the composite.
const COMPOSITE: [Band; 3] = [Band::SWIR1, Band::NIR, Band::RED];

const BINS: usize = u16::MAX as usize + 1;

/// Linear contrast stretch of 16-bit reflectance into 1..=255, keeping 0 as
/// fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stretch {
    low: u16,
    high: u16,
}

impl Stretch {
    const FULL_RANGE: Stretch = Stretch {
        low: 1,
        high: u16::MAX,
    };

    /// Picks the bounds at the `low` and `high` fractions of the non-zero
    /// pixels counted in `histogram`.
    pub fn from_histogram(histogram: &[u64], low: f64, high: f64) -> Option<Self> {
        let total = histogram.iter().skip(1).sum::<u64>();
        if total == 0 {
            return None;
        }
        Some(Self {
            low: percentile(histogram, total, low),
            high: percentile(histogram, total, high),
        })
    }

    pub fn apply(self, value: u16) -> u8 {
        if value == 0 {
            return 0;
        }
        if self.high <= self.low {
            return if value >= self.high { 255 } else { 1 };
        }
        let value = value.clamp(self.low, self.high);
        let t = (value - self.low) as f32 / (self.high - self.low) as f32;
        1 + (t * 254.0).round() as u8
    }
}

fn percentile(histogram: &[u64], total: u64, fraction: f64) -> u16 {
    let target = ((total as f64 * fraction).round() as u64).max(1);
    let mut cumulative = 0;
    for (value, &count) in histogram.iter().enumerate().skip(1) {
        cumulative += count;
        if cumulative >= target {
            return value as u16;
        }
    }
    (histogram.len() - 1) as u16
}

fn accumulate_histogram(histogram: &mut [u64], data: &[u16]) {
    let partial = data
        .par_chunks(1 << 16)
        .fold(
            || vec![0u64; BINS],
            |mut histogram, chunk| {
                for &value in chunk {
                    histogram[value as usize] += 1;
                }
                histogram
            },
        )
        .reduce(
            || vec![0u64; BINS],
            |mut a, b| {
                for (a, b) in a.iter_mut().zip(b) {
                    *a += b;
                }
                a
            },
        );
    for (total, count) in histogram.iter_mut().zip(partial) {
        *total += count;
    }
}

pub fn write_rgb(scene: &Scene, config: &ProcessConfig, path: &Path) -> Result<()> {
    let datasets = COMPOSITE
        .iter()
        .map(|&band| Ok(Dataset::open(scene.band_path(band)?)?))
        .collect::<Result<Vec<_>>>()?;
    let bands = datasets
        .iter()
        .map(|ds| ds.rasterband(1))
        .collect::<gdal::errors::Result<Vec<_>>>()?;

    let size = bands[0].size();
    if bands.iter().any(|band| band.size() != size) {
        bail!("bands {COMPOSITE:?} differ in size");
    }
    let windows = strips(size, config.strip_height).collect::<Vec<_>>();

    let bar = progress_bar(windows.len() * bands.len(), "RGB statistics")?;
    let mut stretches = Vec::with_capacity(bands.len());
    for (band, name) in bands.iter().zip(COMPOSITE) {
        let mut histogram = vec![0u64; BINS];
        for &window in &windows {
            let buffer = band.read_window::<u16>(window)?;
            accumulate_histogram(&mut histogram, buffer.data());
            bar.inc(1);
        }
        let stretch = Stretch::from_histogram(&histogram, config.stretch.0, config.stretch.1)
            .unwrap_or_else(|| {
                tracing::warn!(band = %name, "band has no valid pixels");
                Stretch::FULL_RANGE
            });
        tracing::debug!(band = %name, low = stretch.low, high = stretch.high, "contrast stretch");
        stretches.push(stretch);
    }
    bar.finish_and_clear();

    let mut output = create_geotiff::<u8>(path, &datasets[0], 3, &["PHOTOMETRIC=RGB"])?;
    let bar = progress_bar(windows.len(), "RGB")?;
    for &window in &windows {
        for (idx, (band, stretch)) in bands.iter().zip(&stretches).enumerate() {
            let input = band.read_window::<u16>(window)?;
            let mut buffer = Buffer::new(window.size, vec![0u8; window.pixel_count()]);
            buffer
                .data_mut()
                .par_iter_mut()
                .zip(input.data())
                .for_each(|(out, &value)| *out = stretch.apply(value));
            output.rasterband(idx + 1)?.write_window(window, &mut buffer)?;
        }
        bar.inc(1);
    }
    for idx in 1..=3 {
        output.rasterband(idx)?.set_no_data_value(Some(0.0))?;
    }
    bar.finish_and_clear();

    Ok(())
}
