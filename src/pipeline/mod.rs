mod change;
mod ndvi;
mod output;
mod rgb;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{commands::SceneJob, landsat::Scene};
use output::Product;

#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Days between two acquisitions of the same footprint.
    pub revisit_days: u64,
    /// Minimum NDVI drop counted as vegetation loss.
    pub loss_threshold: f32,
    /// Rows read per raster strip.
    pub strip_height: usize,
    /// Lower and upper percentiles of the RGB contrast stretch.
    pub stretch: (f64, f64),
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            revisit_days: 16,
            loss_threshold: 0.2,
            strip_height: 256,
            stretch: (0.02, 0.98),
        }
    }
}

pub fn default_output_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("unable to determine the home directory")?;
    Ok(home.join("landsat"))
}

/// Processing of one scene into the output directory.
#[derive(Debug)]
pub struct Process {
    scene: Scene,
    output_dir: PathBuf,
    config: ProcessConfig,
}

impl Process {
    pub fn new(path: &Path, output_dir: Option<&Path>) -> Result<Self> {
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_output_dir()?,
        };
        Self::with_config(path, output_dir, ProcessConfig::default())
    }

    pub fn with_config(path: &Path, output_dir: PathBuf, config: ProcessConfig) -> Result<Self> {
        let scene = Scene::open(path)?;
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("unable to create {}", output_dir.display()))?;

        {
            let scene = scene.id();
            let output_dir = output_dir.display();
            tracing::info!(%scene, %output_dir, "opened scene");
        }

        Ok(Self {
            scene,
            output_dir,
            config,
        })
    }

    fn product_path(&self, product: Product) -> PathBuf {
        product.path(&self.output_dir, self.scene.id())
    }
}

impl SceneJob for Process {
    fn make_rgb(&self) -> Result<PathBuf> {
        let path = self.product_path(Product::Rgb);
        rgb::write_rgb(&self.scene, &self.config, &path)
            .with_context(|| format!("unable to create {}", path.display()))?;
        Ok(path)
    }

    fn make_ndvi(&self) -> Result<PathBuf> {
        let path = self.product_path(Product::Ndvi);
        ndvi::write_ndvi(&self.scene, &self.config, &path)
            .with_context(|| format!("unable to create {}", path.display()))?;
        Ok(path)
    }

    fn full(&self, polygonize: bool) -> Result<()> {
        {
            let path = self.make_rgb()?;
            let path = path.display();
            tracing::info!(%path, "wrote RGB composite");
        }
        let ndvi = self.make_ndvi()?;
        {
            let path = ndvi.display();
            tracing::info!(%path, "wrote NDVI");
        }

        let Some(previous) =
            change::find_previous_ndvi(&self.output_dir, self.scene.id(), self.config.revisit_days)?
        else {
            let scene = self.scene.id();
            let days = self.config.revisit_days;
            tracing::warn!(%scene, days, "no previous NDVI found, skipping change detection");
            return Ok(());
        };

        let (path, losses) = if polygonize {
            let path = self.product_path(Product::ChangeVector);
            let losses = change::write_change_vector(&ndvi, &previous, &self.config, &path)
                .with_context(|| format!("unable to create {}", path.display()))?;
            (path, losses)
        } else {
            let path = self.product_path(Product::ChangeRaster);
            let losses = change::write_change_raster(&ndvi, &previous, &self.config, &path)
                .with_context(|| format!("unable to create {}", path.display()))?;
            (path, losses)
        };

        let path = path.display();
        let previous = previous.display();
        tracing::info!(%path, %previous, losses, "wrote change detection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        path::{Path, PathBuf},
        process::Command,
    };

    use approx_eq::assert_approx_eq;
    use gdal::{
        raster::{Buffer, GdalDataType},
        spatial_ref::SpatialRef,
        vector::LayerAccess,
        Dataset, DriverManager,
    };
    use tempfile::TempDir;

    use super::{Process, ProcessConfig};
    use crate::commands::SceneJob;

    const WIDTH: usize = 8;
    const HEIGHT: usize = 6;
    const GEO_TRANSFORM: [f64; 6] = [500_000.0, 30.0, 0.0, 8_000_000.0, 0.0, -30.0];
    const CLEAR: u16 = 20480;
    const CLOUD: u16 = 53248;

    fn write_band(path: &Path, data: Vec<u16>) {
        let mut dataset = DriverManager::get_driver_by_name("GTiff")
            .unwrap()
            .create_with_band_type::<u16, _>(path, WIDTH, HEIGHT, 1)
            .unwrap();
        let wkt = SpatialRef::from_epsg(32622).unwrap().to_wkt().unwrap();
        dataset.set_projection(&wkt).unwrap();
        dataset.set_geo_transform(&GEO_TRANSFORM).unwrap();
        let mut buffer = Buffer::new((WIDTH, HEIGHT), data);
        dataset
            .rasterband(1)
            .unwrap()
            .write((0, 0), (WIDTH, HEIGHT), &mut buffer)
            .unwrap();
    }

    /// Writes bands 4, 5, 6 and the quality band of a synthetic scene.
    fn write_scene(
        root: &Path,
        id: &str,
        red: &dyn Fn(usize, usize) -> u16,
        qa: &dyn Fn(usize, usize) -> u16,
    ) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        let pixels = |f: &dyn Fn(usize, usize) -> u16| {
            (0..HEIGHT)
                .flat_map(|row| (0..WIDTH).map(move |col| (col, row)))
                .map(|(col, row)| f(col, row))
                .collect::<Vec<_>>()
        };
        write_band(&dir.join(format!("{id}_B4.TIF")), pixels(red));
        write_band(&dir.join(format!("{id}_B5.TIF")), pixels(&|_, _| 3000));
        write_band(
            &dir.join(format!("{id}_B6.TIF")),
            pixels(&|col, row| (row * WIDTH + col + 1) as u16),
        );
        write_band(&dir.join(format!("{id}_BQA.TIF")), pixels(qa));
        File::create(dir.join(format!("{id}_MTL.txt"))).unwrap();
        dir
    }

    fn read_f32(path: &Path) -> Vec<f32> {
        let dataset = Dataset::open(path).unwrap();
        let band = dataset.rasterband(1).unwrap();
        band.read_as::<f32>((0, 0), (WIDTH, HEIGHT), (WIDTH, HEIGHT), None)
            .unwrap()
            .data()
            .to_vec()
    }

    fn config() -> ProcessConfig {
        ProcessConfig {
            strip_height: 4,
            ..ProcessConfig::default()
        }
    }

    struct Workspace {
        scenes: TempDir,
        output: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                scenes: tempfile::tempdir().unwrap(),
                output: tempfile::tempdir().unwrap(),
            }
        }

        fn process(&self, scene: &Path) -> Process {
            Process::with_config(scene, self.output.path().to_path_buf(), config()).unwrap()
        }
    }

    #[test]
    fn ndvi_masks_clouds() {
        let ws = Workspace::new();
        let scene = write_scene(
            ws.scenes.path(),
            "LC82200662015001LGN00",
            &|_, _| 1000,
            &|_, row| if row == 0 { CLOUD } else { CLEAR },
        );

        let path = ws.process(&scene).make_ndvi().unwrap();
        assert_eq!(
            path,
            ws.output.path().join("LC82200662015001LGN00_NDVI.TIF")
        );

        let ndvi = read_f32(&path);
        assert!(ndvi[..WIDTH].iter().all(|&v| v == 0.0));
        for &value in &ndvi[WIDTH..] {
            assert_approx_eq!(value as f64, 0.5);
        }

        let dataset = Dataset::open(&path).unwrap();
        assert_eq!(dataset.geo_transform().unwrap(), GEO_TRANSFORM);
    }

    #[test]
    fn rgb_composite() {
        let ws = Workspace::new();
        let scene = write_scene(
            ws.scenes.path(),
            "LC82200662015001LGN00",
            &|_, _| 1000,
            &|_, _| CLEAR,
        );

        let path = ws.process(&scene).make_rgb().unwrap();
        let dataset = Dataset::open(&path).unwrap();
        assert_eq!(dataset.raster_count(), 3);
        assert_eq!(dataset.raster_size(), (WIDTH, HEIGHT));

        let red = dataset.rasterband(1).unwrap();
        assert_eq!(red.band_type(), GdalDataType::UInt8);
        let red = red
            .read_as::<u8>((0, 0), (WIDTH, HEIGHT), (WIDTH, HEIGHT), None)
            .unwrap();
        // band 6 counts 1..=48, stretched between 1 and 47
        assert_eq!(red.data()[0], 1);
        assert_eq!(red.data()[WIDTH * HEIGHT - 1], 255);
    }

    #[test]
    fn full_without_previous_scene() {
        let ws = Workspace::new();
        let scene = write_scene(
            ws.scenes.path(),
            "LC82200662015001LGN00",
            &|_, _| 1000,
            &|_, _| CLEAR,
        );

        ws.process(&scene).full(false).unwrap();
        let output = ws.output.path();
        assert!(output.join("LC82200662015001LGN00_RGB.TIF").exists());
        assert!(output.join("LC82200662015001LGN00_NDVI.TIF").exists());
        assert!(!output.join("LC82200662015001LGN00_CHANGE.TIF").exists());
    }

    #[test]
    fn full_detects_vegetation_loss() {
        let ws = Workspace::new();
        let previous = write_scene(
            ws.scenes.path(),
            "LC82200662014350LGN00",
            &|_, _| 1000,
            &|_, _| CLEAR,
        );
        ws.process(&previous).make_ndvi().unwrap();

        // the western half loses its vegetation, the last row is cloudy
        let current = write_scene(
            ws.scenes.path(),
            "LC82200662015001LGN00",
            &|col, _| if col < WIDTH / 2 { 2000 } else { 1000 },
            &|_, row| if row == HEIGHT - 1 { CLOUD } else { CLEAR },
        );
        let process = ws.process(&current);

        process.full(false).unwrap();
        let change = read_f32(&ws.output.path().join("LC82200662015001LGN00_CHANGE.TIF"));
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                let expected = if col < WIDTH / 2 && row < HEIGHT - 1 {
                    1.0
                } else {
                    0.0
                };
                assert_eq!(change[row * WIDTH + col], expected, "pixel ({col}, {row})");
            }
        }

        process.full(true).unwrap();
        let vector =
            Dataset::open(ws.output.path().join("LC82200662015001LGN00_CHANGE.geojson")).unwrap();
        let mut layer = vector.layer(0).unwrap();
        assert_eq!(layer.feature_count(), 1);
        let loss = layer.defn().field_index("loss").unwrap();
        let feature = layer.features().next().unwrap();
        assert_eq!(feature.field_as_integer(loss).unwrap(), Some(1));

        // the western 4x5 pixel block
        let envelope = feature.geometry().unwrap().envelope();
        assert_approx_eq!(envelope.MinX, GEO_TRANSFORM[0]);
        assert_approx_eq!(envelope.MaxX, GEO_TRANSFORM[0] + 4.0 * GEO_TRANSFORM[1]);
        assert_approx_eq!(envelope.MaxY, GEO_TRANSFORM[3]);
        assert_approx_eq!(envelope.MinY, GEO_TRANSFORM[3] + 5.0 * GEO_TRANSFORM[5]);
    }

    #[test]
    fn ndvi_from_archive() {
        let ws = Workspace::new();
        let id = "LC82200662015001LGN00";
        let dir = write_scene(ws.scenes.path(), id, &|_, _| 1000, &|_, _| CLEAR);

        let archive = ws.scenes.path().join(format!("{id}.tar.gz"));
        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(ws.scenes.path())
            .arg(id)
            .status()
            .unwrap();
        assert!(status.success());
        std::fs::remove_dir_all(dir).unwrap();

        let process = ws.process(&archive);
        let path = process.make_ndvi().unwrap();
        assert_eq!(path, ws.output.path().join(format!("{id}_NDVI.TIF")));
        for value in read_f32(&path) {
            assert_approx_eq!(value as f64, 0.5);
        }
    }

    #[test]
    fn rejects_unusable_paths() {
        let ws = Workspace::new();
        let missing = ws.scenes.path().join("missing.tar.gz");
        assert!(Process::with_config(&missing, ws.output.path().to_path_buf(), config()).is_err());

        let text = ws.scenes.path().join("scene.txt");
        File::create(&text).unwrap();
        assert!(Process::with_config(&text, ws.output.path().to_path_buf(), config()).is_err());

        let empty = ws.scenes.path().join("empty");
        std::fs::create_dir(&empty).unwrap();
        assert!(Process::with_config(&empty, ws.output.path().to_path_buf(), config()).is_err());
    }

    #[test]
    fn missing_band_is_reported() {
        let ws = Workspace::new();
        let scene = write_scene(
            ws.scenes.path(),
            "LC82200662015001LGN00",
            &|_, _| 1000,
            &|_, _| CLEAR,
        );
        std::fs::remove_file(scene.join("LC82200662015001LGN00_BQA.TIF")).unwrap();

        let err = ws.process(&scene).make_ndvi().unwrap_err();
        assert!(format!("{err:#}").contains("has no BQA file"));
    }
}
