use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use super::{quality::QualityBand, scene::SceneId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Band {
    /// OLI/TIRS spectral band, 1 to 11.
    Spectral(u8),
    /// `BQA` or `QA_PIXEL`.
    Quality,
}

impl Band {
    pub const RED: Band = Band::Spectral(4);
    pub const NIR: Band = Band::Spectral(5);
    pub const SWIR1: Band = Band::Spectral(6);
}

impl Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Spectral(n) => write!(f, "B{n}"),
            Band::Quality => write!(f, "BQA"),
        }
    }
}

/// Splits a band file name such as `LC82200662015001LGN00_B4.TIF` into its
/// scene prefix and band.
pub fn parse_band_file_name(name: &str) -> Option<(&str, Band)> {
    let (stem, extension) = name.rsplit_once('.')?;
    if !extension.eq_ignore_ascii_case("tif") {
        return None;
    }

    let upper = stem.to_ascii_uppercase();
    let (prefix_len, band) = if upper.ends_with("_QA_PIXEL") {
        (stem.len() - "_QA_PIXEL".len(), Band::Quality)
    } else if upper.ends_with("_BQA") {
        (stem.len() - "_BQA".len(), Band::Quality)
    } else {
        let (prefix, token) = stem.rsplit_once('_')?;
        let number = token.strip_prefix(['B', 'b'])?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let number = number.parse::<u8>().ok()?;
        if !(1..=11).contains(&number) {
            return None;
        }
        (prefix.len(), Band::Spectral(number))
    };

    let prefix = &stem[..prefix_len];
    // Collection 2 surface reflectance files carry an extra `_SR` token.
    let prefix = match prefix.len().checked_sub(3) {
        Some(idx) if prefix.get(idx..).is_some_and(|t| t.eq_ignore_ascii_case("_SR")) => {
            &prefix[..idx]
        }
        _ => prefix,
    };
    Some((prefix, band))
}

pub fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".tar")
}

/// The band files of a single scene, addressed by paths GDAL can open.
#[derive(Debug)]
pub struct Scene {
    id: SceneId,
    bands: BTreeMap<Band, PathBuf>,
}

impl Scene {
    /// Opens a compressed scene archive or a directory of band files.
    pub fn open(path: &Path) -> Result<Self> {
        let metadata = path
            .metadata()
            .with_context(|| format!("unable to read {}", path.display()))?;

        let files = if metadata.is_dir() {
            list_directory(path)?
        } else if is_archive(path) {
            list_archive(path)?
        } else {
            bail!(
                "{} is neither a scene archive nor a directory",
                path.display()
            );
        };

        Self::from_files(files).with_context(|| format!("no usable scene in {}", path.display()))
    }

    pub fn from_files(files: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let mut id = None::<SceneId>;
        let mut bands = BTreeMap::new();
        for file in files {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((prefix, band)) = parse_band_file_name(name) else {
                continue;
            };
            let Ok(file_id) = prefix.parse::<SceneId>() else {
                tracing::debug!(name, "ignoring band file with unrecognized scene id");
                continue;
            };
            let scene_id = id.get_or_insert_with(|| file_id.clone());
            if *scene_id != file_id {
                bail!("band files of more than one scene: {scene_id} and {file_id}");
            }
            bands.insert(band, file);
        }

        let Some(id) = id else {
            bail!("no Landsat 8 band files found");
        };
        Ok(Self { id, bands })
    }

    pub fn id(&self) -> &SceneId {
        &self.id
    }

    pub fn band_path(&self, band: Band) -> Result<&Path> {
        self.bands
            .get(&band)
            .map(PathBuf::as_path)
            .with_context(|| format!("scene {} has no {} file", self.id, self.band_name(band)))
    }

    /// The band token used in this scene's file names.
    fn band_name(&self, band: Band) -> String {
        match (band, QualityBand::for_scene(&self.id)) {
            (Band::Quality, QualityBand::Collection2) => "QA_PIXEL".to_string(),
            _ => band.to_string(),
        }
    }
}

fn list_directory(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(path).max_depth(2) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn list_archive(path: &Path) -> Result<Vec<PathBuf>> {
    let path = path
        .canonicalize()
        .with_context(|| format!("unable to read {}", path.display()))?;
    let root = PathBuf::from(format!("/vsitar/{}", path.display()));
    let members = gdal::vsi::read_dir(&root, true)
        .with_context(|| format!("unable to list {}", path.display()))?;
    Ok(members.into_iter().map(|member| root.join(member)).collect())
}
