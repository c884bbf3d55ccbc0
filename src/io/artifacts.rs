use chrono::NaiveDate;
use image::RgbaImage;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::core::render::save_png;
use crate::types::{NdviResult, ValidationError, DATE_FORMAT};

/// URL prefix under which artifacts are published
pub const OUTPUT_URL_PREFIX: &str = "/output";

/// Directory holding the PNG artifacts of every run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `<cache dir>/ndvi-series/output`, or `./output` when the platform has no cache dir
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("ndvi-series").join("output"))
            .unwrap_or_else(|| PathBuf::from("output"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> NdviResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn map_layer_name(scene_date: NaiveDate, run_timestamp: &str) -> String {
        format!("ndvi_map_{}_{}.png", scene_date.format(DATE_FORMAT), run_timestamp)
    }

    pub fn graph_name(run_timestamp: &str) -> String {
        format!("graph_{}.png", run_timestamp)
    }

    pub fn legend_name(run_timestamp: &str) -> String {
        format!("legend_{}.png", run_timestamp)
    }

    /// Public reference for a stored artifact
    pub fn url_for(name: &str) -> String {
        format!("{}/{}", OUTPUT_URL_PREFIX, name)
    }

    /// Write `image` under `name` and return its path
    pub fn write_png(&self, name: &str, image: &RgbaImage) -> NdviResult<PathBuf> {
        let path = self.resolve(name)?;
        save_png(image, &path)?;
        log::debug!("Wrote artifact {}", path.display());
        Ok(path)
    }

    /// On-disk path of an artifact name received from a client.
    /// Anything that is not a bare file name is rejected.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ValidationError> {
        if name.contains("..") || name.starts_with('/') || !file_name_pattern().is_match(name) {
            return Err(ValidationError::InvalidParameter(format!(
                "Invalid artifact name '{}'",
                name
            )));
        }
        Ok(self.root.join(name))
    }

    /// Read a stored artifact back, `None` when it does not exist
    pub fn read(&self, name: &str) -> NdviResult<Option<Vec<u8>>> {
        let path = self.resolve(name)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let date = NaiveDate::from_ymd_opt(2023, 7, 25).unwrap();
        let name = ArtifactStore::map_layer_name(date, "20230801120000");
        assert_eq!(name, "ndvi_map_2023-07-25_20230801120000.png");
        assert_eq!(
            ArtifactStore::url_for(&name),
            "/output/ndvi_map_2023-07-25_20230801120000.png"
        );
        assert_eq!(ArtifactStore::graph_name("1"), "graph_1.png");
        assert_eq!(ArtifactStore::legend_name("1"), "legend_1.png");
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = ArtifactStore::new("/srv/output");
        assert_eq!(
            store.resolve("graph_1.png").unwrap(),
            PathBuf::from("/srv/output/graph_1.png")
        );
        for bad in ["../secret", "/etc/passwd", "a/b.png", "..", "", "name with space.png", "a\\b"] {
            assert!(store.resolve(bad).is_err(), "{} should be rejected", bad);
        }
    }
}
