use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the reference pair inside a session directory
pub const META_FILE_NAME: &str = "meta.json";

/// Reference pair sampled once at session start
///
/// `ref_mono` shares its clock with the tracer's event timestamps, `ref_wall`
/// is the wall clock read immediately next to it. Every later conversion of a
/// monotonic timestamp goes through this one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Wall-clock seconds since the Unix epoch
    pub ref_wall: f64,
    /// Monotonic seconds
    pub ref_mono: f64,
}

impl SessionMetadata {
    pub fn new(ref_wall: f64, ref_mono: f64) -> Self {
        Self { ref_wall, ref_mono }
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(META_FILE_NAME)
    }

    /// Write `meta.json` into the session directory
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        self.validate()?;
        let path = Self::path_in(dir);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Read `meta.json` from the session directory
    pub fn load_from(dir: &Path) -> Result<Self> {
        Self::load_file(&Self::path_in(dir))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let meta: SessionMetadata = serde_json::from_str(&content)?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<()> {
        if !self.ref_wall.is_finite() || !self.ref_mono.is_finite() {
            return Err(Error::InvalidMetadata(format!(
                "non-finite reference pair (wall={}, mono={})",
                self.ref_wall, self.ref_mono
            )));
        }
        if self.ref_wall < 0.0 || self.ref_mono < 0.0 {
            return Err(Error::InvalidMetadata(format!(
                "negative reference pair (wall={}, mono={})",
                self.ref_wall, self.ref_mono
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let meta = SessionMetadata::new(1763500038.948842, 618549.44);

        let path = meta.save_to(temp_dir.path())?;
        assert!(path.ends_with("meta.json"));

        let loaded = SessionMetadata::load_from(temp_dir.path())?;
        assert_eq!(loaded, meta);
        Ok(())
    }

    #[test]
    fn test_json_shape() {
        let meta = SessionMetadata::new(10.5, 2.25);
        let value = serde_json::to_value(meta).unwrap();
        assert_eq!(value, serde_json::json!({"ref_wall": 10.5, "ref_mono": 2.25}));
    }

    #[test]
    fn test_null_mono_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(META_FILE_NAME),
            r#"{"ref_wall": 1763500038.9, "ref_mono": null}"#,
        )
        .unwrap();

        let err = SessionMetadata::load_from(temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = SessionMetadata::load_from(temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
