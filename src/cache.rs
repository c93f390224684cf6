//! Model cache management for downloaded models
//!
//! Model files live flat in one directory as `<name>.onnx`, optionally next
//! to a `<name>.onnx.sha256` checksum sidecar written by the downloader. The
//! directory is the configured one, else `$U2NET_HOME`, else `~/.u2net`.

use crate::error::{Result, WhiteBgError};
use crate::models::ModelName;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Environment variable overriding the model directory
pub const MODEL_DIR_ENV: &str = "U2NET_HOME";

/// Directory name under the home directory used by default
const DEFAULT_MODEL_DIR_NAME: &str = ".u2net";

/// Extension of checksum sidecar files
const CHECKSUM_EXTENSION: &str = "sha256";

/// Information about a cached model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModelInfo {
    /// Registered model name
    pub model: ModelName,
    /// Path to the model file
    pub path: PathBuf,
    /// Size of the model file in bytes
    pub size_bytes: u64,
    /// Whether a checksum sidecar exists next to the file
    pub has_checksum: bool,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

/// Resolve the model directory from its three possible sources
///
/// # Errors
/// - `WhiteBgError::InvalidConfig` when no source yields a directory
pub fn resolve_model_dir(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(value));
    }
    home.map(|home| home.join(DEFAULT_MODEL_DIR_NAME)).ok_or_else(|| {
        WhiteBgError::invalid_config(format!(
            "Failed to determine the model directory. Set {MODEL_DIR_ENV} or pass a model directory."
        ))
    })
}

/// SHA-256 of a file as lowercase hex
///
/// # Errors
/// - I/O errors while reading the file
pub fn file_sha256<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let mut file =
        fs::File::open(path).map_err(|e| WhiteBgError::file_io_error("open model file", path, &e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| WhiteBgError::file_io_error("read model file", path, &e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

impl ModelCache {
    /// Create a cache manager, creating the directory if needed
    ///
    /// # Errors
    /// - Failed to determine the model directory
    /// - Failed to create the model directory
    pub fn new(model_dir: Option<&Path>) -> Result<Self> {
        let cache = Self::locate(model_dir)?;
        let cache_dir = cache.cache_dir;

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                WhiteBgError::file_io_error("create model directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    /// Resolve the model directory without touching the filesystem
    ///
    /// # Errors
    /// - Failed to determine the model directory
    pub fn locate(model_dir: Option<&Path>) -> Result<Self> {
        let cache_dir =
            resolve_model_dir(model_dir, std::env::var_os(MODEL_DIR_ENV), dirs::home_dir())?;
        Ok(Self { cache_dir })
    }

    /// Directory holding the model files
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of a model file (may not exist)
    #[must_use]
    pub fn model_path(&self, model: ModelName) -> PathBuf {
        self.cache_dir.join(model.file_name())
    }

    /// Path of a model's checksum sidecar
    #[must_use]
    pub fn checksum_path(&self, model: ModelName) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", model.file_name(), CHECKSUM_EXTENSION))
    }

    /// Check if a non-empty model file is present
    #[must_use]
    pub fn is_model_cached(&self, model: ModelName) -> bool {
        fs::metadata(self.model_path(model)).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    /// Check a cached model against its checksum sidecar
    ///
    /// Files without a sidecar are accepted.
    ///
    /// # Errors
    /// - `WhiteBgError::ModelUnavailable` when the model is not cached
    /// - I/O errors while hashing
    pub fn verify(&self, model: ModelName) -> Result<bool> {
        if !self.is_model_cached(model) {
            return Err(WhiteBgError::model_unavailable(format!(
                "Model '{model}' is not cached in {}",
                self.cache_dir.display()
            )));
        }

        let checksum_path = self.checksum_path(model);
        let Ok(expected) = fs::read_to_string(&checksum_path) else {
            log::debug!("No checksum sidecar for {model}, skipping verification");
            return Ok(true);
        };

        let actual = file_sha256(self.model_path(model))?;
        let matches = actual.eq_ignore_ascii_case(expected.trim());
        if !matches {
            log::warn!("Checksum mismatch for {model}: expected {}, got {actual}", expected.trim());
        }
        Ok(matches)
    }

    /// All registered models present in the directory, in registry order
    ///
    /// # Errors
    /// - I/O errors when reading file metadata
    pub fn cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        for model in ModelName::ALL {
            if !self.is_model_cached(model) {
                continue;
            }
            let path = self.model_path(model);
            let size_bytes = fs::metadata(&path)
                .map_err(|e| WhiteBgError::file_io_error("read model metadata", &path, &e))?
                .len();
            models.push(CachedModelInfo {
                model,
                size_bytes,
                has_checksum: self.checksum_path(model).is_file(),
                path,
            });
        }
        Ok(models)
    }

    /// Remove a cached model and its sidecar
    ///
    /// Returns `false` when the model was not cached.
    ///
    /// # Errors
    /// - Failed to remove the files
    pub fn clear_model(&self, model: ModelName) -> Result<bool> {
        let path = self.model_path(model);
        if !path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {model}");
        fs::remove_file(&path)
            .map_err(|e| WhiteBgError::file_io_error("remove cached model", &path, &e))?;

        let checksum_path = self.checksum_path(model);
        if checksum_path.exists() {
            fs::remove_file(&checksum_path).map_err(|e| {
                WhiteBgError::file_io_error("remove checksum sidecar", &checksum_path, &e)
            })?;
        }
        Ok(true)
    }
}

/// Format file size in human-readable format
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(temp_dir: &TempDir) -> ModelCache {
        ModelCache::new(Some(temp_dir.path())).unwrap()
    }

    #[test]
    fn test_resolve_model_dir_precedence() {
        let explicit = PathBuf::from("/explicit");
        let home = Some(PathBuf::from("/home/user"));

        assert_eq!(
            resolve_model_dir(Some(&explicit), Some("/env".into()), home.clone()).unwrap(),
            explicit
        );
        assert_eq!(
            resolve_model_dir(None, Some("/env".into()), home.clone()).unwrap(),
            PathBuf::from("/env")
        );
        assert_eq!(
            resolve_model_dir(None, Some(OsString::new()), home.clone()).unwrap(),
            PathBuf::from("/home/user/.u2net")
        );
        assert!(resolve_model_dir(None, None, None).is_err());
    }

    #[test]
    fn test_new_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("models");
        let cache = ModelCache::new(Some(&dir)).unwrap();
        assert!(dir.is_dir());
        assert_eq!(cache.cache_dir(), dir.as_path());
    }

    #[test]
    fn test_locate_does_not_create_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("not-yet");
        let cache = ModelCache::locate(Some(&dir)).unwrap();

        assert_eq!(cache.cache_dir(), dir.as_path());
        assert!(!dir.exists());
        assert!(!cache.is_model_cached(ModelName::U2net));
        assert!(cache.cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_model_paths() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        assert_eq!(
            cache.model_path(ModelName::Silueta),
            temp_dir.path().join("silueta.onnx")
        );
        assert_eq!(
            cache.checksum_path(ModelName::Silueta),
            temp_dir.path().join("silueta.onnx.sha256")
        );
    }

    #[test]
    fn test_is_model_cached_requires_non_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        let path = cache.model_path(ModelName::U2netp);

        assert!(!cache.is_model_cached(ModelName::U2netp));
        fs::write(&path, b"").unwrap();
        assert!(!cache.is_model_cached(ModelName::U2netp));
        fs::write(&path, b"onnx").unwrap();
        assert!(cache.is_model_cached(ModelName::U2netp));
    }

    #[test]
    fn test_verify_against_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        let path = cache.model_path(ModelName::U2net);
        fs::write(&path, b"model bytes").unwrap();

        // No sidecar: accepted
        assert!(cache.verify(ModelName::U2net).unwrap());

        let checksum = file_sha256(&path).unwrap();
        fs::write(cache.checksum_path(ModelName::U2net), format!("{checksum}\n")).unwrap();
        assert!(cache.verify(ModelName::U2net).unwrap());

        fs::write(&path, b"tampered").unwrap();
        assert!(!cache.verify(ModelName::U2net).unwrap());
    }

    #[test]
    fn test_verify_missing_model() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        assert!(matches!(
            cache.verify(ModelName::Silueta),
            Err(WhiteBgError::ModelUnavailable(_))
        ));
    }

    #[test]
    fn test_file_sha256_known_value() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_cached_models_in_registry_order() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        fs::write(cache.model_path(ModelName::IsnetGeneralUse), b"1234").unwrap();
        fs::write(cache.model_path(ModelName::U2net), b"12").unwrap();
        fs::write(temp_dir.path().join("unrelated.onnx"), b"x").unwrap();

        let models = cache.cached_models().unwrap();
        let names: Vec<ModelName> = models.iter().map(|m| m.model).collect();
        assert_eq!(names, vec![ModelName::U2net, ModelName::IsnetGeneralUse]);
        assert_eq!(models[1].size_bytes, 4);
        assert!(!models[0].has_checksum);
    }

    #[test]
    fn test_clear_model() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        fs::write(cache.model_path(ModelName::U2netp), b"x").unwrap();
        fs::write(cache.checksum_path(ModelName::U2netp), b"y").unwrap();

        assert!(cache.clear_model(ModelName::U2netp).unwrap());
        assert!(!cache.model_path(ModelName::U2netp).exists());
        assert!(!cache.checksum_path(ModelName::U2netp).exists());
        assert!(!cache.clear_model(ModelName::U2netp).unwrap());
    }

    #[test]
    fn test_format_size_comprehensive() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(999), "999 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024_u64 * 1024 * 1536), "1.5 GB");
        assert_eq!(format_size(1024_u64 * 1024 * 1024 * 1024), "1.0 TB");

        // Beyond TB stays in TB
        assert_eq!(
            format_size(1024_u64 * 1024 * 1024 * 1024 * 1024),
            "1024.0 TB"
        );
    }
}
