//! Model cache management for downloaded models
//!
//! Models live as flat `<name>.onnx` files in an XDG-compliant cache directory.
//! A `<name>.onnx.sha256` sidecar written at download time lets a truncated or
//! corrupted file be detected and fetched again.

use crate::error::{BgRemovalError, Result};
use crate::models::ModelKind;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "BGREMOVE_B64_CACHE_DIR";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Whether a checksum sidecar exists and matches
    pub verified: bool,
}

/// Model cache manager
///
/// Clones share the set of models whose checksum has already been verified,
/// so a model file is hashed at most once per process.
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
    verified: Arc<Mutex<HashSet<ModelKind>>>,
}

impl ModelCache {
    /// Create a new model cache manager
    ///
    /// Uses `$BGREMOVE_B64_CACHE_DIR/models` when set, otherwise
    /// - Linux: `~/.cache/bgremove-b64/models/`
    /// - macOS: `~/Library/Caches/bgremove-b64/models/`
    /// - Windows: `%LOCALAPPDATA%/bgremove-b64/models/`
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;
        Self::ensure_dir(&cache_dir)?;
        Ok(Self::at(cache_dir))
    }

    /// Use a custom cache root (models go into `<root>/models`)
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let cache_dir = cache_dir.join("models");
        Self::ensure_dir(&cache_dir)?;
        Ok(Self::at(cache_dir))
    }

    fn at(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            verified: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn is_verified(&self, kind: ModelKind) -> bool {
        self.verified
            .lock()
            .map(|verified| verified.contains(&kind))
            .unwrap_or(false)
    }

    /// Record that `kind` matches its checksum
    pub(crate) fn mark_verified(&self, kind: ModelKind) {
        if let Ok(mut verified) = self.verified.lock() {
            verified.insert(kind);
        }
    }

    fn forget_verified(&self, kind: ModelKind) {
        if let Ok(mut verified) = self.verified.lock() {
            verified.remove(&kind);
        }
    }

    fn ensure_dir(cache_dir: &Path) -> Result<()> {
        if !cache_dir.exists() {
            fs::create_dir_all(cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }
        Ok(())
    }

    fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            if !cache_override.is_empty() {
                return Ok(PathBuf::from(cache_override).join("models"));
            }
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("bgremove-b64")
            .join("models"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the model file (may not exist)
    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(kind.file_name())
    }

    /// Path of the checksum sidecar for a model
    #[must_use]
    pub fn checksum_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(format!("{}.sha256", kind.file_name()))
    }

    /// Check if a model is cached and intact
    ///
    /// A model without a sidecar is accepted as long as it is non-empty, so
    /// files dropped into the cache by hand keep working.
    #[must_use]
    pub fn is_model_cached(&self, kind: ModelKind) -> bool {
        let path = self.model_path(kind);
        let Ok(metadata) = fs::metadata(&path) else {
            return false;
        };
        if !metadata.is_file() || metadata.len() == 0 {
            return false;
        }
        if self.is_verified(kind) {
            return true;
        }
        match self.verify_checksum(kind) {
            Ok(Some(true)) => {
                self.mark_verified(kind);
                true
            },
            Ok(Some(false)) => false,
            Ok(None) => true,
            Err(e) => {
                log::warn!("Failed to verify cached model {kind}: {e}");
                false
            },
        }
    }

    /// Compare the model file against its sidecar
    ///
    /// Returns `None` when no sidecar exists.
    ///
    /// # Errors
    /// - Model or sidecar unreadable
    pub fn verify_checksum(&self, kind: ModelKind) -> Result<Option<bool>> {
        let sidecar = self.checksum_path(kind);
        if !sidecar.exists() {
            return Ok(None);
        }
        let expected = fs::read_to_string(&sidecar)
            .map_err(|e| BgRemovalError::file_io_error("read checksum", &sidecar, &e))?;
        let actual = sha256_file(&self.model_path(kind))?;
        Ok(Some(expected.trim().eq_ignore_ascii_case(&actual)))
    }

    /// List cached registry models, sorted by name
    ///
    /// # Errors
    /// - Failed to read model file metadata
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        for kind in ModelKind::ALL {
            let path = self.model_path(kind);
            if !path.is_file() {
                continue;
            }
            let size_bytes = fs::metadata(&path)
                .map_err(|e| BgRemovalError::file_io_error("stat cached model", &path, &e))?
                .len();
            let verified = matches!(self.verify_checksum(kind), Ok(Some(true)));
            models.push(CachedModelInfo {
                kind,
                path,
                size_bytes,
                verified,
            });
        }
        models.sort_by(|a, b| a.kind.name().cmp(b.kind.name()));
        Ok(models)
    }

    /// Remove one cached model and its sidecar
    ///
    /// Returns `false` if the model was not cached.
    ///
    /// # Errors
    /// - Failed to delete the files
    pub fn clear_model(&self, kind: ModelKind) -> Result<bool> {
        self.forget_verified(kind);
        let path = self.model_path(kind);
        let existed = path.exists();
        for file in [path, self.checksum_path(kind)] {
            if file.exists() {
                fs::remove_file(&file)
                    .map_err(|e| BgRemovalError::file_io_error("remove cached model", &file, &e))?;
            }
        }
        Ok(existed)
    }

    /// Remove every cached registry model, returning what was removed
    ///
    /// # Errors
    /// - Failed to delete a model file
    pub fn clear_all_models(&self) -> Result<Vec<ModelKind>> {
        let mut removed = Vec::new();
        for kind in ModelKind::ALL {
            if self.clear_model(kind)? {
                removed.push(kind);
            }
        }
        Ok(removed)
    }
}

/// SHA-256 of a file as lowercase hex
///
/// # Errors
/// - File unreadable
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).map_err(|e| BgRemovalError::file_io_error("open", path, &e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| BgRemovalError::file_io_error("read", path, &e))?;
        if n == 0 {
            break;
        }
        hasher.update(buffer.get(..n).unwrap_or(&[]));
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Format file size in human-readable format
#[must_use]
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

    fn write_model(cache: &ModelCache, kind: ModelKind, data: &[u8]) {
        fs::write(cache.model_path(kind), data).unwrap();
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_custom_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let custom_cache = temp_dir.path().join("custom_cache");

        let cache = ModelCache::with_custom_cache_dir(custom_cache.as_path()).unwrap();

        assert!(custom_cache.join("models").exists());
        assert_eq!(cache.cache_dir(), custom_cache.join("models"));
        assert_eq!(
            cache.model_path(ModelKind::U2netp),
            custom_cache.join("models").join("u2netp.onnx")
        );
    }

    #[test]
    fn test_is_model_cached() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        assert!(!cache.is_model_cached(ModelKind::U2net));

        // Empty files do not count
        write_model(&cache, ModelKind::U2net, b"");
        assert!(!cache.is_model_cached(ModelKind::U2net));

        write_model(&cache, ModelKind::U2net, b"onnx bytes");
        assert!(cache.is_model_cached(ModelKind::U2net));
    }

    #[test]
    fn test_checksum_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        write_model(&cache, ModelKind::Silueta, b"abc");

        assert_eq!(cache.verify_checksum(ModelKind::Silueta).unwrap(), None);

        // sha256("abc")
        fs::write(
            cache.checksum_path(ModelKind::Silueta),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n",
        )
        .unwrap();
        assert_eq!(cache.verify_checksum(ModelKind::Silueta).unwrap(), Some(true));
        assert!(cache.is_model_cached(ModelKind::Silueta));

        // Corrupt the model; a fresh handle hashes it again
        write_model(&cache, ModelKind::Silueta, b"abd");
        let fresh = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        assert_eq!(fresh.verify_checksum(ModelKind::Silueta).unwrap(), Some(false));
        assert!(!fresh.is_model_cached(ModelKind::Silueta));
    }

    #[test]
    fn test_checksum_verified_once_per_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        write_model(&cache, ModelKind::Silueta, b"abc");
        fs::write(
            cache.checksum_path(ModelKind::Silueta),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        )
        .unwrap();

        let clone = cache.clone();
        assert!(cache.is_model_cached(ModelKind::Silueta));

        // Once verified, lookups through any clone skip hashing
        write_model(&cache, ModelKind::Silueta, b"abd");
        assert!(clone.is_model_cached(ModelKind::Silueta));

        // Clearing forgets the verification
        assert!(cache.clear_model(ModelKind::Silueta).unwrap());
        write_model(&cache, ModelKind::Silueta, b"abd");
        fs::write(cache.checksum_path(ModelKind::Silueta), "0000").unwrap();
        assert!(!clone.is_model_cached(ModelKind::Silueta));
    }

    #[test]
    fn test_scan_cached_models() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        assert!(cache.scan_cached_models().unwrap().is_empty());

        write_model(&cache, ModelKind::U2netp, b"12345");
        write_model(&cache, ModelKind::IsnetAnime, b"1");
        fs::write(cache.cache_dir().join("notes.txt"), b"ignored").unwrap();

        let models = cache.scan_cached_models().unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.kind.name()).collect();
        assert_eq!(names, vec!["isnet-anime", "u2netp"]);
        assert_eq!(models[1].size_bytes, 5);
        assert!(!models[1].verified);
    }

    #[test]
    fn test_clear_models() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        write_model(&cache, ModelKind::U2net, b"a");
        fs::write(cache.checksum_path(ModelKind::U2net), "x").unwrap();
        write_model(&cache, ModelKind::U2netp, b"b");

        assert!(cache.clear_model(ModelKind::U2net).unwrap());
        assert!(!cache.model_path(ModelKind::U2net).exists());
        assert!(!cache.checksum_path(ModelKind::U2net).exists());
        assert!(!cache.clear_model(ModelKind::U2net).unwrap());

        let removed = cache.clear_all_models().unwrap();
        assert_eq!(removed, vec![ModelKind::U2netp]);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_sha256_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        fs::write(&path, b"").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(sha256_file(&temp_dir.path().join("missing")).is_err());
    }
}
