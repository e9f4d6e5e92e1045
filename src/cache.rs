//! Optimization cache for incremental releases.
//!
//! Re-encoding every image on every release is the slowest part of the
//! pipeline. This module lets `image-optimize` skip files whose source bytes
//! and optimization parameters haven't changed since the last run.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: lookups are by the combination of
//! `source_hash` and `params_hash`, not by output path. Renaming or moving an
//! image under `src/images/` does not force a re-encode; the previous output
//! is copied to the new location instead.
//!
//! - **`source_hash`**: SHA-256 of the source file contents. Content-based
//!   rather than mtime-based so it survives `git checkout`.
//! - **`params_hash`**: SHA-256 of the optimization parameters (quality).
//!
//! A cache hit requires:
//! 1. An entry with matching `source_hash` and `params_hash` exists
//! 2. The previously-written output file still exists on disk
//!
//! The caller's own output path is checked first, so several sources with
//! identical bytes each keep their own entry. Entries for outputs whose
//! source is gone are dropped with [`CacheManifest::retain_outputs`].
//!
//! ## Storage
//!
//! The manifest is a JSON file at `public/imgs/.optimize-cache.json`, next to
//! the optimized images it describes. A missing, corrupt or
//! version-mismatched file loads as an empty manifest.
//!
//! ## Bypassing the cache
//!
//! `--no-cache` loads an empty manifest, so every image is re-encoded and
//! the old outputs are overwritten.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache manifest file within the optimized image directory.
const MANIFEST_FILENAME: &str = ".optimize-cache.json";

/// Bump to invalidate all existing caches when the format or key computation
/// changes.
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub source_hash: String,
    pub params_hash: String,
}

/// On-disk manifest mapping output paths (relative, `/`-separated) to their
/// cache entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
    /// `"{source_hash}:{params_hash}"` → output path. Rebuilt on load.
    #[serde(skip)]
    content_index: HashMap<String, String>,
}

impl CacheManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
            content_index: HashMap::new(),
        }
    }

    /// Load from `dir`. Returns an empty manifest if the file doesn't exist
    /// or can't be parsed.
    pub fn load(dir: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(manifest_path(dir)) else {
            return Self::empty();
        };
        let mut manifest: Self = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(_) => return Self::empty(),
        };
        if manifest.version != MANIFEST_VERSION {
            return Self::empty();
        }
        manifest.content_index = build_content_index(&manifest.entries);
        manifest
    }

    pub fn save(&self, dir: &Path) -> io::Result<()> {
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(dir), json)
    }

    /// Look up a previous output by content hashes.
    ///
    /// Returns `output_path` itself when its entry matches and the file is on
    /// disk under `dir`. Otherwise returns any other stored output with the
    /// same hashes that is still on disk, which is where a moved or
    /// duplicated source can be copied from.
    pub fn find_cached(
        &self,
        output_path: &str,
        source_hash: &str,
        params_hash: &str,
        dir: &Path,
    ) -> Option<String> {
        if let Some(entry) = self.entries.get(output_path)
            && entry.source_hash == source_hash
            && entry.params_hash == params_hash
            && dir.join(output_path).exists()
        {
            return Some(output_path.to_string());
        }
        let stored = self
            .content_index
            .get(&content_key(source_hash, params_hash))?;
        dir.join(stored).exists().then(|| stored.clone())
    }

    /// Record an entry for `output_path`.
    pub fn insert(&mut self, output_path: String, source_hash: String, params_hash: String) {
        self.content_index
            .insert(content_key(&source_hash, &params_hash), output_path.clone());
        self.entries.insert(
            output_path,
            CacheEntry {
                source_hash,
                params_hash,
            },
        );
    }

    /// Drop entries whose output path fails `keep`.
    pub fn retain_outputs(&mut self, keep: impl Fn(&str) -> bool) {
        self.entries.retain(|path, _| keep(path));
        self.content_index = build_content_index(&self.entries);
    }
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{source_hash}:{params_hash}")
}

fn build_content_index(entries: &HashMap<String, CacheEntry>) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(path, entry)| {
            (
                content_key(&entry.source_hash, &entry.params_hash),
                path.clone(),
            )
        })
        .collect()
}

/// SHA-256 of a byte buffer, as hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of the optimization parameters.
pub fn hash_optimize_params(quality: u8) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"optimize\0");
    hasher.update([quality]);
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for one `image-optimize` run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub copies: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn copy(&mut self) {
        self.copies += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.copies + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.hits, self.copies) {
            (0, 0) => write!(f, "{} optimized", self.misses),
            (_, 0) => write!(
                f,
                "{} cached, {} optimized ({} total)",
                self.hits,
                self.misses,
                self.total()
            ),
            _ => write!(
                f,
                "{} cached, {} copied, {} optimized ({} total)",
                self.hits,
                self.copies,
                self.misses,
                self.total()
            ),
        }
    }
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILENAME)
}

/// True for the manifest file itself, so tree copies can leave it out.
pub fn is_manifest(relative: &Path) -> bool {
    relative.file_name().is_some_and(|n| n == MANIFEST_FILENAME)
}
