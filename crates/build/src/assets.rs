//! Content-hashed build assets and writing them to disk.

use crate::error::BuildError;
use crate::manifest::{SITE_MANIFEST_FILE, SiteManifest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Hex digits of the content hash kept in file names.
pub const HASH_LEN: usize = 8;

/// Output layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOptions {
    /// Directory (relative to the output root) assets are written to.
    pub assets_dir: String,
    /// Public URL prefix prepended to asset paths in manifests.
    pub base: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            assets_dir: "assets".to_string(),
            base: "/".to_string(),
        }
    }
}

impl BuildOptions {
    /// Public path of an asset file name.
    pub fn public_path(&self, file_name: &str) -> String {
        let base = self.base.trim_end_matches('/');
        let dir = self.assets_dir.trim_matches('/');
        if dir.is_empty() {
            format!("{}/{}", base, file_name)
        } else {
            format!("{}/{}/{}", base, dir, file_name)
        }
    }
}

/// First [`HASH_LEN`] hex digits of the SHA-256 of `content`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    hex::encode(digest)[..HASH_LEN].to_string()
}

/// `{stem}.{hash}.{ext}`.
pub fn hashed_file_name(stem: &str, ext: &str, content: &str) -> String {
    format!("{}.{}.{}", stem, content_hash(content), ext)
}

/// Asset files keyed by public path. Identical content under the same stem
/// collapses into one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSet {
    files: BTreeMap<String, String>,
}

impl AssetSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a content-hashed asset and returns its public path.
    pub fn add(&mut self, options: &BuildOptions, stem: &str, ext: &str, content: String) -> String {
        let path = options.public_path(&hashed_file_name(stem, ext, &content));
        self.files.entry(path.clone()).or_insert(content);
        path
    }

    /// Merges another set in.
    pub fn extend(&mut self, other: AssetSet) {
        self.files.extend(other.files);
    }

    /// Content of an asset.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Assets in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.files.iter()
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Writes every asset and the site manifest under `out_dir`.
///
/// Public paths are written relative to `out_dir` with the leading base
/// stripped.
pub fn write_assets(
    out_dir: &Path,
    options: &BuildOptions,
    assets: &AssetSet,
    manifest: &SiteManifest,
) -> Result<(), BuildError> {
    fs::create_dir_all(out_dir).map_err(|e| BuildError::io(out_dir, e))?;

    let base = options.base.trim_end_matches('/');
    for (public, content) in assets.iter() {
        let relative = public
            .strip_prefix(base)
            .unwrap_or(public)
            .trim_start_matches('/');
        let path = out_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| BuildError::io(&path, e))?;
    }

    let manifest_path = out_dir.join(SITE_MANIFEST_FILE);
    fs::write(&manifest_path, manifest.to_json()?).map_err(|e| BuildError::io(&manifest_path, e))?;
    log::debug!(
        "wrote {} asset(s) and {} to {}",
        assets.len(),
        SITE_MANIFEST_FILE,
        out_dir.display()
    );
    Ok(())
}
