// src/packages/artifact.rs

//! One built archive of a package
//!
//! A `VersionedArtifact` ties a source .deb under the packages folder to the
//! patched copy published under `<build>/debs/`.

use crate::config::RepoConfig;
use crate::error::Result;
use crate::hash::{self, MultiHash};
use crate::packages::deb;
use crate::packages::manifest::ManifestRecord;
use crate::version::Version;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A single built package variant
#[derive(Debug, Clone)]
pub struct VersionedArtifact {
    archive_name: String,
    source_path: PathBuf,
    output_path: PathBuf,
    manifest: ManifestRecord,
    version: Version,
}

impl VersionedArtifact {
    /// Load the archive `archive_name` of group `group_name`
    pub fn construct(config: &RepoConfig, group_name: &str, archive_name: &str) -> Result<Self> {
        debug!("Loading deb {} for {}", archive_name, group_name);

        let source_path = config.packages_dir().join(group_name).join(archive_name);
        let output_path = config.debs_dir().join(archive_name);

        let text = deb::extract_manifest_text(&source_path)?;
        let manifest = ManifestRecord::parse(&text, &config.base_url())?;
        let version = Version::parse(manifest.version())?;

        Ok(Self {
            archive_name: archive_name.to_string(),
            source_path,
            output_path,
            manifest,
            version,
        })
    }

    /// Merge group metadata into the manifest
    ///
    /// The version is re-derived afterwards so it always matches the
    /// manifest's `Version` field.
    pub fn apply_meta(&mut self, meta: &Map<String, Value>) -> Result<()> {
        if meta.is_empty() {
            return Ok(());
        }
        let mut manifest = self.manifest.clone();
        manifest.merge(meta);
        self.version = Version::parse(manifest.version())?;
        self.manifest = manifest;
        Ok(())
    }

    /// Write the patched archive to its output path
    pub fn patch_and_publish(&self, config: &RepoConfig) -> Result<()> {
        deb::patch_manifest(
            &self.source_path,
            &self.manifest.to_text(&[]),
            &self.output_path,
            &config.scratch_folder,
        )
    }

    /// Digests of the published archive, read in one pass
    pub fn hashes(&self) -> Result<MultiHash> {
        Ok(hash::hash_file(&self.output_path)?)
    }

    /// Byte length of the published archive
    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.output_path)?.len())
    }

    /// Path of the archive relative to the repository root, as listed in Packages
    pub fn index_filename(&self) -> String {
        format!("./debs/{}", self.archive_name)
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn manifest(&self) -> &ManifestRecord {
        &self.manifest
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}
