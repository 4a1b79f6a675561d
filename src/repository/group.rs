// src/repository/group.rs

//! Package groups
//!
//! A group is one folder under the packages folder: every build of one
//! package plus its `meta/` folder (`info.json`, `changelog.json`,
//! `description.md`, `screenshots/`).

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::packages::artifact::VersionedArtifact;
use crate::packages::manifest::ManifestRecord;
use crate::repository::Skipped;
use crate::repository::changelog::{ChangelogEntry, ChangelogLedger};
use crate::version::Version;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const INFO_FILE: &str = "info.json";
const CHANGELOG_FILE: &str = "changelog.json";
const DESCRIPTION_FILE: &str = "description.md";
const SCREENSHOTS_DIR: &str = "screenshots";

/// Group metadata from `meta/info.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupInfo {
    #[serde(default)]
    pub featured: bool,
    /// Source code URL
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub min_ios: Option<String>,
    #[serde(default)]
    pub max_ios: Option<String>,
    /// Overrides merged into every control file of the group
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub control: Map<String, Value>,
}

impl GroupInfo {
    /// Load `info.json`, falling back to defaults when absent or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            debug!("No group info at {}", path.display());
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<Self>(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(info) => info,
            Err(e) => {
                warn!("Ignoring unreadable group info {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Human-readable compatibility range, e.g. "14.0 to 16.5"
    pub fn version_range(&self) -> Option<String> {
        let min = self.min_ios.as_deref().filter(|s| !s.trim().is_empty());
        let max = self.max_ios.as_deref().filter(|s| !s.trim().is_empty());

        match (min, max) {
            (Some(min), Some(max)) => Some(format!("{} to {}", min, max)),
            (Some(min), None) => Some(format!("{}+", min)),
            (None, Some(max)) => Some(format!("Up to {}", max)),
            (None, None) => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Metadata portion of a group view
#[derive(Debug, Clone, Serialize)]
pub struct InfoView {
    pub featured: bool,
    pub min_ios: Option<String>,
    pub max_ios: Option<String>,
    pub version_range: Option<String>,
    pub source: Option<String>,
}

/// Read-only structure handed to the rendering layer
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub folder: String,
    pub control: ManifestRecord,
    pub info: InfoView,
    pub changelog: Vec<ChangelogEntry>,
    pub screenshots: Vec<String>,
}

/// All builds of one logical package
#[derive(Debug)]
pub struct PackageGroup {
    name: String,
    artifacts: Vec<VersionedArtifact>,
    changelog: ChangelogLedger,
    info: GroupInfo,
    screenshots: Vec<String>,
}

impl PackageGroup {
    /// Load a group from its folder and the archive names found in it
    ///
    /// Corrupt archives are skipped and recorded in `skipped`. A missing
    /// essential field or invalid version in any archive fails the group, as
    /// does a group left with no archive. An out-of-order changelog is put to
    /// `operator`; if refused, the ordering fault is returned.
    pub fn construct(
        config: &RepoConfig,
        group_name: &str,
        archive_names: &[String],
        operator: &mut dyn Operator,
        skipped: &mut Vec<Skipped>,
    ) -> Result<Self> {
        debug!("Loading group {}", group_name);

        let mut artifacts = Vec::with_capacity(archive_names.len());
        for archive_name in archive_names {
            match VersionedArtifact::construct(config, group_name, archive_name) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e @ Error::CorruptArchive { .. }) => {
                    warn!("Skipping {} in {}: {}", archive_name, group_name, e);
                    skipped.push(Skipped::artifact(group_name, archive_name, &e));
                }
                Err(e) => return Err(e),
            }
        }

        if artifacts.is_empty() {
            return Err(Error::EmptyGroup(group_name.to_string()));
        }

        // Stable sort: equal versions keep discovery order
        artifacts.sort_by(|a, b| b.version().cmp(a.version()));

        let meta_dir = config.meta_dir(group_name);
        let info = GroupInfo::load(&meta_dir.join(INFO_FILE));
        for artifact in &mut artifacts {
            artifact.apply_meta(&info.control)?;
        }

        let changelog = ChangelogLedger::load(&meta_dir.join(CHANGELOG_FILE));
        if let Err(fault) = changelog.validate_order() {
            warn!("{}", fault);
            if !operator.accept_ordering_fault(group_name, &fault) {
                return Err(fault.into());
            }
            warn!("Continuing with out-of-order changelog for {}", group_name);
        }

        let screenshots = list_screenshots(&meta_dir.join(SCREENSHOTS_DIR));

        Ok(Self {
            name: group_name.to_string(),
            artifacts,
            changelog,
            info,
            screenshots,
        })
    }

    /// Reserve the published path of every build in `claimed`
    ///
    /// A build whose path another group already holds is dropped, logged and
    /// recorded in `skipped`. Fails with `EmptyGroup` when no build is left.
    pub fn claim_output_paths(
        &mut self,
        claimed: &mut HashMap<PathBuf, String>,
        skipped: &mut Vec<Skipped>,
    ) -> Result<()> {
        let name = &self.name;
        self.artifacts.retain(|artifact| {
            let Some(owner) = claimed.get(artifact.output_path()) else {
                claimed.insert(artifact.output_path().to_path_buf(), name.clone());
                return true;
            };

            let e = Error::OutputConflict {
                path: artifact.output_path().display().to_string(),
                group: owner.clone(),
            };
            warn!("Skipping {} in {}: {}", artifact.archive_name(), name, e);
            skipped.push(Skipped::artifact(name, artifact.archive_name(), &e));
            false
        });

        if self.artifacts.is_empty() {
            return Err(Error::EmptyGroup(self.name.clone()));
        }
        Ok(())
    }

    /// Manifest of the newest build
    pub fn canonical_manifest(&self) -> &ManifestRecord {
        self.artifacts[0].manifest()
    }

    /// Version needing a changelog entry, if the newest build is not recorded yet
    pub fn reconcile_changelog(&self) -> Option<Version> {
        let newest = self.artifacts.iter().map(VersionedArtifact::version).max()?;

        match self.changelog.latest_recorded_version() {
            Some(recorded) if recorded >= newest => None,
            _ => Some(newest.clone()),
        }
    }

    /// Record notes for `version` as the newest changelog entry
    pub fn record_changelog(&mut self, version: &Version, notes: &str) -> Result<()> {
        self.changelog.append(version, notes)
    }

    /// Patch and publish every build of the group
    ///
    /// Builds run in parallel; failures are logged, recorded in `skipped` and
    /// dropped. Fails with `EmptyGroup` when no build could be published.
    pub fn publish(mut self, config: &RepoConfig, skipped: &mut Vec<Skipped>) -> Result<Self> {
        let results: Vec<Result<()>> = self
            .artifacts
            .par_iter()
            .map(|artifact| artifact.patch_and_publish(config))
            .collect();

        let mut published = Vec::with_capacity(self.artifacts.len());
        for (artifact, result) in self.artifacts.into_iter().zip(results) {
            match result {
                Ok(()) => published.push(artifact),
                Err(e) => {
                    warn!("Skipping {} in {}: {}", artifact.archive_name(), self.name, e);
                    skipped.push(Skipped::artifact(&self.name, artifact.archive_name(), &e));
                }
            }
        }

        if published.is_empty() {
            return Err(Error::EmptyGroup(self.name));
        }

        info!("Published {} build(s) of {}", published.len(), self.name);
        self.artifacts = published;
        Ok(self)
    }

    /// Structure consumed by the rendering layer
    pub fn view(&self) -> GroupView {
        GroupView {
            folder: self.name.clone(),
            control: self.canonical_manifest().clone(),
            info: InfoView {
                featured: self.info.featured,
                min_ios: self.info.min_ios.clone(),
                max_ios: self.info.max_ios.clone(),
                version_range: self.info.version_range(),
                source: self.info.source().map(str::to_string),
            },
            changelog: self.changelog.entries().cloned().collect(),
            screenshots: self.screenshots.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds, newest first
    pub fn artifacts(&self) -> &[VersionedArtifact] {
        &self.artifacts
    }

    pub fn is_featured(&self) -> bool {
        self.info.featured
    }

    pub fn screenshots(&self) -> &[String] {
        &self.screenshots
    }
}

/// Screenshot file names, sorted
fn list_screenshots(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut screenshots: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.eq_ignore_ascii_case(".ds_store"))
        .collect();

    screenshots.sort();
    screenshots
}

/// Create the missing parts of a group's `meta/` folder
///
/// Existing files are left alone. Returns the meta folder path.
pub fn scaffold_group_meta(
    config: &RepoConfig,
    group_name: &str,
    display_name: &str,
) -> Result<PathBuf> {
    let meta_dir = config.meta_dir(group_name);
    fs::create_dir_all(meta_dir.join(SCREENSHOTS_DIR))?;

    let info_path = meta_dir.join(INFO_FILE);
    if !info_path.exists() {
        fs::write(&info_path, serde_json::to_string_pretty(&GroupInfo::default())?)?;
    }

    let changelog_path = meta_dir.join(CHANGELOG_FILE);
    if !changelog_path.exists() {
        fs::write(&changelog_path, "[]")?;
    }

    let description_path = meta_dir.join(DESCRIPTION_FILE);
    if !description_path.exists() {
        fs::write(
            &description_path,
            format!("# {}\n\nYour description here\n", display_name),
        )?;
    }

    info!("Meta folder for {} ready at {}", group_name, meta_dir.display());
    Ok(meta_dir)
}
