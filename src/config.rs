// src/config.rs

//! Repository settings
//!
//! Loaded once from `repo/settings.json` and passed by reference into every
//! component of a build.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "repo/settings.json";

/// Immutable repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    pub repo_name: String,
    #[serde(default)]
    pub description: String,
    /// Accent color used by the rendering layer (e.g. "#FC4C02")
    #[serde(default)]
    pub tint: Option<String>,
    #[serde(default)]
    pub https: bool,
    /// Domain the repository is hosted on, without scheme
    pub cname: String,
    #[serde(default)]
    pub maintainer: Option<Maintainer>,
    #[serde(default = "default_build_folder")]
    pub build_folder: PathBuf,
    #[serde(default = "default_packages_folder")]
    pub packages_folder: PathBuf,
    #[serde(default = "default_scratch_folder")]
    pub scratch_folder: PathBuf,
    #[serde(default)]
    pub release: ReleaseSettings,
}

/// Repository maintainer contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    pub email: String,
}

/// Fixed fields written at the top of the Release file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    /// Defaults to the repository name
    pub origin: Option<String>,
    /// Defaults to the repository name
    pub label: Option<String>,
    pub suite: String,
    pub version: String,
    pub codename: String,
    pub architectures: String,
    pub components: String,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            origin: None,
            label: None,
            suite: "stable".to_string(),
            version: "1.0".to_string(),
            codename: "ios".to_string(),
            architectures: "iphoneos-arm iphoneos-arm64".to_string(),
            components: "main".to_string(),
        }
    }
}

fn default_build_folder() -> PathBuf {
    PathBuf::from("www")
}

fn default_packages_folder() -> PathBuf {
    PathBuf::from("repo/packages")
}

fn default_scratch_folder() -> PathBuf {
    PathBuf::from("tmp")
}

impl RepoConfig {
    /// Create a configuration with default folders
    pub fn new(repo_name: String, cname: String) -> Self {
        Self {
            repo_name,
            description: String::new(),
            tint: None,
            https: false,
            cname,
            maintainer: None,
            build_folder: default_build_folder(),
            packages_folder: default_packages_folder(),
            scratch_folder: default_scratch_folder(),
            release: ReleaseSettings::default(),
        }
    }

    /// Load and validate settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading repository settings from {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read settings {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse settings {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check required fields are usable
    pub fn validate(&self) -> Result<()> {
        if self.repo_name.trim().is_empty() {
            return Err(Error::Config("repo_name must not be empty".to_string()));
        }
        if self.cname.trim().is_empty() {
            return Err(Error::Config("cname must not be empty".to_string()));
        }
        if self.cname.contains("://") {
            return Err(Error::Config(format!(
                "cname '{}' must be a bare domain, without scheme",
                self.cname
            )));
        }
        Ok(())
    }

    /// Full URL of the hosted repository, honoring the `https` flag
    pub fn base_url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}", scheme, self.cname.trim_end_matches('/'))
    }

    /// Folder holding one sub-folder per package group
    pub fn packages_dir(&self) -> &Path {
        &self.packages_folder
    }

    /// Folder the patched archives are published to
    pub fn debs_dir(&self) -> PathBuf {
        self.build_folder.join("debs")
    }

    /// Metadata folder of a group
    pub fn meta_dir(&self, group: &str) -> PathBuf {
        self.packages_folder.join(group).join("meta")
    }

    pub fn origin(&self) -> &str {
        self.release.origin.as_deref().unwrap_or(&self.repo_name)
    }

    pub fn label(&self) -> &str {
        self.release.label.as_deref().unwrap_or(&self.repo_name)
    }
}
