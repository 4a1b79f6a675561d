// src/repository/mod.rs

//! Repository build pipeline
//!
//! This module provides functionality for:
//! - Discovering package groups under the packages folder
//! - Loading, patching and publishing every build of every group
//! - Keeping each group's changelog in step with its newest build
//! - Writing the `Packages`/`Release` index set

pub mod changelog;
pub mod group;
pub mod index;

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::operator::Operator;
use chrono::Local;
use group::{GroupView, PackageGroup};
use index::{IndexOutput, RepositoryIndexBuilder};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

const ARCHIVE_EXTENSION: &str = "deb";

/// Something left out of the build, and why
#[derive(Debug, Clone, Serialize)]
pub struct Skipped {
    pub group: String,
    /// Archive name, or `None` when the whole group was skipped
    pub artifact: Option<String>,
    pub reason: String,
}

impl Skipped {
    pub fn artifact(group: &str, artifact: &str, reason: &Error) -> Self {
        Self {
            group: group.to_string(),
            artifact: Some(artifact.to_string()),
            reason: reason.to_string(),
        }
    }

    pub fn group(group: &str, reason: &Error) -> Self {
        Self {
            group: group.to_string(),
            artifact: None,
            reason: reason.to_string(),
        }
    }
}

/// A group folder and the archives found in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredGroup {
    pub name: String,
    pub archives: Vec<String>,
}

/// Find every group folder holding at least one `.deb`
///
/// Groups and archives are sorted by name so the index order is stable
/// across runs.
pub fn discover_groups(config: &RepoConfig) -> Vec<DiscoveredGroup> {
    let root = config.packages_dir();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Packages folder {} is unreadable: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut folders: Vec<(String, PathBuf)> = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        if !path.is_dir() {
            warn!("'{}' isn't a folder, it shouldn't be inside {}", name, root.display());
            continue;
        }
        folders.push((name, path));
    }
    folders.sort();

    let mut groups = Vec::with_capacity(folders.len());
    for (name, path) in folders {
        let archives = match list_archives(&path) {
            Ok(archives) => archives,
            Err(e) => {
                warn!("Skipping group {}: {}", name, e);
                continue;
            }
        };

        if archives.is_empty() {
            warn!("'{}' has no deb in it", name);
            continue;
        }

        debug!("Discovered group {} with {} archive(s)", name, archives.len());
        groups.push(DiscoveredGroup { name, archives });
    }

    groups
}

fn list_archives(folder: &std::path::Path) -> std::io::Result<Vec<String>> {
    let mut archives = Vec::new();

    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ARCHIVE_EXTENSION) => archives.push(name),
            Some(_) => {}
            None => warn!("File with no extension shouldn't be there: {}", path.display()),
        }
    }

    archives.sort();
    Ok(archives)
}

/// Everything the rendering layer needs about the built repository
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryView {
    pub repo_name: String,
    pub description: String,
    pub base_url: String,
    pub tint: Option<String>,
    pub run_date: String,
    /// Package identifiers of the featured groups
    pub featured: Vec<String>,
    pub groups: Vec<GroupView>,
}

impl RepositoryView {
    fn new(config: &RepoConfig, builder: &RepositoryIndexBuilder<'_>, run_date: String) -> Self {
        Self {
            repo_name: config.repo_name.clone(),
            description: config.description.clone(),
            base_url: config.base_url(),
            tint: config.tint.clone(),
            run_date,
            featured: builder
                .featured()
                .map(|g| g.canonical_manifest().package().to_string())
                .collect(),
            groups: builder.groups().iter().map(PackageGroup::view).collect(),
        }
    }
}

/// Outcome of [`build_repository`]
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub index: IndexOutput,
    pub skipped: Vec<Skipped>,
    pub view: RepositoryView,
}

impl BuildReport {
    pub fn packages_path(&self) -> &std::path::Path {
        &self.index.packages
    }

    pub fn release_path(&self) -> &std::path::Path {
        &self.index.release
    }
}

/// Build the whole repository
///
/// Failures of single archives or groups are logged, recorded in the report
/// and do not stop the build. An ordering fault the operator refuses aborts
/// it.
pub fn build_repository(
    config: &RepoConfig,
    operator: &mut dyn Operator,
    rng: &mut dyn RngCore,
) -> Result<BuildReport> {
    let run_date = Local::now().format("%Y-%m-%d").to_string();

    let discovered = discover_groups(config);
    if discovered.is_empty() {
        warn!(
            "No package group found in {}, writing an empty index",
            config.packages_dir().display()
        );
    }

    fs::create_dir_all(config.debs_dir())?;

    let mut skipped = Vec::new();
    let mut groups = Vec::with_capacity(discovered.len());
    // Published path -> owning group, first discovered wins
    let mut claimed = HashMap::new();
    for found in &discovered {
        let constructed =
            PackageGroup::construct(config, &found.name, &found.archives, operator, &mut skipped)
                .and_then(|mut group| {
                    group.claim_output_paths(&mut claimed, &mut skipped)?;
                    Ok(group)
                });

        match constructed {
            Ok(group) => groups.push(group),
            Err(Error::OrderingFault(fault)) => {
                error!("Aborting build: {}", fault);
                return Err(fault.into());
            }
            Err(e) => {
                warn!("Skipping group {}: {}", found.name, e);
                skipped.push(Skipped::group(&found.name, &e));
            }
        }
    }

    for group in &mut groups {
        let Some(version) = group.reconcile_changelog() else {
            continue;
        };
        let Some(notes) = operator.changelog_notes(group.name(), &version) else {
            continue;
        };
        if let Err(e) = group.record_changelog(&version, &notes) {
            warn!("Could not record changelog of {}: {}", group.name(), e);
        }
    }

    let mut published = Vec::with_capacity(groups.len());
    for group in groups {
        let name = group.name().to_string();
        match group.publish(config, &mut skipped) {
            Ok(group) => published.push(group),
            Err(e) => {
                warn!("Skipping group {}: {}", name, e);
                skipped.push(Skipped::group(&name, &e));
            }
        }
    }

    let builder = RepositoryIndexBuilder::new(config, published, rng);
    let index = builder.write(&config.build_folder, &mut skipped)?;
    let view = RepositoryView::new(config, &builder, run_date);

    info!(
        "Built repository {} with {} group(s), {} skipped item(s)",
        config.repo_name,
        builder.groups().len(),
        skipped.len()
    );

    Ok(BuildReport {
        index,
        skipped,
        view,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Unattended;
    use crate::test_support::{control_text, test_config, write_deb};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    #[test]
    fn test_discover_groups_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let packages = config.packages_dir().to_path_buf();

        write_deb(&packages.join("zeta/z_2.deb"), &control_text("z", "2"));
        write_deb(&packages.join("zeta/z_1.deb"), &control_text("z", "1"));
        write_deb(&packages.join("alpha/a.deb"), &control_text("a", "1"));
        fs::write(packages.join("zeta/README"), "no extension").unwrap();
        fs::write(packages.join("zeta/notes.txt"), "ignored").unwrap();
        fs::create_dir_all(packages.join("empty/meta")).unwrap();
        fs::write(packages.join("stray.deb"), "not a group").unwrap();

        let groups = discover_groups(&config);
        assert_eq!(
            groups,
            vec![
                DiscoveredGroup {
                    name: "alpha".to_string(),
                    archives: vec!["a.deb".to_string()],
                },
                DiscoveredGroup {
                    name: "zeta".to_string(),
                    archives: vec!["z_1.deb".to_string(), "z_2.deb".to_string()],
                },
            ]
        );
    }

    #[test]
    fn test_discover_missing_folder() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        assert!(discover_groups(&config).is_empty());
    }

    #[test]
    fn test_empty_repository_writes_empty_index() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());

        let report = build_repository(
            &config,
            &mut Unattended::new(),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert_eq!(fs::read_to_string(report.packages_path()).unwrap(), "");
        assert!(report.release_path().is_file());
        assert!(report.view.featured.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_group_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let packages = config.packages_dir().to_path_buf();

        write_deb(&packages.join("good/good.deb"), &control_text("com.example.good", "1.0"));
        write_deb(&packages.join("bad/bad.deb"), "Package: com.example.bad\nVersion: 1.0\n");

        let report = build_repository(
            &config,
            &mut Unattended::new(),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].group, "bad");
        assert_eq!(report.skipped[0].artifact, None);

        let packages_text = fs::read_to_string(report.packages_path()).unwrap();
        assert!(packages_text.contains("Package: com.example.good\n"));
        assert!(!packages_text.contains("com.example.bad"));
        assert_eq!(report.view.featured, vec!["com.example.good".to_string()]);
        assert_eq!(report.view.run_date.len(), 10);
    }

    #[test]
    fn test_same_archive_name_in_two_groups() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let packages = config.packages_dir().to_path_buf();

        write_deb(&packages.join("aaa/package.deb"), &control_text("com.example.aaa", "1.0"));
        write_deb(&packages.join("bbb/package.deb"), &control_text("com.example.bbb", "2.0"));
        write_deb(&packages.join("bbb/bbb_2.1.deb"), &control_text("com.example.bbb", "2.1"));

        let report = build_repository(
            &config,
            &mut Unattended::new(),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].group, "bbb");
        assert_eq!(report.skipped[0].artifact.as_deref(), Some("package.deb"));

        let packages_text = fs::read_to_string(report.packages_path()).unwrap();
        assert_eq!(packages_text.matches("Filename: ./debs/package.deb\n").count(), 1);
        assert!(packages_text.contains("Filename: ./debs/bbb_2.1.deb\n"));

        let published = crate::packages::deb::extract_manifest_text(
            &config.debs_dir().join("package.deb"),
        )
        .unwrap();
        assert!(published.starts_with("Package: com.example.aaa\n"));
    }

    #[test]
    fn test_refused_ordering_fault_aborts_build() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        write_deb(
            &config.packages_dir().join("tweak/t.deb"),
            &control_text("com.example.tweak", "2.0"),
        );
        let meta = config.meta_dir("tweak");
        fs::create_dir_all(&meta).unwrap();
        fs::write(
            meta.join("changelog.json"),
            r#"[{"version": "2.0", "changes": ""}, {"version": "1.0", "changes": ""}]"#,
        )
        .unwrap();

        let result = build_repository(
            &config,
            &mut Unattended::new(),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(Error::OrderingFault(_))));
        assert!(!config.build_folder.join("Packages").exists());
    }
}
