// src/repository/index.rs

//! Repository index generation
//!
//! Produces the files an APT client fetches first:
//! - `Packages`: every published control file with its size, digests and path
//! - `Packages.xz` / `Packages.bz2`: the same bytes, compressed
//! - `Release`: repository fields plus digests of the three index files

use crate::config::RepoConfig;
use crate::error::Result;
use crate::hash::{self, HashAlgorithm, MultiHash};
use crate::repository::Skipped;
use crate::repository::group::PackageGroup;
use bzip2::write::BzEncoder;
use rand::{Rng, RngCore};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use xz2::write::XzEncoder;

pub const PACKAGES_FILE: &str = "Packages";
pub const RELEASE_FILE: &str = "Release";

const XZ_PRESET: u32 = 6;

/// Compressed variants of `Packages`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCompression {
    Xz,
    Bzip2,
}

impl IndexCompression {
    pub const ALL: [IndexCompression; 2] = [Self::Xz, Self::Bzip2];

    pub fn filename(self) -> &'static str {
        match self {
            Self::Xz => "Packages.xz",
            Self::Bzip2 => "Packages.bz2",
        }
    }

    pub fn compress(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Xz => {
                let mut encoder = XzEncoder::new(Vec::new(), XZ_PRESET);
                encoder.write_all(raw)?;
                Ok(encoder.finish()?)
            }
            Self::Bzip2 => {
                let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(raw)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

/// Digests and size of one index file, as listed in `Release`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFileDigest {
    pub filename: String,
    pub size: u64,
    pub hashes: MultiHash,
}

impl IndexFileDigest {
    pub fn of_bytes(filename: &str, data: &[u8]) -> Result<Self> {
        Ok(Self {
            filename: filename.to_string(),
            size: data.len() as u64,
            hashes: hash::hash_reader(data)?,
        })
    }
}

/// Paths written by [`RepositoryIndexBuilder::write`]
#[derive(Debug, Clone)]
pub struct IndexOutput {
    pub packages: PathBuf,
    pub compressed: Vec<PathBuf>,
    pub release: PathBuf,
}

/// Pick featured entries from their flags
///
/// All flagged indices are returned. When none is flagged, exactly one index
/// is drawn uniformly from `rng`. Empty input selects nothing.
pub fn select_featured(flags: &[bool], rng: &mut dyn RngCore) -> Vec<usize> {
    let flagged: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter(|(_, featured)| **featured)
        .map(|(i, _)| i)
        .collect();

    if !flagged.is_empty() || flags.is_empty() {
        return flagged;
    }

    vec![rng.random_range(0..flags.len())]
}

/// Compress `raw` with every index compression, in `Release` order
pub fn compress_index(raw: &[u8]) -> Result<Vec<(IndexCompression, Vec<u8>)>> {
    let mut variants = Vec::with_capacity(IndexCompression::ALL.len());
    for compression in IndexCompression::ALL {
        variants.push((compression, compression.compress(raw)?));
    }
    Ok(variants)
}

/// One `Release` checksum block
///
/// ```text
/// SHA256:
///  <hash> <size> <filename>
/// ```
pub fn render_hash_block(algorithm: HashAlgorithm, files: &[IndexFileDigest]) -> String {
    let mut block = format!("{}:\n", algorithm.field_name());
    for file in files {
        block.push_str(&format!(
            " {} {} {}\n",
            file.hashes.get(algorithm),
            file.size,
            file.filename
        ));
    }
    block
}

/// Assembles the index files from the published groups
pub struct RepositoryIndexBuilder<'a> {
    config: &'a RepoConfig,
    groups: Vec<PackageGroup>,
    featured: Vec<usize>,
}

impl<'a> RepositoryIndexBuilder<'a> {
    /// Take ownership of the groups and pick the featured subset once
    pub fn new(config: &'a RepoConfig, groups: Vec<PackageGroup>, rng: &mut dyn RngCore) -> Self {
        let flags: Vec<bool> = groups.iter().map(PackageGroup::is_featured).collect();
        let featured = select_featured(&flags, rng);

        if !groups.is_empty() && !flags.iter().any(|f| *f) {
            debug!("No featured group flagged, picked {}", groups[featured[0]].name());
        }

        Self {
            config,
            groups,
            featured,
        }
    }

    pub fn groups(&self) -> &[PackageGroup] {
        &self.groups
    }

    /// Featured groups, in discovery order
    pub fn featured(&self) -> impl Iterator<Item = &PackageGroup> {
        self.featured.iter().map(|i| &self.groups[*i])
    }

    /// Text of the `Packages` file
    ///
    /// Groups in discovery order, builds newest first. A build whose published
    /// archive cannot be read is left out and recorded in `skipped`.
    pub fn build_package_index(&self, skipped: &mut Vec<Skipped>) -> String {
        let mut index = String::new();

        for group in &self.groups {
            for artifact in group.artifacts() {
                let digest = artifact.hashes().and_then(|hashes| Ok((hashes, artifact.size()?)));
                let (hashes, size) = match digest {
                    Ok(digest) => digest,
                    Err(e) => {
                        warn!(
                            "Leaving {} of {} out of the index: {}",
                            artifact.archive_name(),
                            group.name(),
                            e
                        );
                        skipped.push(Skipped::artifact(group.name(), artifact.archive_name(), &e));
                        continue;
                    }
                };

                let mut transient: Vec<(&str, String)> = hashes.fields();
                transient.push(("Size", size.to_string()));
                transient.push(("Filename", artifact.index_filename()));

                index.push_str(&artifact.manifest().to_text(&transient));
                index.push('\n');
            }
        }

        index
    }

    /// Text of the `Release` file for the given index files
    pub fn build_release_summary(&self, files: &[IndexFileDigest]) -> String {
        let release = &self.config.release;
        let mut summary = String::new();

        for (key, value) in [
            ("Origin", self.config.origin()),
            ("Label", self.config.label()),
            ("Suite", release.suite.as_str()),
            ("Version", release.version.as_str()),
            ("Codename", release.codename.as_str()),
            ("Architectures", release.architectures.as_str()),
            ("Components", release.components.as_str()),
            ("Description", self.config.description.as_str()),
        ] {
            summary.push_str(&format!("{}: {}\n", key, value));
        }
        summary.push('\n');

        for algorithm in HashAlgorithm::ALL {
            summary.push_str(&render_hash_block(algorithm, files));
            summary.push('\n');
        }

        summary
    }

    /// Write `Packages`, its compressed variants and `Release` to `dir`
    pub fn write(&self, dir: &Path, skipped: &mut Vec<Skipped>) -> Result<IndexOutput> {
        fs::create_dir_all(dir)?;

        let packages = self.build_package_index(skipped);
        let raw = packages.as_bytes();

        let packages_path = dir.join(PACKAGES_FILE);
        fs::write(&packages_path, raw)?;

        let mut digests = vec![IndexFileDigest::of_bytes(PACKAGES_FILE, raw)?];
        let mut compressed = Vec::new();
        for (compression, data) in compress_index(raw)? {
            let path = dir.join(compression.filename());
            fs::write(&path, &data)?;
            digests.push(IndexFileDigest::of_bytes(compression.filename(), &data)?);
            compressed.push(path);
        }

        let release_path = dir.join(RELEASE_FILE);
        fs::write(&release_path, self.build_release_summary(&digests))?;

        info!(
            "Wrote index for {} group(s) to {}",
            self.groups.len(),
            dir.display()
        );

        Ok(IndexOutput {
            packages: packages_path,
            compressed,
            release: release_path,
        })
    }

}
