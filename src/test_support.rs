// src/test_support.rs

//! Fixtures shared by unit tests

use crate::config::RepoConfig;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub(crate) fn control_text(package: &str, version: &str) -> String {
    format!(
        "Package: {package}\n\
         Name: {package} tweak\n\
         Version: {version}\n\
         Architecture: iphoneos-arm\n\
         Section: Tweaks\n"
    )
}

fn gzip_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    let tar_data = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_data).unwrap();
    encoder.finish().unwrap()
}

/// Write a minimal .deb whose control file is `control`
pub(crate) fn write_deb(path: &Path, control: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    let members = [
        ("debian-binary", b"2.0\n".to_vec()),
        ("control.tar.gz", gzip_tar(&[("./control", control.as_bytes())])),
        ("data.tar.gz", gzip_tar(&[("./usr/bin/tool", b"payload")])),
    ];

    let mut builder = ar::Builder::new(File::create(path).unwrap());
    for (name, data) in members {
        let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        builder.append(&header, data.as_slice()).unwrap();
    }
}

/// Configuration rooted in a temporary directory
pub(crate) fn test_config(root: &Path) -> RepoConfig {
    let mut config = RepoConfig::new("Test Repo".to_string(), "repo.example.com".to_string());
    config.description = "Test packages".to_string();
    config.build_folder = root.join("www");
    config.packages_folder = root.join("repo/packages");
    config.scratch_folder = root.join("tmp");
    config
}
