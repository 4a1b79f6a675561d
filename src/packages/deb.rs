// src/packages/deb.rs

//! Debian package container handling
//!
//! A .deb is an AR archive holding `debian-binary`, a `control.tar.*` member
//! with the control file and maintainer scripts, and a `data.tar.*` payload.
//! This module reads the control file out of that container and rewrites it
//! without touching the payload.

use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tar::Archive;
use tracing::{debug, warn};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Accepted control tarball member names
const CONTROL_MEMBERS: [&str; 4] = [
    "control.tar.gz",
    "control.tar.xz",
    "control.tar.zst",
    "control.tar",
];

/// Compression of a control tarball, derived from its member name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Gzip,
    Xz,
    Zstd,
    Plain,
}

impl Codec {
    fn from_member_name(name: &str) -> Option<Self> {
        match name {
            "control.tar.gz" => Some(Self::Gzip),
            "control.tar.xz" => Some(Self::Xz),
            "control.tar.zst" => Some(Self::Zstd),
            "control.tar" => Some(Self::Plain),
            _ => None,
        }
    }

    fn decoder<'a>(self, data: &'a [u8]) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::Gzip => Box::new(GzDecoder::new(data)),
            Self::Xz => Box::new(XzDecoder::new(data)),
            Self::Zstd => Box::new(zstd::Decoder::new(data)?),
            Self::Plain => Box::new(data),
        })
    }

    fn encode(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Xz => {
                let mut encoder = XzEncoder::new(Vec::new(), 6);
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Zstd => zstd::encode_all(data, 0),
            Self::Plain => Ok(data.to_vec()),
        }
    }
}

/// AR member identifier without the GNU trailing slash
fn member_name(identifier: &[u8]) -> String {
    String::from_utf8_lossy(identifier)
        .trim_end()
        .trim_end_matches('/')
        .to_string()
}

fn is_control_entry(path: &Path) -> bool {
    path == Path::new("./control") || path == Path::new("control")
}

fn corrupt(path: &Path, reason: impl Into<String>) -> Error {
    Error::CorruptArchive {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn repack_failure(path: &Path, reason: impl Into<String>) -> Error {
    Error::RepackFailure {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Read the control file text embedded in a .deb
pub fn extract_manifest_text(archive_path: &Path) -> Result<String> {
    debug!("Extracting control file from {}", archive_path.display());

    let (codec, tar_data) = find_control_member(archive_path)?;
    let reader = codec
        .decoder(&tar_data)
        .map_err(|e| corrupt(archive_path, format!("Failed to decode control member: {}", e)))?;

    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| corrupt(archive_path, format!("Failed to read control.tar: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| corrupt(archive_path, format!("Failed to read entry: {}", e)))?;

        let entry_path = entry
            .path()
            .map_err(|e| corrupt(archive_path, format!("Failed to get entry path: {}", e)))?
            .into_owned();

        if is_control_entry(&entry_path) {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| corrupt(archive_path, format!("Failed to read control file: {}", e)))?;
            return Ok(content);
        }
    }

    Err(corrupt(archive_path, "No control file inside the control member"))
}

/// Locate the control tarball member in the AR container
fn find_control_member(archive_path: &Path) -> Result<(Codec, Vec<u8>)> {
    let file = File::open(archive_path)
        .map_err(|e| corrupt(archive_path, format!("Failed to open DEB file: {}", e)))?;

    let mut archive = ar::Archive::new(file);

    while let Some(entry) = archive.next_entry() {
        let mut entry =
            entry.map_err(|e| corrupt(archive_path, format!("Failed to read AR entry: {}", e)))?;

        let name = member_name(entry.header().identifier());
        if let Some(codec) = Codec::from_member_name(&name) {
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| corrupt(archive_path, format!("Failed to read {}: {}", name, e)))?;
            return Ok((codec, content));
        }
    }

    Err(corrupt(
        archive_path,
        format!("None of {} found in DEB archive", CONTROL_MEMBERS.join(", ")),
    ))
}

/// Header fields of one AR member, kept to rebuild the container
#[derive(Debug)]
struct UnpackedMember {
    name: String,
    mtime: u64,
    uid: u32,
    gid: u32,
    mode: u32,
}

/// Replace the control file of `archive_path`, writing the result to `output_path`
///
/// The archive is unpacked into a uniquely named directory under
/// `scratch_root`, the control member is rewritten, and the members are
/// packed again in their original order. All other members are copied
/// byte-for-byte. The scratch directory is removed whether or not the
/// repack succeeds.
pub fn patch_manifest(
    archive_path: &Path,
    manifest_text: &str,
    output_path: &Path,
    scratch_root: &Path,
) -> Result<()> {
    debug!(
        "Patching {} into {}",
        archive_path.display(),
        output_path.display()
    );

    fs::create_dir_all(scratch_root).map_err(|e| {
        repack_failure(
            archive_path,
            format!("Failed to create scratch root {}: {}", scratch_root.display(), e),
        )
    })?;

    let scratch = tempfile::Builder::new()
        .prefix("deb-patch-")
        .tempdir_in(scratch_root)
        .map_err(|e| repack_failure(archive_path, format!("Failed to create scratch dir: {}", e)))?;

    let members = unpack_members(archive_path, scratch.path())?;
    rewrite_control_member(archive_path, &members, scratch.path(), manifest_text)?;
    repack_members(archive_path, &members, scratch.path(), output_path)?;

    if let Err(e) = scratch.close() {
        warn!("Failed to remove scratch dir for {}: {}", archive_path.display(), e);
    }

    Ok(())
}

/// Write every AR member into `scratch` as a file named after the member
fn unpack_members(archive_path: &Path, scratch: &Path) -> Result<Vec<UnpackedMember>> {
    let file = File::open(archive_path)
        .map_err(|e| repack_failure(archive_path, format!("Failed to open DEB file: {}", e)))?;

    let mut archive = ar::Archive::new(file);
    let mut members = Vec::new();

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry
            .map_err(|e| repack_failure(archive_path, format!("Failed to read AR entry: {}", e)))?;

        let header = entry.header();
        let name = member_name(header.identifier());
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(repack_failure(
                archive_path,
                format!("Unsupported AR member name '{}'", name),
            ));
        }

        let member = UnpackedMember {
            name,
            mtime: header.mtime(),
            uid: header.uid(),
            gid: header.gid(),
            mode: header.mode(),
        };

        File::create(scratch.join(&member.name))
            .and_then(|mut out| io::copy(&mut entry, &mut out))
            .map_err(|e| {
                repack_failure(archive_path, format!("Failed to unpack {}: {}", member.name, e))
            })?;

        members.push(member);
    }

    debug!("Unpacked {} AR members", members.len());
    Ok(members)
}

/// Swap the control file inside the unpacked control tarball
fn rewrite_control_member(
    archive_path: &Path,
    members: &[UnpackedMember],
    scratch: &Path,
    manifest_text: &str,
) -> Result<()> {
    let (member, codec) = members
        .iter()
        .find_map(|m| Codec::from_member_name(&m.name).map(|codec| (m, codec)))
        .ok_or_else(|| repack_failure(archive_path, "No control member to patch"))?;

    let member_path = scratch.join(&member.name);

    fs::read(&member_path)
        .and_then(|original| rewrite_control_tar(codec, &original, manifest_text))
        .and_then(|rewritten| fs::write(&member_path, rewritten))
        .map_err(|e| {
            repack_failure(archive_path, format!("Failed to rewrite {}: {}", member.name, e))
        })
}

/// Re-encode a control tarball with `./control` replaced by `manifest_text`
fn rewrite_control_tar(
    codec: Codec,
    compressed: &[u8],
    manifest_text: &str,
) -> io::Result<Vec<u8>> {
    let mut archive = Archive::new(codec.decoder(compressed)?);
    let mut builder = tar::Builder::new(Vec::new());
    let mut replaced = false;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let mut header = entry.header().clone();
        let entry_path = entry.path()?.into_owned();

        let data = if is_control_entry(&entry_path) {
            replaced = true;
            header.set_size(manifest_text.len() as u64);
            manifest_text.as_bytes().to_vec()
        } else {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            data
        };

        // Short names live in the header itself; long ones need an extension record
        if header.path_bytes().as_ref() == entry.path_bytes().as_ref() {
            header.set_cksum();
            builder.append(&header, data.as_slice())?;
        } else {
            builder.append_data(&mut header, &entry_path, data.as_slice())?;
        }
    }

    if !replaced {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "control member has no control file",
        ));
    }

    let tar_data = builder.into_inner()?;
    codec.encode(&tar_data)
}

/// Pack the scratch members into a new AR archive at `output_path`
fn repack_members(
    archive_path: &Path,
    members: &[UnpackedMember],
    scratch: &Path,
    output_path: &Path,
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            repack_failure(
                archive_path,
                format!("Failed to create directory {}: {}", parent.display(), e),
            )
        })?;
    }

    // Write to a uniquely named sibling first, then persist it into place
    let parent = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_failure = |e: io::Error| {
        repack_failure(
            archive_path,
            format!("Failed to write {}: {}", output_path.display(), e),
        )
    };

    // Published files keep the source archive's mode, not the 0600 of a temp file
    let permissions = fs::metadata(archive_path)
        .map_err(|e| repack_failure(archive_path, format!("Failed to stat source: {}", e)))?
        .permissions();
    let mut staged = tempfile::Builder::new()
        .prefix(".debrepo-")
        .suffix(".deb")
        .permissions(permissions)
        .tempfile_in(parent)
        .map_err(write_failure)?;
    write_ar(members, scratch, staged.as_file_mut()).map_err(write_failure)?;
    staged
        .persist(output_path)
        .map_err(|e| write_failure(e.error))?;

    debug!("Repacked {} members into {}", members.len(), output_path.display());
    Ok(())
}

fn write_ar<W: Write>(members: &[UnpackedMember], scratch: &Path, dest: W) -> io::Result<()> {
    let mut builder = ar::Builder::new(BufWriter::new(dest));

    for member in members {
        let member_file = File::open(scratch.join(&member.name))?;
        let size = member_file.metadata()?.len();

        let mut header = ar::Header::new(member.name.clone().into_bytes(), size);
        header.set_mtime(member.mtime);
        header.set_uid(member.uid);
        header.set_gid(member.gid);
        header.set_mode(member.mode);

        builder.append(&header, member_file)?;
    }

    builder.into_inner()?.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const CONTROL: &str =
        "Package: com.example.tweak\nName: Example\nVersion: 1.0\nArchitecture: iphoneos-arm\n";

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_700_000_000);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn build_deb(path: &Path, control_member: (&str, Vec<u8>), data_tar: &[u8]) {
        let file = File::create(path).unwrap();
        let mut builder = ar::Builder::new(file);
        let members: Vec<(&str, Vec<u8>)> = vec![
            ("debian-binary", b"2.0\n".to_vec()),
            control_member,
            ("data.tar.gz", data_tar.to_vec()),
        ];
        for (name, data) in members {
            let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            header.set_mtime(1_700_000_000);
            header.set_mode(0o100644);
            builder.append(&header, data.as_slice()).unwrap();
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn read_member(path: &Path, wanted: &str) -> Vec<u8> {
        let mut archive = ar::Archive::new(File::open(path).unwrap());
        while let Some(entry) = archive.next_entry() {
            let mut entry = entry.unwrap();
            if member_name(entry.header().identifier()) == wanted {
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                return data;
            }
        }
        panic!("member {} not found", wanted);
    }

    fn sample_deb(dir: &TempDir, codec_member: &str) -> (PathBuf, Vec<u8>) {
        let control_tar = tar_bytes(&[
            ("./control", CONTROL.as_bytes()),
            ("./postinst", b"#!/bin/sh\nexit 0\n"),
        ]);
        let encoded = Codec::from_member_name(codec_member)
            .unwrap()
            .encode(&control_tar)
            .unwrap();
        let data_tar = gzip(&tar_bytes(&[("./usr/lib/tweak.dylib", b"\x7fpayload-bytes")]));

        let path = dir.path().join("tweak.deb");
        build_deb(&path, (codec_member, encoded), &data_tar);
        (path, data_tar)
    }

    #[test]
    fn test_extract_gzip_control() {
        let dir = TempDir::new().unwrap();
        let (path, _) = sample_deb(&dir, "control.tar.gz");
        assert_eq!(extract_manifest_text(&path).unwrap(), CONTROL);
    }

    #[test]
    fn test_extract_xz_and_zstd_control() {
        for member in ["control.tar.xz", "control.tar.zst", "control.tar"] {
            let dir = TempDir::new().unwrap();
            let (path, _) = sample_deb(&dir, member);
            assert_eq!(extract_manifest_text(&path).unwrap(), CONTROL, "{}", member);
        }
    }

    #[test]
    fn test_extract_not_an_archive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.deb");
        fs::write(&path, b"definitely not an ar archive").unwrap();

        assert!(matches!(
            extract_manifest_text(&path),
            Err(Error::CorruptArchive { .. })
        ));
    }

    #[test]
    fn test_extract_missing_control_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nocontrol.deb");
        build_deb(&path, ("other.tar.gz", gzip(b"")), &gzip(b""));

        assert!(matches!(
            extract_manifest_text(&path),
            Err(Error::CorruptArchive { .. })
        ));
    }

    #[test]
    fn test_extract_missing_control_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noentry.deb");
        let control_tar = gzip(&tar_bytes(&[("./postinst", b"exit 0\n")]));
        build_deb(&path, ("control.tar.gz", control_tar), &gzip(b""));

        assert!(matches!(
            extract_manifest_text(&path),
            Err(Error::CorruptArchive { .. })
        ));
    }

    #[test]
    fn test_patch_replaces_control_and_keeps_payload() {
        let dir = TempDir::new().unwrap();
        let (path, data_tar) = sample_deb(&dir, "control.tar.gz");
        let output = dir.path().join("out/debs/tweak.deb");
        let scratch = dir.path().join("scratch");
        let new_control = format!("{}Homepage: https://example.com\n", CONTROL);

        patch_manifest(&path, &new_control, &output, &scratch).unwrap();

        assert_eq!(extract_manifest_text(&output).unwrap(), new_control);
        assert_eq!(read_member(&output, "data.tar.gz"), data_tar);
        assert_eq!(read_member(&output, "debian-binary"), b"2.0\n");
    }

    #[test]
    fn test_patch_preserves_member_order_and_scripts() {
        let dir = TempDir::new().unwrap();
        let (path, _) = sample_deb(&dir, "control.tar.xz");
        let output = dir.path().join("patched.deb");

        patch_manifest(&path, CONTROL, &output, &dir.path().join("scratch")).unwrap();

        let mut archive = ar::Archive::new(File::open(&output).unwrap());
        let mut names = Vec::new();
        while let Some(entry) = archive.next_entry() {
            names.push(member_name(entry.unwrap().header().identifier()));
        }
        assert_eq!(names, vec!["debian-binary", "control.tar.xz", "data.tar.gz"]);

        let control_tar = read_member(&output, "control.tar.xz");
        let mut tar = Archive::new(Codec::Xz.decoder(&control_tar).unwrap());
        let paths: Vec<PathBuf> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().into_owned())
            .collect();
        assert!(paths.iter().any(|p| p.ends_with("postinst")));
    }

    #[test]
    fn test_patch_cleans_scratch() {
        let dir = TempDir::new().unwrap();
        let (path, _) = sample_deb(&dir, "control.tar.gz");
        let scratch = dir.path().join("scratch");

        patch_manifest(&path, CONTROL, &dir.path().join("a.deb"), &scratch).unwrap();
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_patch_failure_cleans_scratch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nocontrol.deb");
        build_deb(&path, ("other.tar.gz", gzip(b"")), &gzip(b""));
        let scratch = dir.path().join("scratch");

        let result = patch_manifest(&path, CONTROL, &dir.path().join("a.deb"), &scratch);
        assert!(matches!(result, Err(Error::RepackFailure { .. })));
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
        assert!(!dir.path().join("a.deb").exists());
    }

    #[test]
    fn test_patch_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (path, _) = sample_deb(&dir, "control.tar");
        let scratch = dir.path().join("scratch");
        let first = dir.path().join("first.deb");
        let second = dir.path().join("second.deb");

        patch_manifest(&path, CONTROL, &first, &scratch).unwrap();
        patch_manifest(&path, CONTROL, &second, &scratch).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_extract_non_utf8_control() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("binary.deb");
        let control_tar = gzip(&tar_bytes(&[("./control", b"Package: \xff\xfe")]));
        build_deb(&path, ("control.tar.gz", control_tar), &gzip(b""));

        assert!(matches!(
            extract_manifest_text(&path),
            Err(Error::CorruptArchive { .. })
        ));
    }

    #[test]
    fn test_patch_replaces_output_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let (path, _) = sample_deb(&dir, "control.tar.gz");
        let scratch = dir.path().join("scratch");
        let debs = dir.path().join("debs");
        let output = debs.join("tweak.deb");

        fs::create_dir_all(&debs).unwrap();
        fs::write(&output, b"stale").unwrap();
        patch_manifest(&path, CONTROL, &output, &scratch).unwrap();
        patch_manifest(&path, "Package: com.example.tweak\nVersion: 2.0\n", &output, &scratch)
            .unwrap();

        let names: Vec<_> = fs::read_dir(&debs)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("tweak.deb")]);
        assert!(extract_manifest_text(&output).unwrap().contains("Version: 2.0\n"));
    }

    #[cfg(unix)]
    #[test]
    fn test_patch_keeps_source_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let (path, _) = sample_deb(&dir, "control.tar.gz");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let output = dir.path().join("published.deb");

        patch_manifest(&path, CONTROL, &output, &dir.path().join("scratch")).unwrap();

        let mode = fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_member_name_strips_gnu_slash() {
        assert_eq!(member_name(b"control.tar.gz/"), "control.tar.gz");
        assert_eq!(member_name(b"debian-binary   "), "debian-binary");
    }
}
