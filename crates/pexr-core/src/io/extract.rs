//! Archive extraction module
//!
//! Handles the distribution container formats: zip (wheels, eggs, zip
//! sdists), tar.gz and plain tar.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;

/// Errors unpacking an archive.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Reading the archive or writing the tree failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Not a zip, tar or tar.gz by extension.
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// Corrupt archive, or an entry that would land outside the destination.
    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<zip::result::ZipError> for ExtractError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

/// Container format of an archive on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.whl`, `.egg`, `.zip`
    Zip,
    /// `.tar.gz`, `.tgz`
    TarGz,
    /// `.tar`
    Tar,
}

/// Detect archive format from file extension
pub fn detect_format(path: &Path) -> Option<ArchiveFormat> {
    let path_str = path.to_string_lossy().to_lowercase();

    if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if path_str.ends_with(".tar") {
        Some(ArchiveFormat::Tar)
    } else if path_str.ends_with(".zip")
        || path_str.ends_with(".whl")
        || path_str.ends_with(".egg")
    {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Reject absolute paths and `..` so entries cannot escape the destination.
fn safe_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Extract a tar.gz archive to a destination directory
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path)?;
    let gz_decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    extract_tar(gz_decoder, dest_dir)
}

/// Extract a tar archive from a reader.
///
/// Only regular files are written. Links are skipped, so no later entry can
/// be routed through one to land outside `dest_dir`.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        let entry_path = entry.path()?.into_owned();
        if !entry_type.is_file() {
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                tracing::debug!(path = %entry_path.display(), "skipping link in archive");
            }
            continue;
        }

        let relative_path = safe_relative(&entry_path).ok_or_else(|| {
            ExtractError::Archive(format!("Invalid path in archive: {}", entry_path.display()))
        })?;
        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                entry_path.display()
            )));
        }
        extracted.push(relative_path);
    }

    Ok(extracted)
}

/// Extract a zip archive
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path)?;
    extract_zip_reader(BufReader::new(file), dest_dir, |_| true)
}

/// Extract the entries of a zip stream accepted by `filter`.
///
/// `filter` sees the archive-relative path; returning `false` skips the
/// entry. Used by the bundle runtime to pull a single subtree out of a bundle.
pub fn extract_zip_reader<R, F>(
    reader: R,
    dest_dir: &Path,
    mut filter: F,
) -> Result<Vec<PathBuf>, ExtractError>
where
    R: Read + io::Seek,
    F: FnMut(&Path) -> bool,
{
    let mut archive = ZipArchive::new(reader)?;
    fs::create_dir_all(dest_dir)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(relative_path) = file.enclosed_name() else {
            continue;
        };
        if !filter(&relative_path) {
            continue;
        }

        let absolute_path = dest_dir.join(&relative_path);
        if file.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o777))?;
        }

        extracted.push(relative_path);
    }

    Ok(extracted)
}

/// Extract an archive, auto-detecting format
pub fn extract_auto(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    match detect_format(archive_path) {
        Some(ArchiveFormat::TarGz) => extract_tar_gz(archive_path, dest_dir),
        Some(ArchiveFormat::Tar) => {
            let file = File::open(archive_path)?;
            extract_tar(BufReader::new(file), dest_dir)
        }
        Some(ArchiveFormat::Zip) => extract_zip(archive_path, dest_dir),
        None => Err(ExtractError::UnsupportedFormat(
            archive_path.display().to_string(),
        )),
    }
}

/// The single top-level directory of an unpacked sdist (`foo-1.0/`), or
/// `dir` itself when the archive was flat.
pub fn source_root(dir: &Path) -> io::Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn extracts_zip_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("foo-1.0-py3-none-any.whl");
        write_zip(&archive, &[("foo/__init__.py", b"x = 1\n")]);

        let dest = tmp.path().join("out");
        let files = extract_auto(&archive, &dest).unwrap();
        assert_eq!(files, vec![PathBuf::from("foo/__init__.py")]);
        assert_eq!(fs::read(dest.join("foo/__init__.py")).unwrap(), b"x = 1\n");
    }

    #[test]
    fn extracts_tar_gz_and_finds_source_root() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("foo-1.0.tar.gz");
        write_tar_gz(
            &archive,
            &[("foo-1.0/setup.py", b"print()"), ("foo-1.0/foo.py", b"")],
        );

        let dest = tmp.path().join("out");
        extract_auto(&archive, &dest).unwrap();
        assert_eq!(source_root(&dest).unwrap(), dest.join("foo-1.0"));
        assert!(dest.join("foo-1.0/setup.py").exists());
    }

    #[test]
    fn tar_links_cannot_redirect_later_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();

        let archive = tmp.path().join("evil-1.0.tar.gz");
        let file = File::create(&archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder.append_link(&mut link, "evil-1.0/link", &outside).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "evil-1.0/link/pwned.txt", &b"pwned"[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = tmp.path().join("out");
        let files = extract_auto(&archive, &dest).unwrap();
        assert_eq!(files, vec![PathBuf::from("evil-1.0/link/pwned.txt")]);
        assert!(!outside.join("pwned.txt").exists());
        assert!(dest.join("evil-1.0/link").is_dir());
        assert!(!fs::symlink_metadata(dest.join("evil-1.0/link")).unwrap().is_symlink());
    }

    #[test]
    fn tar_parent_paths_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil-1.0.tar");
        let mut builder = tar::Builder::new(File::create(&archive).unwrap());
        let mut header = tar::Header::new_old();
        let name = b"../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(1);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, &b"x"[..]).unwrap();
        builder.into_inner().unwrap();

        let dest = tmp.path().join("out");
        assert!(matches!(extract_auto(&archive, &dest), Err(ExtractError::Archive(_))));
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn zip_filter_selects_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bundle.zip");
        write_zip(&archive, &[("a/one.py", b"1"), ("b/two.py", b"2")]);

        let dest = tmp.path().join("out");
        let file = File::open(&archive).unwrap();
        extract_zip_reader(file, &dest, |p| p.starts_with("a")).unwrap();
        assert!(dest.join("a/one.py").exists());
        assert!(!dest.join("b/two.py").exists());
    }

    #[test]
    fn rejects_unknown_formats_and_escaping_paths() {
        assert!(matches!(
            extract_auto(Path::new("foo.rar"), Path::new("/tmp/x")),
            Err(ExtractError::UnsupportedFormat(_))
        ));
        assert!(safe_relative(Path::new("../etc/passwd")).is_none());
        assert!(safe_relative(Path::new("/etc/passwd")).is_none());
        assert_eq!(
            safe_relative(Path::new("./a/b")),
            Some(PathBuf::from("a/b"))
        );
    }
}
