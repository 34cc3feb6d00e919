use std::{
    ffi::OsString,
    fs::File,
    io,
    path::{Path, PathBuf},
};

use zip::{write::SimpleFileOptions, CompressionMethod, DateTime, ZipWriter};

use crate::pipeline::{BatchError, Packager};

/// Packages a statements directory as `<dir>.zip`.
///
/// Entries are stored by path relative to the directory, in sorted order and
/// with a fixed timestamp, so packaging the same files twice gives the same
/// archive. An existing archive at the target path is replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipPackager;

/// Archive path for a statements directory: the directory path plus `.zip`.
pub fn archive_path_for(dir: &Path) -> PathBuf {
    let mut s: OsString = dir.as_os_str().to_owned();
    s.push(".zip");
    PathBuf::from(s)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, PathBuf)>) -> io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((rel, path));
        }
    }
    Ok(())
}

fn package_error(zip_path: &Path, e: &dyn std::fmt::Display) -> BatchError {
    BatchError::Package(format!("{}: {e}", zip_path.display()))
}

fn write_archive(dir: &Path, zip_path: &Path) -> Result<usize, BatchError> {

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files).map_err(|e| package_error(zip_path, &e))?;

    if zip_path.exists() {
        std::fs::remove_file(zip_path).map_err(|e| package_error(zip_path, &e))?;
    }

    let file = File::create(zip_path).map_err(|e| package_error(zip_path, &e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (name, path) in &files {
        zip.start_file(name.as_str(), options).map_err(|e| package_error(zip_path, &e))?;
        let mut src = File::open(path).map_err(|e| package_error(zip_path, &e))?;
        io::copy(&mut src, &mut zip).map_err(|e| package_error(zip_path, &e))?;
    }
    zip.finish().map_err(|e| package_error(zip_path, &e))?;

    Ok(files.len())
}

impl Packager for ZipPackager {
    fn package_directory(&self, dir: &Path) -> Result<PathBuf, BatchError> {
        let zip_path = archive_path_for(dir);
        let entries = write_archive(dir, &zip_path)?;
        tracing::info!(archive = %zip_path.display(), entries, "statements packaged");
        Ok(zip_path)
    }
}
