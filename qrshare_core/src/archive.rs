//! Artifact preparation: turns the shared paths into one servable file.

use crate::error::ArchiveError;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const ARCHIVE_PREFIX: &str = "qrshare-";
const ARCHIVE_SUFFIX: &str = ".zip";

/// The file a session serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Absolute path of the bytes to serve
    pub path: PathBuf,
    /// Whether the file was created by us and must be removed afterwards
    pub is_temporary: bool,
}

/// Name offered to the downloading client for the artifact at `path`
pub fn download_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "download.bin".to_string())
}

impl Artifact {
    pub fn file_name(&self) -> String {
        download_name(&self.path)
    }

    /// Delete the artifact if it is temporary
    pub fn cleanup(&self) -> io::Result<()> {
        if !self.is_temporary {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Removed temporary archive {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Resolve `paths` into a single artifact.
///
/// A lone regular file is served as-is unless `force_zip` is set. Anything
/// else (several paths, or a directory) is packed into a deflate-compressed
/// zip in the system temp directory.
pub fn build_artifact(paths: &[PathBuf], force_zip: bool) -> Result<Artifact, ArchiveError> {
    if let [single] = paths {
        if !force_zip && single.is_file() {
            // Served in place: keep the caller's path, only anchored to the cwd
            return Ok(Artifact {
                path: std::path::absolute(single)?,
                is_temporary: false,
            });
        }
    }

    let inputs = paths
        .iter()
        .map(|p| fs::canonicalize(p).map_err(|_| ArchiveError::NotFound(p.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tmp = tempfile::Builder::new()
        .prefix(ARCHIVE_PREFIX)
        .suffix(ARCHIVE_SUFFIX)
        .tempfile()?;

    let mut writer = ZipWriter::new(tmp.as_file_mut());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut seen = HashSet::new();

    for input in &inputs {
        if input.is_dir() {
            let root = input.parent().unwrap_or(input);
            for file in collect_files(input)? {
                add_file(&mut writer, options, &mut seen, &file, &entry_name(root, &file))?;
            }
        } else {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "file".to_string());
            add_file(&mut writer, options, &mut seen, input, &name)?;
        }
    }
    writer.finish()?;

    let (_, path) = tmp.keep().map_err(|e| ArchiveError::Io(e.error))?;
    tracing::info!(
        "Packed {} path(s) into temporary archive {}",
        inputs.len(),
        path.display()
    );

    Ok(Artifact {
        path,
        is_temporary: true,
    })
}

/// Async wrapper running [`build_artifact`] on the blocking pool
pub async fn prepare_artifact(
    paths: Vec<PathBuf>,
    force_zip: bool,
) -> Result<Artifact, ArchiveError> {
    tokio::task::spawn_blocking(move || build_artifact(&paths, force_zip)).await?
}

fn add_file<W: io::Write + io::Seek>(
    writer: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    seen: &mut HashSet<String>,
    path: &Path,
    name: &str,
) -> Result<(), ArchiveError> {
    if !seen.insert(name.to_string()) {
        tracing::warn!("Skipping duplicate archive entry {}", name);
        return Ok(());
    }
    let mut source = File::open(path)?;
    writer.start_file(name, options)?;
    io::copy(&mut source, writer)?;
    Ok(())
}

/// Every regular file below `dir`, in a stable order.
///
/// Symlinks to files are included; symlinked directories are not descended.
fn collect_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();

    let mut files = Vec::new();
    for path in entries {
        let file_type = fs::symlink_metadata(&path)?.file_type();
        if file_type.is_dir() {
            files.extend(collect_files(&path)?);
        } else if file_type.is_file() {
            files.push(path);
        } else if file_type.is_symlink() {
            match fs::metadata(&path) {
                Ok(target) if target.is_file() => files.push(path),
                Ok(_) => tracing::debug!("Not following directory link {}", path.display()),
                Err(e) => tracing::warn!("Skipping broken link {}: {}", path.display(), e),
            }
        }
    }
    Ok(files)
}

/// Zip entry name: `file` relative to `root`, always `/`-separated
fn entry_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
