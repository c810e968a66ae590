use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::progress::CancelToken;

/// Extracts every file entry of a zip archive under `destination`, overwriting existing
/// files. Progress is reported per entry; an archive without files reports 100 once.
pub fn extract_zip(
    archive_path: &Path,
    destination: &Path,
    progress: &mut dyn FnMut(u8),
    cancel: &CancelToken,
) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("failed to read zip archive: {}", archive_path.display()))?;

    let mut file_indices = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index).with_context(|| {
            format!(
                "failed to read entry {index} of {}",
                archive_path.display()
            )
        })?;
        if !entry.is_dir() {
            file_indices.push(index);
        }
    }

    fs::create_dir_all(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;

    let total = file_indices.len();
    if total == 0 {
        progress(100);
        return Ok(0);
    }

    for (processed, index) in file_indices.into_iter().enumerate() {
        cancel.check()?;
        let mut entry = archive.by_index(index).with_context(|| {
            format!(
                "failed to read entry {index} of {}",
                archive_path.display()
            )
        })?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            anyhow!(
                "archive entry escapes the install directory: {}",
                entry.name()
            )
        })?;
        let out_path = destination.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut out = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract {}", out_path.display()))?;
        restore_unix_mode(&out_path, entry.unix_mode())?;

        let percent = (processed + 1) * 100 / total;
        progress(percent as u8);
    }

    debug!(
        archive = %archive_path.display(),
        destination = %destination.display(),
        files = total,
        "archive extracted"
    );
    Ok(total)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(unix)]
fn restore_unix_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode.map(|mode| mode & 0o777).filter(|mode| *mode != 0) else {
        return Ok(());
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restore_unix_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}
