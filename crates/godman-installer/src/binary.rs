use std::path::{Path, PathBuf};

use godman_core::Platform;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::fs_utils::make_executable;

const PRODUCT_PREFIX: &str = "godot";
const LINUX_CANDIDATE_NAMES: [&str; 4] = ["godot", "Godot", "Godot_v4", "Godot_v3"];

/// Finds the engine executable inside an install directory.
///
/// The folder name is tried first because it mirrors the archive name, then a prefix search
/// over the top level and one directory below it. When nothing matches, the expected
/// folder-derived path is returned so the shim still points somewhere meaningful.
pub fn locate_engine_binary(install_dir: &Path, platform: Platform) -> PathBuf {
    let folder = folder_name(install_dir);
    let expected = match platform {
        Platform::Windows => {
            if folder.to_ascii_lowercase().ends_with(".exe") {
                install_dir.join(&folder)
            } else {
                install_dir.join(format!("{folder}.exe"))
            }
        }
        Platform::Linux => install_dir.join(&folder),
    };
    if expected.is_file() {
        return expected;
    }

    if platform == Platform::Linux {
        let x86_64 = install_dir.join(format!("{folder}.x86_64"));
        if x86_64.is_file() {
            return x86_64;
        }
    }

    find_prefixed_binary(install_dir, platform, 2).unwrap_or(expected)
}

/// Grants execute permission to the extracted Linux engine binary. Returns the path that
/// was marked, or `None` when no candidate was found or the chmod failed.
pub fn mark_engine_executable_best_effort(install_dir: &Path) -> Option<PathBuf> {
    let folder = folder_name(install_dir);
    let candidate = LINUX_CANDIDATE_NAMES
        .iter()
        .map(|name| install_dir.join(name))
        .chain([
            install_dir.join(format!("{folder}.x86_64")),
            install_dir.join(&folder),
        ])
        .find(|path| path.is_file())
        .or_else(|| find_prefixed_binary(install_dir, Platform::Linux, usize::MAX));

    let Some(binary) = candidate else {
        debug!(dir = %install_dir.display(), "no engine binary found to mark executable");
        return None;
    };

    match make_executable(&binary) {
        Ok(()) => Some(binary),
        Err(err) => {
            warn!(path = %binary.display(), error = %err, "failed to mark engine executable");
            None
        }
    }
}

fn find_prefixed_binary(install_dir: &Path, platform: Platform, max_depth: usize) -> Option<PathBuf> {
    let mut matches = WalkDir::new(install_dir)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let lower = name.to_ascii_lowercase();
            if !lower.starts_with(PRODUCT_PREFIX) {
                return None;
            }
            if platform == Platform::Windows && !lower.ends_with(".exe") {
                return None;
            }
            let console = lower.contains("_console");
            Some((entry.depth(), console, name, entry.into_path()))
        })
        .collect::<Vec<_>>();

    matches.sort_by(|left, right| (left.0, left.1, &left.2).cmp(&(right.0, right.1, &right.2)));
    matches.into_iter().next().map(|(_, _, _, path)| path)
}

fn folder_name(install_dir: &Path) -> String {
    install_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
