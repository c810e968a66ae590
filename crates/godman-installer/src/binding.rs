use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use godman_core::{InstallEntry, Platform, Scope};
use tracing::{debug, info};

use crate::binary::locate_engine_binary;
use crate::fs_utils::{make_executable, remove_file_if_exists};
use crate::layout::AppPaths;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindOptions {
    pub dry_run: bool,
    pub create_desktop_shortcut: bool,
}

/// Exposes one install as the `godot` command plus the managed environment variable, and
/// takes that exposure back down.
pub trait EnvironmentBinding {
    fn apply(&self, entry: &InstallEntry, options: BindOptions) -> Result<()>;

    /// Reverses [`EnvironmentBinding::apply`] for `scope`. `entry` is used for per-entry
    /// artifacts such as shortcuts and may be absent when the active pointer dangles.
    fn remove(&self, scope: Scope, entry: Option<&InstallEntry>) -> Result<()>;
}

/// Shell-script binding: an `env.sh` export file plus an executable `godot` script.
#[derive(Debug, Clone)]
pub struct UnixBinding {
    paths: AppPaths,
}

impl UnixBinding {
    pub fn new(paths: AppPaths) -> Self {
        Self { paths }
    }

    fn env_script_path(&self) -> std::path::PathBuf {
        self.paths
            .env_script_path()
            .unwrap_or_else(|| self.paths.config_dir().join("env.sh"))
    }
}

impl EnvironmentBinding for UnixBinding {
    fn apply(&self, entry: &InstallEntry, options: BindOptions) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }

        let env_script = self.env_script_path();
        if let Some(parent) = env_script.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(
            &env_script,
            render_env_script(self.paths.env_var_name(), &entry.path),
        )
        .with_context(|| format!("failed to write env script: {}", env_script.display()))?;

        let binary = locate_engine_binary(&entry.path, Platform::Linux);
        let shim_dir = self.paths.shim_dir(entry.scope);
        fs::create_dir_all(shim_dir)
            .with_context(|| format!("failed to create shim dir: {}", shim_dir.display()))?;
        let shim_path = self.paths.shim_path(entry.scope);
        fs::write(&shim_path, render_unix_shim(&env_script, &binary))
            .with_context(|| format!("failed to write shim: {}", shim_path.display()))?;
        make_executable(&shim_path)
            .with_context(|| format!("failed to mark shim executable: {}", shim_path.display()))?;

        info!(
            shim = %shim_path.display(),
            target = %binary.display(),
            "unix binding applied"
        );
        Ok(())
    }

    fn remove(&self, scope: Scope, _entry: Option<&InstallEntry>) -> Result<()> {
        let env_script = self.env_script_path();
        remove_file_if_exists(&env_script)
            .with_context(|| format!("failed to remove env script: {}", env_script.display()))?;

        let shim_path = self.paths.shim_path(scope);
        let removed = remove_file_if_exists(&shim_path)
            .with_context(|| format!("failed to remove shim: {}", shim_path.display()))?;
        debug!(shim = %shim_path.display(), removed, "unix binding removed");
        Ok(())
    }
}

pub(crate) fn render_env_script(var_name: &str, install_dir: &Path) -> String {
    format!(
        "export {var_name}=\"{}\"\n",
        escape_double_quoted(&install_dir.to_string_lossy())
    )
}

pub(crate) fn render_unix_shim(env_script: &Path, binary: &Path) -> String {
    format!(
        "#!/usr/bin/env bash\nsource \"{}\" 2>/dev/null\nexec \"{}\" \"$@\"\n",
        escape_double_quoted(&env_script.to_string_lossy()),
        escape_double_quoted(&binary.to_string_lossy())
    )
}

pub(crate) fn render_windows_shim(binary: &Path) -> String {
    format!("@echo off\r\n\"{}\" %*\r\n", binary.display())
}

fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
