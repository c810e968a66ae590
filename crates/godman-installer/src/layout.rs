use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use godman_core::{Platform, Scope};
use godman_registry::REGISTRY_FILE_NAME;
use tracing::{debug, info, warn};

pub const ENV_VAR_NAME: &str = "GODOT_HOME";
pub const HOME_OVERRIDE_VAR: &str = "GODMAN_HOME";
pub const LEGACY_HOME_OVERRIDE_VAR: &str = "GODOT_MANAGER_HOME";
pub const GLOBAL_ROOT_OVERRIDE_VAR: &str = "GODMAN_GLOBAL_ROOT";
pub const LEGACY_GLOBAL_ROOT_OVERRIDE_VAR: &str = "GODOT_MANAGER_GLOBAL_ROOT";

const PRODUCT_DIR: &str = "godman";
const ENV_SCRIPT_FILE_NAME: &str = "env.sh";
const SETTINGS_FILE_NAME: &str = "config.toml";
const UNIX_GLOBAL_BIN: &str = "/usr/local/bin";
const WINDOWS_PROGRAM_FILES_FALLBACK: &str = r"C:\Program Files";

/// Every directory and file location the tool touches, for both scopes.
///
/// [`AppPaths::resolve`] is a pure function of the platform and the environment lookup it
/// is handed. [`AppPaths::prepare`] performs the one-time side effects: legacy migration
/// and eager directory creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    platform: Platform,
    config_dir: PathBuf,
    legacy_config_dir: PathBuf,
    user_install_root: PathBuf,
    user_shim_dir: PathBuf,
    global_install_root: PathBuf,
    global_shim_dir: PathBuf,
    overridden: bool,
}

impl AppPaths {
    pub fn resolve<F>(platform: Platform, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home_override = first_set(&lookup, &[HOME_OVERRIDE_VAR, LEGACY_HOME_OVERRIDE_VAR]);
        let global_override = first_set(
            &lookup,
            &[GLOBAL_ROOT_OVERRIDE_VAR, LEGACY_GLOBAL_ROOT_OVERRIDE_VAR],
        );
        let overridden = home_override.is_some() || global_override.is_some();

        match platform {
            Platform::Linux => {
                let home = match home_override {
                    Some(value) => PathBuf::from(value),
                    None => lookup("HOME")
                        .filter(|value| !value.trim().is_empty())
                        .map(PathBuf::from)
                        .ok_or_else(|| anyhow!("HOME is not set; cannot resolve user paths"))?,
                };
                let global = global_override
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(UNIX_GLOBAL_BIN));
                let user_shim_dir = home.join(".local").join("bin");

                Ok(Self {
                    platform,
                    config_dir: home.join(".config").join(PRODUCT_DIR),
                    legacy_config_dir: home.join(".config").join("godot-manager"),
                    user_install_root: user_shim_dir.join(PRODUCT_DIR),
                    user_shim_dir,
                    global_install_root: global.join(PRODUCT_DIR),
                    global_shim_dir: global,
                    overridden,
                })
            }
            Platform::Windows => {
                let app_data = match home_override {
                    Some(value) => PathBuf::from(value),
                    None => lookup("APPDATA")
                        .filter(|value| !value.trim().is_empty())
                        .map(PathBuf::from)
                        .ok_or_else(|| {
                            anyhow!("APPDATA is not set; cannot resolve Windows user paths")
                        })?,
                };
                let program_files = global_override
                    .or_else(|| lookup("ProgramFiles").filter(|value| !value.trim().is_empty()))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(WINDOWS_PROGRAM_FILES_FALLBACK));
                let config_dir = app_data.join(PRODUCT_DIR);
                let global_dir = program_files.join(PRODUCT_DIR);

                Ok(Self {
                    platform,
                    legacy_config_dir: app_data.join("GodotManager"),
                    user_install_root: config_dir.join("installs"),
                    user_shim_dir: config_dir.join("bin"),
                    config_dir,
                    global_install_root: global_dir.join("installs"),
                    global_shim_dir: global_dir.join("bin"),
                    overridden,
                })
            }
        }
    }

    pub fn from_env(platform: Platform) -> Result<Self> {
        Self::resolve(platform, |name| std::env::var(name).ok())
    }

    /// Resolves for the host platform and prepares the directory tree.
    pub fn discover() -> Result<Self> {
        let paths = Self::from_env(Platform::host())?;
        paths.prepare()?;
        Ok(paths)
    }

    pub fn prepare(&self) -> Result<()> {
        if !self.overridden {
            let _migrated = self.migrate_legacy_config_best_effort();
        }
        self.ensure_dirs()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn legacy_config_dir(&self) -> &Path {
        &self.legacy_config_dir
    }

    pub fn install_root(&self, scope: Scope) -> &Path {
        match scope {
            Scope::User => &self.user_install_root,
            Scope::Global => &self.global_install_root,
        }
    }

    pub fn shim_dir(&self, scope: Scope) -> &Path {
        match scope {
            Scope::User => &self.user_shim_dir,
            Scope::Global => &self.global_shim_dir,
        }
    }

    pub fn shim_path(&self, scope: Scope) -> PathBuf {
        self.shim_dir(scope).join(self.shim_file_name())
    }

    pub fn shim_file_name(&self) -> &'static str {
        match self.platform {
            Platform::Windows => "godot.cmd",
            Platform::Linux => "godot",
        }
    }

    /// Whether the shim directory belongs to this tool alone. Shared directories such as
    /// `~/.local/bin` only ever lose the shim file, never the directory.
    pub fn shim_dir_is_owned(&self) -> bool {
        self.platform == Platform::Windows
    }

    pub fn registry_path(&self) -> PathBuf {
        self.config_dir.join(REGISTRY_FILE_NAME)
    }

    pub fn env_script_path(&self) -> Option<PathBuf> {
        match self.platform {
            Platform::Linux => Some(self.config_dir.join(ENV_SCRIPT_FILE_NAME)),
            Platform::Windows => None,
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn env_var_name(&self) -> &'static str {
        ENV_VAR_NAME
    }

    fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.user_install_root,
            &self.user_shim_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        for dir in [&self.global_install_root, &self.global_shim_dir] {
            let _created = create_dir_best_effort(dir);
        }
        Ok(())
    }

    /// Moves the directory used by older releases into place, once. Returns whether a move
    /// happened; every failure leaves the legacy tree untouched.
    pub fn migrate_legacy_config_best_effort(&self) -> bool {
        if !self.legacy_config_dir.is_dir() || self.config_dir.exists() {
            return false;
        }

        if let Some(parent) = self.config_dir.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(
                    path = %parent.display(),
                    error = %err,
                    "legacy config migration skipped"
                );
                return false;
            }
        }

        match fs::rename(&self.legacy_config_dir, &self.config_dir) {
            Ok(()) => {
                info!(
                    from = %self.legacy_config_dir.display(),
                    to = %self.config_dir.display(),
                    "migrated legacy config directory"
                );
                true
            }
            Err(err) => {
                warn!(
                    from = %self.legacy_config_dir.display(),
                    error = %err,
                    "legacy config migration failed"
                );
                false
            }
        }
    }
}

fn first_set<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

fn create_dir_best_effort(dir: &Path) -> bool {
    match fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(err) => {
            debug!(path = %dir.display(), error = %err, "global directory not created");
            false
        }
    }
}
