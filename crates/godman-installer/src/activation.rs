use std::path::PathBuf;

use anyhow::Result;
use godman_core::{paths_equal_ignore_case, InstallEntry, InstallError, InstallRegistry, Scope};
use godman_registry::RegistryStore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::binding::BindOptions;
use crate::elevation::{ElevatedActivatePayload, ElevatedCleanPayload, ElevatedOperation};
use crate::fs_utils::{remove_dir_all_if_exists, remove_file_if_exists};
use crate::platform::PlatformAdapter;

/// What `activate --dry-run` would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPreview {
    pub entry: InstallEntry,
    pub current: Option<InstallEntry>,
    pub shim_path: PathBuf,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    pub entry: InstallEntry,
    pub was_active: bool,
    pub deleted: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanOutcome {
    Removed,
    Missing,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanItem {
    pub path: PathBuf,
    pub outcome: CleanOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub items: Vec<CleanItem>,
    pub delegated: bool,
}

impl CleanReport {
    pub fn failures(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, CleanOutcome::Failed(_)))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorReport {
    pub install_count: usize,
    pub active: Option<InstallEntry>,
    pub env_var_name: &'static str,
    pub process_env: Option<String>,
    pub persisted_env: Option<String>,
    pub shim_path: PathBuf,
    pub shim_exists: bool,
    pub active_dir_exists: Option<bool>,
    pub shim_dir_on_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanTargetKind {
    Dir,
    File,
}

/// Registry-level operations on existing installs.
pub struct ActivationService<'a> {
    platform: &'a dyn PlatformAdapter,
    store: RegistryStore,
}

impl<'a> ActivationService<'a> {
    pub fn new(platform: &'a dyn PlatformAdapter) -> Self {
        Self {
            store: RegistryStore::new(platform.paths().registry_path()),
            platform,
        }
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Accepts a full id or an unambiguous prefix of the short form.
    pub fn resolve_id(&self, text: &str) -> Result<Uuid> {
        let registry = self.store.load()?;
        registry.resolve_id(text).ok_or_else(|| {
            InstallError::NotFound {
                id: text.trim().to_string(),
            }
            .into()
        })
    }

    pub fn preview_activation(&self, id: Uuid) -> Result<ActivationPreview> {
        let registry = self.store.load()?;
        let entry = find_entry(&registry, id)?;
        let current = registry.get_active().cloned();
        let shim_path = self.platform.paths().shim_path(entry.scope);

        let mut actions = Vec::new();
        if let Some(current) = &current {
            actions.push(format!("remove bindings of {}", current.label()));
        }
        actions.push(format!(
            "set {} to {}",
            self.platform.paths().env_var_name(),
            entry.path.display()
        ));
        actions.push(format!("write shim {}", shim_path.display()));
        if self.platform.needs_elevation(entry.scope) {
            actions.push("request elevation for global scope".to_string());
        }

        Ok(ActivationPreview {
            entry,
            current,
            shim_path,
            actions,
        })
    }

    /// Makes `id` the active install. A dry run only checks that the entry exists.
    pub fn activate(&self, id: Uuid, options: BindOptions) -> Result<InstallEntry> {
        let mut registry = self.store.load()?;
        let entry = find_entry(&registry, id)?;
        if options.dry_run {
            return Ok(entry);
        }

        if self.platform.needs_elevation(entry.scope) {
            info!(id = %id, "handing activation to elevated process");
            self.platform
                .run_elevated(&ElevatedOperation::Activate(ElevatedActivatePayload {
                    id,
                    create_desktop_shortcut: options.create_desktop_shortcut,
                }))?;
            return find_entry(&self.store.load()?, id);
        }

        switch_active(self.platform, &self.store, &mut registry, &entry, options)?;
        find_entry(&registry, id)
    }

    /// Removes the active install's bindings and clears the pointer. Returns the entry that
    /// was active, if any.
    pub fn deactivate(&self) -> Result<Option<InstallEntry>> {
        let mut registry = self.store.load()?;
        let Some(active) = registry.get_active().cloned() else {
            if registry.active_id.is_some() {
                registry.clear_active();
                self.store.save(&registry)?;
            }
            return Ok(None);
        };

        self.platform
            .unbind_environment(active.scope, Some(&active))?;
        registry.clear_active();
        self.store.save(&registry)?;
        info!(id = %active.id, "deactivated");
        Ok(Some(active))
    }

    pub fn remove(&self, id: Uuid, delete_files: bool) -> Result<RemoveReport> {
        let mut registry = self.store.load()?;
        let entry = find_entry(&registry, id)?;
        let was_active = registry.active_id == Some(id);
        if was_active {
            self.platform.unbind_environment(entry.scope, Some(&entry))?;
        }
        registry.remove(id);
        self.store.save(&registry)?;

        let mut warnings = Vec::new();
        let mut deleted = false;
        if delete_files {
            match remove_dir_all_if_exists(&entry.path) {
                Ok(removed) => deleted = removed,
                Err(err) => {
                    warn!(path = %entry.path.display(), error = %err, "install directory not deleted");
                    warnings.push(format!(
                        "failed to delete {}: {err}",
                        entry.path.display()
                    ));
                }
            }
        }

        info!(id = %id, was_active, deleted, "removed install");
        Ok(RemoveReport {
            entry,
            was_active,
            deleted,
            warnings,
        })
    }

    /// Wipes every directory and shim this tool owns. When global targets exist and this
    /// process lacks privilege, the whole clean runs in the elevated child and the report
    /// reflects what is gone afterwards.
    pub fn clean(&self) -> Result<CleanReport> {
        let targets = self.clean_targets();
        let global_present = targets
            .iter()
            .any(|(scope, path, _)| *scope == Some(Scope::Global) && path.exists());
        if !(global_present && self.platform.needs_elevation(Scope::Global)) {
            return self.clean_direct();
        }

        let existed = targets
            .iter()
            .map(|(_, path, _)| (path.clone(), path.exists()))
            .collect::<Vec<_>>();
        self.platform
            .run_elevated(&ElevatedOperation::Clean(ElevatedCleanPayload {}))?;

        let items = existed
            .into_iter()
            .map(|(path, existed)| {
                let outcome = match (existed, path.exists()) {
                    (false, _) => CleanOutcome::Missing,
                    (true, false) => CleanOutcome::Removed,
                    (true, true) => CleanOutcome::Failed("still present after elevated clean".to_string()),
                };
                CleanItem { path, outcome }
            })
            .collect();
        Ok(CleanReport {
            items,
            delegated: true,
        })
    }

    /// In-process clean. The active binding is removed first, best-effort.
    pub fn clean_direct(&self) -> Result<CleanReport> {
        let _unbound = self.unbind_active_best_effort();

        let items = self
            .clean_targets()
            .into_iter()
            .map(|(_, path, kind)| {
                let result = match kind {
                    CleanTargetKind::Dir => remove_dir_all_if_exists(&path),
                    CleanTargetKind::File => remove_file_if_exists(&path),
                };
                let outcome = match result {
                    Ok(true) => CleanOutcome::Removed,
                    Ok(false) => CleanOutcome::Missing,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "clean target not removed");
                        CleanOutcome::Failed(err.to_string())
                    }
                };
                CleanItem { path, outcome }
            })
            .collect();

        Ok(CleanReport {
            items,
            delegated: false,
        })
    }

    pub fn doctor(&self) -> Result<DoctorReport> {
        self.doctor_with_env(|name| std::env::var(name).ok())
    }

    pub fn doctor_with_env<F>(&self, lookup: F) -> Result<DoctorReport>
    where
        F: Fn(&str) -> Option<String>,
    {
        let paths = self.platform.paths();
        let registry = self.store.load()?;
        let active = registry.get_active().cloned();
        let scope = active.as_ref().map(|entry| entry.scope).unwrap_or_default();
        let shim_path = paths.shim_path(scope);
        let shim_dir = paths.shim_dir(scope);
        let shim_dir_on_path = lookup("PATH")
            .map(|value| {
                std::env::split_paths(&value).any(|dir| paths_equal_ignore_case(&dir, shim_dir))
            })
            .unwrap_or(false);

        Ok(DoctorReport {
            install_count: registry.installs.len(),
            active_dir_exists: active.as_ref().map(|entry| entry.path.is_dir()),
            active,
            env_var_name: paths.env_var_name(),
            process_env: lookup(paths.env_var_name()).filter(|value| !value.is_empty()),
            persisted_env: self.platform.persisted_env_value(scope),
            shim_exists: shim_path.is_file(),
            shim_path,
            shim_dir_on_path,
        })
    }

    fn unbind_active_best_effort(&self) -> bool {
        let registry = match self.store.load() {
            Ok(registry) => registry,
            Err(err) => {
                warn!(error = %err, "registry unreadable, skipping unbind");
                return false;
            }
        };
        let Some(active) = registry.get_active() else {
            return true;
        };
        match self.platform.unbind_environment(active.scope, Some(active)) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to remove active bindings during clean");
                false
            }
        }
    }

    fn clean_targets(&self) -> Vec<(Option<Scope>, PathBuf, CleanTargetKind)> {
        let paths = self.platform.paths();
        let mut targets = vec![(None, paths.config_dir().to_path_buf(), CleanTargetKind::Dir)];
        for scope in [Scope::User, Scope::Global] {
            targets.push((
                Some(scope),
                paths.install_root(scope).to_path_buf(),
                CleanTargetKind::Dir,
            ));
            if paths.shim_dir_is_owned() {
                targets.push((
                    Some(scope),
                    paths.shim_dir(scope).to_path_buf(),
                    CleanTargetKind::Dir,
                ));
            } else {
                targets.push((Some(scope), paths.shim_path(scope), CleanTargetKind::File));
            }
        }
        targets
    }
}

/// Binds `entry` and persists it as the active install. The previous active entry's
/// bindings come off first since both share the scope's shim path.
pub(crate) fn switch_active(
    platform: &dyn PlatformAdapter,
    store: &RegistryStore,
    registry: &mut InstallRegistry,
    entry: &InstallEntry,
    options: BindOptions,
) -> Result<()> {
    if let Some(previous) = registry.get_active().cloned() {
        unbind_previous(platform, &previous, entry.scope)?;
    }
    platform.bind_environment(entry, options)?;
    registry.mark_active(entry.id);
    store.save(registry)?;
    info!(id = %entry.id, version = %entry.version, "activated");
    Ok(())
}

fn unbind_previous(platform: &dyn PlatformAdapter, previous: &InstallEntry, next_scope: Scope) -> Result<()> {
    if previous.scope == next_scope || !platform.needs_elevation(previous.scope) {
        return platform.unbind_environment(previous.scope, Some(previous));
    }
    warn!(
        id = %previous.id,
        "previous global install stays bound; removing it needs elevation"
    );
    Ok(())
}

fn find_entry(registry: &InstallRegistry, id: Uuid) -> Result<InstallEntry> {
    registry.find(id).cloned().ok_or_else(|| {
        InstallError::NotFound { id: id.to_string() }.into()
    })
}
