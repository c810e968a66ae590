use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use godman_core::{InstallEntry, InstallError, InstallPlan, InstallRequest, Platform};
use godman_registry::RegistryStore;
use tracing::{debug, info};

use crate::activation::switch_active;
use crate::archive::{extract_zip, sha256_file};
use crate::binary::mark_engine_executable_best_effort;
use crate::binding::BindOptions;
use crate::download::{DownloadedArchive, Downloader};
use crate::elevation::{ElevatedInstallPayload, ElevatedOperation};
use crate::fs_utils::dir_has_entries;
use crate::platform::PlatformAdapter;
use crate::progress::{CancelToken, PhaseProgress};

const DOWNLOAD_PHASE_END: u8 = 50;

/// Drives one install from request to registered (and optionally active) entry.
pub struct ArchiveInstaller<'a> {
    platform: &'a dyn PlatformAdapter,
    store: RegistryStore,
    downloader: Downloader,
}

impl<'a> ArchiveInstaller<'a> {
    pub fn new(platform: &'a dyn PlatformAdapter, downloader: Downloader) -> Self {
        Self {
            store: RegistryStore::new(platform.paths().registry_path()),
            platform,
            downloader,
        }
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    /// Resolves, downloads when needed, extracts, registers and optionally activates.
    ///
    /// Dry runs return a synthetic entry pointing at the resolved target and touch nothing.
    /// Global installs on a process without privilege are handed to the elevated child with
    /// a local archive; the result is then read back from the registry.
    pub fn install(
        &self,
        request: &InstallRequest,
        progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> Result<InstallEntry> {
        request.validate()?;
        info!(
            version = %request.version,
            edition = %request.edition,
            scope = %request.scope,
            "resolving install"
        );

        if request.dry_run {
            return self.preview(request);
        }

        let mut phases = PhaseProgress::new(progress);
        let (plan, download) = self.resolve_plan(request, &mut phases, cancel)?;
        let extract_start = if download.is_some() {
            DOWNLOAD_PHASE_END
        } else {
            0
        };
        phases.enter_phase(extract_start, 100);

        let entry = if self.platform.needs_elevation(plan.request.scope) {
            self.install_elevated(&plan)?
        } else {
            self.install_resolved(&plan, &mut phases, cancel)?
        };
        drop(download);

        phases.finish();
        Ok(entry)
    }

    /// Installs an already resolved plan in this process. Used directly by the elevated
    /// child, which must never hand off again.
    pub fn install_plan(
        &self,
        plan: &InstallPlan,
        progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> Result<InstallEntry> {
        let mut phases = PhaseProgress::new(progress);
        let entry = self.install_resolved(plan, &mut phases, cancel)?;
        phases.finish();
        Ok(entry)
    }

    /// The target directory an install would use. URL sources cost one request for the
    /// response headers; the body is never read.
    pub fn preview(&self, request: &InstallRequest) -> Result<InstallEntry> {
        request.validate()?;
        let target_dir = match (&request.install_path, &request.archive_path) {
            (Some(path), _) => absolute_install_path(path)?,
            (None, Some(archive)) => self.target_dir(request, &archive_file_name(archive))?,
            (None, None) => {
                let url = request
                    .download_url
                    .as_deref()
                    .ok_or(InstallError::SourceUnresolved)?;
                let pending = self.downloader.open(url)?;
                self.target_dir(request, pending.file_name())?
            }
        };

        debug!(target = %target_dir.display(), "dry run resolved target");
        Ok(InstallEntry::new(
            request.version.trim(),
            request.edition,
            request.platform,
            request.scope,
            target_dir,
        ))
    }

    fn resolve_plan(
        &self,
        request: &InstallRequest,
        phases: &mut PhaseProgress<'_>,
        cancel: &CancelToken,
    ) -> Result<(InstallPlan, Option<DownloadedArchive>)> {
        if let Some(archive) = &request.archive_path {
            let archive = std::path::absolute(archive)
                .with_context(|| format!("failed to resolve archive path: {}", archive.display()))?;
            if !archive.is_file() {
                return Err(InstallError::Validation(format!(
                    "archive not found: {}",
                    archive.display()
                ))
                .into());
            }
            let target_dir = self.target_dir(request, &archive_file_name(&archive))?;
            ensure_target_available(&target_dir, request.force)?;

            let mut resolved = request.clone();
            resolved.archive_path = Some(archive);
            return Ok((
                InstallPlan {
                    request: resolved,
                    target_dir,
                },
                None,
            ));
        }

        let url = request
            .download_url
            .as_deref()
            .ok_or(InstallError::SourceUnresolved)?;
        info!(url, "downloading");
        let pending = self.downloader.open(url)?;
        let target_dir = self.target_dir(request, pending.file_name())?;
        ensure_target_available(&target_dir, request.force)?;

        phases.enter_phase(0, DOWNLOAD_PHASE_END);
        let downloaded = pending.save_to_temp(&mut |percent| phases.report(percent), cancel)?;

        let mut resolved = request.clone();
        resolved.archive_path = Some(downloaded.path().to_path_buf());
        Ok((
            InstallPlan {
                request: resolved,
                target_dir,
            },
            Some(downloaded),
        ))
    }

    fn install_elevated(&self, plan: &InstallPlan) -> Result<InstallEntry> {
        let payload = ElevatedInstallPayload::from_plan(plan)?;
        info!(target = %plan.target_dir.display(), "handing install to elevated process");
        self.platform
            .run_elevated(&ElevatedOperation::Install(payload))?;

        let request = &plan.request;
        let registry = self.store.load()?;
        registry
            .find_latest_match(
                request.version.trim(),
                request.edition,
                request.platform,
                request.scope,
                &plan.target_dir,
            )
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "elevated install finished but no registry entry was found for {}",
                    plan.target_dir.display()
                )
            })
    }

    fn install_resolved(
        &self,
        plan: &InstallPlan,
        phases: &mut PhaseProgress<'_>,
        cancel: &CancelToken,
    ) -> Result<InstallEntry> {
        let request = &plan.request;
        let archive = plan.archive_path().ok_or(InstallError::SourceUnresolved)?;
        let target_dir = &plan.target_dir;
        ensure_target_available(target_dir, request.force)?;

        info!(
            archive = %archive.display(),
            target = %target_dir.display(),
            "extracting"
        );
        fs::create_dir_all(target_dir)
            .with_context(|| format!("failed to create {}", target_dir.display()))?;
        extract_zip(
            archive,
            target_dir,
            &mut |percent| phases.report(percent),
            cancel,
        )?;
        if request.platform == Platform::Linux {
            let _marked = mark_engine_executable_best_effort(target_dir);
        }

        let mut entry = InstallEntry::new(
            request.version.trim(),
            request.edition,
            request.platform,
            request.scope,
            target_dir.clone(),
        );
        entry.checksum = Some(sha256_file(archive)?);

        info!(id = %entry.id, "registering");
        let mut registry = self.store.load()?;
        registry.upsert(entry.clone());
        self.store.save(&registry)?;

        if request.activate {
            info!(id = %entry.id, "activating");
            let options = BindOptions {
                dry_run: false,
                create_desktop_shortcut: request.create_desktop_shortcut,
            };
            switch_active(self.platform, &self.store, &mut registry, &entry, options)?;
            entry.is_active = true;
        }

        Ok(entry)
    }

    fn target_dir(&self, request: &InstallRequest, archive_file_name: &str) -> Result<PathBuf> {
        match &request.install_path {
            Some(path) => absolute_install_path(path),
            None => Ok(self
                .platform
                .paths()
                .install_root(request.scope)
                .join(request.folder_name_for_archive(archive_file_name))),
        }
    }
}

/// Relative install paths resolve against the current directory.
fn absolute_install_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("failed to resolve install path: {}", path.display()))
}

fn ensure_target_available(target_dir: &Path, force: bool) -> Result<()> {
    if force || !target_dir.exists() {
        return Ok(());
    }
    let occupied = !target_dir.is_dir()
        || dir_has_entries(target_dir)
            .with_context(|| format!("failed to inspect {}", target_dir.display()))?;
    if occupied {
        return Err(InstallError::Conflict {
            path: target_dir.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

fn archive_file_name(archive: &Path) -> String {
    archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
