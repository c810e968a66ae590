use std::path::{Path, PathBuf};

use url::Url;

use crate::{Edition, InstallError, Platform, Scope};

const STRIPPED_SUFFIXES: [&str; 4] = [".zip", ".exe", ".x86_64", ".apk"];

/// One install or import operation as the caller asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub version: String,
    pub edition: Edition,
    pub platform: Platform,
    pub scope: Scope,
    pub download_url: Option<String>,
    pub archive_path: Option<PathBuf>,
    pub install_path: Option<PathBuf>,
    pub activate: bool,
    pub force: bool,
    pub dry_run: bool,
    pub create_desktop_shortcut: bool,
}

impl InstallRequest {
    pub fn new(
        version: impl Into<String>,
        edition: Edition,
        platform: Platform,
        scope: Scope,
    ) -> Self {
        Self {
            version: version.into(),
            edition,
            platform,
            scope,
            download_url: None,
            archive_path: None,
            install_path: None,
            activate: false,
            force: false,
            dry_run: false,
            create_desktop_shortcut: false,
        }
    }

    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    pub fn with_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.archive_path = Some(path.into());
        self
    }

    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = Some(path.into());
        self
    }

    /// Rejects requests that cannot succeed before any I/O happens.
    pub fn validate(&self) -> Result<(), InstallError> {
        if self.version.trim().is_empty() {
            return Err(InstallError::Validation("version is required".to_string()));
        }
        if self.download_url.is_none() && self.archive_path.is_none() {
            return Err(InstallError::SourceUnresolved);
        }
        if let Some(url) = &self.download_url {
            validate_download_url(url)?;
        }
        Ok(())
    }

    /// `version-edition-platform-scope`, used when an archive name strips down to nothing.
    pub fn synthesized_folder_name(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.version.trim(),
            self.edition.as_str(),
            self.platform.as_str(),
            self.scope.as_str()
        )
    }

    pub fn folder_name_for_archive(&self, archive_file_name: &str) -> String {
        let stripped = strip_archive_suffixes(archive_file_name);
        if stripped.is_empty() {
            self.synthesized_folder_name()
        } else {
            stripped
        }
    }
}

/// A request resolved to a concrete archive on disk and a final target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub request: InstallRequest,
    pub target_dir: PathBuf,
}

impl InstallPlan {
    pub fn archive_path(&self) -> Option<&Path> {
        self.request.archive_path.as_deref()
    }
}

pub fn strip_archive_suffixes(file_name: &str) -> String {
    let mut current = file_name.trim();
    loop {
        let lower = current.to_ascii_lowercase();
        let Some(suffix) = STRIPPED_SUFFIXES
            .iter()
            .find(|suffix| lower.ends_with(*suffix))
        else {
            break;
        };
        current = &current[..current.len() - suffix.len()];
    }
    current.trim().to_string()
}

pub fn validate_download_url(url: &str) -> Result<(), InstallError> {
    let parsed = Url::parse(url.trim())
        .map_err(|err| InstallError::Validation(format!("invalid download url {url}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InstallError::Validation(format!(
            "download url must be absolute http(s): {url}"
        )));
    }
    if parsed.host_str().filter(|host| !host.is_empty()).is_none() {
        return Err(InstallError::Validation(format!(
            "download url has no host: {url}"
        )));
    }
    Ok(())
}
