use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use godman_core::InstallRegistry;
use tracing::debug;

pub const REGISTRY_FILE_NAME: &str = "installs.json";

/// Whole-file JSON persistence for [`InstallRegistry`].
///
/// Every save rewrites the document. Writes go to a sibling `.part` file that is renamed
/// over the target, so a crash leaves either the old or the new registry. There is no
/// cross-process lock; the last writer wins.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(config_dir: &Path) -> Self {
        Self::new(config_dir.join(REGISTRY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<InstallRegistry> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "registry file absent, starting empty");
            return Ok(InstallRegistry::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading install registry: {}", self.path.display()))?;
        let mut registry = parse_registry(&content)
            .with_context(|| format!("failed parsing install registry: {}", self.path.display()))?;
        registry.refresh_active_flags();
        Ok(registry)
    }

    pub fn save(&self, registry: &InstallRegistry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating registry directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(registry).with_context(|| {
            format!("failed serializing install registry: {}", self.path.display())
        })?;

        let part_path = self.part_path();
        fs::write(&part_path, format!("{content}\n"))
            .with_context(|| format!("failed writing install registry: {}", part_path.display()))?;
        if let Err(err) = fs::rename(&part_path, &self.path) {
            let _ = fs::remove_file(&part_path);
            return Err(err).with_context(|| {
                format!("failed replacing install registry: {}", self.path.display())
            });
        }

        debug!(
            path = %self.path.display(),
            installs = registry.installs.len(),
            "saved install registry"
        );
        Ok(())
    }

    /// Loads, applies `mutate`, and saves only when the closure succeeds.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut InstallRegistry) -> Result<T>) -> Result<T> {
        let mut registry = self.load()?;
        let value = mutate(&mut registry)?;
        self.save(&registry)?;
        Ok(value)
    }

    fn part_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or(REGISTRY_FILE_NAME);
        self.path.with_file_name(format!("{file_name}.part"))
    }
}

fn parse_registry(content: &str) -> Result<InstallRegistry> {
    if content.trim().is_empty() {
        return Ok(InstallRegistry::default());
    }
    Ok(serde_json::from_str::<InstallRegistry>(content)?)
}
