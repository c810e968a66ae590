use anyhow::Result;
use godman_core::{InstallEntry, Platform, Scope};
use tracing::warn;

use crate::binding::{BindOptions, EnvironmentBinding, UnixBinding};
use crate::elevation::{
    ElevatedOperation, PrivilegedOperationChannel, UnsupportedElevation, WindowsElevation,
};
use crate::layout::AppPaths;
use crate::windows::WindowsBinding;

/// Everything OS-specific the services need, chosen once at startup.
pub trait PlatformAdapter {
    fn paths(&self) -> &AppPaths;
    fn bind_environment(&self, entry: &InstallEntry, options: BindOptions) -> Result<()>;
    fn unbind_environment(&self, scope: Scope, entry: Option<&InstallEntry>) -> Result<()>;
    fn is_elevated(&self) -> bool;
    fn run_elevated(&self, operation: &ElevatedOperation) -> Result<()>;

    fn platform(&self) -> Platform {
        self.paths().platform()
    }

    /// Global-scope mutations need a hand-off only where the OS enforces privilege.
    fn needs_elevation(&self, scope: Scope) -> bool {
        scope == Scope::Global && self.platform() == Platform::Windows && !self.is_elevated()
    }

    /// The managed variable as persisted outside the current process, where that exists.
    fn persisted_env_value(&self, _scope: Scope) -> Option<String> {
        None
    }
}

pub struct UnixPlatform {
    paths: AppPaths,
    binding: UnixBinding,
    elevation: UnsupportedElevation,
}

impl UnixPlatform {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            binding: UnixBinding::new(paths.clone()),
            paths,
            elevation: UnsupportedElevation,
        }
    }
}

impl PlatformAdapter for UnixPlatform {
    fn paths(&self) -> &AppPaths {
        &self.paths
    }

    fn bind_environment(&self, entry: &InstallEntry, options: BindOptions) -> Result<()> {
        self.binding.apply(entry, options)
    }

    fn unbind_environment(&self, scope: Scope, entry: Option<&InstallEntry>) -> Result<()> {
        self.binding.remove(scope, entry)
    }

    fn is_elevated(&self) -> bool {
        self.elevation.is_elevated()
    }

    fn run_elevated(&self, operation: &ElevatedOperation) -> Result<()> {
        self.elevation.run_elevated(operation)
    }

    fn needs_elevation(&self, _scope: Scope) -> bool {
        false
    }
}

pub struct WindowsPlatform {
    paths: AppPaths,
    binding: WindowsBinding,
    elevation: WindowsElevation,
}

impl WindowsPlatform {
    pub fn new(paths: AppPaths) -> Result<Self> {
        Ok(Self::with_parts(
            WindowsBinding::new(paths.clone()),
            WindowsElevation::new()?,
            paths,
        ))
    }

    pub fn with_parts(binding: WindowsBinding, elevation: WindowsElevation, paths: AppPaths) -> Self {
        Self {
            paths,
            binding,
            elevation,
        }
    }
}

impl PlatformAdapter for WindowsPlatform {
    fn paths(&self) -> &AppPaths {
        &self.paths
    }

    fn bind_environment(&self, entry: &InstallEntry, options: BindOptions) -> Result<()> {
        self.binding.apply(entry, options)
    }

    fn unbind_environment(&self, scope: Scope, entry: Option<&InstallEntry>) -> Result<()> {
        self.binding.remove(scope, entry)
    }

    fn is_elevated(&self) -> bool {
        self.elevation.is_elevated()
    }

    fn run_elevated(&self, operation: &ElevatedOperation) -> Result<()> {
        self.elevation.run_elevated(operation)
    }

    fn persisted_env_value(&self, scope: Scope) -> Option<String> {
        match self.binding.persisted_value(scope) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "could not read persisted environment variable");
                None
            }
        }
    }
}

pub fn host_platform(paths: AppPaths) -> Result<Box<dyn PlatformAdapter>> {
    match paths.platform() {
        Platform::Windows => Ok(Box::new(WindowsPlatform::new(paths)?)),
        Platform::Linux => Ok(Box::new(UnixPlatform::new(paths))),
    }
}
