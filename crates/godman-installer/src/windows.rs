use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use godman_core::{InstallEntry, Platform, Scope};
use tracing::{debug, info, warn};

use crate::binary::locate_engine_binary;
use crate::binding::{render_windows_shim, BindOptions, EnvironmentBinding};
use crate::fs_utils::remove_file_if_exists;
use crate::layout::AppPaths;

const PATH_VAR: &str = "Path";
const SHORTCUT_FOLDER: &str = "GodotManager";

/// Runs a prepared command and returns its trimmed stdout.
pub type CommandRunner = Box<dyn Fn(&mut Command, &str) -> Result<String> + Send + Sync>;

/// Variables of the running process. The binding mirrors persisted changes here so later
/// calls in the same process see them.
pub trait ProcessEnvironment: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: Option<&str>);
}

struct CurrentProcess;

impl ProcessEnvironment for CurrentProcess {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn set(&self, name: &str, value: Option<&str>) {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }
}

/// Where shortcuts go. Any folder may be unknown, in which case that shortcut is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellFolders {
    pub user_programs: Option<PathBuf>,
    pub global_programs: Option<PathBuf>,
    pub desktop: Option<PathBuf>,
}

impl ShellFolders {
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let programs = |base: String| {
            PathBuf::from(base)
                .join("Microsoft")
                .join("Windows")
                .join("Start Menu")
                .join("Programs")
                .join(SHORTCUT_FOLDER)
        };
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            user_programs: non_empty("APPDATA").map(programs),
            global_programs: non_empty("ProgramData").map(programs),
            desktop: non_empty("USERPROFILE").map(|home| PathBuf::from(home).join("Desktop")),
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    fn programs(&self, scope: Scope) -> Option<&Path> {
        match scope {
            Scope::User => self.user_programs.as_deref(),
            Scope::Global => self.global_programs.as_deref(),
        }
    }
}

/// Registry-backed binding: persistent environment variable, PATH entry, `.cmd` shim and
/// optional shortcuts, all driven through PowerShell.
pub struct WindowsBinding {
    paths: AppPaths,
    folders: ShellFolders,
    runner: CommandRunner,
    process_env: Option<Box<dyn ProcessEnvironment>>,
}

impl WindowsBinding {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            folders: ShellFolders::from_env(),
            runner: Box::new(run_command_output),
            process_env: cfg!(windows)
                .then(|| Box::new(CurrentProcess) as Box<dyn ProcessEnvironment>),
        }
    }

    /// Builds a binding whose commands go to `runner` and which leaves the current
    /// process environment alone.
    pub fn with_runner(paths: AppPaths, folders: ShellFolders, runner: CommandRunner) -> Self {
        Self {
            paths,
            folders,
            runner,
            process_env: None,
        }
    }

    pub fn with_process_environment(mut self, process_env: Box<dyn ProcessEnvironment>) -> Self {
        self.process_env = Some(process_env);
        self
    }

    /// The managed variable as stored at `scope`'s level, if any.
    pub fn persisted_value(&self, scope: Scope) -> Result<Option<String>> {
        let value = self.read_persistent_variable(self.paths.env_var_name(), scope)?;
        Ok(Some(value).filter(|value| !value.is_empty()))
    }

    fn run(&self, script: &str, context_message: &str) -> Result<String> {
        let mut command = powershell_command(script);
        (self.runner)(&mut command, context_message)
    }

    fn read_persistent_variable(&self, name: &str, scope: Scope) -> Result<String> {
        let script = format!(
            "[Environment]::GetEnvironmentVariable('{}', '{}')",
            escape_ps_single_quote(name),
            env_target(scope)
        );
        self.run(&script, &format!("failed to read {name} environment variable"))
    }

    fn write_persistent_variable(&self, name: &str, value: Option<&str>, scope: Scope) -> Result<()> {
        let value = match value {
            Some(value) => format!("'{}'", escape_ps_single_quote(value)),
            None => "$null".to_string(),
        };
        let script = format!(
            "[Environment]::SetEnvironmentVariable('{}', {value}, '{}')",
            escape_ps_single_quote(name),
            env_target(scope)
        );
        self.run(&script, &format!("failed to set {name} environment variable"))
            .map(|_| ())
    }

    fn add_shim_dir_to_path(&self, scope: Scope) -> Result<bool> {
        let shim_dir = self.paths.shim_dir(scope).to_string_lossy().into_owned();
        self.update_process_path(|current| path_with_entry(current, &shim_dir));
        let current = self.read_persistent_variable(PATH_VAR, scope)?;
        let Some(updated) = path_with_entry(&current, &shim_dir) else {
            return Ok(false);
        };
        self.write_persistent_variable(PATH_VAR, Some(&updated), scope)?;
        Ok(true)
    }

    fn remove_shim_dir_from_path(&self, scope: Scope) -> Result<bool> {
        let shim_dir = self.paths.shim_dir(scope).to_string_lossy().into_owned();
        self.update_process_path(|current| path_without_entry(current, &shim_dir));
        let current = self.read_persistent_variable(PATH_VAR, scope)?;
        let Some(updated) = path_without_entry(&current, &shim_dir) else {
            return Ok(false);
        };
        self.write_persistent_variable(PATH_VAR, Some(&updated), scope)?;
        Ok(true)
    }

    fn shortcut_paths(&self, entry: &InstallEntry, include_desktop: bool) -> Vec<PathBuf> {
        let name = shortcut_file_name(entry);
        let mut paths = Vec::new();
        if let Some(programs) = self.folders.programs(entry.scope) {
            paths.push(programs.join(&name));
        }
        if include_desktop {
            if let Some(desktop) = &self.folders.desktop {
                paths.push(desktop.join(&name));
            }
        }
        paths
    }

    fn create_shortcuts_best_effort(&self, entry: &InstallEntry, binary: &Path, desktop: bool) -> bool {
        let mut all_created = true;
        for shortcut in self.shortcut_paths(entry, desktop) {
            if let Some(parent) = shortcut.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    warn!(path = %parent.display(), error = %err, "shortcut folder not created");
                    all_created = false;
                    continue;
                }
            }
            let script = format!(
                "$shell = New-Object -ComObject WScript.Shell; $link = $shell.CreateShortcut('{}'); $link.TargetPath = '{}'; $link.WorkingDirectory = '{}'; $link.Save()",
                escape_ps_single_quote(&shortcut.to_string_lossy()),
                escape_ps_single_quote(&binary.to_string_lossy()),
                escape_ps_single_quote(&entry.path.to_string_lossy())
            );
            if let Err(err) = self.run(&script, "failed to create shortcut") {
                warn!(path = %shortcut.display(), error = %err, "shortcut not created");
                all_created = false;
            }
        }
        all_created
    }

    fn remove_shortcuts_best_effort(&self, entry: &InstallEntry) -> bool {
        let mut all_removed = true;
        for shortcut in self.shortcut_paths(entry, true) {
            if let Err(err) = remove_file_if_exists(&shortcut) {
                warn!(path = %shortcut.display(), error = %err, "shortcut not removed");
                all_removed = false;
            }
        }
        all_removed
    }

    fn broadcast_environment_change_best_effort(&self) -> bool {
        let script = concat!(
            "Add-Type -Namespace Godman -Name NativeMethods -MemberDefinition ",
            "'[DllImport(\"user32.dll\", SetLastError = true, CharSet = CharSet.Auto)] ",
            "public static extern IntPtr SendMessageTimeout(IntPtr hWnd, uint Msg, UIntPtr wParam, ",
            "string lParam, uint fuFlags, uint uTimeout, out UIntPtr lpdwResult);'; ",
            "$result = [UIntPtr]::Zero; ",
            "[void][Godman.NativeMethods]::SendMessageTimeout([IntPtr]0xffff, 0x1A, [UIntPtr]::Zero, ",
            "'Environment', 2, 5000, [ref]$result)"
        );
        match self.run(script, "failed to broadcast environment change") {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "environment change broadcast failed");
                false
            }
        }
    }

    fn set_process_variable(&self, value: Option<&Path>) {
        if let Some(process_env) = &self.process_env {
            let value = value.map(|path| path.to_string_lossy().into_owned());
            process_env.set(self.paths.env_var_name(), value.as_deref());
        }
    }

    fn update_process_path<F>(&self, update: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(process_env) = &self.process_env else {
            return;
        };
        let current = process_env.get(PATH_VAR).unwrap_or_default();
        if let Some(updated) = update(&current) {
            process_env.set(PATH_VAR, Some(&updated));
        }
    }
}

impl EnvironmentBinding for WindowsBinding {
    fn apply(&self, entry: &InstallEntry, options: BindOptions) -> Result<()> {
        if options.dry_run {
            return Ok(());
        }

        let var_name = self.paths.env_var_name();
        self.write_persistent_variable(var_name, Some(&entry.path.to_string_lossy()), entry.scope)?;
        self.set_process_variable(Some(&entry.path));

        let path_changed = self.add_shim_dir_to_path(entry.scope)?;

        let binary = locate_engine_binary(&entry.path, Platform::Windows);
        let shim_dir = self.paths.shim_dir(entry.scope);
        fs::create_dir_all(shim_dir)
            .with_context(|| format!("failed to create shim dir: {}", shim_dir.display()))?;
        let shim_path = self.paths.shim_path(entry.scope);
        fs::write(&shim_path, render_windows_shim(&binary))
            .with_context(|| format!("failed to write shim: {}", shim_path.display()))?;

        let _shortcuts_created =
            self.create_shortcuts_best_effort(entry, &binary, options.create_desktop_shortcut);
        let _broadcast = self.broadcast_environment_change_best_effort();

        info!(
            shim = %shim_path.display(),
            target = %binary.display(),
            path_changed,
            "windows binding applied"
        );
        Ok(())
    }

    fn remove(&self, scope: Scope, entry: Option<&InstallEntry>) -> Result<()> {
        self.write_persistent_variable(self.paths.env_var_name(), None, scope)?;
        self.set_process_variable(None);

        let path_changed = self.remove_shim_dir_from_path(scope)?;

        let shim_path = self.paths.shim_path(scope);
        remove_file_if_exists(&shim_path)
            .with_context(|| format!("failed to remove shim: {}", shim_path.display()))?;

        if let Some(entry) = entry {
            let _shortcuts_removed = self.remove_shortcuts_best_effort(entry);
        }
        let _broadcast = self.broadcast_environment_change_best_effort();

        debug!(shim = %shim_path.display(), path_changed, "windows binding removed");
        Ok(())
    }
}

pub(crate) fn powershell_command(script: &str) -> Command {
    let mut command = Command::new("powershell");
    command
        .arg("-NoProfile")
        .arg("-NonInteractive")
        .arg("-Command")
        .arg(script);
    command
}

pub(crate) fn run_command_output(command: &mut Command, context_message: &str) -> Result<String> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if output.status.success() {
        return Ok(stdout.trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

pub(crate) fn escape_ps_single_quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// Returns the PATH value with `dir` appended, or `None` when it is already present.
pub(crate) fn path_with_entry(current: &str, dir: &str) -> Option<String> {
    let segments = path_segments(current);
    if segments.iter().any(|segment| same_path_segment(segment, dir)) {
        return None;
    }
    let mut updated = segments;
    updated.push(dir);
    Some(updated.join(";"))
}

/// Returns the PATH value without `dir`, or `None` when it was not present.
pub(crate) fn path_without_entry(current: &str, dir: &str) -> Option<String> {
    let segments = path_segments(current);
    let kept = segments
        .iter()
        .copied()
        .filter(|segment| !same_path_segment(segment, dir))
        .collect::<Vec<_>>();
    if kept.len() == segments.len() {
        return None;
    }
    Some(kept.join(";"))
}

pub(crate) fn shortcut_file_name(entry: &InstallEntry) -> String {
    format!("Godot {} ({}).lnk", entry.version, entry.edition)
}

fn path_segments(value: &str) -> Vec<&str> {
    value
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn same_path_segment(left: &str, right: &str) -> bool {
    let normalize = |value: &str| value.trim().trim_end_matches(['\\', '/']).to_lowercase();
    normalize(left) == normalize(right)
}

fn env_target(scope: Scope) -> &'static str {
    match scope {
        Scope::User => "User",
        Scope::Global => "Machine",
    }
}
