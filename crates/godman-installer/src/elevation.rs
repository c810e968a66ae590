use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use godman_core::{Edition, InstallError, InstallPlan, InstallRequest, Platform, Scope};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activation::ActivationService;
use crate::binding::BindOptions;
use crate::download::{Downloader, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::installer::ArchiveInstaller;
use crate::platform::PlatformAdapter;
use crate::progress::CancelToken;
use crate::windows::{escape_ps_single_quote, powershell_command, run_command_output, CommandRunner};

pub const ELEVATION_PAYLOAD_VERSION: u32 = 1;
/// `ERROR_CANCELLED`: the user dismissed the consent prompt.
pub const ELEVATION_CANCELED_EXIT_CODE: i32 = 1223;

pub const INSTALL_ELEVATED_SUBCOMMAND: &str = "install-elevated";
pub const ACTIVATE_ELEVATED_SUBCOMMAND: &str = "activate-elevated";
pub const CLEAN_ELEVATED_SUBCOMMAND: &str = "clean-elevated";

/// Runs a prepared command to completion and returns its exit code.
pub type StatusRunner = Box<dyn Fn(&mut Command, &str) -> Result<i32> + Send + Sync>;

/// A fully resolved install: the archive is already on local disk, so the elevated child
/// never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevatedInstallPayload {
    pub version: String,
    pub edition: Edition,
    pub platform: Platform,
    pub scope: Scope,
    pub archive_path: PathBuf,
    pub install_path: PathBuf,
    #[serde(default)]
    pub activate: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub create_desktop_shortcut: bool,
}

impl ElevatedInstallPayload {
    pub fn from_plan(plan: &InstallPlan) -> Result<Self> {
        let archive_path = plan
            .archive_path()
            .ok_or(InstallError::SourceUnresolved)?
            .to_path_buf();
        let request = &plan.request;
        Ok(Self {
            version: request.version.clone(),
            edition: request.edition,
            platform: request.platform,
            scope: request.scope,
            archive_path,
            install_path: plan.target_dir.clone(),
            activate: request.activate,
            force: request.force,
            create_desktop_shortcut: request.create_desktop_shortcut,
        })
    }

    pub fn into_plan(self) -> InstallPlan {
        let mut request = InstallRequest::new(self.version, self.edition, self.platform, self.scope)
            .with_archive(self.archive_path)
            .with_install_path(self.install_path.clone());
        request.activate = self.activate;
        request.force = self.force;
        request.create_desktop_shortcut = self.create_desktop_shortcut;
        InstallPlan {
            request,
            target_dir: self.install_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevatedActivatePayload {
    pub id: Uuid,
    #[serde(default)]
    pub create_desktop_shortcut: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevatedCleanPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ElevatedOperation {
    Install(ElevatedInstallPayload),
    Activate(ElevatedActivatePayload),
    Clean(ElevatedCleanPayload),
}

impl ElevatedOperation {
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::Install(_) => INSTALL_ELEVATED_SUBCOMMAND,
            Self::Activate(_) => ACTIVATE_ELEVATED_SUBCOMMAND,
            Self::Clean(_) => CLEAN_ELEVATED_SUBCOMMAND,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ElevationEnvelope {
    version: u32,
    operation: ElevatedOperation,
}

/// Compact JSON, then standard base64, ready to travel as one argument.
pub fn encode_payload(operation: &ElevatedOperation) -> Result<String> {
    let envelope = ElevationEnvelope {
        version: ELEVATION_PAYLOAD_VERSION,
        operation: operation.clone(),
    };
    let json = serde_json::to_vec(&envelope).context("failed to serialize elevation payload")?;
    Ok(STANDARD.encode(json))
}

pub fn decode_payload(encoded: &str) -> Result<ElevatedOperation> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| InstallError::Validation(format!("elevation payload is not base64: {err}")))?;
    let envelope: ElevationEnvelope = serde_json::from_slice(&bytes)
        .map_err(|err| InstallError::Validation(format!("elevation payload is malformed: {err}")))?;
    if envelope.version != ELEVATION_PAYLOAD_VERSION {
        return Err(InstallError::Validation(format!(
            "unsupported elevation payload version {}",
            envelope.version
        ))
        .into());
    }
    Ok(envelope.operation)
}

/// Decodes a payload and checks it belongs to the sub-command that received it.
pub fn decode_payload_for(subcommand: &str, encoded: &str) -> Result<ElevatedOperation> {
    let operation = decode_payload(encoded)?;
    if operation.subcommand() != subcommand {
        return Err(InstallError::Validation(format!(
            "{subcommand} received a payload for {}",
            operation.subcommand()
        ))
        .into());
    }
    Ok(operation)
}

/// Crosses the privilege boundary. The only result is the child's exit status; callers
/// re-read shared state afterwards.
pub trait PrivilegedOperationChannel {
    fn is_elevated(&self) -> bool;
    fn run_elevated(&self, operation: &ElevatedOperation) -> Result<()>;
}

/// Platforms without an elevation prompt run everything in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedElevation;

impl PrivilegedOperationChannel for UnsupportedElevation {
    fn is_elevated(&self) -> bool {
        false
    }

    fn run_elevated(&self, operation: &ElevatedOperation) -> Result<()> {
        Err(anyhow!(
            "{} requires elevation, which this platform does not support",
            operation.subcommand()
        ))
    }
}

/// UAC re-launch of the current executable through `Start-Process -Verb RunAs`.
pub struct WindowsElevation {
    executable: PathBuf,
    runner: CommandRunner,
    status_runner: StatusRunner,
    elevated: OnceLock<bool>,
}

impl WindowsElevation {
    pub fn new() -> Result<Self> {
        let executable =
            std::env::current_exe().context("failed to locate the running executable")?;
        Ok(Self::with_runners(
            executable,
            Box::new(run_command_output),
            Box::new(run_command_status),
        ))
    }

    pub fn with_runners(
        executable: PathBuf,
        runner: CommandRunner,
        status_runner: StatusRunner,
    ) -> Self {
        Self {
            executable,
            runner,
            status_runner,
            elevated: OnceLock::new(),
        }
    }

    fn query_elevation(&self) -> bool {
        let mut command = powershell_command(
            "([Security.Principal.WindowsPrincipal][Security.Principal.WindowsIdentity]::GetCurrent()).IsInRole([Security.Principal.WindowsBuiltInRole]::Administrator)",
        );
        match (self.runner)(&mut command, "failed to query administrator membership") {
            Ok(output) => output.trim().eq_ignore_ascii_case("true"),
            Err(err) => {
                warn!(error = %err, "could not determine elevation, assuming not elevated");
                false
            }
        }
    }

    fn remove_zone_identifier_best_effort(&self) -> bool {
        let script = format!(
            "Remove-Item -LiteralPath '{}' -Stream Zone.Identifier -ErrorAction SilentlyContinue",
            escape_ps_single_quote(&self.executable.to_string_lossy())
        );
        let mut command = powershell_command(&script);
        match (self.runner)(&mut command, "failed to clear Zone.Identifier") {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "Zone.Identifier not removed");
                false
            }
        }
    }
}

impl PrivilegedOperationChannel for WindowsElevation {
    fn is_elevated(&self) -> bool {
        *self.elevated.get_or_init(|| self.query_elevation())
    }

    fn run_elevated(&self, operation: &ElevatedOperation) -> Result<()> {
        let payload = encode_payload(operation)?;
        let _zone_cleared = self.remove_zone_identifier_best_effort();

        let script = render_start_process_script(&self.executable, operation.subcommand(), &payload);
        let mut command = powershell_command(&script);
        info!(subcommand = operation.subcommand(), "requesting elevation");
        let code = (self.status_runner)(&mut command, "failed to start elevated process")?;
        debug!(code, "elevated process exited");
        exit_code_result(code)
    }
}

pub(crate) fn render_start_process_script(
    executable: &std::path::Path,
    subcommand: &str,
    payload: &str,
) -> String {
    format!(
        "try {{ $process = Start-Process -FilePath '{}' -ArgumentList @('{}', '--payload', '{}') -Verb RunAs -Wait -PassThru; exit $process.ExitCode }} \
         catch {{ $inner = $_.Exception; while ($inner -ne $null) {{ if ($inner.NativeErrorCode -eq {cancel}) {{ exit {cancel} }}; $inner = $inner.InnerException }}; Write-Error $_; exit 1 }}",
        escape_ps_single_quote(&executable.to_string_lossy()),
        escape_ps_single_quote(subcommand),
        escape_ps_single_quote(payload),
        cancel = ELEVATION_CANCELED_EXIT_CODE,
    )
}

pub(crate) fn exit_code_result(code: i32) -> Result<()> {
    match code {
        0 => Ok(()),
        ELEVATION_CANCELED_EXIT_CODE => Err(InstallError::ElevationCanceled.into()),
        code => Err(InstallError::ElevationFailed { code }.into()),
    }
}

fn run_command_status(command: &mut Command, context_message: &str) -> Result<i32> {
    let status = command
        .status()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    Ok(status.code().unwrap_or(-1))
}

/// Body of the hidden `*-elevated` sub-commands. Refuses to act unless the process really
/// is elevated.
pub fn execute_elevated_operation(
    platform: &dyn PlatformAdapter,
    operation: ElevatedOperation,
) -> Result<()> {
    if !platform.is_elevated() {
        return Err(InstallError::NotElevated.into());
    }

    info!(subcommand = operation.subcommand(), "running elevated operation");
    match operation {
        ElevatedOperation::Install(payload) => {
            let installer =
                ArchiveInstaller::new(platform, Downloader::new(DEFAULT_DOWNLOAD_TIMEOUT)?);
            installer.install_plan(&payload.into_plan(), &mut |_| {}, &CancelToken::new())?;
        }
        ElevatedOperation::Activate(payload) => {
            let options = BindOptions {
                dry_run: false,
                create_desktop_shortcut: payload.create_desktop_shortcut,
            };
            ActivationService::new(platform).activate(payload.id, options)?;
        }
        ElevatedOperation::Clean(_) => {
            ActivationService::new(platform).clean_direct()?;
        }
    }
    Ok(())
}
