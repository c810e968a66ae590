mod activation;
mod archive;
mod binary;
mod binding;
mod download;
mod elevation;
mod fs_utils;
mod installer;
mod layout;
mod platform;
mod progress;
mod windows;

pub use activation::{
    ActivationPreview, ActivationService, CleanItem, CleanOutcome, CleanReport, DoctorReport,
    RemoveReport,
};
pub use archive::{extract_zip, sha256_file};
pub use binary::{locate_engine_binary, mark_engine_executable_best_effort};
pub use binding::{BindOptions, EnvironmentBinding, UnixBinding};
pub use download::{
    DownloadedArchive, Downloader, PendingDownload, DEFAULT_DOWNLOAD_TIMEOUT, DOWNLOAD_BUFFER_SIZE,
};
pub use elevation::{
    decode_payload, decode_payload_for, encode_payload, execute_elevated_operation,
    ElevatedActivatePayload, ElevatedCleanPayload, ElevatedInstallPayload, ElevatedOperation,
    PrivilegedOperationChannel, StatusRunner, UnsupportedElevation, WindowsElevation,
    ACTIVATE_ELEVATED_SUBCOMMAND, CLEAN_ELEVATED_SUBCOMMAND, ELEVATION_CANCELED_EXIT_CODE,
    ELEVATION_PAYLOAD_VERSION, INSTALL_ELEVATED_SUBCOMMAND,
};
pub use fs_utils::{dir_has_entries, remove_dir_all_if_exists, remove_file_if_exists};
pub use installer::ArchiveInstaller;
pub use layout::{
    AppPaths, ENV_VAR_NAME, GLOBAL_ROOT_OVERRIDE_VAR, HOME_OVERRIDE_VAR,
    LEGACY_GLOBAL_ROOT_OVERRIDE_VAR, LEGACY_HOME_OVERRIDE_VAR,
};
pub use platform::{host_platform, PlatformAdapter, UnixPlatform, WindowsPlatform};
pub use progress::{CancelToken, PhaseProgress};
pub use windows::{CommandRunner, ProcessEnvironment, ShellFolders, WindowsBinding};
