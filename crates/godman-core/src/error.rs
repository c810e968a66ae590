use std::path::PathBuf;

use thiserror::Error;

/// Failures callers are expected to tell apart. Everything else (I/O, network, archive
/// corruption) travels as a context-wrapped `anyhow::Error`.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("install directory already exists: {}; use --force to overwrite", path.display())]
    Conflict { path: PathBuf },

    #[error("no install found with id {id}")]
    NotFound { id: String },

    #[error("provide either a download url or a local archive path")]
    SourceUnresolved,

    #[error("elevation was canceled by the user")]
    ElevationCanceled,

    #[error("elevated process failed with exit code {code}")]
    ElevationFailed { code: i32 },

    #[error("this command must be run as administrator")]
    NotElevated,

    #[error("operation was canceled")]
    Canceled,
}

impl InstallError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not-found",
            Self::SourceUnresolved => "invalid-operation",
            Self::ElevationCanceled | Self::ElevationFailed { .. } | Self::NotElevated => {
                "elevation"
            }
            Self::Canceled => "canceled",
        }
    }
}

pub fn install_error(err: &anyhow::Error) -> Option<&InstallError> {
    err.chain().find_map(|cause| cause.downcast_ref::<InstallError>())
}
