mod error;
mod model;
mod request;

pub use error::{install_error, InstallError};
pub use model::{
    paths_equal_ignore_case, Edition, InstallEntry, InstallRegistry, Platform, Scope,
};
pub use request::{strip_archive_suffixes, validate_download_url, InstallPlan, InstallRequest};
