use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use godman_core::{install_error, Edition, InstallError, Platform, Scope};
use tracing_subscriber::EnvFilter;

mod completion;
mod dispatch;
mod releases;
mod render;
mod settings;

use dispatch::run_cli;

const LOG_ENV_VAR: &str = "GODMAN_LOG";

#[derive(Parser, Debug)]
#[command(name = "godman")]
#[command(about = "Install and switch between Godot engine versions", long_about = None)]
struct Cli {
    /// Log progress details to stderr.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show registered installs, newest first.
    List,
    /// List engine releases published on GitHub.
    Fetch {
        #[arg(long)]
        stable: bool,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Install(InstallArgs),
    /// Make an install the one the shim and environment point at.
    Activate {
        id: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        create_desktop_shortcut: bool,
    },
    Deactivate,
    Remove {
        id: String,
        /// Also delete the install directory.
        #[arg(long)]
        delete: bool,
    },
    Doctor,
    /// Delete every directory and shim this tool created.
    Clean {
        #[arg(long)]
        yes: bool,
    },
    Version,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
    #[command(name = "install-elevated", hide = true)]
    InstallElevated(ElevatedArgs),
    #[command(name = "activate-elevated", hide = true)]
    ActivateElevated(ElevatedArgs),
    #[command(name = "clean-elevated", hide = true)]
    CleanElevated(ElevatedArgs),
}

/// Download or import an engine build.
#[derive(Args, Debug)]
struct InstallArgs {
    #[arg(long)]
    version: String,
    #[arg(long, value_enum)]
    edition: Option<CliEdition>,
    #[arg(long, value_enum)]
    platform: Option<CliPlatform>,
    #[arg(long, value_enum)]
    scope: Option<CliScope>,
    #[arg(long, conflicts_with = "archive")]
    url: Option<String>,
    #[arg(long)]
    archive: Option<PathBuf>,
    #[arg(long)]
    path: Option<PathBuf>,
    #[arg(long)]
    activate: bool,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    create_desktop_shortcut: bool,
}

#[derive(Args, Debug)]
struct ElevatedArgs {
    #[arg(long)]
    payload: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CliEdition {
    Standard,
    Dotnet,
}

impl From<CliEdition> for Edition {
    fn from(value: CliEdition) -> Self {
        match value {
            CliEdition::Standard => Edition::Standard,
            CliEdition::Dotnet => Edition::DotNet,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CliPlatform {
    Windows,
    Linux,
}

impl From<CliPlatform> for Platform {
    fn from(value: CliPlatform) -> Self {
        match value {
            CliPlatform::Windows => Platform::Windows,
            CliPlatform::Linux => Platform::Linux,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CliScope {
    User,
    Global,
}

impl From<CliScope> for Scope {
    fn from(value: CliScope) -> Self {
        match value {
            CliScope::User => Scope::User,
            CliScope::Global => Scope::Global,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CliCompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render::render_error(render::current_output_style(), &err));
            if matches!(install_error(&err), Some(InstallError::ElevationCanceled)) {
                eprintln!("hint: accept the administrator prompt, or install with --scope user");
            }
            ExitCode::FAILURE
        }
    }
}

/// Rewrites the first argument so `-v`, `--version` and `/v` reach the `version` command
/// and `--list` style spellings reach their sub-command.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter().collect::<Vec<_>>();
    let Some(first) = args.get(1).and_then(|arg| arg.to_str()).map(str::to_string) else {
        return args;
    };

    let lowered = first.to_ascii_lowercase();
    if matches!(lowered.as_str(), "-v" | "--version" | "/v") {
        args[1] = OsString::from("version");
    } else if let Some(name) = first.strip_prefix("--") {
        if !name.is_empty() && !name.starts_with('-') && name != "help" && name != "verbose" {
            args[1] = OsString::from(name);
        }
    }
    args
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests;
