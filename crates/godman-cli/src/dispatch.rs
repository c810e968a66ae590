use std::io::{BufRead, Write};

use anyhow::{anyhow, Context, Result};
use godman_core::{validate_download_url, InstallRequest, Platform};
use godman_installer::{
    decode_payload_for, execute_elevated_operation, host_platform, ActivationService, AppPaths,
    ArchiveInstaller, BindOptions, CancelToken, Downloader, PlatformAdapter,
    ACTIVATE_ELEVATED_SUBCOMMAND, CLEAN_ELEVATED_SUBCOMMAND, INSTALL_ELEVATED_SUBCOMMAND,
};
use godman_registry::RegistryStore;
use tracing::debug;

use crate::completion::write_completions_script;
use crate::releases::{build_download_url, filter_releases, ReleaseFetcher, ReleaseFilter};
use crate::render::{
    format_activation_preview_lines, format_clean_lines, format_doctor_lines,
    format_install_preview_lines, format_install_table, format_release_lines,
    format_remove_lines, OutputStyle, TerminalRenderer,
};
use crate::settings::Settings;
use crate::{Cli, Commands, InstallArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Version => {
            println!("{}", version_line());
            return Ok(());
        }
        Commands::Completions { shell } => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            return write_completions_script(*shell, &mut writer);
        }
        _ => {}
    }

    let paths = AppPaths::discover()?;
    let settings = Settings::load(&paths.settings_path())?;
    debug!(config = %paths.config_dir().display(), "resolved application paths");
    let platform = host_platform(paths)?;
    run_command(
        cli.command,
        platform.as_ref(),
        &settings,
        TerminalRenderer::current(),
    )
}

pub(crate) fn run_command(
    command: Commands,
    platform: &dyn PlatformAdapter,
    settings: &Settings,
    renderer: TerminalRenderer,
) -> Result<()> {
    match command {
        Commands::List => {
            let registry = RegistryStore::new(platform.paths().registry_path()).load()?;
            renderer.print_lines(&format_install_table(&registry.sorted_newest_first()));
        }
        Commands::Fetch {
            stable,
            filter,
            limit,
        } => {
            if renderer.style() == OutputStyle::Rich {
                renderer.print_status("info", "fetching available versions from GitHub");
            }
            let releases = ReleaseFetcher::new(settings.download_timeout())?.fetch()?;
            let shown = filter_releases(
                &releases,
                &ReleaseFilter {
                    stable_only: stable,
                    text: filter,
                    limit,
                },
            );
            renderer.print_lines(&format_release_lines(&shown, releases.len(), stable));
        }
        Commands::Install(args) => {
            let request = build_install_request(&args, settings, Platform::host())?;
            run_install(&request, platform, settings, renderer)?;
        }
        Commands::Activate {
            id,
            dry_run,
            create_desktop_shortcut,
        } => {
            let service = ActivationService::new(platform);
            let id = service.resolve_id(&id)?;
            if dry_run {
                let preview = service.preview_activation(id)?;
                renderer.print_lines(&format_activation_preview_lines(&preview));
                return Ok(());
            }

            let entry = service.activate(
                id,
                BindOptions {
                    dry_run: false,
                    create_desktop_shortcut: create_desktop_shortcut
                        || settings.create_desktop_shortcut,
                },
            )?;
            renderer.print_status("ok", &format!("activated {}", entry.label()));
            print_reload_hint(platform, renderer);
        }
        Commands::Deactivate => match ActivationService::new(platform).deactivate()? {
            Some(entry) => {
                renderer.print_status("ok", &format!("deactivated {}", entry.label()))
            }
            None => renderer.print_status("info", "no install is active"),
        },
        Commands::Remove { id, delete } => {
            let service = ActivationService::new(platform);
            let id = service.resolve_id(&id)?;
            let report = service.remove(id, delete)?;
            renderer.print_lines(&format_remove_lines(&report));
        }
        Commands::Doctor => {
            let report = ActivationService::new(platform).doctor()?;
            renderer.print_section("doctor");
            renderer.print_lines(&format_doctor_lines(&report, platform.platform()));
        }
        Commands::Clean { yes } => {
            if !yes {
                let stdin = std::io::stdin();
                let stdout = std::io::stdout();
                let confirmed = confirm(
                    &mut stdin.lock(),
                    &mut stdout.lock(),
                    "Remove all godman installs, shims and configuration?",
                )?;
                if !confirmed {
                    renderer.print_status("info", "clean aborted");
                    return Ok(());
                }
            }

            let report = ActivationService::new(platform).clean()?;
            renderer.print_lines(&format_clean_lines(&report));
            let failures = report.failures();
            if failures > 0 {
                return Err(anyhow!("{failures} clean target(s) could not be removed"));
            }
        }
        Commands::InstallElevated(args) => {
            let operation = decode_payload_for(INSTALL_ELEVATED_SUBCOMMAND, &args.payload)?;
            execute_elevated_operation(platform, operation)?;
        }
        Commands::ActivateElevated(args) => {
            let operation = decode_payload_for(ACTIVATE_ELEVATED_SUBCOMMAND, &args.payload)?;
            execute_elevated_operation(platform, operation)?;
        }
        Commands::CleanElevated(args) => {
            let operation = decode_payload_for(CLEAN_ELEVATED_SUBCOMMAND, &args.payload)?;
            execute_elevated_operation(platform, operation)?;
        }
        Commands::Version => println!("{}", version_line()),
        Commands::Completions { shell } => {
            let stdout = std::io::stdout();
            write_completions_script(shell, &mut stdout.lock())?;
        }
    }

    Ok(())
}

fn run_install(
    request: &InstallRequest,
    platform: &dyn PlatformAdapter,
    settings: &Settings,
    renderer: TerminalRenderer,
) -> Result<()> {
    let installer = ArchiveInstaller::new(platform, Downloader::new(settings.download_timeout())?);
    let cancel = CancelToken::new();

    if request.dry_run {
        let preview = installer.install(request, &mut |_| {}, &cancel)?;
        renderer.print_lines(&format_install_preview_lines(
            request,
            &preview,
            platform.needs_elevation(request.scope),
        ));
        return Ok(());
    }

    cancel_on_interrupt(&cancel);
    let mut progress = renderer.start_progress("install");
    let result = installer.install(request, &mut |percent| progress.set(percent), &cancel);
    let entry = match result {
        Ok(entry) => {
            progress.finish_success();
            entry
        }
        Err(err) => {
            progress.finish_abandon();
            return Err(err);
        }
    };

    renderer.print_status(
        "ok",
        &format!(
            "installed {} [{}] at {}",
            entry.label(),
            entry.short_id(),
            entry.path.display()
        ),
    );
    if entry.is_active {
        renderer.print_status("ok", &format!("activated {}", entry.label()));
        print_reload_hint(platform, renderer);
    }
    Ok(())
}

/// Ctrl+C stops the install at the next download chunk or archive entry.
fn cancel_on_interrupt(cancel: &CancelToken) {
    if let Err(err) = ctrlc::set_handler(interrupt_handler(cancel.clone())) {
        debug!(error = %err, "interrupt handler not installed");
    }
}

pub(crate) fn interrupt_handler(cancel: CancelToken) -> impl FnMut() + Send + 'static {
    move || cancel.cancel()
}

/// Turns parsed flags plus settings into a request. With no explicit source the official
/// download URL for the version is used.
pub(crate) fn build_install_request(
    args: &InstallArgs,
    settings: &Settings,
    host: Platform,
) -> Result<InstallRequest> {
    let edition = args.edition.map(Into::into).unwrap_or(settings.default_edition);
    let platform = args.platform.map(Into::into).unwrap_or(host);
    let scope = args.scope.map(Into::into).unwrap_or(settings.default_scope);

    let mut request = InstallRequest::new(args.version.trim(), edition, platform, scope);
    request = match (&args.url, &args.archive) {
        (Some(url), _) => {
            validate_download_url(url)?;
            request.with_download_url(url.trim())
        }
        (None, Some(archive)) => request.with_archive(archive.clone()),
        (None, None) => {
            let url = build_download_url(&args.version, edition, platform)?;
            request.with_download_url(url)
        }
    };
    if let Some(path) = &args.path {
        request = request.with_install_path(path.clone());
    }

    request.activate = args.activate;
    request.force = args.force;
    request.dry_run = args.dry_run;
    request.create_desktop_shortcut =
        args.create_desktop_shortcut || settings.create_desktop_shortcut;
    request.validate()?;
    Ok(request)
}

/// Shells only pick up the new variable after re-reading their environment.
fn print_reload_hint(platform: &dyn PlatformAdapter, renderer: TerminalRenderer) {
    let message = match platform.paths().env_script_path() {
        Some(script) => format!(
            "run `source {}` or open a new shell to use it",
            script.display()
        ),
        None => "open a new terminal to pick up the environment change".to_string(),
    };
    renderer.print_status("info", &message);
}

pub(crate) fn confirm<R, W>(reader: &mut R, writer: &mut W, prompt: &str) -> Result<bool>
where
    R: BufRead,
    W: Write,
{
    write!(writer, "{prompt} [y/N] ").context("failed writing confirmation prompt")?;
    writer.flush().context("failed writing confirmation prompt")?;

    let mut answer = String::new();
    reader
        .read_line(&mut answer)
        .context("failed reading confirmation answer")?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

pub(crate) fn version_line() -> String {
    format!("godman {}", env!("CARGO_PKG_VERSION"))
}
