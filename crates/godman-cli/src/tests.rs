use super::*;

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use clap::error::ErrorKind;
use godman_core::InstallRegistry;
use godman_installer::{
    encode_payload, AppPaths, CancelToken, CleanItem, CleanOutcome, CleanReport, DoctorReport,
    ElevatedCleanPayload, ElevatedOperation, UnixPlatform, GLOBAL_ROOT_OVERRIDE_VAR,
    HOME_OVERRIDE_VAR,
};
use godman_registry::RegistryStore;

use crate::dispatch::{
    build_install_request, confirm, interrupt_handler, run_command, version_line,
};
use crate::releases::{
    build_download_url, filter_releases, release_version, GodotRelease, ReleaseFetcher,
    ReleaseFilter,
};
use crate::render::{
    format_clean_lines, format_doctor_lines, format_install_table, format_release_lines,
    render_status_line, resolve_output_style, OutputStyle, TerminalRenderer,
};
use crate::settings::{parse_settings, Settings};

fn test_root(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("godman-cli-{label}-{nanos}"))
}

fn test_paths(root: &Path) -> AppPaths {
    let home = root.join("home").display().to_string();
    let global = root.join("global").display().to_string();
    let paths = AppPaths::resolve(Platform::Linux, |name| match name {
        HOME_OVERRIDE_VAR => Some(home.clone()),
        GLOBAL_ROOT_OVERRIDE_VAR => Some(global.clone()),
        _ => None,
    })
    .expect("must resolve test paths");
    paths.prepare().expect("must prepare test paths");
    paths
}

fn args(values: &[&str]) -> Vec<OsString> {
    values.iter().map(OsString::from).collect()
}

fn install_args(version: &str) -> InstallArgs {
    InstallArgs {
        version: version.to_string(),
        edition: None,
        platform: None,
        scope: None,
        url: None,
        archive: None,
        path: None,
        activate: false,
        force: false,
        dry_run: false,
        create_desktop_shortcut: false,
    }
}

fn write_engine_archive(root: &Path, name: &str) -> PathBuf {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
    writer
        .start_file(name, options)
        .expect("must start zip entry");
    writer
        .write_all(b"#!/bin/sh\necho engine\n")
        .expect("must write zip entry");
    let bytes = writer
        .finish()
        .expect("must finish zip fixture")
        .into_inner();

    fs::create_dir_all(root).expect("must create archive dir");
    let path = root.join(format!("{name}.zip"));
    fs::write(&path, bytes).expect("must write archive");
    path
}

fn plain() -> TerminalRenderer {
    TerminalRenderer::from_style(OutputStyle::Plain)
}

fn load_registry(paths: &AppPaths) -> InstallRegistry {
    RegistryStore::new(paths.registry_path())
        .load()
        .expect("must load registry")
}

/// Serves `body` with `status` to a single client and hands back the raw request.
fn start_one_shot_json_server(
    status: &str,
    body: &str,
) -> (String, mpsc::Receiver<String>, std::thread::JoinHandle<()>) {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").expect("must bind one-shot test server");
    let address = listener
        .local_addr()
        .expect("must read one-shot test server address");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let (sender, receiver) = mpsc::channel();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("must accept test client");
        let mut request_buffer = [0_u8; 4096];
        let read = stream.read(&mut request_buffer).unwrap_or(0);
        let _ = sender.send(String::from_utf8_lossy(&request_buffer[..read]).into_owned());
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    });
    (format!("http://{address}/releases"), receiver, handle)
}

fn release(version: &str, is_stable: bool) -> GodotRelease {
    GodotRelease {
        version: version.to_string(),
        is_stable,
        has_standard: true,
        has_dotnet: false,
        published_at: None,
    }
}

#[test]
fn version_spellings_are_rewritten_to_the_version_command() {
    for spelling in ["-v", "--version", "/v", "/V", "--VERSION"] {
        let normalized = normalize_args(args(&["godman", spelling]));
        assert_eq!(normalized, args(&["godman", "version"]), "{spelling}");
    }
}

#[test]
fn double_dash_command_names_are_rewritten() {
    assert_eq!(
        normalize_args(args(&["godman", "--list"])),
        args(&["godman", "list"])
    );
    assert_eq!(
        normalize_args(args(&["godman", "--install", "--version", "4.3"])),
        args(&["godman", "install", "--version", "4.3"])
    );
}

#[test]
fn help_verbose_and_plain_commands_are_left_alone() {
    for argv in [
        ["godman", "--help"],
        ["godman", "--verbose"],
        ["godman", "list"],
        ["godman", "--"],
    ] {
        assert_eq!(normalize_args(args(&argv)), args(&argv));
    }
    assert_eq!(normalize_args(args(&["godman"])), args(&["godman"]));
}

#[test]
fn normalized_version_flag_parses_as_version_command() {
    let cli = Cli::try_parse_from(normalize_args(args(&["godman", "-v"])))
        .expect("command must parse");
    assert!(matches!(cli.command, Commands::Version));
}

#[test]
fn install_rejects_url_together_with_archive() {
    let err = Cli::try_parse_from([
        "godman",
        "install",
        "--version",
        "4.3",
        "--url",
        "https://example.com/godot.zip",
        "--archive",
        "godot.zip",
    ])
    .expect_err("url and archive must conflict");
    assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
}

#[test]
fn install_parses_every_flag() {
    let cli = Cli::try_parse_from([
        "godman",
        "install",
        "--version",
        "4.3",
        "--edition",
        "dotnet",
        "--platform",
        "windows",
        "--scope",
        "global",
        "--path",
        "/opt/godot",
        "--activate",
        "--force",
        "--dry-run",
        "--create-desktop-shortcut",
    ])
    .expect("command must parse");

    let Commands::Install(install) = cli.command else {
        panic!("expected install command");
    };
    assert_eq!(install.version, "4.3");
    assert_eq!(install.edition, Some(CliEdition::Dotnet));
    assert_eq!(install.platform, Some(CliPlatform::Windows));
    assert_eq!(install.scope, Some(CliScope::Global));
    assert_eq!(install.path, Some(PathBuf::from("/opt/godot")));
    assert!(install.activate && install.force && install.dry_run);
    assert!(install.create_desktop_shortcut);
}

#[test]
fn fetch_defaults_to_twenty_results_and_verbose_is_global() {
    let cli = Cli::try_parse_from(["godman", "fetch", "--verbose"]).expect("command must parse");
    assert!(cli.verbose);
    let Commands::Fetch {
        stable,
        filter,
        limit,
    } = cli.command
    else {
        panic!("expected fetch command");
    };
    assert!(!stable);
    assert_eq!(filter, None);
    assert_eq!(limit, 20);
}

#[test]
fn hidden_elevated_commands_take_a_payload() {
    let cli = Cli::try_parse_from(["godman", "clean-elevated", "--payload", "abc"])
        .expect("command must parse");
    let Commands::CleanElevated(elevated) = cli.command else {
        panic!("expected clean-elevated command");
    };
    assert_eq!(elevated.payload, "abc");

    let err = Cli::try_parse_from(["godman", "install-elevated"])
        .expect_err("payload must be required");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn install_request_builds_official_url_when_no_source_is_given() {
    let request = build_install_request(&install_args("4.3"), &Settings::default(), Platform::Linux)
        .expect("request must build");

    assert_eq!(
        request.download_url.as_deref(),
        Some("https://godot-releases.nbg1.your-objectstorage.com/4.3-stable/Godot_v4.3-stable_linux.x86_64.zip")
    );
    assert_eq!(request.archive_path, None);
    assert_eq!(request.edition, Edition::Standard);
    assert_eq!(request.scope, Scope::User);
}

#[test]
fn install_request_applies_settings_then_flags() {
    let settings = Settings {
        default_scope: Scope::Global,
        default_edition: Edition::DotNet,
        create_desktop_shortcut: true,
        download_timeout_secs: 30,
    };

    let from_settings = build_install_request(&install_args("4.2"), &settings, Platform::Windows)
        .expect("request must build");
    assert_eq!(from_settings.scope, Scope::Global);
    assert_eq!(from_settings.edition, Edition::DotNet);
    assert!(from_settings.create_desktop_shortcut);
    assert_eq!(
        from_settings.download_url.as_deref(),
        Some("https://downloads.godotengine.org/?version=4.2&flavor=stable&slug=mono_win64.zip&platform=windows.64")
    );

    let mut flags = install_args("4.2");
    flags.scope = Some(CliScope::User);
    flags.edition = Some(CliEdition::Standard);
    flags.archive = Some(PathBuf::from("local.zip"));
    let from_flags =
        build_install_request(&flags, &settings, Platform::Windows).expect("request must build");
    assert_eq!(from_flags.scope, Scope::User);
    assert_eq!(from_flags.edition, Edition::Standard);
    assert_eq!(from_flags.archive_path, Some(PathBuf::from("local.zip")));
    assert_eq!(from_flags.download_url, None);
}

#[test]
fn install_request_rejects_relative_urls_and_empty_versions() {
    let mut relative = install_args("4.3");
    relative.url = Some("downloads/godot.zip".to_string());
    let err = build_install_request(&relative, &Settings::default(), Platform::Linux)
        .expect_err("relative url must fail");
    assert!(matches!(
        install_error(&err),
        Some(InstallError::Validation(_))
    ));

    let err = build_install_request(&install_args("  "), &Settings::default(), Platform::Linux)
        .expect_err("empty version must fail");
    assert!(matches!(
        install_error(&err),
        Some(InstallError::Validation(_))
    ));
}

#[test]
fn download_urls_follow_the_official_layout() {
    assert_eq!(
        build_download_url("4.3", Edition::DotNet, Platform::Linux).expect("url must build"),
        "https://godot-releases.nbg1.your-objectstorage.com/4.3-stable/Godot_v4.3-stable_mono_linux_x86_64.zip"
    );
    assert_eq!(
        build_download_url("4.3", Edition::Standard, Platform::Windows).expect("url must build"),
        "https://downloads.godotengine.org/?version=4.3&flavor=stable&slug=win64.exe.zip&platform=windows.64"
    );
    assert!(build_download_url("", Edition::Standard, Platform::Linux).is_err());
    assert!(build_download_url("4 3", Edition::Standard, Platform::Linux).is_err());
}

#[test]
fn release_versions_drop_channel_markers() {
    assert_eq!(release_version("4.3-stable"), "4.3");
    assert_eq!(release_version("3.5.3-stable"), "3.5.3");
    assert_eq!(release_version("4.4-dev"), "4.4");
    assert_eq!(release_version("4.2-rc1"), "4.21");
}

#[test]
fn fetch_keeps_usable_releases_newest_first() {
    let body = r#"[
        {"tag_name":"4.3-stable","draft":false,"published_at":"2024-08-15T00:00:00Z",
         "assets":[{"name":"Godot_v4.3-stable_linux.x86_64.zip"},{"name":"Godot_v4.3-stable_mono_win64.zip"}]},
        {"tag_name":"4.4-dev","draft":false,"published_at":"2025-01-01T00:00:00Z",
         "assets":[{"name":"Godot_v4.4-dev_win64.exe.zip"}]},
        {"tag_name":"4.2-stable","draft":true,"published_at":"2025-02-01T00:00:00Z",
         "assets":[{"name":"Godot_v4.2-stable_win64.exe.zip"}]},
        {"tag_name":"","draft":false,"published_at":"2025-02-01T00:00:00Z",
         "assets":[{"name":"Godot_win64.exe.zip"}]},
        {"tag_name":"3.0-stable","draft":false,"published_at":"2018-01-29T00:00:00Z",
         "assets":[{"name":"godot-3.0.tar.xz"}]}
    ]"#;
    let (url, requests, handle) = start_one_shot_json_server("200 OK", body);

    let releases = ReleaseFetcher::with_base_url(&url, Duration::from_secs(10))
        .expect("must build fetcher")
        .fetch()
        .expect("fetch must succeed");
    handle.join().expect("server thread must finish");

    let versions = releases
        .iter()
        .map(|release| release.version.as_str())
        .collect::<Vec<_>>();
    assert_eq!(versions, ["4.4", "4.3"]);
    assert!(!releases[0].is_stable);
    assert!(releases[0].has_standard);
    assert!(!releases[0].has_dotnet);
    assert!(releases[1].is_stable);
    assert!(releases[1].has_dotnet);

    let request = requests.recv().expect("must capture request");
    assert!(request.starts_with("GET /releases?per_page=100&page=1 "));
    let lowered = request.to_ascii_lowercase();
    assert!(lowered.contains("user-agent: godman/"));
    assert!(lowered.contains("accept: application/json"));
}

#[test]
fn fetch_reports_http_failures() {
    let (url, _requests, handle) = start_one_shot_json_server("500 Internal Server Error", "{}");

    let err = ReleaseFetcher::with_base_url(&url, Duration::from_secs(10))
        .expect("must build fetcher")
        .fetch()
        .expect_err("server error must fail");
    handle.join().expect("server thread must finish");

    assert!(format!("{err:#}").contains("failed to fetch releases from GitHub"));
}

#[test]
fn release_filter_applies_stable_text_and_limit() {
    let releases = vec![
        release("4.4", false),
        release("4.3", true),
        release("4.3.1", true),
        release("3.6", true),
    ];

    let stable = filter_releases(
        &releases,
        &ReleaseFilter {
            stable_only: true,
            text: None,
            limit: 2,
        },
    );
    assert_eq!(stable, vec![release("4.3", true), release("4.3.1", true)]);

    let filtered = filter_releases(
        &releases,
        &ReleaseFilter {
            stable_only: false,
            text: Some(" 4.3 ".to_string()),
            limit: 20,
        },
    );
    assert_eq!(filtered.len(), 2);
    assert!(filtered.iter().all(|release| release.version.contains("4.3")));
}

#[test]
fn release_lines_explain_empty_results() {
    assert_eq!(
        format_release_lines(&[], 0, false),
        vec!["No releases found.".to_string()]
    );
    assert_eq!(
        format_release_lines(&[], 4, true),
        vec!["No releases match the specified filters.".to_string()]
    );

    let lines = format_release_lines(&[release("4.3", true)], 4, true);
    assert!(lines[0].starts_with("Version"));
    assert!(lines[1].starts_with("4.3"));
    assert_eq!(lines.last().map(String::as_str), Some("Showing 1 of 4 total releases."));
}

#[test]
fn settings_parse_known_fields() {
    let settings = parse_settings(
        "default_scope = \"global\"\ndefault_edition = \"dotnet\"\ncreate_desktop_shortcut = true\ndownload_timeout_secs = 60\n",
    )
    .expect("settings must parse");
    assert_eq!(
        settings,
        Settings {
            default_scope: Scope::Global,
            default_edition: Edition::DotNet,
            create_desktop_shortcut: true,
            download_timeout_secs: 60,
        }
    );
    assert_eq!(settings.download_timeout(), Duration::from_secs(60));

    assert_eq!(parse_settings("").expect("empty must parse"), Settings::default());
}

#[test]
fn settings_reject_unknown_values() {
    assert!(parse_settings("default_scope = \"galaxy\"").is_err());
    assert!(parse_settings("default_edition = \"gold\"").is_err());
    assert!(parse_settings("download_timeout_secs = 0").is_err());
}

#[test]
fn settings_file_is_optional_but_must_be_valid() {
    let root = test_root("settings");
    fs::create_dir_all(&root).expect("must create root");
    let path = root.join("config.toml");

    assert_eq!(
        Settings::load(&path).expect("missing file must yield defaults"),
        Settings::default()
    );

    fs::write(&path, "default_scope = [").expect("must write settings");
    let err = Settings::load(&path).expect_err("malformed settings must fail");
    assert!(format!("{err:#}").contains(&path.display().to_string()));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn status_lines_only_badge_rich_output() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "activated 4.3"),
        "activated 4.3"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "shim missing"),
        "[WARN] shim missing"
    );
}

#[test]
fn output_style_follows_stdout() {
    assert_eq!(resolve_output_style(true, false), OutputStyle::Rich);
    assert_eq!(resolve_output_style(false, true), OutputStyle::Plain);
}

#[test]
fn install_table_marks_the_active_entry() {
    let mut active = godman_core::InstallEntry::new(
        "4.3",
        Edition::Standard,
        Platform::Linux,
        Scope::User,
        "/opt/godot-4.3",
    );
    active.is_active = true;
    let other = godman_core::InstallEntry::new(
        "4.2",
        Edition::DotNet,
        Platform::Linux,
        Scope::Global,
        "/opt/godot-4.2",
    );

    let lines = format_install_table(&[&active, &other]);
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Active"));
    assert!(lines[1].starts_with('*'));
    assert!(lines[1].contains(&active.short_id()));
    assert!(lines[2].starts_with(' '));
    assert!(lines[2].contains("DotNet"));

    assert_eq!(
        format_install_table(&[]),
        vec!["No installs registered.".to_string()]
    );
}

#[test]
fn doctor_lines_show_persisted_value_on_windows() {
    let report = DoctorReport {
        install_count: 1,
        active: None,
        env_var_name: "GODOT_HOME",
        process_env: None,
        persisted_env: Some("C:\\godot".to_string()),
        shim_path: PathBuf::from("C:\\bin\\godot.cmd"),
        shim_exists: false,
        active_dir_exists: None,
        shim_dir_on_path: true,
    };

    let windows = format_doctor_lines(&report, Platform::Windows);
    assert_eq!(windows[0], "registry: 1 install(s) tracked, active: none");
    assert!(windows[1].contains("restart the shell to load: C:\\godot"));
    assert!(windows[2].starts_with("shim missing"));
    assert_eq!(windows[3], "shim directory on PATH: yes");

    let linux = format_doctor_lines(&report, Platform::Linux);
    assert_eq!(linux[1], "GODOT_HOME not set");
}

#[test]
fn clean_lines_report_each_outcome() {
    let report = CleanReport {
        items: vec![
            CleanItem {
                path: PathBuf::from("/a"),
                outcome: CleanOutcome::Removed,
            },
            CleanItem {
                path: PathBuf::from("/b"),
                outcome: CleanOutcome::Missing,
            },
            CleanItem {
                path: PathBuf::from("/c"),
                outcome: CleanOutcome::Failed("busy".to_string()),
            },
        ],
        delegated: false,
    };

    assert_eq!(
        format_clean_lines(&report),
        vec![
            "removed /a".to_string(),
            "skipped /b (not found)".to_string(),
            "failed /c: busy".to_string(),
            "clean finished with 1 failure(s)".to_string(),
        ]
    );
}

#[test]
fn confirmation_accepts_only_yes() {
    for (answer, expected) in [
        ("y\n", true),
        ("YES\n", true),
        ("\n", false),
        ("no\n", false),
        ("", false),
    ] {
        let mut output = Vec::new();
        let confirmed = confirm(&mut Cursor::new(answer), &mut output, "Proceed?")
            .expect("confirmation must read");
        assert_eq!(confirmed, expected, "{answer:?}");
        assert_eq!(String::from_utf8_lossy(&output), "Proceed? [y/N] ");
    }
}

#[test]
fn version_line_names_the_binary() {
    assert_eq!(version_line(), format!("godman {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn completion_scripts_name_the_binary() {
    let mut output = Vec::new();
    completion::write_completions_script(CliCompletionShell::Bash, &mut output)
        .expect("completions must render");
    let script = String::from_utf8(output).expect("script must be utf8");
    assert!(script.contains("godman"));
    assert!(script.contains("install"));
}

#[test]
fn install_activate_deactivate_remove_round_through_commands() {
    let root = test_root("flow");
    let paths = test_paths(&root);
    let platform = UnixPlatform::new(paths.clone());
    let archive = write_engine_archive(&root.join("downloads"), "Godot_v4.3-stable_linux.x86_64");
    let settings = Settings::default();

    let mut install = install_args("4.3");
    install.platform = Some(CliPlatform::Linux);
    install.archive = Some(archive);
    install.activate = true;
    run_command(Commands::Install(install), &platform, &settings, plain())
        .expect("install must succeed");

    let registry = load_registry(&paths);
    let entry = registry.get_active().cloned().expect("install must be active");
    assert_eq!(entry.version, "4.3");
    assert_eq!(
        entry.path,
        paths
            .install_root(Scope::User)
            .join("Godot_v4.3-stable_linux")
    );
    assert!(paths.shim_path(Scope::User).is_file());

    run_command(Commands::List, &platform, &settings, plain()).expect("list must succeed");

    run_command(Commands::Deactivate, &platform, &settings, plain())
        .expect("deactivate must succeed");
    assert_eq!(load_registry(&paths).active_id, None);
    assert!(!paths.shim_path(Scope::User).exists());

    run_command(Commands::Deactivate, &platform, &settings, plain())
        .expect("deactivate without active install must succeed");

    let prefix = entry.short_id()[..8].to_string();
    run_command(
        Commands::Remove {
            id: prefix,
            delete: true,
        },
        &platform,
        &settings,
        plain(),
    )
    .expect("remove must succeed");
    assert!(load_registry(&paths).installs.is_empty());
    assert!(!entry.path.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unknown_ids_are_not_found() {
    let root = test_root("unknown-id");
    let paths = test_paths(&root);
    let platform = UnixPlatform::new(paths);

    let err = run_command(
        Commands::Activate {
            id: "deadbeef".to_string(),
            dry_run: false,
            create_desktop_shortcut: false,
        },
        &platform,
        &Settings::default(),
        plain(),
    )
    .expect_err("unknown id must fail");
    assert!(matches!(
        install_error(&err),
        Some(InstallError::NotFound { .. })
    ));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn clean_with_yes_removes_owned_directories() {
    let root = test_root("clean");
    let paths = test_paths(&root);
    let platform = UnixPlatform::new(paths.clone());
    let shared_file = paths.shim_dir(Scope::User).join("other-tool");
    fs::create_dir_all(paths.shim_dir(Scope::User)).expect("must create shim dir");
    fs::write(&shared_file, "keep").expect("must write unrelated file");

    run_command(
        Commands::Clean { yes: true },
        &platform,
        &Settings::default(),
        plain(),
    )
    .expect("clean must succeed");

    assert!(!paths.config_dir().exists());
    assert!(!paths.install_root(Scope::User).exists());
    assert!(shared_file.is_file());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn elevated_commands_refuse_without_privilege() {
    let root = test_root("elevated");
    let paths = test_paths(&root);
    let platform = UnixPlatform::new(paths);
    let payload = encode_payload(&ElevatedOperation::Clean(ElevatedCleanPayload {}))
        .expect("payload must encode");

    let err = run_command(
        Commands::CleanElevated(ElevatedArgs {
            payload: payload.clone(),
        }),
        &platform,
        &Settings::default(),
        plain(),
    )
    .expect_err("unprivileged child must refuse");
    assert!(matches!(install_error(&err), Some(InstallError::NotElevated)));

    let err = run_command(
        Commands::InstallElevated(ElevatedArgs { payload }),
        &platform,
        &Settings::default(),
        plain(),
    )
    .expect_err("mismatched payload must fail");
    assert!(matches!(
        install_error(&err),
        Some(InstallError::Validation(_))
    ));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn interrupt_handler_cancels_the_running_install() {
    let cancel = CancelToken::new();
    let mut handler = interrupt_handler(cancel.clone());
    assert!(cancel.check().is_ok());

    handler();
    assert!(cancel.is_canceled());
    let err = cancel.check().expect_err("must report cancellation");
    assert!(matches!(install_error(&err), Some(InstallError::Canceled)));
}
