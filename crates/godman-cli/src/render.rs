use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use godman_core::{InstallEntry, InstallRequest, Platform};
use godman_installer::{
    ActivationPreview, CleanOutcome, CleanReport, DoctorReport, RemoveReport,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::releases::GodotRelease;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool, _stderr_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal(), std::io::stderr().is_terminal())
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    /// Percent-based bar for installs; plain output gets no bar at all.
    pub(crate) fn start_progress(self, label: &str) -> InstallProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(100);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<10} [{bar:24.cyan/blue}] {pos:>3}% {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars(".oO@* ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        InstallProgress {
            label: label.to_string(),
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

pub(crate) struct InstallProgress {
    label: String,
    current: u8,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl InstallProgress {
    pub(crate) fn set(&mut self, percent: u8) {
        self.current = percent.min(100);
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.set_position(u64::from(self.current));
        }
    }

    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };
        progress_bar.finish_and_clear();
        println!(
            "{} {:>3}% complete in {}",
            colorize(progress_label_style(), &self.label),
            self.current,
            format_elapsed(self.started_at.elapsed())
        );
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status.to_ascii_uppercase()),
    }
}

pub(crate) fn render_error(style: OutputStyle, err: &anyhow::Error) -> String {
    let prefix = match style {
        OutputStyle::Plain => "error:".to_string(),
        OutputStyle::Rich => colorize(error_style(), "error:"),
    };
    format!("{prefix} {err:#}")
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Left-aligned columns separated by two spaces. The last column is never padded.
fn format_table(header: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths = header.iter().map(|cell| cell.len()).collect::<Vec<_>>();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let render_row = |cells: Vec<&str>| {
        let last = cells.len().saturating_sub(1);
        cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                if index == last {
                    cell.to_string()
                } else {
                    format!("{cell:<width$}", width = widths[index])
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render_row(header.to_vec())];
    lines.extend(
        rows.iter()
            .map(|row| render_row(row.iter().map(String::as_str).collect())),
    );
    lines
}

pub(crate) fn format_install_table(installs: &[&InstallEntry]) -> Vec<String> {
    if installs.is_empty() {
        return vec!["No installs registered.".to_string()];
    }

    let rows = installs
        .iter()
        .map(|install| {
            vec![
                if install.is_active { "*" } else { "" }.to_string(),
                install.short_id(),
                install.version.clone(),
                install.edition.to_string(),
                install.platform.to_string(),
                install.scope.to_string(),
                install.path.display().to_string(),
                install.added_at.format("%Y-%m-%d %H:%M:%SZ").to_string(),
            ]
        })
        .collect::<Vec<_>>();
    format_table(
        &[
            "Active", "Id", "Version", "Edition", "Platform", "Scope", "Path", "Added",
        ],
        &rows,
    )
}

pub(crate) fn format_release_lines(
    shown: &[GodotRelease],
    total: usize,
    stable_only: bool,
) -> Vec<String> {
    if total == 0 {
        return vec!["No releases found.".to_string()];
    }
    if shown.is_empty() {
        return vec!["No releases match the specified filters.".to_string()];
    }

    let rows = shown
        .iter()
        .map(|release| {
            vec![
                release.version.clone(),
                if release.is_stable { "Stable" } else { "Preview" }.to_string(),
                if release.has_standard { "yes" } else { "-" }.to_string(),
                if release.has_dotnet { "yes" } else { "-" }.to_string(),
                release
                    .published_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect::<Vec<_>>();
    let mut lines = format_table(
        &["Version", "Type", "Standard", "DotNet", "Published"],
        &rows,
    );
    lines.push(String::new());
    lines.push(format!("Showing {} of {total} total releases.", shown.len()));
    if !stable_only {
        lines.push("Tip: use --stable to show only stable releases.".to_string());
    }
    lines
}

pub(crate) fn format_install_preview_lines(
    request: &InstallRequest,
    preview: &InstallEntry,
    needs_elevation: bool,
) -> Vec<String> {
    let source = match (&request.archive_path, &request.download_url) {
        (Some(archive), _) => format!("archive {}", archive.display()),
        (None, Some(url)) => format!("download {url}"),
        (None, None) => "none".to_string(),
    };

    let mut lines = vec![
        "Dry run: nothing will be changed.".to_string(),
        format!("version: {}", preview.version),
        format!("edition: {}", preview.edition),
        format!("platform: {}", preview.platform),
        format!("scope: {}", preview.scope),
        format!("source: {source}"),
        format!("target: {}", preview.path.display()),
        "planned:".to_string(),
    ];
    if request.download_url.is_some() && request.archive_path.is_none() {
        lines.push("- download the archive to a temporary file".to_string());
    }
    lines.push(format!("- extract into {}", preview.path.display()));
    if request.force {
        lines.push("- overwrite an existing install directory".to_string());
    }
    lines.push("- register the install".to_string());
    if request.activate {
        lines.push("- activate it".to_string());
    }
    if request.create_desktop_shortcut && request.platform == Platform::Windows {
        lines.push("- create a desktop shortcut".to_string());
    }
    if needs_elevation {
        lines.push("- request elevation for global scope".to_string());
    }
    lines
}

pub(crate) fn format_activation_preview_lines(preview: &ActivationPreview) -> Vec<String> {
    let mut lines = vec![
        "Dry run: nothing will be changed.".to_string(),
        format!(
            "install: {} [{}] {}",
            preview.entry.label(),
            preview.entry.short_id(),
            preview.entry.path.display()
        ),
        format!(
            "current: {}",
            preview
                .current
                .as_ref()
                .map(InstallEntry::label)
                .unwrap_or_else(|| "none".to_string())
        ),
        format!("shim: {}", preview.shim_path.display()),
        "planned:".to_string(),
    ];
    lines.extend(preview.actions.iter().map(|action| format!("- {action}")));
    lines
}

pub(crate) fn format_remove_lines(report: &RemoveReport) -> Vec<String> {
    let mut lines = vec![format!(
        "removed {} [{}]",
        report.entry.label(),
        report.entry.short_id()
    )];
    if report.was_active {
        lines.push("it was active; bindings were removed".to_string());
    }
    if report.deleted {
        lines.push(format!("deleted {}", report.entry.path.display()));
    }
    lines.extend(report.warnings.iter().map(|warning| format!("warning: {warning}")));
    lines
}

pub(crate) fn format_doctor_lines(report: &DoctorReport, platform: Platform) -> Vec<String> {
    let mut lines = Vec::new();
    match (&report.active, report.install_count) {
        (_, 0) => lines.push("registry: no installs registered yet".to_string()),
        (Some(active), count) => lines.push(format!(
            "registry: {count} install(s) tracked, active: {}",
            active.version
        )),
        (None, count) => lines.push(format!(
            "registry: {count} install(s) tracked, active: none"
        )),
    }

    let name = report.env_var_name;
    match (&report.process_env, &report.persisted_env) {
        (Some(value), persisted) => {
            lines.push(format!("{name} -> {value}"));
            if platform == Platform::Windows && persisted.as_ref() != Some(value) {
                lines.push(format!(
                    "  persisted value: {}",
                    persisted.as_deref().unwrap_or("(not set)")
                ));
            }
        }
        (None, Some(persisted)) if platform == Platform::Windows => lines.push(format!(
            "{name} not set in current session (restart the shell to load: {persisted})"
        )),
        (None, _) => lines.push(format!("{name} not set")),
    }

    lines.push(format!(
        "shim {} at {}",
        if report.shim_exists { "present" } else { "missing" },
        report.shim_path.display()
    ));
    if let Some(exists) = report.active_dir_exists {
        lines.push(format!("active install directory exists: {}", yes_no(exists)));
    }
    lines.push(format!(
        "shim directory on PATH: {}",
        yes_no(report.shim_dir_on_path)
    ));
    lines
}

pub(crate) fn format_clean_lines(report: &CleanReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.delegated {
        lines.push("global targets were cleaned by the elevated process".to_string());
    }
    for item in &report.items {
        let line = match &item.outcome {
            CleanOutcome::Removed => format!("removed {}", item.path.display()),
            CleanOutcome::Missing => format!("skipped {} (not found)", item.path.display()),
            CleanOutcome::Failed(reason) => {
                format!("failed {}: {reason}", item.path.display())
            }
        };
        lines.push(line);
    }
    let failures = report.failures();
    if failures == 0 {
        lines.push("clean complete".to_string());
    } else {
        lines.push(format!("clean finished with {failures} failure(s)"));
    }
    lines
}
