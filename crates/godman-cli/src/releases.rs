use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use godman_core::{Edition, InstallError, Platform};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

pub(crate) const GITHUB_RELEASES_URL: &str =
    "https://api.github.com/repos/godotengine/godot/releases";
const RELEASES_PER_PAGE: usize = 100;
const MAX_RELEASE_PAGES: u32 = 3;
const PRERELEASE_MARKERS: [&str; 5] = ["-stable", "-beta", "-alpha", "-rc", "-dev"];
const STANDARD_ASSET_MARKERS: [&str; 3] = ["win64.exe.zip", "linux.x86_64.zip", "linux_x86_64.zip"];
const DOTNET_ASSET_MARKERS: [&str; 2] = ["mono", "dotnet"];

const OBJECT_STORAGE_BASE: &str = "https://godot-releases.nbg1.your-objectstorage.com";
const OFFICIAL_DOWNLOADS_BASE: &str = "https://downloads.godotengine.org/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GodotRelease {
    pub(crate) version: String,
    pub(crate) is_stable: bool,
    pub(crate) has_standard: bool,
    pub(crate) has_dotnet: bool,
    pub(crate) published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReleaseFilter {
    pub(crate) stable_only: bool,
    pub(crate) text: Option<String>,
    pub(crate) limit: usize,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    #[serde(default)]
    name: String,
}

pub(crate) struct ReleaseFetcher {
    client: Client,
    base_url: String,
}

impl ReleaseFetcher {
    pub(crate) fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(GITHUB_RELEASES_URL, timeout)
    }

    pub(crate) fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("godman/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Reads up to three pages of releases and returns the usable ones, newest first.
    pub(crate) fn fetch(&self) -> Result<Vec<GodotRelease>> {
        let mut releases = Vec::new();
        for page in 1..=MAX_RELEASE_PAGES {
            let raw = self
                .fetch_page(page)
                .context("failed to fetch releases from GitHub")?;
            let count = raw.len();
            debug!(page, count, "fetched release page");
            releases.extend(raw.into_iter().filter_map(summarize_release));
            if count < RELEASES_PER_PAGE {
                break;
            }
        }

        sort_newest_first(&mut releases);
        Ok(releases)
    }

    fn fetch_page(&self, page: u32) -> Result<Vec<GithubRelease>> {
        let url = format!(
            "{}?per_page={RELEASES_PER_PAGE}&page={page}",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .with_context(|| format!("request failed: {url}"))?
            .error_for_status()
            .with_context(|| format!("request failed: {url}"))?;
        let body = response
            .text()
            .with_context(|| format!("failed reading response body: {url}"))?;
        parse_release_page(&body)
    }
}

fn parse_release_page(body: &str) -> Result<Vec<GithubRelease>> {
    serde_json::from_str(body).context("failed parsing release listing")
}

fn summarize_release(release: GithubRelease) -> Option<GodotRelease> {
    let tag = release.tag_name.as_deref().map(str::trim).unwrap_or_default();
    if release.draft || tag.is_empty() {
        return None;
    }

    let has_standard = release.assets.iter().any(|asset| {
        STANDARD_ASSET_MARKERS
            .iter()
            .any(|marker| asset.name.contains(marker))
    });
    let has_dotnet = release.assets.iter().any(|asset| {
        DOTNET_ASSET_MARKERS
            .iter()
            .any(|marker| asset.name.contains(marker))
    });
    if !has_standard && !has_dotnet {
        return None;
    }

    Some(GodotRelease {
        version: release_version(tag),
        is_stable: tag.contains("-stable"),
        has_standard,
        has_dotnet,
        published_at: release.published_at,
    })
}

/// Removes every channel marker in place: `4.3-stable` becomes `4.3` and `4.4-beta2`
/// becomes `4.42`.
pub(crate) fn release_version(tag: &str) -> String {
    PRERELEASE_MARKERS
        .iter()
        .fold(tag.to_string(), |version, marker| version.replace(marker, ""))
}

fn sort_newest_first(releases: &mut [GodotRelease]) {
    releases.sort_by(|left, right| right.published_at.cmp(&left.published_at));
}

pub(crate) fn filter_releases(releases: &[GodotRelease], filter: &ReleaseFilter) -> Vec<GodotRelease> {
    let needle = filter
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    releases
        .iter()
        .filter(|release| !filter.stable_only || release.is_stable)
        .filter(|release| match &needle {
            Some(needle) => release.version.to_lowercase().contains(needle),
            None => true,
        })
        .take(filter.limit)
        .cloned()
        .collect()
}

/// Official download location of a stable build.
pub(crate) fn build_download_url(version: &str, edition: Edition, platform: Platform) -> Result<String> {
    let version = version.trim();
    if version.is_empty() {
        return Err(InstallError::Validation("version is required".to_string()).into());
    }

    let url = match platform {
        Platform::Linux => {
            let file = match edition {
                Edition::Standard => format!("Godot_v{version}-stable_linux.x86_64.zip"),
                Edition::DotNet => format!("Godot_v{version}-stable_mono_linux_x86_64.zip"),
            };
            format!("{OBJECT_STORAGE_BASE}/{version}-stable/{file}")
        }
        Platform::Windows => {
            let slug = match edition {
                Edition::Standard => "win64.exe.zip",
                Edition::DotNet => "mono_win64.zip",
            };
            format!(
                "{OFFICIAL_DOWNLOADS_BASE}?version={version}&flavor=stable&slug={slug}&platform=windows.64"
            )
        }
    };

    if url.chars().any(char::is_whitespace) {
        return Err(InstallError::Validation(format!(
            "version '{version}' cannot be used in a download url"
        ))
        .into());
    }
    Ok(url)
}
