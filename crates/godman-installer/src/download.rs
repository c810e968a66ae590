use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use reqwest::blocking::{Client, Response};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Url;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::progress::CancelToken;

pub const DOWNLOAD_BUFFER_SIZE: usize = 80 * 1024;
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const FALLBACK_ARCHIVE_NAME: &str = "download.zip";

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("godman/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self { client })
    }

    /// Sends the request and returns once headers arrive. The body is not read until
    /// [`PendingDownload::save_to_temp`] is called.
    pub fn open(&self, url: &str) -> Result<PendingDownload> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to download {url}"))?
            .error_for_status()
            .with_context(|| format!("failed to download {url}"))?;

        let file_name = suggested_file_name(&response);
        let total = response.content_length().filter(|len| *len > 0);
        debug!(url, file_name = %file_name, total, "download response headers received");

        Ok(PendingDownload {
            url: url.to_string(),
            file_name,
            total,
            response,
        })
    }
}

pub struct PendingDownload {
    url: String,
    file_name: String,
    total: Option<u64>,
    response: Response,
}

impl PendingDownload {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Streams the body into a temporary file. Percentages are reported while the total is
    /// known; otherwise only the final 100 is reported.
    pub fn save_to_temp(
        mut self,
        progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> Result<DownloadedArchive> {
        let mut file = tempfile::Builder::new()
            .prefix("godman-")
            .suffix(&temp_suffix(&self.file_name))
            .tempfile()
            .context("failed to create temporary download file")?;

        let mut buffer = vec![0_u8; DOWNLOAD_BUFFER_SIZE];
        let mut downloaded = 0_u64;
        loop {
            cancel.check()?;
            let read = self
                .response
                .read(&mut buffer)
                .with_context(|| format!("failed reading download body from {}", self.url))?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read]).with_context(|| {
                format!("failed writing download to {}", file.path().display())
            })?;
            downloaded += read as u64;

            if let Some(total) = self.total {
                let percent = (downloaded.saturating_mul(100) / total).min(100);
                progress(percent as u8);
            }
        }
        file.flush()
            .with_context(|| format!("failed flushing download to {}", file.path().display()))?;
        progress(100);

        debug!(url = %self.url, bytes = downloaded, "download complete");
        Ok(DownloadedArchive {
            file_name: self.file_name,
            bytes: downloaded,
            file,
        })
    }
}

/// A downloaded archive held in a temporary file that is deleted on drop.
#[derive(Debug)]
pub struct DownloadedArchive {
    file_name: String,
    bytes: u64,
    file: NamedTempFile,
}

impl DownloadedArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

fn suggested_file_name(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(file_name_from_content_disposition)
        .or_else(|| file_name_from_url(response.url()))
        .unwrap_or_else(|| FALLBACK_ARCHIVE_NAME.to_string())
}

pub(crate) fn file_name_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header_parameters(header) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.trim().rsplit("''").next().unwrap_or(value);
                let decoded = percent_decode_str(encoded).decode_utf8_lossy();
                if let Some(name) = sanitize_file_name(&decoded) {
                    return Some(name);
                }
            }
            "filename" => {
                if plain.is_none() {
                    plain = sanitize_file_name(value);
                }
            }
            _ => {}
        }
    }
    plain
}

/// Splits on `;` outside of double quotes.
fn header_parameters(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (index, ch) in header.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(header[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(header[start..].trim());
    parts
}

pub(crate) fn file_name_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    sanitize_file_name(&percent_decode_str(segment).decode_utf8_lossy())
}

fn sanitize_file_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('"').trim();
    let last = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed).trim();
    if last.is_empty() || last == "." || last == ".." {
        return None;
    }
    Some(last.to_string())
}

fn temp_suffix(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        ".zip".to_string()
    } else {
        ".download".to_string()
    }
}
