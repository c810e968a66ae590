use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edition {
    Standard,
    DotNet,
}

impl Edition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::DotNet => "dotnet",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "standard" | "std" => Some(Self::Standard),
            "dotnet" | ".net" | "mono" | "csharp" => Some(Self::DotNet),
            _ => None,
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("Standard"),
            Self::DotNet => f.write_str("DotNet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    /// Platform of the running process. Every non-Windows host is treated as Linux.
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "win64" => Some(Self::Windows),
            "linux" | "x11" => Some(Self::Linux),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => f.write_str("Windows"),
            Self::Linux => f.write_str("Linux"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[default]
    User,
    Global,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Global => "global",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "global" | "machine" | "system" => Some(Self::Global),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("User"),
            Self::Global => f.write_str("Global"),
        }
    }
}

/// One extracted copy of the engine on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallEntry {
    pub id: Uuid,
    pub version: String,
    pub edition: Edition,
    pub platform: Platform,
    #[serde(default)]
    pub scope: Scope,
    pub path: PathBuf,
    #[serde(default)]
    pub checksum: Option<String>,
    pub added_at: DateTime<Utc>,
    /// Derived from [`InstallRegistry::active_id`]; never written to disk.
    #[serde(skip)]
    pub is_active: bool,
}

impl InstallEntry {
    pub fn new(
        version: impl Into<String>,
        edition: Edition,
        platform: Platform,
        scope: Scope,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: version.into(),
            edition,
            platform,
            scope,
            path: path.into(),
            checksum: None,
            added_at: Utc::now(),
            is_active: false,
        }
    }

    pub fn short_id(&self) -> String {
        self.id.simple().to_string()
    }

    pub fn label(&self) -> String {
        format!("{} ({}, {})", self.version, self.edition, self.platform)
    }
}

/// Persisted root aggregate: every known install plus the active pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRegistry {
    #[serde(default)]
    pub installs: Vec<InstallEntry>,
    #[serde(default)]
    pub active_id: Option<Uuid>,
}

impl InstallRegistry {
    /// Points the registry at `id` and rewrites every entry's flag. An id with no matching
    /// entry is stored as-is and leaves every flag cleared.
    pub fn mark_active(&mut self, id: Uuid) {
        self.active_id = Some(id);
        for install in &mut self.installs {
            install.is_active = install.id == id;
        }
    }

    pub fn clear_active(&mut self) {
        self.active_id = None;
        for install in &mut self.installs {
            install.is_active = false;
        }
    }

    pub fn get_active(&self) -> Option<&InstallEntry> {
        let active_id = self.active_id?;
        self.installs.iter().find(|install| install.id == active_id)
    }

    pub fn refresh_active_flags(&mut self) {
        match self.active_id {
            Some(id) => self.mark_active(id),
            None => self.clear_active(),
        }
    }

    pub fn find(&self, id: Uuid) -> Option<&InstallEntry> {
        self.installs.iter().find(|install| install.id == id)
    }

    /// Resolves a full id, or a prefix of the hyphen-free form that matches exactly one
    /// entry.
    pub fn resolve_id(&self, text: &str) -> Option<Uuid> {
        let text = text.trim();
        if let Ok(id) = Uuid::parse_str(text) {
            return self.find(id).map(|install| install.id);
        }

        let needle = text.replace('-', "").to_ascii_lowercase();
        if needle.is_empty() {
            return None;
        }
        let mut matches = self
            .installs
            .iter()
            .filter(|install| install.short_id().starts_with(&needle));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.id)
    }

    /// Replaces any entry living at the same directory, then appends `entry`.
    pub fn upsert(&mut self, entry: InstallEntry) {
        self.installs
            .retain(|existing| !paths_equal_ignore_case(&existing.path, &entry.path));
        self.installs.push(entry);
        self.refresh_active_flags();
    }

    pub fn remove(&mut self, id: Uuid) -> Option<InstallEntry> {
        let index = self.installs.iter().position(|install| install.id == id)?;
        let removed = self.installs.remove(index);
        if self.active_id == Some(id) {
            self.clear_active();
        }
        Some(removed)
    }

    /// Newest entry matching every identifying field of a finished install.
    pub fn find_latest_match(
        &self,
        version: &str,
        edition: Edition,
        platform: Platform,
        scope: Scope,
        path: &Path,
    ) -> Option<&InstallEntry> {
        self.installs
            .iter()
            .filter(|install| {
                install.version == version
                    && install.edition == edition
                    && install.platform == platform
                    && install.scope == scope
                    && paths_equal_ignore_case(&install.path, path)
            })
            .max_by_key(|install| install.added_at)
    }

    pub fn sorted_newest_first(&self) -> Vec<&InstallEntry> {
        let mut installs = self.installs.iter().collect::<Vec<_>>();
        installs.sort_by(|left, right| right.added_at.cmp(&left.added_at));
        installs
    }
}

pub fn paths_equal_ignore_case(left: &Path, right: &Path) -> bool {
    normalized_path_key(left) == normalized_path_key(right)
}

fn normalized_path_key(path: &Path) -> String {
    path.to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .replace('\\', "/")
        .to_lowercase()
}
