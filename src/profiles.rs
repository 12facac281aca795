//! # Profile Discovery
//!
//! Locates every browser profile under the platform's profile root that holds
//! a history store. Profiles are enumerated from the directory itself rather
//! than from a fixed list of names.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::HistoryError;

/// Host platforms with a known profile layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Windows,
}

impl Platform {
    /// Platform of the running process.
    pub fn detect() -> Result<Self, HistoryError> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value onto a supported platform.
    pub fn from_os(os: &str) -> Result<Self, HistoryError> {
        match os {
            "macos" => Ok(Platform::MacOs),
            "windows" => Ok(Platform::Windows),
            other => Err(HistoryError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Browser profile root relative to the user's home directory.
    pub fn profile_root(self, home: &Path) -> PathBuf {
        match self {
            Platform::MacOs => home
                .join("Library")
                .join("Application Support")
                .join("Google")
                .join("Chrome"),
            Platform::Windows => home
                .join("AppData")
                .join("Local")
                .join("Google")
                .join("Chrome")
                .join("User Data"),
        }
    }

    /// Whether the browser holds an exclusive lock on its store while running,
    /// so reads have to go through a snapshot copy.
    pub fn requires_snapshot_copy(self) -> bool {
        matches!(self, Platform::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::MacOs => f.write_str("macos"),
            Platform::Windows => f.write_str("windows"),
        }
    }
}

/// A profile directory that contains a history store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProfileLocation {
    pub name: String,
    pub store_path: PathBuf,
}

/// Enumerates profile directories under one root.
#[derive(Debug, Clone)]
pub struct ProfileDiscovery {
    root: PathBuf,
    store_file_name: String,
}

impl ProfileDiscovery {
    pub fn new(root: impl Into<PathBuf>, store_file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            store_file_name: store_file_name.into(),
        }
    }

    /// Discovery rooted at the platform's default location for the current user.
    pub fn for_platform(platform: Platform, store_file_name: &str) -> Result<Self, HistoryError> {
        let home = dirs::home_dir().ok_or_else(|| {
            HistoryError::UnsupportedPlatform(format!("{platform} (no home directory)"))
        })?;
        Ok(Self::new(platform.profile_root(&home), store_file_name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List every profile whose store file exists as a regular file.
    ///
    /// A missing or unreadable root yields an empty list.
    pub fn discover(&self) -> Vec<ProfileLocation> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                info!(root = %self.root.display(), error = %err, "profile root not readable");
                return Vec::new();
            }
        };

        let mut profiles = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %self.root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let store_path = dir.join(&self.store_file_name);
            // `metadata` follows symlinks, so a linked store file still counts.
            match std::fs::metadata(&store_path) {
                Ok(meta) if meta.is_file() => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    debug!(profile = %name, path = %store_path.display(), "profile found");
                    profiles.push(ProfileLocation { name, store_path });
                }
                _ => {
                    debug!(dir = %dir.display(), "no history store in directory");
                }
            }
        }

        info!(
            root = %self.root.display(),
            profiles = profiles.len(),
            "profile discovery finished"
        );
        profiles
    }
}
