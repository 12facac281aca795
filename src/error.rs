use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("unsupported host platform: {0}")]
    UnsupportedPlatform(String),
    #[error("no browser profile storage found")]
    NoStoresFound,
    #[error("cannot access store for profile {profile} at {path}: {source}")]
    Access {
        profile: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read store for profile {profile}: {source}")]
    StoreRead {
        profile: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("query for profile {profile} exceeded {timeout:?}")]
    QueryTimeout { profile: String, timeout: Duration },
    #[error("every profile failed ({} failure(s)): {}", failures.len(), summarize(failures))]
    Aggregate { failures: Vec<ProfileFailure> },
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl HistoryError {
    /// Stable category name for callers that need to tell failures apart.
    pub fn category(&self) -> &'static str {
        match self {
            HistoryError::UnsupportedPlatform(_) => "unsupported_platform",
            HistoryError::NoStoresFound => "no_stores_found",
            HistoryError::Access { .. } => "access",
            HistoryError::StoreRead { .. } | HistoryError::QueryTimeout { .. } => "store_read",
            HistoryError::Aggregate { .. } => "aggregate",
            HistoryError::InvalidDate(_) => "invalid_date",
        }
    }

    /// Failures that only exclude one profile from an aggregate call.
    pub fn is_per_profile(&self) -> bool {
        matches!(
            self,
            HistoryError::Access { .. }
                | HistoryError::StoreRead { .. }
                | HistoryError::QueryTimeout { .. }
        )
    }
}

/// One profile that was skipped during an aggregate call.
#[derive(Debug)]
pub struct ProfileFailure {
    pub profile: String,
    pub error: HistoryError,
}

fn summarize(failures: &[ProfileFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.profile, f.error.category()))
        .collect::<Vec<_>>()
        .join(", ")
}
