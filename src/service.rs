//! End-to-end history requests: discover, resolve, query, merge.

use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::access::SafeAccessor;
use crate::aggregate::{AggregateOptions, Aggregator};
use crate::cache::StoreHandleCache;
use crate::config::Config;
use crate::error::HistoryError;
use crate::profiles::{Platform, ProfileDiscovery, ProfileLocation};
use crate::record::AggregatedResult;
use crate::timestamp::TimeRange;

enum Source {
    Ready(ProfileDiscovery),
    Unsupported(String),
}

pub struct HistoryService {
    source: Source,
    aggregator: Aggregator,
}

impl HistoryService {
    pub fn new(discovery: ProfileDiscovery, aggregator: Aggregator) -> Self {
        Self {
            source: Source::Ready(discovery),
            aggregator,
        }
    }

    /// A service whose every request fails with `UnsupportedPlatform(reason)`.
    pub fn unavailable(reason: impl Into<String>, aggregator: Aggregator) -> Self {
        Self {
            source: Source::Unsupported(reason.into()),
            aggregator,
        }
    }

    /// Build the service for the host platform.
    ///
    /// An unsupported host still yields a service; every request on it fails
    /// with `UnsupportedPlatform`.
    pub fn from_config(cfg: &Config) -> Self {
        let cache = Arc::new(StoreHandleCache::new(cfg.busy_timeout()));
        let options = AggregateOptions {
            result_cap: cfg.result_cap,
            query_timeout: cfg.query_timeout(),
            max_parallel: cfg.parallelism(),
        };

        let platform = match Platform::detect() {
            Ok(platform) => platform,
            Err(err) => {
                warn!(error = %err, "history unavailable on this host");
                if let Some(root) = cfg.profile_root() {
                    warn!(
                        root = %root.display(),
                        "profile_root ignored: only macOS and Windows are supported"
                    );
                }
                let aggregator = Aggregator::new(
                    SafeAccessor::new(false, cfg.scratch_dir()),
                    cache,
                    options,
                );
                return Self::unavailable(unsupported_reason(err), aggregator);
            }
        };

        let discovery = match cfg.profile_root() {
            Some(root) => Ok(ProfileDiscovery::new(root, cfg.store_file_name.clone())),
            None => ProfileDiscovery::for_platform(platform, &cfg.store_file_name),
        };
        let accessor = SafeAccessor::for_platform(platform, cfg.scratch_dir());
        let aggregator = Aggregator::new(accessor, cache, options);

        match discovery {
            Ok(discovery) => {
                info!(
                    %platform,
                    root = %discovery.root().display(),
                    snapshot_copy = platform.requires_snapshot_copy(),
                    "history service ready"
                );
                Self::new(discovery, aggregator)
            }
            Err(err) => Self::unavailable(unsupported_reason(err), aggregator),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn discover(&self) -> Result<Vec<ProfileLocation>, HistoryError> {
        match &self.source {
            Source::Ready(discovery) => Ok(discovery.discover()),
            Source::Unsupported(os) => Err(HistoryError::UnsupportedPlatform(os.clone())),
        }
    }

    /// One aggregate call, optionally limited to the 24 hours of `date`.
    ///
    /// No profiles at all is an empty success with `stores_discovered == 0`.
    pub fn fetch(&self, date: Option<NaiveDate>) -> Result<AggregatedResult, HistoryError> {
        let profiles = self.discover()?;
        let range = date.map(TimeRange::for_date);
        if profiles.is_empty() {
            info!("no history stores found");
            return Ok(AggregatedResult::default());
        }
        self.aggregator.aggregate(&profiles, range)
    }

    /// Release cached handles and the snapshot copies behind them.
    pub fn shutdown(&self) {
        self.aggregator.cache().close_all();
    }
}

fn unsupported_reason(err: HistoryError) -> String {
    match err {
        HistoryError::UnsupportedPlatform(reason) => reason,
        other => other.to_string(),
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, HistoryError> {
    static DATE_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));
    let trimmed = value.trim();
    if !DATE_RE.is_match(trimmed) {
        return Err(HistoryError::InvalidDate(value.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| HistoryError::InvalidDate(value.to_string()))
}
