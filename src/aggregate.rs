//! # Aggregate Module
//!
//! Fans one history request out across every discovered store and merges the
//! per-store results into a single newest-first sequence.
//!
//! Each store is asked for at most `result_cap` records, and the same cap is
//! applied again after merging. The global top `result_cap` is always a subset
//! of the union of every store's own top `result_cap`, so the per-store limit
//! never starves a profile.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use tracing::{info, warn};

use crate::access::SafeAccessor;
use crate::cache::StoreHandleCache;
use crate::error::{HistoryError, ProfileFailure};
use crate::profiles::ProfileLocation;
use crate::query;
use crate::record::{AggregatedResult, HistoryRecord};
use crate::timestamp::TimeRange;

#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    pub result_cap: usize,
    pub query_timeout: Duration,
    pub max_parallel: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            result_cap: crate::constants::DEFAULT_RESULT_CAP,
            query_timeout: Duration::from_secs(5),
            max_parallel: 1,
        }
    }
}

pub struct Aggregator {
    accessor: SafeAccessor,
    cache: Arc<StoreHandleCache>,
    options: AggregateOptions,
}

impl Aggregator {
    pub fn new(
        accessor: SafeAccessor,
        cache: Arc<StoreHandleCache>,
        options: AggregateOptions,
    ) -> Self {
        Self {
            accessor,
            cache,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<StoreHandleCache> {
        &self.cache
    }

    pub fn accessor(&self) -> &SafeAccessor {
        &self.accessor
    }

    pub fn options(&self) -> AggregateOptions {
        self.options
    }

    /// Query every profile and merge the results.
    ///
    /// Profiles that fail are skipped and reported in `failures`. The call only
    /// fails when at least one profile failed and none produced records.
    pub fn aggregate(
        &self,
        profiles: &[ProfileLocation],
        range: Option<TimeRange>,
    ) -> Result<AggregatedResult, HistoryError> {
        let started = Instant::now();
        if profiles.is_empty() {
            return Ok(AggregatedResult::default());
        }

        let outcomes = self.query_all(profiles, range);

        let mut per_store = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (profile, outcome) in profiles.iter().zip(outcomes) {
            match outcome {
                Ok(records) => per_store.push(records),
                Err(error) => {
                    warn!(
                        profile = %profile.name,
                        category = error.category(),
                        error = %error,
                        "profile skipped"
                    );
                    failures.push(ProfileFailure {
                        profile: profile.name.clone(),
                        error,
                    });
                }
            }
        }

        if per_store.is_empty() {
            warn!(profiles = profiles.len(), "every profile failed");
            return Err(HistoryError::Aggregate { failures });
        }

        let stores_succeeded = per_store.len();
        let records = merge_records(per_store, self.options.result_cap);
        info!(
            stores = profiles.len(),
            succeeded = stores_succeeded,
            failed = failures.len(),
            records = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregate finished"
        );

        Ok(AggregatedResult {
            records,
            stores_discovered: profiles.len(),
            stores_succeeded,
            failures,
        })
    }

    /// One outcome per profile, in discovery order. Returns only after every
    /// profile has settled.
    fn query_all(
        &self,
        profiles: &[ProfileLocation],
        range: Option<TimeRange>,
    ) -> Vec<Result<Vec<HistoryRecord>, HistoryError>> {
        let workers = self.options.max_parallel.clamp(1, profiles.len());
        if workers == 1 {
            return profiles
                .iter()
                .map(|profile| self.query_profile(profile, range))
                .collect();
        }

        let (job_tx, job_rx) = unbounded::<usize>();
        for index in 0..profiles.len() {
            if job_tx.send(index).is_err() {
                break;
            }
        }
        drop(job_tx);

        let (result_tx, result_rx) = unbounded();
        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for index in job_rx.iter() {
                        let outcome = self.query_profile(&profiles[index], range);
                        if result_tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut settled: Vec<(usize, Result<Vec<HistoryRecord>, HistoryError>)> =
            result_rx.iter().collect();
        settled.sort_by_key(|(index, _)| *index);
        settled.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn query_profile(
        &self,
        profile: &ProfileLocation,
        range: Option<TimeRange>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let resolved = self.accessor.resolve(profile)?;
        let cap = self.options.result_cap;
        let timeout = self.options.query_timeout;
        self.cache
            .with_handle(&resolved, |handle| query::query_store(handle, range, cap, timeout))
    }
}

/// Concatenate per-store sequences, sort newest first and keep the first `cap`.
///
/// The sort is stable, so records with equal timestamps keep store order.
pub fn merge_records(per_store: Vec<Vec<HistoryRecord>>, cap: usize) -> Vec<HistoryRecord> {
    let mut merged: Vec<HistoryRecord> = per_store.into_iter().flatten().collect();
    merged.sort_by(|a, b| b.last_visit_time.cmp(&a.last_visit_time));
    merged.truncate(cap);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(url: &str, t: i64) -> HistoryRecord {
        HistoryRecord {
            url: url.to_string(),
            title: None,
            last_visit_time: t,
        }
    }

    fn times(records: &[HistoryRecord]) -> Vec<i64> {
        records.iter().map(|r| r.last_visit_time).collect()
    }

    #[test]
    fn merges_descending() {
        let merged = merge_records(
            vec![vec![rec("a", 10), rec("a", 5)], vec![rec("b", 8), rec("b", 3)]],
            1000,
        );
        assert_eq!(times(&merged), vec![10, 8, 5, 3]);
    }

    #[test]
    fn cap_applies_after_merge() {
        let first: Vec<HistoryRecord> = (0..5).map(|i| rec("a", 100 + i)).collect();
        let second: Vec<HistoryRecord> = (0..5).map(|i| rec("b", 200 + i)).collect();
        let merged = merge_records(vec![first, second], 6);
        assert_eq!(times(&merged), vec![204, 203, 202, 201, 200, 104]);
    }

    #[test]
    fn ties_keep_store_order_and_duplicates_survive() {
        let merged = merge_records(
            vec![vec![rec("first", 7)], vec![rec("second", 7), rec("first", 7)]],
            10,
        );
        let urls: Vec<&str> = merged.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["first", "second", "first"]);
    }

    #[test]
    fn empty_profile_list_is_empty_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let aggregator = Aggregator::new(
            SafeAccessor::new(true, dir.path()),
            Arc::new(StoreHandleCache::new(Duration::from_millis(10))),
            AggregateOptions::default(),
        );
        let result = aggregator.aggregate(&[], None).expect("aggregate");
        assert!(result.records.is_empty());
        assert_eq!(result.stores_discovered, 0);
        assert!(!result.is_degraded());
    }
}
