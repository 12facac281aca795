use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ProfileFailure;
use crate::timestamp;

/// One row of the store's `urls` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub url: String,
    /// `None` when the store holds NULL; serialized as an empty string.
    #[serde(serialize_with = "title_or_empty")]
    pub title: Option<String>,
    /// Native timestamp (microseconds since 1601).
    pub last_visit_time: i64,
}

impl HistoryRecord {
    pub fn visited_at(&self) -> Option<NaiveDateTime> {
        timestamp::from_native(self.last_visit_time)
    }
}

fn title_or_empty<S: Serializer>(title: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(title.as_deref().unwrap_or(""))
}

/// Outcome of one aggregate call.
#[derive(Debug, Default)]
pub struct AggregatedResult {
    /// Non-increasing by `last_visit_time`, at most the configured cap.
    pub records: Vec<HistoryRecord>,
    pub stores_discovered: usize,
    pub stores_succeeded: usize,
    /// Profiles skipped because they could not be read.
    pub failures: Vec<ProfileFailure>,
}

impl AggregatedResult {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}
