//! # Query Module
//!
//! Reads visit rows from one open store, newest first, with an optional
//! half-open time range and a per-query deadline.

use std::time::{Duration, Instant};

use rusqlite::{Connection, ErrorCode, params};
use tracing::{debug, warn};

use crate::cache::StoreHandle;
use crate::constants::PROGRESS_CHECK_OPS;
use crate::error::HistoryError;
use crate::record::HistoryRecord;
use crate::timestamp::TimeRange;

const SELECT_ALL: &str = "SELECT url, title, last_visit_time FROM urls \
     ORDER BY last_visit_time DESC LIMIT ?1";

const SELECT_RANGE: &str = "SELECT url, title, last_visit_time FROM urls \
     WHERE last_visit_time >= ?1 AND last_visit_time < ?2 \
     ORDER BY last_visit_time DESC LIMIT ?3";

/// Read up to `limit` records from one store, newest first, optionally
/// restricted to `range`. The query is interrupted once `timeout` elapses.
pub fn query_store(
    handle: &StoreHandle<'_>,
    range: Option<TimeRange>,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<HistoryRecord>, HistoryError> {
    let profile = handle.profile_name();
    let conn = handle.connection();
    let started = Instant::now();

    let deadline = started + timeout;
    conn.progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() >= deadline));
    let result = run_query(conn, range, limit);
    conn.progress_handler(0, None::<fn() -> bool>);

    match result {
        Ok(records) => {
            debug!(
                profile,
                records = records.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                ranged = range.is_some(),
                "query finished"
            );
            Ok(records)
        }
        Err(err) if is_interrupt(&err) => {
            warn!(profile, ?timeout, "query timed out");
            Err(HistoryError::QueryTimeout {
                profile: profile.to_string(),
                timeout,
            })
        }
        Err(source) => {
            warn!(profile, error = %source, "query failed");
            Err(HistoryError::StoreRead {
                profile: profile.to_string(),
                source,
            })
        }
    }
}

fn run_query(
    conn: &Connection,
    range: Option<TimeRange>,
    limit: usize,
) -> rusqlite::Result<Vec<HistoryRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<HistoryRecord> {
        let url: String = row.get(0)?;
        let title: Option<String> = row.get(1)?;
        let last_visit_time: Option<i64> = row.get(2)?;
        Ok(HistoryRecord {
            url,
            title,
            last_visit_time: last_visit_time.unwrap_or(0),
        })
    };

    let mut out = Vec::new();
    match range {
        Some(range) => {
            let mut stmt = conn.prepare(SELECT_RANGE)?;
            let rows = stmt.query_map(params![range.start, range.end, limit], map_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(SELECT_ALL)?;
            let rows = stmt.query_map(params![limit], map_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}
