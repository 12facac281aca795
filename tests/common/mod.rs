//! Shared fixtures: on-disk profile trees with Chrome-shaped history stores.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tempfile::TempDir;

use visitscope::access::SafeAccessor;
use visitscope::aggregate::{AggregateOptions, Aggregator};
use visitscope::cache::StoreHandleCache;
use visitscope::profiles::{ProfileDiscovery, ProfileLocation};
use visitscope::service::HistoryService;

pub type Row<'a> = (&'a str, Option<&'a str>, i64);

const URLS_SCHEMA: &str = "CREATE TABLE urls(\
    id INTEGER PRIMARY KEY AUTOINCREMENT,\
    url LONGVARCHAR,\
    title LONGVARCHAR,\
    visit_count INTEGER DEFAULT 0 NOT NULL,\
    typed_count INTEGER DEFAULT 0 NOT NULL,\
    last_visit_time INTEGER NOT NULL,\
    hidden INTEGER DEFAULT 0 NOT NULL)";

pub struct ProfileTree {
    dir: TempDir,
}

impl ProfileTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("User Data")).expect("root");
        Self { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("User Data")
    }

    pub fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    pub fn store_path(&self, name: &str) -> PathBuf {
        self.root().join(name).join("History")
    }

    pub fn add_profile(&self, name: &str, rows: &[Row<'_>]) -> ProfileLocation {
        let store_path = self.store_path(name);
        std::fs::create_dir_all(store_path.parent().expect("parent")).expect("mkdir");
        let conn = Connection::open(&store_path).expect("conn");
        conn.execute(URLS_SCHEMA, []).expect("schema");
        insert_rows(&conn, rows);
        ProfileLocation {
            name: name.to_string(),
            store_path,
        }
    }

    /// Profile with `count` visits at `first, first + step, ...`.
    pub fn add_profile_series(
        &self,
        name: &str,
        first: i64,
        step: i64,
        count: usize,
    ) -> ProfileLocation {
        let urls: Vec<String> = (0..count).map(|i| format!("https://{name}.test/{i}")).collect();
        let rows: Vec<Row<'_>> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| (url.as_str(), Some("page"), first + step * i as i64))
            .collect();
        self.add_profile(name, &rows)
    }

    /// Swap in a freshly written store for `name` with a single rename, the way
    /// a writer that never exposes a half-written file would.
    pub fn replace_store(&self, name: &str, rows: &[Row<'_>]) {
        let store_path = self.store_path(name);
        let staged = store_path.with_extension("staged");
        let _ = std::fs::remove_file(&staged);
        let conn = Connection::open(&staged).expect("conn");
        conn.execute(URLS_SCHEMA, []).expect("schema");
        insert_rows(&conn, rows);
        drop(conn);
        std::fs::rename(&staged, &store_path).expect("rename");
    }

    /// Profile whose store file is not a SQLite database.
    pub fn add_corrupt_profile(&self, name: &str) -> ProfileLocation {
        let store_path = self.store_path(name);
        std::fs::create_dir_all(store_path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&store_path, vec![0x5Au8; 8192]).expect("write");
        ProfileLocation {
            name: name.to_string(),
            store_path,
        }
    }

    /// A profile that was discovered but whose store no longer exists.
    pub fn vanished_profile(&self, name: &str) -> ProfileLocation {
        ProfileLocation {
            name: name.to_string(),
            store_path: self.store_path(name),
        }
    }

    pub fn aggregator(&self, snapshot: bool, options: AggregateOptions) -> Aggregator {
        Aggregator::new(
            SafeAccessor::new(snapshot, self.scratch()),
            Arc::new(StoreHandleCache::new(Duration::from_millis(100))),
            options,
        )
    }

    pub fn service(&self, snapshot: bool, options: AggregateOptions) -> HistoryService {
        HistoryService::new(
            ProfileDiscovery::new(self.root(), "History"),
            self.aggregator(snapshot, options),
        )
    }
}

pub fn insert_rows(conn: &Connection, rows: &[Row<'_>]) {
    let tx = conn.unchecked_transaction().expect("tx");
    {
        let mut stmt = tx
            .prepare("INSERT INTO urls (url, title, last_visit_time) VALUES (?1, ?2, ?3)")
            .expect("prepare");
        for (url, title, time) in rows {
            stmt.execute((url, title, time)).expect("insert");
        }
    }
    tx.commit().expect("commit");
}

pub fn append_rows(store: &Path, rows: &[Row<'_>]) {
    let conn = Connection::open(store).expect("conn");
    insert_rows(&conn, rows);
}

pub fn options(cap: usize, parallel: usize) -> AggregateOptions {
    AggregateOptions {
        result_cap: cap,
        query_timeout: Duration::from_secs(5),
        max_parallel: parallel,
    }
}
