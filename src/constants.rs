//! Shared constants.

/// Records returned by one aggregate call when the config does not say otherwise.
pub const DEFAULT_RESULT_CAP: usize = 1000;

/// Microseconds in one calendar day.
pub const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Store file name Chrome keeps inside each profile directory.
pub const DEFAULT_STORE_FILE_NAME: &str = "History";

/// Directory under the system temp dir used for snapshot copies.
pub const SNAPSHOT_DIR_NAME: &str = "visitscope-snapshots";

/// Hex characters of the path digest used to name a profile's scratch directory.
pub const SNAPSHOT_SLUG_LEN: usize = 16;

/// SQLite VM steps between deadline checks while a query runs.
pub const PROGRESS_CHECK_OPS: i32 = 1000;
