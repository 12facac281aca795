//! visitscope: read browser visit history from every local profile without
//! fighting the browser's file lock, and merge it into one newest-first view.

pub mod access;
pub mod aggregate;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod logging;
pub mod profiles;
pub mod query;
pub mod record;
pub mod server;
pub mod service;
pub mod timestamp;

pub use error::{HistoryError, ProfileFailure};
pub use record::{AggregatedResult, HistoryRecord};
pub use service::HistoryService;
