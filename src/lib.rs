//! feedagg: an RSS aggregator with a scheduled ingestion pipeline and a
//! per-account subscription graph, backed by SQLite.

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod util;
