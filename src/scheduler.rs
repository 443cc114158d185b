//! Periodic feed collection.
//!
//! Every tick claims exactly one due feed (see [`Database::claim_next_feed`]),
//! then fetches, parses, and stores it. Feeds are visited in rotation: never
//! fetched first, then least recently fetched. A failing feed has already been
//! stamped when it fails, so it waits a full rotation before its next attempt.

use std::time::Duration;

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};

use crate::feed::{refresh_feed, FetchOptions, RefreshError};
use crate::storage::{current_time, Database, DatabaseError, Feed};

#[derive(Debug, Error)]
pub enum IntervalError {
    #[error("Invalid interval '{input}': {source}")]
    Invalid {
        input: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("Interval must be greater than zero")]
    Zero,
}

/// Parse a tick interval such as `30s`, `1m`, or `1h 30m`.
pub fn parse_tick_interval(input: &str) -> Result<Duration, IntervalError> {
    let interval =
        humantime::parse_duration(input.trim()).map_err(|source| IntervalError::Invalid {
            input: input.to_string(),
            source,
        })?;
    if interval.is_zero() {
        return Err(IntervalError::Zero);
    }
    Ok(interval)
}

/// What a single tick did
#[derive(Debug)]
pub enum TickReport {
    /// No feed was claimed: either there are no feeds, or the least recently
    /// fetched feed is already stamped at or after this tick's time (two ticks
    /// in the same millisecond, or the clock stepped backwards)
    Idle,
    Refreshed {
        feed: Feed,
        inserted: usize,
        skipped: usize,
    },
    /// The feed was claimed but its refresh failed; the loop carries on
    Failed { feed: Feed, error: RefreshError },
}

pub struct Scheduler {
    db: Database,
    client: reqwest::Client,
    options: FetchOptions,
}

impl Scheduler {
    pub fn new(db: Database, client: reqwest::Client, options: FetchOptions) -> Self {
        Self {
            db,
            client,
            options,
        }
    }

    /// Claim and refresh the next due feed.
    ///
    /// Fetch, parse, and per-post failures are logged and reported as
    /// [`TickReport::Failed`]. Only an unreachable store is returned as an error.
    pub async fn tick(&self) -> Result<TickReport, DatabaseError> {
        let Some(feed) = self.db.claim_next_feed(current_time()).await? else {
            tracing::debug!("No feed claimed this tick");
            return Ok(TickReport::Idle);
        };

        tracing::info!(feed = %feed.name, url = %feed.url, "Fetching feed");

        match refresh_feed(&self.db, &self.client, &feed, &self.options).await {
            Ok(outcome) => {
                tracing::info!(
                    feed = %feed.name,
                    inserted = outcome.inserted,
                    skipped = outcome.skipped,
                    "Feed refreshed"
                );
                Ok(TickReport::Refreshed {
                    feed,
                    inserted: outcome.inserted,
                    skipped: outcome.skipped,
                })
            }
            Err(RefreshError::Database(e)) if e.is_unavailable() => Err(e),
            Err(error) => {
                tracing::warn!(feed = %feed.name, url = %feed.url, error = %error, "Feed refresh failed");
                Ok(TickReport::Failed { feed, error })
            }
        }
    }

    /// Tick every `tick_interval` until the store becomes unavailable.
    ///
    /// The first tick fires immediately. A tick that overruns the interval
    /// delays the next one rather than causing a burst of catch-up ticks.
    pub async fn run_forever(&self, tick_interval: Duration) -> Result<(), DatabaseError> {
        tracing::info!(
            interval = %humantime::format_duration(tick_interval),
            "Scheduler started"
        );

        let mut timer = interval(tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Scheduler stopping");
                return Err(e);
            }
        }
    }
}
