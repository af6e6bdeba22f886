//! Keepalive scheduler.
//!
//! While a connection is Connected, a keepalive message is due every
//! `period`.  The scheduler owns a `tokio::time::Interval` only while it is
//! started; [`KeepaliveScheduler::tick`] never completes when it is
//! cancelled, so a `tokio::select!` branch on it simply goes quiet.
//!
//! The first tick fires one full period after `start`, not immediately:
//! the connection has just been acknowledged and needs no ping yet.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Shortest accepted period.  `interval_at` panics on a zero period.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct KeepaliveScheduler {
    period: Duration,
    ticker: Option<Interval>,
}

impl KeepaliveScheduler {
    /// `period` is raised to [`MIN_PERIOD`] if shorter.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            ticker: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts the periodic timer.  No-op if already running.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        // A stalled runtime must not produce a burst of pings afterwards.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// Stops the timer.  Returns whether it was running.
    pub fn cancel(&mut self) -> bool {
        self.ticker.take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.ticker.is_some()
    }

    /// Completes when the next keepalive is due.  Pending forever while
    /// cancelled.
    pub async fn tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
