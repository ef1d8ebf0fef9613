// Periodic activity handle: either running or not, never twice

use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// A restartable interval. Starting a running timer or stopping a stopped
/// one does nothing; a stopped timer never ticks.
#[derive(Debug)]
pub struct PeriodicTimer {
    name: &'static str,
    period: Duration,
    interval: Option<Interval>,
}

impl PeriodicTimer {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            interval: None,
        }
    }

    /// Start ticking one period from now. Returns false if already running.
    pub fn start(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        tracing::trace!("Timer {} started ({:?})", self.name, self.period);
        true
    }

    /// Stop ticking. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.interval.take().is_some();
        if was_running {
            tracing::trace!("Timer {} stopped", self.name);
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick; pends forever while stopped
    pub async fn tick(&mut self) -> Instant {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await,
            None => std::future::pending().await,
        }
    }
}
