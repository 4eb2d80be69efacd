//! Periodic price-evolution triggers.
//!
//! Two independent tokio tasks drive the engine: the daily tick and the
//! live fluctuation tick. Each is individually abortable so a reset can
//! stop both, mutate state, and restart them; shutdown cancels both before
//! the final save. On startup the daily schedule resumes from the persisted
//! last-tick time, so a day already partially elapsed before a restart is
//! honored rather than restarted from zero.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::SimEngine;

#[derive(Default)]
pub(crate) struct TimerHandles {
    day: Option<JoinHandle<()>>,
    fluct: Option<JoinHandle<()>>,
}

impl TimerHandles {
    fn abort_all(&mut self) {
        if let Some(handle) = self.day.take() {
            handle.abort();
        }
        if let Some(handle) = self.fluct.take() {
            handle.abort();
        }
    }
}

impl SimEngine {
    /// Start (or restart) both triggers. Requires a tokio runtime.
    pub fn start(&self) {
        let mut timers = self.inner.timers.lock();
        timers.abort_all();

        // Honor a partially elapsed day across restarts.
        let last_tick = self.inner.state.lock().last_tick;
        let elapsed = chrono::Utc::now()
            .signed_duration_since(last_tick)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let first_delay = self.inner.cfg.day_length.saturating_sub(elapsed);
        debug!(?first_delay, day_length = ?self.inner.cfg.day_length, "daily tick scheduled");

        timers.day = Some(tokio::spawn(self.clone().run_day_cycle(first_delay)));
        timers.fluct = Some(tokio::spawn(self.clone().run_live_fluctuations()));
    }

    /// Cancel both triggers.
    pub(crate) fn stop_timers(&self) {
        self.inner.timers.lock().abort_all();
    }

    async fn run_day_cycle(self, first_delay: Duration) {
        tokio::time::sleep(first_delay).await;
        self.tick_day();

        let mut interval = tokio::time::interval(self.inner.cfg.day_length);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick completes immediately and is already
        // covered by the tick above.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.tick_day();
        }
    }

    async fn run_live_fluctuations(self) {
        let mut interval = tokio::time::interval(self.inner.cfg.fluct_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick_live();
        }
    }
}
