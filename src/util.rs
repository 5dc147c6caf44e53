use std::{future::Future, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use log::*;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    ccd::{CcdHost, ExposureOutcome, GigeCcd},
    vision::DeviceProvider,
    GigeError, GigeResult,
};

/// Wall-clock time that advances with the tokio clock, so timeout guards follow the
/// runtime's notion of time (including paused time in tests).
#[derive(Debug, Clone, Copy)]
struct RuntimeClock {
    origin: Instant,
    base: DateTime<Utc>,
}

impl RuntimeClock {
    fn start() -> Self {
        Self {
            origin: Instant::now(),
            base: Utc::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.origin.elapsed())
            .ok()
            .and_then(|elapsed| self.base.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// This trait provides convenience functions for the `GigeCcd` struct,
/// for hosts that let the driver run its own polling timer on a tokio task.
pub trait CcdUtil {
    /// Calls `timer_hit` every polling period while the timer is armed, until `shutdown` resolves.
    fn run_timer(&mut self, shutdown: impl Future<Output = ()>) -> impl Future<Output = ()>;

    /// Convenience method for taking an exposure and waiting for the frame.
    ///
    /// * `duration` - Exposure time in seconds.
    ///
    /// Returns a copy of the frame buffer. A camera that stops responding fails the
    /// exposure through the usual timeout guards, the host is notified as for any failure.
    fn capture_frame(&mut self, duration: f64) -> impl Future<Output = GigeResult<Vec<u8>>>;
}

impl<P: DeviceProvider, H: CcdHost> CcdUtil for GigeCcd<P, H> {
    async fn run_timer(&mut self, shutdown: impl Future<Output = ()>) {
        let clock = RuntimeClock::start();
        let mut interval = tokio::time::interval(self.settings().polling_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    if self.is_timer_armed() {
                        self.timer_hit_at(clock.now());
                    }
                }
            }
        }
    }

    async fn capture_frame(&mut self, duration: f64) -> GigeResult<Vec<u8>> {
        let clock = RuntimeClock::start();

        if !self.start_exposure_at(duration, clock.now()) {
            return Err(GigeError::ExposureFailed("couldn't start the exposure".to_string()));
        }

        let settings = self.settings();
        let period = settings.polling_period;
        // Outlasts both timeout guards.
        let limit = Duration::try_from_secs_f64(duration.max(0.0))
            .unwrap_or(Duration::MAX)
            .saturating_add(settings.exposure_timeout)
            .saturating_add(settings.transfer_timeout)
            .saturating_add(period);

        let waited = tokio::time::timeout(limit, async {
            while self.is_exposing() {
                tokio::time::sleep(period).await;
                self.timer_hit_at(clock.now());
            }
        })
        .await;

        if waited.is_err() {
            error!("No exposure outcome within {limit:?}");
            self.handle_failed();
            return Err(GigeError::Timeout(limit));
        }

        match self.last_exposure() {
            Some(ExposureOutcome::Complete) => Ok(self.chip().frame_buffer().to_vec()),
            _ => Err(GigeError::ExposureFailed(
                "the camera didn't deliver a frame".to_string(),
            )),
        }
    }
}
