use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::service::LocalBoxFuture;

pub const DEFAULT_THINKING_INDICATOR_MS: u64 = 2_000;
pub const DEFAULT_FAILURE_GRACE_MS: u64 = 50;
pub const DEFAULT_RETRY_SETTLE_MS: u64 = 100;
pub const DEFAULT_PLAYBACK_MIN_MS: u64 = 20;
pub const DEFAULT_PLAYBACK_MAX_MS: u64 = 50;
pub const DEFAULT_NEAR_BOTTOM_THRESHOLD_PX: f32 = 100.0;

const MIN_FAILURE_GRACE_MS: u64 = 40;
const MIN_RETRY_SETTLE_MS: u64 = 100;

/// Named delays consumed by the send, retry and playback flows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub thinking_indicator_ms: u64,
    pub failure_grace_ms: u64,
    pub retry_settle_ms: u64,
    pub playback_min_ms: u64,
    pub playback_max_ms: u64,
    pub near_bottom_threshold_px: f32,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            thinking_indicator_ms: DEFAULT_THINKING_INDICATOR_MS,
            failure_grace_ms: DEFAULT_FAILURE_GRACE_MS,
            retry_settle_ms: DEFAULT_RETRY_SETTLE_MS,
            playback_min_ms: DEFAULT_PLAYBACK_MIN_MS,
            playback_max_ms: DEFAULT_PLAYBACK_MAX_MS,
            near_bottom_threshold_px: DEFAULT_NEAR_BOTTOM_THRESHOLD_PX,
        }
    }
}

impl Delays {
    pub fn normalized(mut self) -> Self {
        self.failure_grace_ms = self.failure_grace_ms.max(MIN_FAILURE_GRACE_MS);
        self.retry_settle_ms = self.retry_settle_ms.max(MIN_RETRY_SETTLE_MS);
        if self.playback_max_ms < self.playback_min_ms {
            self.playback_max_ms = self.playback_min_ms;
        }
        if !self.near_bottom_threshold_px.is_finite() || self.near_bottom_threshold_px <= 0.0 {
            self.near_bottom_threshold_px = DEFAULT_NEAR_BOTTOM_THRESHOLD_PX;
        }
        self
    }

    pub fn thinking_indicator(&self) -> Duration {
        Duration::from_millis(self.thinking_indicator_ms)
    }

    pub fn failure_grace(&self) -> Duration {
        Duration::from_millis(self.failure_grace_ms)
    }

    pub fn retry_settle(&self) -> Duration {
        Duration::from_millis(self.retry_settle_ms)
    }

    /// Random pause between two revealed words, uniform in `[min, max)`.
    pub fn playback_step(&self) -> Duration {
        if self.playback_max_ms <= self.playback_min_ms {
            return Duration::from_millis(self.playback_min_ms);
        }

        let millis = rand::rng().random_range(self.playback_min_ms..self.playback_max_ms);
        Duration::from_millis(millis)
    }

    pub fn near_bottom_threshold(&self) -> f32 {
        self.near_bottom_threshold_px
    }
}

/// The single suspension primitive every timed step goes through.
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'_, ()>;
}

/// Sleeper backed by the tokio timer, so paused test runtimes drive it with a
/// logical clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn normalization_raises_floors_and_collapses_inverted_ranges() {
        let delays = Delays {
            failure_grace_ms: 5,
            retry_settle_ms: 10,
            playback_min_ms: 30,
            playback_max_ms: 10,
            near_bottom_threshold_px: f32::NAN,
            ..Delays::default()
        }
        .normalized();

        assert_eq!(delays.failure_grace_ms, 40);
        assert_eq!(delays.retry_settle_ms, 100);
        assert_eq!(delays.playback_max_ms, 30);
        assert_eq!(delays.playback_step(), Duration::from_millis(30));
        assert_eq!(delays.near_bottom_threshold(), 100.0);
    }

    #[test]
    fn playback_steps_stay_inside_the_configured_window() {
        let delays = Delays::default();
        for _ in 0..200 {
            let step = delays.playback_step();
            assert!(step >= Duration::from_millis(20));
            assert!(step < Duration::from_millis(50));
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let delays: Delays = serde_json::from_str(r#"{"thinking_indicator_ms": 500}"#)
            .unwrap_or_default();

        assert_eq!(delays.thinking_indicator(), Duration::from_millis(500));
        assert_eq!(delays.retry_settle(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_advances_the_logical_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_millis(2_000)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(2_000));
        assert!(elapsed < Duration::from_millis(2_010));
    }
}
