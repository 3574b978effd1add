use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use super::round2;
use super::window::SlidingWindow;
use crate::probes::{CounterSample, CounterSource, OrFallback};

const BYTES_TO_MEGABITS: f64 = 8.0 / (1024.0 * 1024.0);

/// Turns successive cumulative byte counters into smoothed
/// upload/download rates in Mbps.
pub struct RateSampler {
    source: Arc<dyn CounterSource>,
    inner: Mutex<RateState>,
}

#[derive(Default)]
struct RateState {
    last_sample: Option<CounterSample>,
    upload: SlidingWindow,
    download: SlidingWindow,
}

impl RateSampler {
    pub fn new(source: Arc<dyn CounterSource>) -> Self {
        Self {
            source,
            inner: Mutex::new(RateState::default()),
        }
    }

    /// Returns `(upload_mbps, download_mbps)`.
    ///
    /// The first successful reading is only a baseline and yields `(0, 0)`,
    /// as does an unreadable counter or a reading that is not strictly
    /// later than the previous one. In the last two cases the state is left
    /// untouched.
    pub fn sample(&self) -> (f64, f64) {
        let Some(current) = self.source.read().map(Some).or_fallback("network_io_counters") else {
            return (0.0, 0.0);
        };
        self.inner.lock().observe(current)
    }
}

impl RateState {
    fn observe(&mut self, current: CounterSample) -> (f64, f64) {
        let Some(prior) = self.last_sample else {
            self.last_sample = Some(current);
            return (0.0, 0.0);
        };

        let elapsed = current
            .timestamp
            .checked_duration_since(prior.timestamp)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        if elapsed <= 0.0 {
            debug!("network counters read without time advancing, skipping");
            return (0.0, 0.0);
        }

        let sent = delta("bytes_sent", prior.bytes_sent, current.bytes_sent);
        let received = delta("bytes_received", prior.bytes_received, current.bytes_received);

        self.upload.push(sent as f64 / elapsed * BYTES_TO_MEGABITS);
        self.download.push(received as f64 / elapsed * BYTES_TO_MEGABITS);
        self.last_sample = Some(current);

        (round2(self.upload.mean()), round2(self.download.mean()))
    }
}

/// Counter resets (interface bounce, wraparound) clamp to a zero delta.
fn delta(counter: &str, prior: u64, current: u64) -> u64 {
    if current < prior {
        warn!(counter, prior, current, "network counter went backwards, treating as reset");
    }
    current.saturating_sub(prior)
}
