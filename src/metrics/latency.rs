use parking_lot::Mutex;
use std::sync::Arc;

use super::round2;
use super::window::SlidingWindow;
use crate::probes::{LatencyProbe, OrFallback};

/// Smooths ICMP round-trip times over the last few scrapes.
pub struct LatencySampler {
    probe: Arc<dyn LatencyProbe>,
    window: Mutex<SlidingWindow>,
}

impl LatencySampler {
    pub fn new(probe: Arc<dyn LatencyProbe>) -> Self {
        Self {
            probe,
            window: Mutex::new(SlidingWindow::default()),
        }
    }

    /// Smoothed latency in ms. An unreachable host or unparseable probe
    /// reports `0` and is not pushed into the window.
    pub async fn sample(&self, host: &str, count: u32) -> f64 {
        let Some(rtt) = self
            .probe
            .average_rtt_ms(host, count)
            .await
            .map(Some)
            .or_fallback("network_latency_ms")
        else {
            return 0.0;
        };

        let mut window = self.window.lock();
        window.push(rtt);
        round2(window.mean())
    }
}
