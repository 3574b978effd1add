use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::probes::{OrFallback, SpeedTest, SpeedtestResult};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3600);

/// Runs the speed test at most once per `min_interval` and serves the
/// cached result in between.
///
/// A failed run caches `(0, 0)` and still counts as a run, so an outage
/// does not turn every scrape into another full speed test. Runs are
/// single-flight: a caller arriving while one is in progress gets the
/// cached values straight away.
///
/// Each run lives on its own task. A caller that goes away mid-run (a
/// scraper hitting its timeout) only stops waiting; the run finishes and
/// records its result for later callers.
pub struct ThrottledProbeCache {
    probe: Arc<dyn SpeedTest>,
    min_interval: Duration,
    run_gate: Arc<tokio::sync::Mutex<()>>,
    state: Arc<Mutex<ThrottledResult>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ThrottledResult {
    /// `None` until the first run, which makes the first call always due.
    last_run: Option<Instant>,
    cached: SpeedtestResult,
}

impl ThrottledResult {
    fn is_due(&self, now: Instant, min_interval: Duration) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) > min_interval,
        }
    }
}

impl ThrottledProbeCache {
    pub fn new(probe: Arc<dyn SpeedTest>, min_interval: Duration) -> Self {
        Self {
            probe,
            min_interval,
            run_gate: Arc::new(tokio::sync::Mutex::new(())),
            state: Arc::new(Mutex::new(ThrottledResult::default())),
        }
    }

    /// Returns `(download_mbps, upload_mbps)`.
    pub async fn sample(&self) -> (f64, f64) {
        if !self.is_due() {
            return self.cached();
        }

        let Ok(running) = self.run_gate.clone().try_lock_owned() else {
            debug!("speed test already in flight, serving cached result");
            return self.cached();
        };

        // Someone may have finished a run between the check and the gate.
        if !self.is_due() {
            return self.cached();
        }

        let probe = self.probe.clone();
        let state = self.state.clone();
        let run = tokio::spawn(async move {
            let _running = running;
            info!("running internet speed test");
            let result = probe.run().await.or_fallback("internet_speedtest");

            let mut slot = state.lock();
            slot.cached = result;
            slot.last_run = Some(Instant::now());
            info!(
                download_mbps = result.download_mbps,
                upload_mbps = result.upload_mbps,
                "speed test finished"
            );
            result
        });

        match run.await {
            Ok(result) => (result.download_mbps, result.upload_mbps),
            Err(err) => {
                error!(error = %err, "speed test task failed");
                self.cached()
            }
        }
    }

    fn is_due(&self) -> bool {
        self.state.lock().is_due(Instant::now(), self.min_interval)
    }

    fn cached(&self) -> (f64, f64) {
        let cached = self.state.lock().cached;
        (cached.download_mbps, cached.upload_mbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::fake::FakeSpeedTest;

    fn cache(probe: &Arc<FakeSpeedTest>) -> ThrottledProbeCache {
        ThrottledProbeCache::new(probe.clone(), DEFAULT_MIN_INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_always_runs() {
        let probe = Arc::new(FakeSpeedTest::succeeding(250.5, 40.25));
        let speed = cache(&probe);
        assert_eq!(speed.sample().await, (250.5, 40.25));
        assert_eq!(probe.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_within_interval_serve_the_cache() {
        let probe = Arc::new(FakeSpeedTest::succeeding(100.0, 10.0));
        let speed = cache(&probe);
        let first = speed.sample().await;

        probe.set_outcome(Some(SpeedtestResult {
            download_mbps: 1.0,
            upload_mbps: 1.0,
        }));
        tokio::time::advance(Duration::from_secs(1800)).await;
        assert_eq!(speed.sample().await, first);
        tokio::time::advance(Duration::from_secs(1800)).await;
        // Exactly at the interval is not yet past it.
        assert_eq!(speed.sample().await, first);
        assert_eq!(probe.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn call_after_interval_runs_exactly_once() {
        let probe = Arc::new(FakeSpeedTest::succeeding(100.0, 10.0));
        let speed = cache(&probe);
        speed.sample().await;

        probe.set_outcome(Some(SpeedtestResult {
            download_mbps: 90.0,
            upload_mbps: 9.0,
        }));
        tokio::time::advance(DEFAULT_MIN_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(speed.sample().await, (90.0, 9.0));
        assert_eq!(speed.sample().await, (90.0, 9.0));
        assert_eq!(probe.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_caches_zero_and_still_throttles() {
        let probe = Arc::new(FakeSpeedTest::succeeding(100.0, 10.0));
        let speed = cache(&probe);
        speed.sample().await;

        probe.set_outcome(None);
        tokio::time::advance(DEFAULT_MIN_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(speed.sample().await, (0.0, 0.0));

        probe.set_outcome(Some(SpeedtestResult {
            download_mbps: 100.0,
            upload_mbps: 10.0,
        }));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(speed.sample().await, (0.0, 0.0));
        assert_eq!(probe.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_do_not_double_run() {
        let probe = Arc::new(FakeSpeedTest::failing().with_delay(Duration::from_secs(20)));
        probe.set_outcome(Some(SpeedtestResult {
            download_mbps: 300.0,
            upload_mbps: 30.0,
        }));
        let speed = Arc::new(cache(&probe));

        let leader = tokio::spawn({
            let speed = speed.clone();
            async move { speed.sample().await }
        });
        tokio::task::yield_now().await;

        // The leader holds the gate; this caller must not wait for it.
        assert_eq!(speed.sample().await, (0.0, 0.0));
        assert_eq!(leader.await.unwrap(), (300.0, 30.0));
        assert_eq!(probe.runs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_does_not_cancel_the_run() {
        let probe = Arc::new(
            FakeSpeedTest::succeeding(120.0, 12.0).with_delay(Duration::from_secs(30)),
        );
        let speed = cache(&probe);

        // A scraper that gives up after 10s, retrying every 15s.
        for _ in 0..3 {
            let _ = tokio::time::timeout(Duration::from_secs(10), speed.sample()).await;
            tokio::time::sleep(Duration::from_secs(15)).await;
        }

        assert_eq!(probe.runs(), 1);
        assert_eq!(speed.sample().await, (120.0, 12.0));
        assert_eq!(probe.runs(), 1);
    }
}
