//! Scripted probes for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::{
    CounterSample, CounterSource, HostProbes, LatencyProbe, ProbeError, ProbeResult, SpeedTest,
    SpeedtestResult,
};

/// Replays a queue of counter readings; an empty queue reads as a failure.
#[derive(Default)]
pub struct FakeCounters {
    script: Mutex<VecDeque<ProbeResult<CounterSample>>>,
}

impl FakeCounters {
    pub fn new(script: Vec<ProbeResult<CounterSample>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

impl CounterSource for FakeCounters {
    fn read(&self) -> ProbeResult<CounterSample> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProbeError::Unexpected("counter script exhausted".into())))
    }
}

pub fn counters(sent: u64, received: u64, timestamp: Instant) -> ProbeResult<CounterSample> {
    Ok(CounterSample {
        bytes_sent: sent,
        bytes_received: received,
        timestamp,
    })
}

/// Replays a queue of average RTTs.
#[derive(Default)]
pub struct FakeLatency {
    script: Mutex<VecDeque<ProbeResult<f64>>>,
}

impl FakeLatency {
    pub fn new(script: Vec<ProbeResult<f64>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl LatencyProbe for FakeLatency {
    async fn average_rtt_ms(&self, host: &str, _count: u32) -> ProbeResult<f64> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ProbeError::Unexpected(format!("{host} unreachable"))))
    }
}

/// Speed test that counts its runs and optionally fails or stalls.
pub struct FakeSpeedTest {
    runs: AtomicUsize,
    outcome: Mutex<Option<SpeedtestResult>>,
    delay: Duration,
}

impl FakeSpeedTest {
    pub fn succeeding(download_mbps: f64, upload_mbps: f64) -> Self {
        Self {
            runs: AtomicUsize::new(0),
            outcome: Mutex::new(Some(SpeedtestResult {
                download_mbps,
                upload_mbps,
            })),
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            runs: AtomicUsize::new(0),
            outcome: Mutex::new(None),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_outcome(&self, outcome: Option<SpeedtestResult>) {
        *self.outcome.lock() = outcome;
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeedTest for FakeSpeedTest {
    async fn run(&self) -> ProbeResult<SpeedtestResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = *self.outcome.lock();
        outcome.ok_or(ProbeError::Timeout(Duration::from_secs(60)))
    }
}

/// Host with fixed answers; anything not listed fails with `NotFound`.
#[derive(Default)]
pub struct FakeHost {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
    pub dirs: Option<Vec<PathBuf>>,
    pub dir_sizes: HashMap<PathBuf, u64>,
    pub units: HashMap<String, bool>,
    pub containers: HashMap<String, bool>,
    pub reachable: HashMap<String, bool>,
    pub pinged: Mutex<Vec<String>>,
}

fn missing<T>(what: impl Into<String>) -> ProbeResult<T> {
    Err(ProbeError::NotFound(what.into()))
}

#[async_trait]
impl HostProbes for FakeHost {
    async fn cpu_percent(&self, _interval: Duration) -> ProbeResult<f64> {
        self.cpu.map_or_else(|| missing("cpu"), Ok)
    }

    async fn memory_percent(&self) -> ProbeResult<f64> {
        self.memory.map_or_else(|| missing("memory"), Ok)
    }

    async fn disk_percent(&self, path: &Path) -> ProbeResult<f64> {
        self.disk
            .map_or_else(|| missing(path.display().to_string()), Ok)
    }

    async fn child_dirs(&self, path: &Path) -> ProbeResult<Vec<PathBuf>> {
        self.dirs
            .clone()
            .map_or_else(|| missing(path.display().to_string()), Ok)
    }

    async fn dir_size(&self, path: &Path) -> ProbeResult<u64> {
        match self.dir_sizes.get(path) {
            Some(size) => Ok(*size),
            None => Err(ProbeError::PermissionDenied(path.display().to_string())),
        }
    }

    async fn unit_active(&self, unit: &str) -> ProbeResult<bool> {
        self.units.get(unit).copied().map_or_else(|| missing(unit), Ok)
    }

    async fn container_running(&self, name: &str) -> ProbeResult<bool> {
        self.containers
            .get(name)
            .copied()
            .map_or_else(|| missing(name), Ok)
    }

    async fn host_reachable(&self, host: &str) -> ProbeResult<bool> {
        self.pinged.lock().push(host.to_owned());
        self.reachable
            .get(host)
            .copied()
            .map_or_else(|| Err(ProbeError::Timeout(Duration::from_secs(5))), Ok)
    }
}
