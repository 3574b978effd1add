pub mod ping;
pub mod speedtest;
pub mod system;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, warn};

pub use ping::PingProbe;
pub use speedtest::SpeedtestCli;
pub use system::SystemProbes;

// ─── Errors ──────────────────────────────────────────────────────

/// Every way a single probe can fail. Failures never leave the
/// collector; each one collapses to the metric's zero value.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("could not parse {0}")]
    Parse(String),

    #[error("{0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeErrorKind {
    Timeout,
    NotFound,
    PermissionDenied,
    Parse,
    Unexpected,
}

pub type ProbeResult<T> = Result<T, ProbeError>;

impl ProbeError {
    pub fn kind(&self) -> ProbeErrorKind {
        match self {
            Self::Timeout(_) => ProbeErrorKind::Timeout,
            Self::NotFound(_) => ProbeErrorKind::NotFound,
            Self::PermissionDenied(_) => ProbeErrorKind::PermissionDenied,
            Self::Parse(_) => ProbeErrorKind::Parse,
            Self::Unexpected(_) => ProbeErrorKind::Unexpected,
        }
    }

    fn from_io(what: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(what.to_owned()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(what.to_owned()),
            _ => Self::Unexpected(format!("{what}: {err}")),
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        Self::from_io("io", err)
    }
}

/// Collapses a failed probe into the metric's zero value.
///
/// | kind             | logged at | value          |
/// |------------------|-----------|----------------|
/// | Timeout          | error     | `T::default()` |
/// | NotFound         | warn      | `T::default()` |
/// | PermissionDenied | warn      | `T::default()` |
/// | Parse            | warn      | `T::default()` |
/// | Unexpected       | error     | `T::default()` |
pub trait OrFallback<T> {
    fn or_fallback(self, metric: &str) -> T;
}

impl<T: Default> OrFallback<T> for ProbeResult<T> {
    fn or_fallback(self, metric: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                match err.kind() {
                    ProbeErrorKind::Timeout | ProbeErrorKind::Unexpected => {
                        error!(metric, error = %err, "probe failed, reporting 0");
                    }
                    ProbeErrorKind::NotFound
                    | ProbeErrorKind::PermissionDenied
                    | ProbeErrorKind::Parse => {
                        warn!(metric, error = %err, "probe failed, reporting 0");
                    }
                }
                T::default()
            }
        }
    }
}

// ─── Probe seams ─────────────────────────────────────────────────

/// A point-in-time cumulative I/O reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timestamp: Instant,
}

/// Source of cumulative network byte counters.
pub trait CounterSource: Send + Sync {
    fn read(&self) -> ProbeResult<CounterSample>;
}

/// One ICMP echo round, yielding the average round-trip time in ms.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    async fn average_rtt_ms(&self, host: &str, count: u32) -> ProbeResult<f64>;
}

/// Result of one internet throughput test, in Mbps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpeedtestResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

/// The expensive probe behind the throttled cache.
#[async_trait]
pub trait SpeedTest: Send + Sync {
    async fn run(&self) -> ProbeResult<SpeedtestResult>;
}

/// Everything else the collector asks of the host.
#[async_trait]
pub trait HostProbes: Send + Sync {
    async fn cpu_percent(&self, interval: Duration) -> ProbeResult<f64>;
    async fn memory_percent(&self) -> ProbeResult<f64>;
    async fn disk_percent(&self, path: &Path) -> ProbeResult<f64>;
    /// Immediate child directories of `path`, sorted by name.
    async fn child_dirs(&self, path: &Path) -> ProbeResult<Vec<PathBuf>>;
    async fn dir_size(&self, path: &Path) -> ProbeResult<u64>;
    async fn unit_active(&self, unit: &str) -> ProbeResult<bool>;
    async fn container_running(&self, name: &str) -> ProbeResult<bool>;
    async fn host_reachable(&self, host: &str) -> ProbeResult<bool>;
}

// ─── Subprocess helper ───────────────────────────────────────────

/// Runs `program args..` with stdin closed, killing it once `limit` elapses.
/// A non-zero exit status is returned as-is; callers decide what it means.
pub async fn run_command(program: &str, args: &[&str], limit: Duration) -> ProbeResult<Output> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProbeError::from_io(program, e))?;

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| ProbeError::from_io(program, e)),
        Err(_) => Err(ProbeError::Timeout(limit)),
    }
}
