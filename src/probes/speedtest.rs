use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{run_command, ProbeError, ProbeResult, SpeedTest, SpeedtestResult};

/// A full download + upload run against the best server rarely takes
/// longer than this.
const SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(180);
const BITS_PER_MEGABIT: f64 = 1024.0 * 1024.0;

/// Internet throughput test driven through a `speedtest-cli` compatible
/// executable that prints a JSON report with `--json`.
#[derive(Debug, Clone)]
pub struct SpeedtestCli {
    command: String,
}

/// The subset of the JSON report we care about. Rates are bits/second.
#[derive(Debug, Deserialize)]
struct Report {
    download: f64,
    upload: f64,
}

impl SpeedtestCli {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl SpeedTest for SpeedtestCli {
    async fn run(&self) -> ProbeResult<SpeedtestResult> {
        let output = run_command(&self.command, &["--json"], SPEEDTEST_TIMEOUT).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Unexpected(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        parse_report(&output.stdout)
    }
}

fn parse_report(stdout: &[u8]) -> ProbeResult<SpeedtestResult> {
    let report: Report = serde_json::from_slice(stdout)
        .map_err(|e| ProbeError::Parse(format!("speed test report: {e}")))?;
    Ok(SpeedtestResult {
        download_mbps: crate::metrics::round2(report.download / BITS_PER_MEGABIT),
        upload_mbps: crate::metrics::round2(report.upload / BITS_PER_MEGABIT),
    })
}
