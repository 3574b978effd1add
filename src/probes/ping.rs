use async_trait::async_trait;
use std::time::Duration;

use super::{run_command, LatencyProbe, ProbeError, ProbeResult};

/// Upper bound for a whole multi-echo latency probe.
const LATENCY_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-echo wait passed to `ping -W`.
const PER_ECHO_WAIT_SECS: &str = "3";

/// Latency probe backed by the system `ping` binary.
#[derive(Debug, Default, Clone)]
pub struct PingProbe;

#[async_trait]
impl LatencyProbe for PingProbe {
    async fn average_rtt_ms(&self, host: &str, count: u32) -> ProbeResult<f64> {
        let count = count.max(1).to_string();
        let output = run_command(
            "ping",
            &["-c", count.as_str(), "-W", PER_ECHO_WAIT_SECS, host],
            LATENCY_TIMEOUT,
        )
        .await?;

        if !output.status.success() {
            return Err(ProbeError::Unexpected(format!("{host} unreachable")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_average_rtt(&stdout)
            .ok_or_else(|| ProbeError::Parse(format!("ping summary for {host}")))
    }
}

/// Pulls the average out of a ping summary line such as
/// `rtt min/avg/max/mdev = 9.8/12.3/15.1/2.0 ms` or the BSD
/// `round-trip min/avg/max/stddev = ...` form.
pub fn parse_average_rtt(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter(|line| (line.contains("avg") || line.contains("rtt")) && line.contains("ms"))
        .find_map(|line| {
            let (_, values) = line.split_once('=')?;
            let avg = values.trim().split('/').nth(1)?;
            avg.trim().parse::<f64>().ok()
        })
}
