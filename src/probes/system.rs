use async_trait::async_trait;
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::{Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{run_command, CounterSample, CounterSource, HostProbes, ProbeError, ProbeResult};

// ─── Timeouts ────────────────────────────────────────────────────

const DU_TIMEOUT: Duration = Duration::from_secs(30);
const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(5);
const DOCKER_TIMEOUT: Duration = Duration::from_secs(10);
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Host probes backed by `sysinfo` and a handful of system binaries
/// (`du`, `systemctl`, `docker`, `ping`).
#[derive(Debug, Clone, Default)]
pub struct SystemProbes {
    /// Prefix `du` with `sudo` so directories owned by other users count.
    du_sudo: bool,
}

impl SystemProbes {
    pub fn new(du_sudo: bool) -> Self {
        Self { du_sudo }
    }
}

#[async_trait]
impl HostProbes for SystemProbes {
    async fn cpu_percent(&self, interval: Duration) -> ProbeResult<f64> {
        let mut sys = System::new();
        sys.refresh_cpu();
        tokio::time::sleep(interval.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
        sys.refresh_cpu();

        let cpus = sys.cpus();
        if cpus.is_empty() {
            return Err(ProbeError::Unexpected("no CPUs reported".into()));
        }
        let total: f64 = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum();
        Ok(total / cpus.len() as f64)
    }

    async fn memory_percent(&self) -> ProbeResult<f64> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(ProbeError::Unexpected("total memory reported as 0".into()));
        }
        let used = total.saturating_sub(sys.available_memory());
        Ok(used as f64 / total as f64 * 100.0)
    }

    async fn disk_percent(&self, path: &Path) -> ProbeResult<f64> {
        let usage = fs_usage(path)?;
        usage
            .used_percent()
            .ok_or_else(|| ProbeError::Unexpected(format!("{} reports zero capacity", path.display())))
    }

    async fn child_dirs(&self, path: &Path) -> ProbeResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Follows symlinks, so a linked app directory still counts.
            let is_dir = tokio::fs::metadata(entry.path())
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    async fn dir_size(&self, path: &Path) -> ProbeResult<u64> {
        let path_arg = path.to_string_lossy();
        let output = if self.du_sudo {
            run_command("sudo", &["du", "-sb", path_arg.as_ref()], DU_TIMEOUT).await?
        } else {
            run_command("du", &["-sb", path_arg.as_ref()], DU_TIMEOUT).await?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Unexpected(format!(
                "du failed for {path_arg}: {}",
                stderr.trim()
            )));
        }
        parse_du(&String::from_utf8_lossy(&output.stdout))
    }

    async fn unit_active(&self, unit: &str) -> ProbeResult<bool> {
        // `is-active` exits non-zero for inactive units, so only stdout counts.
        let output = run_command("systemctl", &["is-active", unit], SYSTEMCTL_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "active")
    }

    async fn container_running(&self, name: &str) -> ProbeResult<bool> {
        let output = run_command(
            "docker",
            &["inspect", "--format={{.State.Running}}", name],
            DOCKER_TIMEOUT,
        )
        .await?;

        // Non-zero exit: no such container.
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim()
            .eq_ignore_ascii_case("true"))
    }

    async fn host_reachable(&self, host: &str) -> ProbeResult<bool> {
        let output = run_command("ping", &["-c", "1", "-W", "3", host], REACHABILITY_TIMEOUT).await?;
        Ok(output.status.success())
    }
}

impl CounterSource for SystemProbes {
    fn read(&self) -> ProbeResult<CounterSample> {
        let networks = Networks::new_with_refreshed_list();
        if networks.iter().next().is_none() {
            return Err(ProbeError::NotFound("network interfaces".into()));
        }

        let (sent, received) = networks.iter().fold((0u64, 0u64), |(tx, rx), (_, data)| {
            (
                tx.saturating_add(data.total_transmitted()),
                rx.saturating_add(data.total_received()),
            )
        });

        Ok(CounterSample {
            bytes_sent: sent,
            bytes_received: received,
            timestamp: Instant::now(),
        })
    }
}

// ─── Filesystem usage ────────────────────────────────────────────

/// Block counts of the filesystem holding a path, as `statvfs` reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FsUsage {
    total_blocks: u64,
    free_blocks: u64,
}

impl FsUsage {
    /// `used / total` with `used = total - free`. Blocks reserved for root
    /// are free, not used, even though unprivileged writers cannot reach them.
    fn used_percent(&self) -> Option<f64> {
        if self.total_blocks == 0 {
            return None;
        }
        let used = self.total_blocks.saturating_sub(self.free_blocks);
        Some(used as f64 / self.total_blocks as f64 * 100.0)
    }
}

fn fs_usage(path: &Path) -> ProbeResult<FsUsage> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ProbeError::Unexpected(format!("{} contains a NUL byte", path.display())))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        let err = io::Error::last_os_error();
        return Err(ProbeError::from_io(&path.display().to_string(), err));
    }

    Ok(FsUsage {
        total_blocks: stat.f_blocks as u64,
        free_blocks: stat.f_bfree as u64,
    })
}

/// `du -sb` prints `"<bytes>\t<path>"`.
fn parse_du(stdout: &str) -> ProbeResult<u64> {
    let field = stdout.trim().split('\t').next().unwrap_or_default();
    field
        .trim()
        .parse::<u64>()
        .map_err(|_| ProbeError::Parse(format!("du output {field:?}")))
}
