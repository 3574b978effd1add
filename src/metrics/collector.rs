use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::latency::LatencySampler;
use super::rate::RateSampler;
use super::throttle::ThrottledProbeCache;
use super::{sanitize_name, MetricSet};
use crate::probes::{CounterSource, HostProbes, LatencyProbe, OrFallback, SpeedTest};

// ─── Configuration ───────────────────────────────────────────────

/// A logical service, up only while every one of its containers runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceGroup {
    pub name: String,
    pub containers: Vec<String>,
}

/// Static inputs to every scrape, fixed at startup.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Volume root for disk % and the per-directory size metrics.
    pub root_path: PathBuf,
    pub cpu_interval: Duration,
    pub latency_host: String,
    pub latency_count: u32,
    /// systemd unit exported as `<unit>_running`.
    pub vpn_unit: String,
    pub services: Vec<ServiceGroup>,
    /// Tried in order; the first one that answers marks the internet up.
    pub reachability_hosts: Vec<String>,
    pub speedtest_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("/srv"),
            cpu_interval: Duration::from_secs(2),
            latency_host: "8.8.8.8".into(),
            latency_count: 3,
            vpn_unit: "tailscaled".into(),
            services: Vec::new(),
            reachability_hosts: vec!["8.8.8.8".into(), "1.1.1.1".into()],
            speedtest_interval: super::throttle::DEFAULT_MIN_INTERVAL,
        }
    }
}

// ─── Collector ───────────────────────────────────────────────────

/// Runs every probe once per scrape and assembles the metric set.
///
/// Scrapes are serialized: concurrent requests queue on `scrape_gate`
/// and each then performs its own full collection. The speed test is
/// sampled before the gate, so a scrape that triggers a run never holds
/// the others behind it.
pub struct Collector {
    config: CollectorConfig,
    host: Arc<dyn HostProbes>,
    rate: RateSampler,
    latency: LatencySampler,
    speedtest: ThrottledProbeCache,
    scrape_gate: tokio::sync::Mutex<()>,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        host: Arc<dyn HostProbes>,
        counters: Arc<dyn CounterSource>,
        latency: Arc<dyn LatencyProbe>,
        speedtest: Arc<dyn SpeedTest>,
    ) -> Self {
        let speedtest = ThrottledProbeCache::new(speedtest, config.speedtest_interval);
        Self {
            config,
            host,
            rate: RateSampler::new(counters),
            latency: LatencySampler::new(latency),
            speedtest,
            scrape_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// One full collection. Never fails: every probe failure becomes a
    /// `0` for that metric alone.
    pub async fn collect_all(&self) -> MetricSet {
        let (speed_down, speed_up) = self.speedtest.sample().await;

        let _scrape = self.scrape_gate.lock().await;
        let started = Instant::now();
        let mut metrics = MetricSet::new();

        // ── Host utilisation ────────────────────────────────────
        let cpu = self
            .host
            .cpu_percent(self.config.cpu_interval)
            .await
            .or_fallback("cpu_usage_percent");
        metrics.push("cpu_usage_percent", cpu as i64);

        let memory = self.host.memory_percent().await.or_fallback("memory_usage_percent");
        metrics.push("memory_usage_percent", memory as i64);

        let disk = self
            .host
            .disk_percent(&self.config.root_path)
            .await
            .or_fallback("disk_usage_percent");
        metrics.push("disk_usage_percent", disk as i64);

        self.collect_dir_sizes(&mut metrics).await;

        // ── Network ─────────────────────────────────────────────
        let (upload, download) = self.rate.sample();
        metrics.push("network_upload_speed_mbps", upload);
        metrics.push("network_download_speed_mbps", download);

        let latency = self
            .latency
            .sample(&self.config.latency_host, self.config.latency_count)
            .await;
        metrics.push("network_latency_ms", latency);

        metrics.push("internet_download_speed_mbps", speed_down);
        metrics.push("internet_upload_speed_mbps", speed_up);

        // ── Services ────────────────────────────────────────────
        let vpn_metric = format!("{}_running", sanitize_name(&self.config.vpn_unit));
        let vpn_up = self
            .host
            .unit_active(&self.config.vpn_unit)
            .await
            .or_fallback(&vpn_metric);
        metrics.push(vpn_metric, vpn_up);

        self.collect_services(&mut metrics).await;

        metrics.push("internet_up", self.internet_up().await);

        info!(
            metrics = metrics.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collected metrics"
        );
        metrics
    }

    /// One `<dir>_disk_usage_bytes` per immediate child of the root. A
    /// directory that cannot be sized reports `0`; a root that cannot be
    /// listed contributes nothing.
    async fn collect_dir_sizes(&self, metrics: &mut MetricSet) {
        let root = &self.config.root_path;
        let dirs = match self.host.child_dirs(root).await {
            Ok(dirs) => dirs,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "cannot list directories");
                return;
            }
        };

        for dir in dirs {
            let Some(label) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let metric = format!("{}_disk_usage_bytes", sanitize_name(&label));
            let size = self.host.dir_size(&dir).await.or_fallback(&metric);
            metrics.push(metric, size);
        }
    }

    async fn collect_services(&self, metrics: &mut MetricSet) {
        let statuses = self.container_statuses().await;
        for group in &self.config.services {
            let up = service_up(group, &statuses);
            if !up {
                debug!(service = %group.name, "service down");
            }
            metrics.push(format!("{}_running", sanitize_name(&group.name)), up);
        }
    }

    /// Queries each distinct container once. Containers whose status could
    /// not be read are left out of the map.
    async fn container_statuses(&self) -> HashMap<String, bool> {
        let mut statuses = HashMap::new();
        for container in self.config.services.iter().flat_map(|g| &g.containers) {
            if statuses.contains_key(container) {
                continue;
            }
            match self.host.container_running(container).await {
                Ok(running) => {
                    statuses.insert(container.clone(), running);
                }
                Err(err) => warn!(container = %container, error = %err, "container status unavailable"),
            }
        }
        statuses
    }

    async fn internet_up(&self) -> bool {
        for host in &self.config.reachability_hosts {
            match self.host.host_reachable(host).await {
                Ok(true) => return true,
                Ok(false) => debug!(host = %host, "no echo reply"),
                Err(err) => warn!(host = %host, error = %err, "reachability probe failed"),
            }
        }
        false
    }
}

/// Up only if every member container is known and running.
pub fn service_up(group: &ServiceGroup, statuses: &HashMap<String, bool>) -> bool {
    group
        .containers
        .iter()
        .all(|c| statuses.get(c).copied().unwrap_or(false))
}
