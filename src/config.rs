use clap::Parser;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::metrics::{CollectorConfig, ServiceGroup};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command line / environment surface. Flags win over the config file.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Pull-based host and service health exporter for Prometheus"
)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "HOMELAB_EXPORTER_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// TCP port to listen on
    #[arg(short, long, env = "HOMELAB_EXPORTER_PORT", default_value_t = 9090)]
    pub port: u16,

    /// Optional TOML file with service groups and probe targets
    #[arg(short, long, env = "HOMELAB_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Volume root for disk usage and per-directory sizes [default: /srv]
    #[arg(long, env = "HOMELAB_EXPORTER_ROOT_PATH")]
    pub root_path: Option<PathBuf>,

    /// Host probed for network latency [default: 8.8.8.8]
    #[arg(long, env = "HOMELAB_EXPORTER_LATENCY_HOST")]
    pub latency_host: Option<String>,

    /// Echo requests per latency probe
    #[arg(long, env = "HOMELAB_EXPORTER_LATENCY_COUNT", default_value_t = 3)]
    pub latency_count: u32,

    /// Hosts tried in order for internet reachability [default: 8.8.8.8,1.1.1.1]
    #[arg(long, env = "HOMELAB_EXPORTER_REACHABILITY_HOSTS", value_delimiter = ',')]
    pub reachability_hosts: Option<Vec<String>>,

    /// Minimum seconds between two internet speed tests
    #[arg(long, env = "HOMELAB_EXPORTER_SPEEDTEST_INTERVAL_SECS", default_value_t = 3600)]
    pub speedtest_interval_secs: u64,

    /// speedtest-cli compatible executable (must support --json)
    #[arg(long, env = "HOMELAB_EXPORTER_SPEEDTEST_COMMAND", default_value = "speedtest-cli")]
    pub speedtest_command: String,

    /// systemd unit exported as <unit>_running
    #[arg(long, env = "HOMELAB_EXPORTER_VPN_UNIT", default_value = "tailscaled")]
    pub vpn_unit: String,

    /// Seconds over which CPU utilisation is sampled
    #[arg(long, env = "HOMELAB_EXPORTER_CPU_INTERVAL_SECS", default_value_t = 2)]
    pub cpu_interval_secs: u64,

    /// Run `du` through sudo
    #[arg(long, env = "HOMELAB_EXPORTER_DU_SUDO")]
    pub du_sudo: bool,

    /// Log level, overridden by RUST_LOG
    #[arg(long, env = "HOMELAB_EXPORTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long, env = "HOMELAB_EXPORTER_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Contents of the optional TOML file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub root_path: Option<PathBuf>,
    pub latency_host: Option<String>,
    pub reachability_hosts: Option<Vec<String>>,
    #[serde(rename = "service")]
    pub services: Vec<ServiceGroup>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

impl Args {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Merges flags over the config file over built-in defaults.
    pub fn collector_config(&self) -> Result<CollectorConfig, ConfigError> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(self.merge(file))
    }

    fn merge(&self, file: FileConfig) -> CollectorConfig {
        let defaults = CollectorConfig::default();
        CollectorConfig {
            root_path: self
                .root_path
                .clone()
                .or(file.root_path)
                .unwrap_or(defaults.root_path),
            cpu_interval: Duration::from_secs(self.cpu_interval_secs),
            latency_host: self
                .latency_host
                .clone()
                .or(file.latency_host)
                .unwrap_or(defaults.latency_host),
            latency_count: self.latency_count,
            vpn_unit: self.vpn_unit.clone(),
            services: file.services,
            reachability_hosts: self
                .reachability_hosts
                .clone()
                .or(file.reachability_hosts)
                .unwrap_or(defaults.reachability_hosts),
            speedtest_interval: Duration::from_secs(self.speedtest_interval_secs),
        }
    }
}
