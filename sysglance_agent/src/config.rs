//! Runtime configuration: `SYSGLANCE_*` environment variables plus `--port`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::DEFAULT_ENDPOINT;
use crate::broadcast::{DEFAULT_QUEUE_DEPTH, DEFAULT_SEND_TIMEOUT};
use crate::history::DEFAULT_WINDOW_MS;
use crate::probe::default_disk_mount;
use crate::sampler::DEFAULT_PERIOD;

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub sample_period: Duration,
    pub history_window_ms: i64,
    pub send_timeout: Duration,
    pub subscriber_queue: usize,
    pub disk_mount: PathBuf,
    pub genai_endpoint: String,
    pub genai_api_key: Option<String>,
    pub genai_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            sample_period: DEFAULT_PERIOD,
            history_window_ms: DEFAULT_WINDOW_MS,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            subscriber_queue: DEFAULT_QUEUE_DEPTH,
            disk_mount: default_disk_mount(),
            genai_endpoint: DEFAULT_ENDPOINT.to_string(),
            genai_api_key: None,
            genai_timeout: Duration::from_secs(30),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl AgentConfig {
    /// Defaults overridden by whatever valid `SYSGLANCE_*` variables are set.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind: env_parse("SYSGLANCE_BIND").unwrap_or(d.bind),
            port: env_parse("SYSGLANCE_PORT").unwrap_or(d.port),
            sample_period: env_parse::<u64>("SYSGLANCE_SAMPLE_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(d.sample_period),
            history_window_ms: env_parse::<i64>("SYSGLANCE_HISTORY_WINDOW_MS")
                .filter(|ms| *ms > 0)
                .unwrap_or(d.history_window_ms),
            send_timeout: env_parse::<u64>("SYSGLANCE_SEND_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(d.send_timeout),
            subscriber_queue: env_parse::<usize>("SYSGLANCE_SUBSCRIBER_QUEUE")
                .filter(|n| *n > 0)
                .unwrap_or(d.subscriber_queue),
            disk_mount: env_nonempty("SYSGLANCE_DISK_MOUNT")
                .map(PathBuf::from)
                .unwrap_or(d.disk_mount),
            genai_endpoint: env_nonempty("SYSGLANCE_GENAI_ENDPOINT").unwrap_or(d.genai_endpoint),
            genai_api_key: env_nonempty("SYSGLANCE_GENAI_API_KEY"),
            genai_timeout: env_parse::<u64>("SYSGLANCE_GENAI_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(d.genai_timeout),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

pub fn usage(prog: &str) -> String {
    format!("Usage: {prog} [--port PORT|-p PORT]")
}

/// Port from `--port N`, `--port=N` or `-p N`, falling back to `default_port`
/// (the env-configured port). The long form wins over `-p`.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut long = None;
    let mut short = None;
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        if let Some(v) = arg.strip_prefix("--port=") {
            long = Some(v.to_string());
        } else if arg == "--port" {
            long = args.next();
        } else if arg == "-p" {
            short = args.next();
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}

pub fn wants_help<I: IntoIterator<Item = String>>(args: I) -> bool {
    args.into_iter().any(|a| a == "-h" || a == "--help")
}
