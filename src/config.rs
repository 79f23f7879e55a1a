use crate::error::ConfigError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of every environment variable read by [`DnsConfig::from_env`]
pub const ENV_PREFIX: &str = "ZONEAGENT_";

/// Longest accepted value for any timeout
const MAX_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    /// Address both DNS listeners bind to
    pub bind_addr: SocketAddr,

    /// Control plane address (None = disabled)
    pub http_bind_addr: Option<SocketAddr>,

    /// Location of the JSON zone document
    pub zones_url: String,

    /// Server that unanswerable queries are relayed to (None = recursion disabled)
    pub upstream: Option<SocketAddr>,

    /// Shared secret for the control plane
    pub api_key: Option<String>,

    /// Durable snapshot database (None = no persistence)
    pub snapshot_path: Option<PathBuf>,

    /// Interval between background refreshes (zero = disabled)
    pub refresh_interval: Duration,

    /// Per-connection read deadline
    pub read_timeout: Duration,

    /// Per-connection write deadline
    pub write_timeout: Duration,

    /// Timeout for one relayed query
    pub upstream_timeout: Duration,

    /// Timeout for fetching the zone document
    pub fetch_timeout: Duration,

    /// Max number of concurrent DNS queries to handle
    pub max_concurrent_queries: usize,

    /// Answer queries carrying EDNS0 with NOTIMP instead of processing them
    pub reject_edns: bool,

    /// Answer with CNAME, then NS, at the query name when the requested type is missing
    pub alias_fallback: bool,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 53),
            http_bind_addr: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5380)),
            zones_url: "http://localhost/zones.json".to_string(),
            upstream: None,
            api_key: None,
            snapshot_path: Some(PathBuf::from("/var/cache/zoneagent.redb")),
            refresh_interval: Duration::from_secs(300),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            upstream_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_queries: 10000,
            reject_edns: false,
            alias_fallback: false,
        }
    }
}

impl DnsConfig {
    /// Create a DnsConfig from environment variables
    /// Returns Err if critical configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; `lookup` receives the full
    /// variable name including the prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(listen) = var("LISTEN") {
            config.bind_addr = parse_socket_addr(&listen, 53)
                .ok_or(ConfigError::InvalidBindAddress(listen))?;
        }

        if let Some(http_listen) = var("HTTP_LISTEN") {
            config.http_bind_addr = parse_optional_addr(&http_listen, 5380)
                .map_err(|_| ConfigError::InvalidHttpBindAddress(http_listen))?;
        }

        if let Some(zones_url) = var("ZONES_URL") {
            config.zones_url = zones_url;
        }

        if let Some(upstream) = var("RECURSE_TO") {
            config.upstream = parse_optional_addr(&upstream, 53)
                .map_err(|_| ConfigError::InvalidUpstreamServer(upstream))?;
        }

        if let Some(key) = var("KEY") {
            config.api_key = (!key.is_empty()).then_some(key);
        }

        if let Some(path) = var("SNAPSHOT_PATH") {
            config.snapshot_path = if path.is_empty() || path.eq_ignore_ascii_case("disabled") {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Some(interval) = var("REFRESH_INTERVAL") {
            config.refresh_interval = Duration::from_secs(interval.parse::<u64>().map_err(
                |_| ConfigError::ParseError(format!("Invalid refresh interval: {}", interval)),
            )?);
        }

        for (name, field) in [
            ("READ_TIMEOUT", &mut config.read_timeout),
            ("WRITE_TIMEOUT", &mut config.write_timeout),
            ("UPSTREAM_TIMEOUT", &mut config.upstream_timeout),
            ("FETCH_TIMEOUT", &mut config.fetch_timeout),
        ] {
            if let Some(value) = var(name) {
                let secs = value
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidTimeout(format!("{}={}", name, value)))?;
                *field = Duration::from_secs(secs);
            }
        }

        if let Some(max_concurrent) = var("MAX_CONCURRENT_QUERIES") {
            config.max_concurrent_queries = max_concurrent.parse::<usize>().map_err(|_| {
                ConfigError::ParseError(format!(
                    "Invalid max concurrent queries: {}",
                    max_concurrent
                ))
            })?;
        }

        if let Some(reject_edns) = var("REJECT_EDNS") {
            config.reject_edns = parse_bool(&reject_edns, false);
        }

        if let Some(alias_fallback) = var("ALIAS_FALLBACK") {
            config.alias_fallback = parse_bool(&alias_fallback, false);
        }

        // Validate the final configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, timeout) in [
            ("read", self.read_timeout),
            ("write", self.write_timeout),
            ("upstream", self.upstream_timeout),
            ("fetch", self.fetch_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidTimeout(format!(
                    "{} timeout must be greater than 0",
                    name
                )));
            }
            if timeout > MAX_TIMEOUT {
                return Err(ConfigError::InvalidTimeout(format!(
                    "{} timeout too large (max 300 seconds)",
                    name
                )));
            }
        }

        if self.max_concurrent_queries == 0 {
            return Err(ConfigError::ParseError(
                "Max concurrent queries must be greater than 0".to_string(),
            ));
        }

        if !(self.zones_url.starts_with("http://") || self.zones_url.starts_with("https://")) {
            return Err(ConfigError::InvalidZonesUrl(self.zones_url.clone()));
        }

        Ok(())
    }

    pub fn recursion_enabled(&self) -> bool {
        self.upstream.is_some()
    }
}

/// Parse `ip:port`, or a bare IP with `default_port`.
pub fn parse_socket_addr(s: &str, default_port: u16) -> Option<SocketAddr> {
    let s = s.trim();
    s.parse::<SocketAddr>()
        .ok()
        .or_else(|| s.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, default_port)))
}

/// Like [`parse_socket_addr`], with empty or `disabled` meaning none.
pub fn parse_optional_addr(s: &str, default_port: u16) -> Result<Option<SocketAddr>, String> {
    if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("disabled") {
        return Ok(None);
    }
    parse_socket_addr(s, default_port)
        .map(Some)
        .ok_or_else(|| s.to_string())
}

/// Parse a boolean from a string, with a default value for invalid input
pub fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
