//! Endpoint addresses
//!
//! Hosts are configured as URLs (`https://rpc.example.com`), multiaddrs
//! (`/dns/val.example.com/tcp/8080/http`) or bare `host[:port]` pairs.
//! Parsing normalises all of them into one immutable [`Address`], which then
//! derives the RPC and metrics URLs and the key used for deduplication.

use serde::Serialize;
use std::net::IpAddr;
use url::Url;

/// Default JSON-RPC port of a full node
pub const DEFAULT_RPC_PORT: u16 = 9000;

/// Default Prometheus port of nodes and validators
pub const DEFAULT_METRICS_PORT: u16 = 9184;

/// Path of the Prometheus exposition endpoint
const METRICS_PATH: &str = "/metrics";

/// Address parsing / derivation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid address '{raw}': {reason}")]
    Invalid { raw: String, reason: String },

    #[error("invalid port '{raw}'")]
    InvalidPort { raw: String },

    #[error("address {address} has no {purpose} port")]
    MissingPort { address: String, purpose: &'static str },
}

/// A resolved network endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Address {
    host: String,
    rpc_port: Option<u16>,
    metrics_port: Option<u16>,
    peer_port: Option<u16>,
    path: Option<String>,
    tls: bool,
}

impl Address {
    /// Parse an address from its configured string form
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }

        if raw.starts_with('/') {
            Self::parse_multiaddr(raw)
        } else if raw.contains("://") {
            Self::parse_url(raw)
        } else {
            Self::parse_host_port(raw)
        }
    }

    /// `http(s)://host[:port][/path]`
    fn parse_url(raw: &str) -> Result<Self, AddressError> {
        let url = Url::parse(raw).map_err(|e| AddressError::Invalid {
            raw: raw.to_string(),
            reason: e.to_string(),
        })?;

        let tls = match url.scheme() {
            "https" => true,
            "http" => false,
            other => {
                return Err(AddressError::Invalid {
                    raw: raw.to_string(),
                    reason: format!("unsupported scheme '{}'", other),
                })
            }
        };

        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase())
            .ok_or_else(|| AddressError::Invalid {
                raw: raw.to_string(),
                reason: "missing host".to_string(),
            })?;

        let path = match url.path().trim_end_matches('/') {
            "" => None,
            p => Some(p.to_string()),
        };

        Ok(Self {
            host,
            rpc_port: url.port_or_known_default(),
            metrics_port: None,
            peer_port: None,
            path,
            tls,
        })
    }

    /// `/ip4/1.2.3.4/tcp/8080/http` or `/dns/host/udp/8084`
    fn parse_multiaddr(raw: &str) -> Result<Self, AddressError> {
        let invalid = |reason: &str| AddressError::Invalid {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
        let mut host = None;
        let mut port = None;
        let mut tls = false;

        let mut i = 0;
        while i < parts.len() {
            match parts[i] {
                "ip4" | "ip6" | "dns" | "dns4" | "dns6" => {
                    let value = parts.get(i + 1).ok_or_else(|| invalid("missing host value"))?;
                    host = Some(value.to_ascii_lowercase());
                    i += 2;
                }
                "tcp" | "udp" => {
                    let value = parts.get(i + 1).ok_or_else(|| invalid("missing port value"))?;
                    port = Some(parse_port(value)?);
                    i += 2;
                }
                "https" | "tls" => {
                    tls = true;
                    i += 1;
                }
                _ => i += 1,
            }
        }

        Ok(Self {
            host: host.ok_or_else(|| invalid("missing host protocol"))?,
            rpc_port: None,
            metrics_port: None,
            peer_port: port,
            path: None,
            tls,
        })
    }

    /// `host`, `host:port`, `[v6]:port`
    fn parse_host_port(raw: &str) -> Result<Self, AddressError> {
        let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| AddressError::Invalid {
                raw: raw.to_string(),
                reason: "unterminated IPv6 literal".to_string(),
            })?;
            let port = match tail.strip_prefix(':') {
                Some(p) => Some(parse_port(p)?),
                None => None,
            };
            (host.to_string(), port)
        } else if raw.parse::<IpAddr>().is_ok() {
            (raw.to_string(), None)
        } else {
            match raw.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), Some(parse_port(port)?)),
                None => (raw.to_string(), None),
            }
        };

        if host.is_empty() || host.contains('/') {
            return Err(AddressError::Invalid {
                raw: raw.to_string(),
                reason: "invalid host".to_string(),
            });
        }

        Ok(Self {
            host: host.to_ascii_lowercase(),
            rpc_port: port,
            metrics_port: None,
            peer_port: None,
            path: None,
            tls: false,
        })
    }

    // Builder-style overrides from configuration

    pub fn with_rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = Some(port);
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    pub fn with_peer_port(mut self, port: u16) -> Self {
        self.peer_port = Some(port);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn rpc_port(&self) -> Option<u16> {
        self.rpc_port
    }

    pub fn metrics_port(&self) -> Option<u16> {
        self.metrics_port
    }

    pub fn peer_port(&self) -> Option<u16> {
        self.peer_port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Literal IP of the host, if it is not a DNS name
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// Normalised string used to deduplicate configured addresses
    pub fn key(&self) -> String {
        let port = |p: Option<u16>| p.map(|p| p.to_string()).unwrap_or_default();
        format!(
            "{}://{}|rpc={}|metrics={}|peer={}|{}",
            if self.tls { "https" } else { "http" },
            self.host,
            port(self.rpc_port),
            port(self.metrics_port),
            port(self.peer_port),
            self.path.as_deref().unwrap_or(""),
        )
    }

    /// JSON-RPC endpoint
    pub fn rpc_url(&self) -> Result<String, AddressError> {
        let port = self.rpc_port.ok_or_else(|| AddressError::MissingPort {
            address: self.to_string(),
            purpose: "rpc",
        })?;
        Ok(format!(
            "{}://{}:{}{}",
            if self.tls { "https" } else { "http" },
            self.url_host(),
            port,
            self.path.as_deref().unwrap_or(""),
        ))
    }

    /// Prometheus scrape endpoint
    pub fn metrics_url(&self) -> Result<String, AddressError> {
        let port = self.metrics_port.ok_or_else(|| AddressError::MissingPort {
            address: self.to_string(),
            purpose: "metrics",
        })?;
        Ok(format!("http://{}:{}{}", self.url_host(), port, METRICS_PATH))
    }

    fn url_host(&self) -> String {
        match self.ip() {
            Some(IpAddr::V6(_)) => format!("[{}]", self.host),
            _ => self.host.clone(),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let host = self.url_host();
        match self.rpc_port.or(self.metrics_port).or(self.peer_port) {
            Some(port) => write!(f, "{}:{}", host, port)?,
            None => write!(f, "{}", host)?,
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
        }
        Ok(())
    }
}

fn parse_port(raw: &str) -> Result<u16, AddressError> {
    raw.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| AddressError::InvalidPort { raw: raw.to_string() })
}
