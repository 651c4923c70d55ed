use std::fmt;

use tracing::debug;
use url::{Host, Url};

/// Port used when neither the descriptor nor its scheme names one.
pub const DEFAULT_PORT: u16 = 5432;

/// Where a descriptor's port came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
    Explicit,
    Default,
}

/// Host and port of a network dependency, extracted from a connection string
/// such as `postgres://user:pass@db:5432/app`.
///
/// Parsing never fails. Anything that cannot be extracted is reported as
/// absent (`host`) or replaced by the scheme default (`port`), so `port` is
/// always a positive integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    scheme: Option<String>,
    host: Option<String>,
    port: u16,
    port_source: PortSource,
}

/// Standard port for well-known database and broker schemes.
pub fn default_port_for(scheme: Option<&str>) -> u16 {
    let scheme = scheme.map(str::to_ascii_lowercase);
    match scheme.as_deref() {
        Some("postgres" | "postgresql" | "pgsql" | "postgis") => 5432,
        Some("mysql" | "mariadb") => 3306,
        Some("redis" | "rediss") => 6379,
        Some("mongodb") => 27017,
        Some("amqp") => 5672,
        Some("http" | "ws") => 80,
        Some("https" | "wss") => 443,
        _ => DEFAULT_PORT,
    }
}

impl ConnectionDescriptor {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        // Without an authority marker `Url` happily reads `host:5432` as a
        // scheme plus path, so only trust it for `scheme://...` input.
        if input.contains("://") {
            match Url::parse(input) {
                Ok(url) => return Self::from_url(&url),
                Err(err) => debug!(error = %err, "falling back to lenient descriptor parsing"),
            }
        }
        Self::from_authority(input)
    }

    /// `None`, empty and blank values all mean "no dependency configured".
    pub fn from_optional(input: Option<&str>) -> Option<Self> {
        input
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn port_source(&self) -> PortSource {
        self.port_source
    }

    fn from_url(url: &Url) -> Self {
        let host = match url.host() {
            Some(Host::Domain(domain)) => non_empty(domain),
            Some(Host::Ipv4(addr)) => Some(addr.to_string()),
            Some(Host::Ipv6(addr)) => Some(addr.to_string()),
            None => None,
        };
        Self::assemble(Some(url.scheme().to_ascii_lowercase()), host, url.port())
    }

    fn from_authority(input: &str) -> Self {
        let (scheme, rest) = match input.split_once("://") {
            Some((scheme, rest)) => (non_empty(&scheme.to_ascii_lowercase()), rest),
            None => (None, input),
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host_port = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host_port)| host_port);
        let (host, port) = split_host_port(host_port);
        Self::assemble(scheme, host, port)
    }

    fn assemble(scheme: Option<String>, host: Option<String>, port: Option<u16>) -> Self {
        match port.filter(|p| *p != 0) {
            Some(port) => Self {
                scheme,
                host,
                port,
                port_source: PortSource::Explicit,
            },
            None => {
                let port = default_port_for(scheme.as_deref());
                Self {
                    scheme,
                    host,
                    port,
                    port_source: PortSource::Default,
                }
            }
        }
    }
}

fn split_host_port(host_port: &str) -> (Option<String>, Option<u16>) {
    if let Some(bracketed) = host_port.strip_prefix('[') {
        return match bracketed.split_once(']') {
            Some((host, tail)) => (
                non_empty(host),
                tail.strip_prefix(':').and_then(parse_port),
            ),
            None => (non_empty(bracketed), None),
        };
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) => (non_empty(host), parse_port(port)),
        None => (non_empty(host_port), None),
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.parse::<u16>().ok().filter(|p| *p != 0)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

// Credentials and database name are never rendered.
impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.as_deref() {
            Some(host) if host.contains(':') => write!(f, "[{host}]:{}", self.port),
            Some(host) => write!(f, "{host}:{}", self.port),
            None => write!(f, "<no host>:{}", self.port),
        }
    }
}
