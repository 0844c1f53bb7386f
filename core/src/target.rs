//! Subjects of collection: hosts, services and domains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown transport protocol: {other}")),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub address: IpAddr,
}

/// A listening service. The host is embedded, so a service can never exist
/// without exactly one owning host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    pub host: Host,
    pub port: u16,
    pub protocol: Protocol,
    /// Service name as reported by a scanner (e.g. `http`, `isakmp`).
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Host,
    Service,
    Domain,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Host => "host",
            TargetKind::Service => "service",
            TargetKind::Domain => "domain",
        }
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(TargetKind::Host),
            "service" => Ok(TargetKind::Service),
            "domain" => Ok(TargetKind::Domain),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
    Host(Host),
    Service(Service),
    Domain(Domain),
}

impl Target {
    pub fn host(address: IpAddr) -> Self {
        Target::Host(Host { address })
    }

    pub fn service(address: IpAddr, port: u16, protocol: Protocol) -> Self {
        Target::Service(Service { host: Host { address }, port, protocol, name: None })
    }

    pub fn domain(name: impl Into<String>) -> Self {
        Target::Domain(Domain { name: name.into().trim_end_matches('.').to_ascii_lowercase() })
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Host(_) => TargetKind::Host,
            Target::Service(_) => TargetKind::Service,
            Target::Domain(_) => TargetKind::Domain,
        }
    }

    /// Stable identity used for uniqueness in the ledger and for artifact names.
    /// The service name is deliberately not part of the key.
    pub fn key(&self) -> String {
        match self {
            Target::Host(h) => format!("host/{}", h.address),
            Target::Service(s) => format!("service/{}/{}/{}", s.protocol, s.host.address, s.port),
            Target::Domain(d) => format!("domain/{}", d.name),
        }
    }

    /// Address the target resolves to without a lookup, if any.
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Target::Host(h) => Some(h.address),
            Target::Service(s) => Some(s.host.address),
            Target::Domain(_) => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host(h) => write!(f, "{}", h.address),
            Target::Service(s) => write!(f, "{}/{}", SocketAddr::new(s.host.address, s.port), s.protocol),
            Target::Domain(d) => f.write_str(&d.name),
        }
    }
}

/// Parses `host:<ip>`, `domain:<name>` and `service:<ip>:<port>/<tcp|udp>[=<name>]`.
/// IPv6 services use the bracket form, e.g. `service:[::1]:443/tcp`.
impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s.split_once(':').ok_or_else(|| format!("missing target kind in '{s}'"))?;
        match kind.parse::<TargetKind>()? {
            TargetKind::Host => {
                let address: IpAddr = rest.trim().parse().map_err(|e| format!("invalid address '{rest}': {e}"))?;
                Ok(Target::host(address))
            }
            TargetKind::Domain => {
                let name = rest.trim();
                if name.is_empty() || name.contains(char::is_whitespace) {
                    return Err(format!("invalid domain '{rest}'"));
                }
                Ok(Target::domain(name))
            }
            TargetKind::Service => {
                let (socket, name) = match rest.split_once('=') {
                    Some((socket, name)) => (socket, Some(name.trim().to_string())),
                    None => (rest, None),
                };
                let (addr, proto) = socket.rsplit_once('/').ok_or_else(|| format!("missing protocol in '{rest}'"))?;
                let addr: SocketAddr = addr.trim().parse().map_err(|e| format!("invalid service address '{addr}': {e}"))?;
                if addr.port() == 0 {
                    return Err(format!("invalid port in '{rest}'"));
                }
                Ok(Target::Service(Service {
                    host: Host { address: addr.ip() },
                    port: addr.port(),
                    protocol: proto.parse()?,
                    name: name.filter(|n| !n.is_empty()),
                }))
            }
        }
    }
}
