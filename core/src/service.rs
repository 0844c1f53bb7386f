use crate::target::{Protocol, Service};
use regex::Regex;

/// Decides whether a service looks like the protocol a collector speaks:
/// either it listens on a well-known port, or a scanner reported a matching
/// service name (which covers non-standard ports).
#[derive(Debug, Clone)]
pub struct ServiceMatcher {
    tcp_ports: Vec<u16>,
    udp_ports: Vec<u16>,
    tcp_names: Vec<Regex>,
    udp_names: Vec<Regex>,
}

impl ServiceMatcher {
    pub fn new(
        tcp_ports: &[u16],
        udp_ports: &[u16],
        tcp_names: &[&str],
        udp_names: &[&str],
    ) -> Result<Self, regex::Error> {
        let compile = |patterns: &[&str]| patterns.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>();
        Ok(ServiceMatcher {
            tcp_ports: tcp_ports.to_vec(),
            udp_ports: udp_ports.to_vec(),
            tcp_names: compile(tcp_names)?,
            udp_names: compile(udp_names)?,
        })
    }

    pub fn matches(&self, service: &Service) -> bool {
        let (ports, names) = match service.protocol {
            Protocol::Tcp => (&self.tcp_ports, &self.tcp_names),
            Protocol::Udp => (&self.udp_ports, &self.udp_names),
        };
        match service.name.as_deref() {
            Some(name) => names.iter().any(|re| re.is_match(name)),
            None => ports.contains(&service.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Host;

    fn svc(port: u16, protocol: Protocol, name: Option<&str>) -> Service {
        Service {
            host: Host { address: "10.0.0.1".parse().unwrap() },
            port,
            protocol,
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn name_takes_precedence_over_port() {
        let m = ServiceMatcher::new(&[80, 443], &[], &["^http$", "^https$"], &[]).unwrap();
        assert!(m.matches(&svc(80, Protocol::Tcp, None)));
        assert!(m.matches(&svc(8081, Protocol::Tcp, Some("http"))));
        assert!(!m.matches(&svc(80, Protocol::Tcp, Some("ssh"))));
        assert!(!m.matches(&svc(80, Protocol::Udp, None)));
    }
}
