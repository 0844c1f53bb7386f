//! `whoishost`: queries whois for publicly routed host addresses and records
//! the owning networks and companies.

use recon_core::{
    CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest, ConfigError,
    DerivedEntity, Normalized, Target,
};
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::trace;

pub const NAME: &str = "whoishost";

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Host)
        .priority(510)
        .max_concurrency(1)
        .timeout(Duration::from_secs(60))
        .binary("whois")
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(WhoisHost::new(ctx.descriptor.clone(), ctx.program())?))
}

fn is_global_v4(a: Ipv4Addr) -> bool {
    let [o1, o2, ..] = a.octets();
    let shared = o1 == 100 && (64..128).contains(&o2);
    let reserved = o1 >= 240;
    !(a.is_private()
        || a.is_loopback()
        || a.is_link_local()
        || a.is_broadcast()
        || a.is_documentation()
        || a.is_unspecified()
        || a.is_multicast()
        || shared
        || reserved
        || o1 == 0)
}

fn is_global_v6(a: Ipv6Addr) -> bool {
    let s = a.segments();
    let unique_local = (s[0] & 0xfe00) == 0xfc00;
    let link_local = (s[0] & 0xffc0) == 0xfe80;
    let documentation = s[0] == 0x2001 && s[1] == 0x0db8;
    !(a.is_loopback() || a.is_unspecified() || a.is_multicast() || unique_local || link_local || documentation)
}

pub fn is_global(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(a) => is_global_v4(a),
        IpAddr::V6(a) => match a.to_ipv4_mapped() {
            Some(v4) => is_global_v4(v4),
            None => is_global_v6(a),
        },
    }
}

pub struct WhoisHost {
    descriptor: CollectorDescriptor,
    program: String,
    field: Regex,
    handle: Regex,
}

impl WhoisHost {
    pub fn new(descriptor: CollectorDescriptor, program: String) -> Result<Self, ConfigError> {
        let invalid = |e: regex::Error| ConfigError::Invalid { collector: NAME.into(), reason: e.to_string() };
        Ok(WhoisHost {
            descriptor,
            program,
            field: Regex::new(r"^(?P<key>[A-Za-z0-9-]+):\s*(?P<value>.+?)\s*$").map_err(invalid)?,
            handle: Regex::new(r"\s*\([A-Z0-9-]+\)$").map_err(invalid)?,
        })
    }
}

impl Collector for WhoisHost {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Host(host) = target else {
            return Vec::new();
        };
        if !is_global(host.address) {
            trace!(collector = NAME, address = %host.address, "address is not globally routed");
            return Vec::new();
        }
        vec![CommandRequest::process([self.program.clone(), host.address.to_string()])]
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        for line in output.stdout_lines() {
            let Some(caps) = self.field.captures(line) else {
                continue;
            };
            let value = &caps["value"];
            match caps["key"].to_ascii_lowercase().as_str() {
                "cidr" => {
                    for network in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                        out.push(DerivedEntity::finding("network", network));
                    }
                }
                "inetnum" | "inet6num" => out.push(DerivedEntity::finding("network", value)),
                "organization" => out.push(DerivedEntity::finding("company", self.handle.replace(value, "").trim())),
                "orgname" | "org-name" | "role" => out.push(DerivedEntity::finding("company", value)),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARIN_AMAZON: &str = "\
# ARIN WHOIS data and services are subject to the Terms of Use
NetRange:       54.240.0.0 - 54.255.255.255
CIDR:           54.240.0.0/12
NetName:        AMAZON-2011L
Parent:         NET54 (NET-54-0-0-0-0)
Organization:   Amazon Technologies Inc. (AT-88-Z)
Ref:            https://rdap.arin.net/registry/ip/54.240.0.0
";

    const ARIN_GOOGLE: &str = "\
NetRange:       216.58.192.0 - 216.58.223.255
CIDR:           216.58.192.0/19
Organization:   Google LLC (GOGL)

OrgName:        Google LLC
OrgId:          GOGL
";

    const RIPE_GOOGLE: &str = "\
% Information related to '2a00:1450:4000::/37'
inet6num:       2a00:1450:4000::/37
netname:        IE-GOOGLE-2a00-1450-4000-1
descr:          EU metro frontend
source:         RIPE

role:           Google Ireland Limited
";

    fn collector() -> WhoisHost {
        WhoisHost::new(descriptor(), "whois".into()).unwrap()
    }

    #[test]
    fn global_addresses_only() {
        let c = collector();
        assert_eq!(
            c.materialize(&"host:54.240.0.1".parse().unwrap()),
            [CommandRequest::process(["whois", "54.240.0.1"])]
        );
        for local in ["host:10.0.0.1", "host:192.168.1.1", "host:127.0.0.1", "host:100.64.0.1", "host:fe80::1", "host:fd00::1"] {
            assert!(c.materialize(&local.parse().unwrap()).is_empty(), "{local}");
        }
        assert!(c.materialize(&"service:54.240.0.1:80/tcp".parse().unwrap()).is_empty());
    }

    #[test]
    fn networks_and_companies() {
        let c = collector();
        let target: Target = "host:54.240.0.1".parse().unwrap();
        let mut networks = Vec::new();
        let mut companies = Vec::new();
        for stdout in [ARIN_AMAZON, ARIN_GOOGLE, RIPE_GOOGLE] {
            let out = CapturedOutput { stdout: stdout.into(), ..Default::default() };
            for entity in c.normalize(&target, &out).entities {
                match entity {
                    DerivedEntity::Finding { kind, value } if kind == "network" => networks.push(value),
                    DerivedEntity::Finding { kind, value } if kind == "company" => companies.push(value),
                    other => panic!("unexpected entity {other:?}"),
                }
            }
        }
        networks.sort();
        companies.sort();
        companies.dedup();
        assert_eq!(networks, ["216.58.192.0/19", "2a00:1450:4000::/37", "54.240.0.0/12"]);
        assert_eq!(companies, ["Amazon Technologies Inc.", "Google Ireland Limited", "Google LLC"]);
    }
}
