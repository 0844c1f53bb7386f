//! `ikescan`: probes ISAKMP services in main and aggressive mode.

use recon_core::{
    CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest, ConfigError,
    DerivedEntity, Normalized, Privilege, Protocol, ServiceMatcher, Target,
};
use regex::Regex;
use std::net::IpAddr;

pub const NAME: &str = "ikescan";

/// Mode flags, one request each.
const MODES: [&[&str]; 2] = [&["-M", "--auth=1"], &["--aggressive"]];

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Service)
        .priority(71100)
        .max_concurrency(1)
        .privilege(Privilege::Elevated)
        .binary("ike-scan")
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(IkeScan::new(ctx.descriptor.clone(), ctx.program())?))
}

pub struct IkeScan {
    descriptor: CollectorDescriptor,
    program: String,
    matcher: ServiceMatcher,
    handshake: Regex,
    transform: Regex,
}

impl IkeScan {
    pub fn new(descriptor: CollectorDescriptor, program: String) -> Result<Self, ConfigError> {
        let invalid = |e: regex::Error| ConfigError::Invalid { collector: NAME.into(), reason: e.to_string() };
        let matcher = ServiceMatcher::new(&[500], &[500], &["^isakmp$", "^ike$"], &["^isakmp$", "^ike$"]).map_err(invalid)?;
        Ok(IkeScan {
            descriptor,
            program,
            matcher,
            handshake: Regex::new(r"^\S+\s+(?P<mode>Main|Aggressive) Mode Handshake returned").map_err(invalid)?,
            transform: Regex::new(r"^\s*SA=\((?P<sa>[^)]*)\)").map_err(invalid)?,
        })
    }

    fn request(&self, protocol: Protocol, port: u16, address: &str, mode: &[&str]) -> CommandRequest {
        let mut argv = vec![self.program.clone()];
        if protocol == Protocol::Tcp {
            argv.push("--tcp".into());
        }
        argv.extend(["-d".to_string(), port.to_string(), "--multiline".to_string()]);
        argv.extend(mode.iter().map(|m| m.to_string()));
        argv.push(address.to_string());
        CommandRequest::Process { argv }
    }
}

impl Collector for IkeScan {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Service(service) = target else {
            return Vec::new();
        };
        let IpAddr::V4(address) = service.host.address else {
            return Vec::new();
        };
        if !self.matcher.matches(service) {
            return Vec::new();
        }
        let address = address.to_string();
        MODES.iter().map(|mode| self.request(service.protocol, service.port, &address, mode)).collect()
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        let mut aggressive = false;
        for line in output.stdout_lines() {
            if let Some(caps) = self.handshake.captures(line) {
                aggressive = &caps["mode"] == "Aggressive";
                continue;
            }
            let Some(caps) = self.transform.captures(line) else {
                continue;
            };
            let sa = caps["sa"].trim();
            out.push(DerivedEntity::finding("ike-transform", sa));
            if aggressive && sa.split_whitespace().any(|t| t.eq_ignore_ascii_case("Auth=PSK")) {
                out.report(format!("aggressive mode with pre-shared key accepted: {sa}"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> IkeScan {
        IkeScan::new(descriptor(), "ike-scan".into()).unwrap()
    }

    #[test]
    fn two_modes_per_service() {
        let c = collector();
        let target: Target = "service:10.0.0.5:500/udp=isakmp".parse().unwrap();
        let reqs = c.materialize(&target);
        assert_eq!(
            reqs,
            [
                CommandRequest::process(["ike-scan", "-d", "500", "--multiline", "-M", "--auth=1", "10.0.0.5"]),
                CommandRequest::process(["ike-scan", "-d", "500", "--multiline", "--aggressive", "10.0.0.5"]),
            ]
        );
        assert_eq!(reqs, c.materialize(&target));
    }

    #[test]
    fn tcp_adds_flag() {
        let reqs = collector().materialize(&"service:10.0.0.5:4500/tcp=isakmp".parse().unwrap());
        match &reqs[0] {
            CommandRequest::Process { argv } => assert_eq!(argv[..4], ["ike-scan", "--tcp", "-d", "4500"]),
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn ineligible_targets_yield_nothing() {
        let c = collector();
        assert!(c.materialize(&"service:[2001:db8::1]:500/udp=isakmp".parse().unwrap()).is_empty());
        assert!(c.materialize(&"service:10.0.0.5:22/tcp=ssh".parse().unwrap()).is_empty());
        assert!(c.materialize(&"host:10.0.0.5".parse().unwrap()).is_empty());
    }

    #[test]
    fn aggressive_psk_is_reported() {
        let out = CapturedOutput {
            stdout: "Starting ike-scan 1.9.4 with 1 hosts (http://www.nta-monitor.com/tools/ike-scan/)\n\
                     10.0.0.5\tAggressive Mode Handshake returned\n\
                     \tHDR=(CKY-R=5fe5b2b7d07a0dd4)\n\
                     \tSA=(Enc=3DES Hash=SHA1 Group=2:modp1024 Auth=PSK LifeType=Seconds LifeDuration=28800)\n\
                     \tKeyExchange(128 bytes)\n\
                     \n\
                     Ending ike-scan 1.9.4: 1 hosts scanned in 0.046 seconds (21.58 hosts/sec).\n"
                .into(),
            exit_code: Some(0),
            ..Default::default()
        };
        let target: Target = "service:10.0.0.5:500/udp=isakmp".parse().unwrap();
        let parsed = collector().normalize(&target, &out);
        assert_eq!(
            parsed.entities,
            [DerivedEntity::finding(
                "ike-transform",
                "Enc=3DES Hash=SHA1 Group=2:modp1024 Auth=PSK LifeType=Seconds LifeDuration=28800"
            )]
        );
        assert_eq!(parsed.reports.len(), 1);
    }

    #[test]
    fn no_handshake_yields_nothing() {
        let out = CapturedOutput {
            stdout: "Ending ike-scan 1.9.4: 1 hosts scanned in 2.4 seconds. 0 returned handshake; 0 returned notify\n".into(),
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(collector().normalize(&"service:10.0.0.5:500/udp".parse().unwrap(), &out).is_empty());
    }
}
