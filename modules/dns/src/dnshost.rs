//! `dnshost`: resolves a domain with `host` and records its A, AAAA, MX and
//! CNAME records.

use recon_core::{
    CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest, ConfigError,
    DerivedEntity, FailureRule, Normalized, OutputStream, RecordType, Target,
};
use regex::Regex;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

pub const NAME: &str = "dnshost";

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Domain)
        .priority(120)
        .max_concurrency(5)
        .timeout(Duration::from_secs(30))
        .binary("host")
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(DnsHost::new(ctx.descriptor.clone(), ctx.program(), ctx.settings.dns_server.clone())?))
}

pub struct DnsHost {
    descriptor: CollectorDescriptor,
    program: String,
    dns_server: Option<String>,
    rules: Vec<FailureRule>,
    ipv4: Regex,
    ipv6: Regex,
    mx: Regex,
    cname: Regex,
}

fn dns_name(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

impl DnsHost {
    pub fn new(descriptor: CollectorDescriptor, program: String, dns_server: Option<String>) -> Result<Self, ConfigError> {
        let invalid = |e: regex::Error| ConfigError::Invalid { collector: NAME.into(), reason: e.to_string() };
        Ok(DnsHost {
            descriptor,
            program,
            dns_server,
            rules: vec![FailureRule::new(r"^.*connection timed out; no servers could be reached.*$", OutputStream::Stdout)
                .map_err(invalid)?],
            ipv4: Regex::new(r"^(?P<name>.+?)\.? has address (?P<address>.+)$").map_err(invalid)?,
            ipv6: Regex::new(r"(?i)^(?P<name>.+?)\.? has IPv6 address (?P<address>.+)$").map_err(invalid)?,
            mx: Regex::new(r"^(?P<name>.+?)\.? mail is handled by( [0-9]+)? (?P<exchange>.+?)\.?$").map_err(invalid)?,
            cname: Regex::new(r"^(?P<alias>.+?)\.? is an alias for (?P<canonical>.+?)\.?$").map_err(invalid)?,
        })
    }

    fn address_record(out: &mut Normalized, name: &str, record: RecordType, address: &str) {
        let Ok(address) = address.trim().parse::<IpAddr>() else {
            debug!(collector = NAME, address, "ignoring invalid address");
            return;
        };
        let name = dns_name(name);
        out.push(DerivedEntity::host_name(name.clone()));
        out.push(DerivedEntity::DnsRecord { name, record, value: address.to_string() });
    }
}

impl Collector for DnsHost {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Domain(domain) = target else {
            return Vec::new();
        };
        let mut argv = vec![self.program.clone(), domain.name.clone()];
        argv.extend(self.dns_server.iter().cloned());
        vec![CommandRequest::Process { argv }]
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        for line in output.stdout_lines() {
            if let Some(caps) = self.ipv4.captures(line) {
                Self::address_record(&mut out, &caps["name"], RecordType::A, &caps["address"]);
            } else if let Some(caps) = self.ipv6.captures(line) {
                Self::address_record(&mut out, &caps["name"], RecordType::Aaaa, &caps["address"]);
            } else if let Some(caps) = self.cname.captures(line) {
                let (alias, canonical) = (dns_name(&caps["alias"]), dns_name(&caps["canonical"]));
                out.push(DerivedEntity::host_name(alias.clone()));
                out.push(DerivedEntity::host_name(canonical.clone()));
                out.push(DerivedEntity::DnsRecord { name: alias, record: RecordType::Cname, value: canonical });
            } else if let Some(caps) = self.mx.captures(line) {
                let (name, exchange) = (dns_name(&caps["name"]), dns_name(&caps["exchange"]));
                out.push(DerivedEntity::host_name(exchange.clone()));
                out.push(DerivedEntity::DnsRecord { name, record: RecordType::Mx, value: exchange });
            }
        }
        out
    }

    fn failure_rules(&self) -> &[FailureRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CNAME_CHAIN: &str = "\
www.test.local is an alias for sites.test.local.edgekey.net.
sites.test.local.edgekey.net is an alias for e13595.a.akamaiedge.net.
e13595.a.akamaiedge.net has address 92.122.36.1
e13595.a.akamaiedge.net has IPv6 address 2a00:1450:400a:802::2004
";

    fn collector(server: Option<&str>) -> DnsHost {
        DnsHost::new(descriptor(), "host".into(), server.map(str::to_string)).unwrap()
    }

    fn record(name: &str, record: RecordType, value: &str) -> DerivedEntity {
        DerivedEntity::DnsRecord { name: name.into(), record, value: value.into() }
    }

    #[test]
    fn materializes_with_optional_server() {
        let target = Target::domain("www.test.local");
        assert_eq!(collector(None).materialize(&target), [CommandRequest::process(["host", "www.test.local"])]);
        assert_eq!(
            collector(Some("10.0.0.53")).materialize(&target),
            [CommandRequest::process(["host", "www.test.local", "10.0.0.53"])]
        );
        assert!(collector(None).materialize(&"host:10.0.0.1".parse().unwrap()).is_empty());
    }

    #[test]
    fn follows_cname_chain() {
        let out = CapturedOutput { stdout: CNAME_CHAIN.into(), exit_code: Some(0), ..Default::default() };
        let parsed = collector(None).normalize(&Target::domain("www.test.local"), &out);
        let records: Vec<_> = parsed.entities.iter().filter(|e| matches!(e, DerivedEntity::DnsRecord { .. })).collect();
        assert_eq!(
            records,
            [
                &record("www.test.local", RecordType::Cname, "sites.test.local.edgekey.net"),
                &record("sites.test.local.edgekey.net", RecordType::Cname, "e13595.a.akamaiedge.net"),
                &record("e13595.a.akamaiedge.net", RecordType::A, "92.122.36.1"),
                &record("e13595.a.akamaiedge.net", RecordType::Aaaa, "2a00:1450:400a:802::2004"),
            ]
        );
        let names = parsed.entities.iter().filter(|e| matches!(e, DerivedEntity::HostName { .. })).count();
        assert_eq!(names, 3);
    }

    #[test]
    fn mail_exchangers_and_bad_addresses() {
        let out = CapturedOutput {
            stdout: "test.local mail is handled by 10 Mail.Test.Local.\ntest.local has address 999.1.1.1\n".into(),
            ..Default::default()
        };
        let parsed = collector(None).normalize(&Target::domain("test.local"), &out);
        assert_eq!(
            parsed.entities,
            [DerivedEntity::host_name("mail.test.local"), record("test.local", RecordType::Mx, "mail.test.local")]
        );
    }

    #[test]
    fn unreachable_server_is_a_failure() {
        let out = CapturedOutput {
            stdout: ";; connection timed out; no servers could be reached\n".into(),
            exit_code: Some(1),
            ..Default::default()
        };
        assert!(collector(None).failure_rules()[0].check(&out).is_some());
    }
}
