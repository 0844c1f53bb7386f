//! `httpmsfrobotstxt`: fetches robots.txt through the metasploit scanner
//! module and records every listed path.

use crate::{http_matcher, is_tls};
use recon_core::{
    CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest, ConfigError,
    DerivedEntity, Normalized, ServiceMatcher, Target,
};
use regex::Regex;
use std::time::Duration;

pub const NAME: &str = "httpmsfrobotstxt";

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Service)
        .priority(1450)
        .max_concurrency(2)
        .timeout(Duration::from_secs(300))
        .binary("msfconsole")
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(MsfRobotsTxt::new(ctx.descriptor.clone(), ctx.program())?))
}

pub struct MsfRobotsTxt {
    descriptor: CollectorDescriptor,
    program: String,
    matcher: ServiceMatcher,
    entry: Regex,
}

impl MsfRobotsTxt {
    pub fn new(descriptor: CollectorDescriptor, program: String) -> Result<Self, ConfigError> {
        let entry = Regex::new(r"(?i)^\s*(?P<directive>(?:dis)?allow:\s*)?(?P<path>/\S*)\s*$")
            .map_err(|e| ConfigError::Invalid { collector: NAME.into(), reason: e.to_string() })?;
        Ok(MsfRobotsTxt { matcher: http_matcher(NAME)?, descriptor, program, entry })
    }
}

impl Collector for MsfRobotsTxt {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Service(service) = target else {
            return Vec::new();
        };
        if !self.matcher.matches(service) {
            return Vec::new();
        }
        let script = format!(
            "use auxiliary/scanner/http/robots_txt;set RHOSTS {};set RPORT {};set SSL {};run;exit",
            service.host.address,
            service.port,
            is_tls(service)
        );
        vec![CommandRequest::process([self.program.clone(), "-q".into(), "-x".into(), script])]
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        for line in output.stdout_lines() {
            let Some(caps) = self.entry.captures(line) else {
                continue;
            };
            let entry = &caps["path"];
            let (path, query) = match entry.split_once('?') {
                Some((p, q)) => (p, Some(q)),
                None => (entry, None),
            };
            out.push(DerivedEntity::path(path));
            if let Some(q) = query.filter(|q| !q.is_empty()) {
                out.push(DerivedEntity::query(path, q));
            }
            if caps.name("directive").is_some_and(|d| d.as_str().to_ascii_lowercase().starts_with("dis")) {
                out.report(format!("potential hidden path found: {entry}"));
            }
        }
        out
    }
}
