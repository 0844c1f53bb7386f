//! `crtshdomain`: certificate transparency search on crt.sh.

use crate::within;
use recon_core::{
    ApiRequest, CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest,
    ConfigError, DerivedEntity, Normalized, Target, TargetKind,
};
use serde::Deserialize;
use tracing::debug;

pub const NAME: &str = "crtshdomain";

const API_URL: &str = "https://crt.sh/";

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Api(TargetKind::Domain)).priority(134).max_concurrency(1)
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(CrtshDomain { descriptor: ctx.descriptor.clone() }))
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    name_value: String,
}

pub struct CrtshDomain {
    descriptor: CollectorDescriptor,
}

impl Collector for CrtshDomain {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Domain(domain) = target else {
            return Vec::new();
        };
        let request = ApiRequest::get(API_URL).param("q", format!("%.{}", domain.name)).param("output", "json");
        vec![CommandRequest::Api(request)]
    }

    fn normalize(&self, target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        let Target::Domain(domain) = target else {
            return out;
        };
        let entries: Vec<Entry> = match serde_json::from_str(&output.stdout) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(collector = NAME, error = %e, "unexpected response body");
                return out;
            }
        };
        for entry in &entries {
            for name in entry.name_value.lines() {
                let name = name.trim().trim_start_matches("*.").trim_end_matches('.').to_ascii_lowercase();
                if !name.is_empty() && within(&name, &domain.name) {
                    out.push(DerivedEntity::host_name(name));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> CrtshDomain {
        CrtshDomain { descriptor: descriptor() }
    }

    #[test]
    fn request_is_deterministic() {
        let target = Target::domain("test.local");
        let reqs = collector().materialize(&target);
        assert_eq!(reqs, collector().materialize(&target));
        assert_eq!(reqs[0].display(), "GET https://crt.sh/?q=%.test.local&output=json");
        assert!(collector().materialize(&"host:10.0.0.1".parse().unwrap()).is_empty());
    }

    #[test]
    fn certificate_names() {
        let body = r#"[
            {"issuer_name": "C=US, O=Let's Encrypt", "name_value": "*.test.local\ntest.local"},
            {"name_value": "VPN.Test.Local\nmail.test.local"},
            {"name_value": "other.example"}
        ]"#;
        let out = CapturedOutput { stdout: body.into(), status_code: Some(200), ..Default::default() };
        let parsed = collector().normalize(&Target::domain("test.local"), &out);
        assert_eq!(
            parsed.entities,
            [
                DerivedEntity::host_name("test.local"),
                DerivedEntity::host_name("vpn.test.local"),
                DerivedEntity::host_name("mail.test.local"),
            ]
        );
    }

    #[test]
    fn empty_or_html_body() {
        let target = Target::domain("test.local");
        for body in ["[]", "<html><body>Certificates</body></html>"] {
            let out = CapturedOutput { stdout: body.into(), ..Default::default() };
            assert!(collector().normalize(&target, &out).is_empty());
        }
    }
}
