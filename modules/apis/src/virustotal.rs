//! `virustotal`: domain report of the VirusTotal v2 API.

use crate::within;
use recon_core::{
    ApiRequest, CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest,
    ConfigError, Credentials, DerivedEntity, FailureCause, Normalized, RecordType, Target, TargetKind,
};
use serde::Deserialize;
use std::net::IpAddr;
use tracing::debug;

pub const NAME: &str = "virustotal";

const API_DOMAIN_URL: &str = "https://www.virustotal.com/vtapi/v2/domain/report";

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Api(TargetKind::Domain)).priority(160).max_concurrency(1)
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    if ctx.settings.credentials(NAME).is_none() {
        return Err(ConfigError::MissingCredentials(NAME.into()));
    }
    Ok(Box::new(VirusTotal::new(ctx.descriptor.clone())))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DomainReport {
    subdomains: Vec<String>,
    resolutions: Vec<Resolution>,
    detected_urls: Vec<DetectedUrl>,
}

#[derive(Debug, Deserialize)]
struct Resolution {
    ip_address: String,
}

#[derive(Debug, Deserialize)]
struct DetectedUrl {
    url: String,
    #[serde(default)]
    positives: u32,
    #[serde(default)]
    total: u32,
}

pub struct VirusTotal {
    descriptor: CollectorDescriptor,
}

impl VirusTotal {
    pub fn new(descriptor: CollectorDescriptor) -> Self {
        VirusTotal { descriptor }
    }
}

impl Collector for VirusTotal {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Domain(domain) = target else {
            return Vec::new();
        };
        vec![CommandRequest::Api(ApiRequest::get(API_DOMAIN_URL).param("domain", &domain.name))]
    }

    fn normalize(&self, target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        let Target::Domain(domain) = target else {
            return out;
        };
        let report: DomainReport = match serde_json::from_str(&output.stdout) {
            Ok(report) => report,
            Err(e) => {
                debug!(collector = NAME, error = %e, "unexpected response body");
                return out;
            }
        };
        out.push(DerivedEntity::host_name(domain.name.as_str()));
        for name in report.subdomains {
            let name = DerivedEntity::host_name(name);
            if matches!(&name, DerivedEntity::HostName { name } if within(name, &domain.name)) {
                out.push(name);
            }
        }
        for resolution in report.resolutions {
            let record = match resolution.ip_address.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => RecordType::A,
                Ok(IpAddr::V6(_)) => RecordType::Aaaa,
                Err(_) => continue,
            };
            out.push(DerivedEntity::DnsRecord { name: domain.name.clone(), record, value: resolution.ip_address });
        }
        for hit in report.detected_urls.iter().filter(|u| u.positives > 0) {
            out.report(format!("url flagged by {}/{} engines: {}", hit.positives, hit.total, hit.url));
        }
        out
    }

    fn authorize(&self, request: ApiRequest, credentials: Option<&Credentials>) -> Result<ApiRequest, FailureCause> {
        match credentials {
            Some(c) => Ok(request.param("apikey", &c.api_key)),
            None => Err(FailureCause::MissingCredentials(NAME.into())),
        }
    }
}
