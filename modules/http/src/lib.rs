//! Collectors for HTTP services.

pub mod gobuster;
pub mod robots;

use recon_core::{CollectorDescriptor, CollectorFactory, ConfigError, Service, ServiceMatcher};
use url::Url;

pub fn catalog() -> Vec<(CollectorDescriptor, CollectorFactory)> {
    vec![(robots::descriptor(), robots::build), (gobuster::descriptor(), gobuster::build)]
}

/// Ports and scanner service names that identify a web server.
pub fn http_matcher(collector: &str) -> Result<ServiceMatcher, ConfigError> {
    ServiceMatcher::new(
        &[80, 443],
        &[],
        &[r"^ssl\|http$", r"^http$", r"^http-alt$", r"^https$", r"^http-proxy$", r"^sgi-soap$", r"^caldav$"],
        &[],
    )
    .map_err(|e| ConfigError::Invalid { collector: collector.to_string(), reason: e.to_string() })
}

pub fn is_tls(service: &Service) -> bool {
    match service.name.as_deref() {
        Some(name) => name.starts_with("ssl") || name == "https",
        None => matches!(service.port, 443 | 8443 | 9443),
    }
}

/// Base URL of the web server behind `service`.
pub fn service_url(service: &Service) -> Option<Url> {
    let scheme = if is_tls(service) { "https" } else { "http" };
    let host = match service.host.address {
        std::net::IpAddr::V4(a) => a.to_string(),
        std::net::IpAddr::V6(a) => format!("[{a}]"),
    };
    Url::parse(&format!("{scheme}://{host}:{}/", service.port)).ok()
}
