//! Collectors backed by third party HTTP APIs.

pub mod crtsh;
pub mod virustotal;

use recon_core::{CollectorDescriptor, CollectorFactory};

pub fn catalog() -> Vec<(CollectorDescriptor, CollectorFactory)> {
    vec![(virustotal::descriptor(), virustotal::build), (crtsh::descriptor(), crtsh::build)]
}

/// True if `name` is `domain` or one of its subdomains.
pub(crate) fn within(name: &str, domain: &str) -> bool {
    name == domain || name.strip_suffix(domain).is_some_and(|prefix| prefix.ends_with('.'))
}
