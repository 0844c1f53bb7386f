//! Collectors that resolve domains.

pub mod dnshost;

use recon_core::{CollectorDescriptor, CollectorFactory};

pub fn catalog() -> Vec<(CollectorDescriptor, CollectorFactory)> {
    vec![(dnshost::descriptor(), dnshost::build)]
}
