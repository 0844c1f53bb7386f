//! Collectors for IPsec VPN endpoints.

pub mod ikescan;

use recon_core::{CollectorDescriptor, CollectorFactory};

pub fn catalog() -> Vec<(CollectorDescriptor, CollectorFactory)> {
    vec![(ikescan::descriptor(), ikescan::build)]
}
