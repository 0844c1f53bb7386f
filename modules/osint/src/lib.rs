//! Open source intelligence collectors.

pub mod whoishost;

use recon_core::{CollectorDescriptor, CollectorFactory};

pub fn catalog() -> Vec<(CollectorDescriptor, CollectorFactory)> {
    vec![(whoishost::descriptor(), whoishost::build)]
}
