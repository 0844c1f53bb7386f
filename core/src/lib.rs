//! Core utilities and shared types for the collection engine.
//!
//! Everything a collector plugin needs lives here: the target model, the
//! descriptor metadata, the invocation and entity types, the error taxonomy and
//! the [`Collector`] contract itself. Persistence and execution live in the
//! `recon-ledger` and `recon-engine` crates.

pub mod collector;
pub mod command;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod service;
pub mod target;

pub use collector::{Collector, CollectorContext, CollectorFactory, CollectorSettings, Credentials, FailureRule, OutputStream};
pub use command::{ApiRequest, CapturedOutput, CommandRequest, CommandStatus};
pub use descriptor::{Capability, CollectorDescriptor, Privilege};
pub use entity::{DerivedEntity, Normalized, RecordType, ReportItem};
pub use error::{ApiFailure, ConfigError, FailureCause};
pub use service::ServiceMatcher;
pub use target::{Domain, Host, Protocol, Service, Target, TargetKind};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
