//! Collector orchestration: registry, materialization, scheduling,
//! execution and normalization on top of the ledger.

pub mod exec;
pub mod materializer;
pub mod normalizer;
pub mod registry;
pub mod scheduler;
pub mod tools;

#[cfg(test)]
mod testing;

pub use exec::{
    ApiRunner, ArtifactStore, Escalation, Executor, HttpOptions, HttpResponse, HttpTransport, ProcessRunner, ReqwestTransport,
    TransportError,
};
pub use materializer::{materialize, materialize_all, Materialized};
pub use normalizer::{LogSink, NormalizeStats, Normalizer, ReportSink};
pub use registry::{CollectorOverride, Registry};
pub use scheduler::{RunSummary, Scheduler};
pub use tools::ToolPaths;
