use recon_core::{CapturedOutput, CommandRequest, CommandStatus, FailureCause, Target};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SourceId = i64;
pub type TargetId = i64;
pub type CommandId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub started_at: i64,
    pub tool_version: String,
    pub args_json: String,
}

/// A persisted command with its current lifecycle state.
#[derive(Debug, Clone)]
pub struct CommandRow {
    pub id: CommandId,
    pub collector: String,
    pub target_id: TargetId,
    pub target: Target,
    pub request: CommandRequest,
    pub status: CommandStatus,
    pub output: CapturedOutput,
    pub failure: Option<FailureCause>,
    pub run_id: Option<Uuid>,
    pub created_ms: i64,
    pub started_ms: Option<i64>,
    pub finished_ms: Option<i64>,
    pub normalized_ms: Option<i64>,
}

/// Final state written back by the executor, exactly once per command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub status: CommandStatus,
    pub output: CapturedOutput,
    pub failure: Option<FailureCause>,
}

impl ExecutionRecord {
    pub fn completed(output: CapturedOutput) -> Self {
        ExecutionRecord { status: CommandStatus::Completed, output, failure: None }
    }

    /// Partial output is kept for diagnostics.
    pub fn failed(cause: FailureCause, output: CapturedOutput) -> Self {
        ExecutionRecord { status: cause.terminal_status(), output, failure: Some(cause) }
    }
}

/// Entity tables that accept derived rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Path,
    Query,
    HostName,
    DnsRecord,
    Finding,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Path => "path",
            EntityKind::Query => "query",
            EntityKind::HostName => "host_name",
            EntityKind::DnsRecord => "dns_record",
            EntityKind::Finding => "finding",
        }
    }
}
