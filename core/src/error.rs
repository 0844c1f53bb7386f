//! Error taxonomy. Configuration errors are fatal at startup; everything else
//! is a per-command failure cause carried as data on the command row.

use crate::command::CommandStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("collector '{0}' is registered more than once")]
    DuplicateCollector(String),
    #[error("collector '{collector}' requires binary '{binary}' which could not be found")]
    MissingBinary { collector: String, binary: String },
    #[error("collector '{0}' requires an API key")]
    MissingCredentials(String),
    #[error("word list '{}' does not exist", .0.display())]
    MissingWordlist(PathBuf),
    #[error("invalid collector '{collector}': {reason}")]
    Invalid { collector: String, reason: String },
}

/// Classification of a non-200 API response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiFailure {
    RateLimitExceeded,
    MalformedRequest,
    InsufficientPrivilege,
    NotFound,
    GenericFailure,
}

impl ApiFailure {
    /// `None` for 200; 204 is how rate limiting is signalled by the APIs in use.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200 => None,
            204 => Some(ApiFailure::RateLimitExceeded),
            400 => Some(ApiFailure::MalformedRequest),
            403 => Some(ApiFailure::InsufficientPrivilege),
            404 => Some(ApiFailure::NotFound),
            _ => Some(ApiFailure::GenericFailure),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFailure::RateLimitExceeded => "rate-limit-exceeded",
            ApiFailure::MalformedRequest => "malformed-request",
            ApiFailure::InsufficientPrivilege => "insufficient-privilege",
            ApiFailure::NotFound => "not-found",
            ApiFailure::GenericFailure => "generic-failure",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        [
            ApiFailure::RateLimitExceeded,
            ApiFailure::MalformedRequest,
            ApiFailure::InsufficientPrivilege,
            ApiFailure::NotFound,
            ApiFailure::GenericFailure,
        ]
        .into_iter()
        .find(|f| f.as_str() == s)
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a command ended in `Failed` or `TimedOut`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),
    #[error("process was killed: {0}")]
    ProcessKilled(String),
    #[error("timeout of {} ms exceeded", .0.as_millis())]
    TimeoutExceeded(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("privilege escalation unavailable: {0}")]
    PrivilegeUnavailable(String),
    #[error("no credentials configured for {0}")]
    MissingCredentials(String),
    #[error("api request failed: {failure} (status {status})")]
    ApiRequestFailed { failure: ApiFailure, status: u16 },
    #[error("tool reported failure: {0}")]
    ToolReportedFailure(String),
}

impl FailureCause {
    pub fn code(&self) -> &'static str {
        match self {
            FailureCause::SpawnFailed(_) => "spawn-failed",
            FailureCause::ProcessKilled(_) => "process-killed",
            FailureCause::TimeoutExceeded(_) => "timeout-exceeded",
            FailureCause::Transport(_) => "transport",
            FailureCause::PrivilegeUnavailable(_) => "privilege-unavailable",
            FailureCause::MissingCredentials(_) => "missing-credentials",
            FailureCause::ApiRequestFailed { .. } => "api-request-failed",
            FailureCause::ToolReportedFailure(_) => "tool-reported-failure",
        }
    }

    /// Free-text part stored next to the code.
    pub fn detail(&self) -> String {
        match self {
            FailureCause::SpawnFailed(s)
            | FailureCause::ProcessKilled(s)
            | FailureCause::Transport(s)
            | FailureCause::PrivilegeUnavailable(s)
            | FailureCause::MissingCredentials(s)
            | FailureCause::ToolReportedFailure(s) => s.clone(),
            FailureCause::TimeoutExceeded(t) => t.as_millis().to_string(),
            FailureCause::ApiRequestFailed { failure, .. } => failure.as_str().to_string(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FailureCause::ApiRequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn terminal_status(&self) -> CommandStatus {
        match self {
            FailureCause::TimeoutExceeded(_) => CommandStatus::TimedOut,
            _ => CommandStatus::Failed,
        }
    }

    /// Rebuilds a cause from its stored columns.
    pub fn from_parts(code: &str, detail: &str, status_code: Option<u16>) -> Option<Self> {
        let d = detail.to_string();
        Some(match code {
            "spawn-failed" => FailureCause::SpawnFailed(d),
            "process-killed" => FailureCause::ProcessKilled(d),
            "timeout-exceeded" => FailureCause::TimeoutExceeded(Duration::from_millis(detail.parse().unwrap_or(0))),
            "transport" => FailureCause::Transport(d),
            "privilege-unavailable" => FailureCause::PrivilegeUnavailable(d),
            "missing-credentials" => FailureCause::MissingCredentials(d),
            "api-request-failed" => FailureCause::ApiRequestFailed {
                failure: ApiFailure::parse(detail)?,
                status: status_code?,
            },
            "tool-reported-failure" => FailureCause::ToolReportedFailure(d),
            _ => return None,
        })
    }
}
