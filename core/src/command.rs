use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request parameters of one API call. Credentials are never part of it; they
/// are attached at execution time so the ledger never stores secrets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        ApiRequest { url: url.into(), params: Vec::new(), headers: Vec::new() }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// One concrete invocation produced by materialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandRequest {
    Process { argv: Vec<String> },
    Api(ApiRequest),
}

impl CommandRequest {
    pub fn process<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandRequest::Process { argv: argv.into_iter().map(Into::into).collect() }
    }

    /// Canonical serialized form; part of the command uniqueness tuple.
    pub fn canonical(&self) -> String {
        // Only strings and vectors are serialized, which cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Human readable rendering, used for logs and print-only mode.
    pub fn display(&self) -> String {
        match self {
            CommandRequest::Process { argv } => argv.join(" "),
            CommandRequest::Api(req) => {
                if req.params.is_empty() {
                    format!("GET {}", req.url)
                } else {
                    let q = req.params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
                    format!("GET {}?{}", req.url, q)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Running => "running",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
            CommandStatus::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed | CommandStatus::TimedOut)
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "running" => Ok(CommandStatus::Running),
            "completed" => Ok(CommandStatus::Completed),
            "failed" => Ok(CommandStatus::Failed),
            "timed_out" => Ok(CommandStatus::TimedOut),
            other => Err(format!("unknown command status: {other}")),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output handed to a collector's parser. For API collectors `stdout`
/// holds the response body and `status_code` the HTTP status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub status_code: Option<u16>,
}

impl CapturedOutput {
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_is_stable() {
        let a = CommandRequest::process(["ike-scan", "-d", "500", "10.0.0.1"]);
        let b = CommandRequest::process(vec!["ike-scan".to_string(), "-d".into(), "500".into(), "10.0.0.1".into()]);
        assert_eq!(a.canonical(), b.canonical());
        assert!(a.canonical().contains("\"type\":\"process\""));
    }

    #[test]
    fn status_round_trip() {
        for s in [
            CommandStatus::Pending,
            CommandStatus::Running,
            CommandStatus::Completed,
            CommandStatus::Failed,
            CommandStatus::TimedOut,
        ] {
            assert_eq!(s.as_str().parse::<CommandStatus>().unwrap(), s);
        }
        assert!(!CommandStatus::Running.is_terminal());
        assert!(CommandStatus::TimedOut.is_terminal());
    }

    #[test]
    fn api_display_includes_params() {
        let r = CommandRequest::Api(ApiRequest::get("https://crt.sh/").param("q", "%.test.local").param("output", "json"));
        assert_eq!(r.display(), "GET https://crt.sh/?q=%.test.local&output=json");
    }
}
