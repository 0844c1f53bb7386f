//! The plugin contract every collector implements.

use crate::command::{ApiRequest, CapturedOutput, CommandRequest};
use crate::descriptor::CollectorDescriptor;
use crate::entity::Normalized;
use crate::error::{ConfigError, FailureCause};
use crate::target::Target;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// A collector plugin. Variants are told apart by the descriptor's
/// capability: API collectors produce [`CommandRequest::Api`], all others
/// [`CommandRequest::Process`].
pub trait Collector: Send + Sync {
    fn descriptor(&self) -> &CollectorDescriptor;

    /// Invocations required for `target`. Must be a pure function of the
    /// collector's configuration and the target; an ineligible target yields
    /// an empty vector.
    fn materialize(&self, target: &Target) -> Vec<CommandRequest>;

    /// Parses captured output. Must never fail; unexpected output yields an
    /// empty result.
    fn normalize(&self, target: &Target, output: &CapturedOutput) -> Normalized;

    /// Output patterns that mark an otherwise successful run as failed.
    fn failure_rules(&self) -> &[FailureRule] {
        &[]
    }

    /// Attaches credentials right before an API request is sent.
    fn authorize(&self, request: ApiRequest, _credentials: Option<&Credentials>) -> Result<ApiRequest, FailureCause> {
        Ok(request)
    }
}

/// Builds a collector from its resolved context. Returning an error aborts
/// startup.
pub type CollectorFactory = fn(&CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError>;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("api_key", &"<redacted>").finish()
    }
}

/// Settings shared by all collectors, resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct CollectorSettings {
    pub dns_server: Option<String>,
    pub user_agent: Option<String>,
    pub wordlists: Vec<PathBuf>,
    pub api_keys: HashMap<String, Credentials>,
}

impl CollectorSettings {
    pub fn credentials(&self, collector: &str) -> Option<&Credentials> {
        self.api_keys.get(collector)
    }
}

/// Everything a factory needs to build a collector at registration.
#[derive(Debug)]
pub struct CollectorContext<'a> {
    pub descriptor: CollectorDescriptor,
    /// Resolved path of `descriptor.binary`, if it declares one.
    pub binary: Option<PathBuf>,
    pub settings: &'a CollectorSettings,
}

impl CollectorContext<'_> {
    /// Program name to put in argv[0].
    pub fn program(&self) -> String {
        match (&self.binary, &self.descriptor.binary) {
            (Some(path), _) => path.to_string_lossy().into_owned(),
            (None, Some(name)) => name.clone(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct FailureRule {
    pub pattern: Regex,
    pub stream: OutputStream,
}

impl FailureRule {
    pub fn new(pattern: &str, stream: OutputStream) -> Result<Self, regex::Error> {
        Ok(FailureRule { pattern: Regex::new(pattern)?, stream })
    }

    /// First offending line, if any.
    pub fn check<'a>(&self, output: &'a CapturedOutput) -> Option<&'a str> {
        let text = match self.stream {
            OutputStream::Stdout => &output.stdout,
            OutputStream::Stderr => &output.stderr,
        };
        text.lines().find(|line| self.pattern.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_rule_checks_selected_stream() {
        let rule = FailureRule::new(r"^.*no servers could be reached.*$", OutputStream::Stdout).unwrap();
        let out = CapturedOutput {
            stdout: "first\n;; connection timed out; no servers could be reached\n".into(),
            stderr: String::new(),
            exit_code: Some(1),
            status_code: None,
        };
        assert!(rule.check(&out).is_some());
        let rule = FailureRule::new("no servers", OutputStream::Stderr).unwrap();
        assert!(rule.check(&out).is_none());
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let c = Credentials { api_key: "secret".into() };
        assert!(!format!("{c:?}").contains("secret"));
    }
}
