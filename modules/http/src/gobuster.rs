//! `httpgobuster`: directory brute force, one command per word list.

use crate::{http_matcher, service_url};
use recon_core::{
    CapturedOutput, Capability, Collector, CollectorContext, CollectorDescriptor, CommandRequest, ConfigError,
    DerivedEntity, FailureRule, Normalized, OutputStream, ServiceMatcher, Target,
};
use regex::Regex;
use std::path::PathBuf;
use tracing::trace;

pub const NAME: &str = "httpgobuster";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";
const THREADS: u32 = 10;

pub fn descriptor() -> CollectorDescriptor {
    CollectorDescriptor::new(NAME, Capability::Service).priority(1500).max_concurrency(1).binary("gobuster")
}

pub fn build(ctx: &CollectorContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    let settings = ctx.settings;
    if settings.wordlists.is_empty() {
        return Err(ConfigError::Invalid { collector: NAME.into(), reason: "no word lists configured".into() });
    }
    if let Some(missing) = settings.wordlists.iter().find(|w| !w.is_file()) {
        return Err(ConfigError::MissingWordlist(missing.clone()));
    }
    let user_agent = settings.user_agent.clone().unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    Ok(Box::new(GoBuster::new(ctx.descriptor.clone(), ctx.program(), settings.wordlists.clone(), user_agent)?))
}

pub struct GoBuster {
    descriptor: CollectorDescriptor,
    program: String,
    wordlists: Vec<PathBuf>,
    user_agent: String,
    matcher: ServiceMatcher,
    rules: Vec<FailureRule>,
    hit: Regex,
}

impl GoBuster {
    pub fn new(
        descriptor: CollectorDescriptor,
        program: String,
        wordlists: Vec<PathBuf>,
        user_agent: String,
    ) -> Result<Self, ConfigError> {
        let invalid = |e: regex::Error| ConfigError::Invalid { collector: NAME.into(), reason: e.to_string() };
        let rules = vec![
            FailureRule::new(r"^Error: error on running go[bu]{2}ster: unable to connect to.*$", OutputStream::Stderr)
                .map_err(invalid)?,
            FailureRule::new(
                r"^.*Error: the server returns a status code that matches the provided options for non existing urls.*$",
                OutputStream::Stderr,
            )
            .map_err(invalid)?,
        ];
        let hit = Regex::new(r"^(?P<path>/?[^\s(]+)\s+\(Status:\s*(?P<status>\d{3})\)").map_err(invalid)?;
        Ok(GoBuster { matcher: http_matcher(NAME)?, descriptor, program, wordlists, user_agent, rules, hit })
    }
}

impl Collector for GoBuster {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        let Target::Service(service) = target else {
            return Vec::new();
        };
        if !self.matcher.matches(service) {
            return Vec::new();
        }
        let Some(url) = service_url(service) else {
            return Vec::new();
        };
        self.wordlists
            .iter()
            .map(|wordlist| {
                CommandRequest::process([
                    self.program.clone(),
                    "dir".into(),
                    "-z".into(),
                    "-q".into(),
                    "-t".into(),
                    THREADS.to_string(),
                    "-w".into(),
                    wordlist.to_string_lossy().into_owned(),
                    "-a".into(),
                    self.user_agent.clone(),
                    "-k".into(),
                    "-u".into(),
                    url.to_string(),
                ])
            })
            .collect()
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        for line in output.stdout_lines() {
            let Some(caps) = self.hit.captures(line.trim_start()) else {
                trace!(line, "skipping");
                continue;
            };
            let raw = &caps["path"];
            let path = if raw.starts_with('/') { raw.to_string() } else { format!("/{raw}") };
            let (path, query) = match path.split_once('?') {
                Some((p, q)) => (p.to_string(), Some(q.to_string())),
                None => (path, None),
            };
            out.push(DerivedEntity::path(path.clone()));
            if let Some(q) = query.filter(|q| !q.is_empty()) {
                out.push(DerivedEntity::query(path.clone(), q));
            }
            if matches!(&caps["status"], "401" | "403") {
                out.report(format!("access restricted ({}): {path}", &caps["status"]));
            }
        }
        out
    }

    fn failure_rules(&self) -> &[FailureRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::CollectorSettings;

    fn collector(wordlists: Vec<PathBuf>) -> GoBuster {
        GoBuster::new(descriptor(), "gobuster".into(), wordlists, "ua".into()).unwrap()
    }

    #[test]
    fn one_command_per_wordlist() {
        let c = collector(vec!["/w/common.txt".into(), "/w/big.txt".into()]);
        let target: Target = "service:10.0.0.7:8443/tcp=https".parse().unwrap();
        let reqs = c.materialize(&target);
        assert_eq!(reqs.len(), 2);
        assert_eq!(
            reqs[0],
            CommandRequest::process([
                "gobuster", "dir", "-z", "-q", "-t", "10", "-w", "/w/common.txt", "-a", "ua", "-k", "-u",
                "https://10.0.0.7:8443/"
            ])
        );
        assert_eq!(reqs, c.materialize(&target));
    }

    #[test]
    fn parses_hits_of_both_output_styles() {
        let out = CapturedOutput {
            stdout: "/admin                (Status: 301) [Size: 0] [--> http://10.0.0.7/admin/]\n\
                     server-status        (Status: 403) [Size: 277]\n\
                     /index.php?x=1 (Status: 200)\n\
                     ===============================\n"
                .into(),
            ..Default::default()
        };
        let target: Target = "service:10.0.0.7:80/tcp".parse().unwrap();
        let parsed = collector(vec![]).normalize(&target, &out);
        assert_eq!(
            parsed.entities,
            [
                DerivedEntity::path("/admin"),
                DerivedEntity::path("/server-status"),
                DerivedEntity::path("/index.php"),
                DerivedEntity::query("/index.php", "x=1"),
            ]
        );
        assert_eq!(parsed.reports.len(), 1);
    }

    #[test]
    fn connection_error_is_a_failure_rule() {
        let out = CapturedOutput {
            stderr: "Error: error on running gobuster: unable to connect to http://10.0.0.7/\n".into(),
            ..Default::default()
        };
        assert!(collector(vec![]).failure_rules().iter().any(|r| r.check(&out).is_some()));
    }

    #[test]
    fn missing_wordlist_is_a_config_error() {
        let settings = CollectorSettings { wordlists: vec!["/nonexistent/list.txt".into()], ..Default::default() };
        let ctx = CollectorContext { descriptor: descriptor(), binary: None, settings: &settings };
        assert!(matches!(build(&ctx), Err(ConfigError::MissingWordlist(_))));

        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("common.txt");
        std::fs::write(&list, "admin\n").unwrap();
        let settings = CollectorSettings { wordlists: vec![list], ..Default::default() };
        let ctx = CollectorContext { descriptor: descriptor(), binary: None, settings: &settings };
        assert!(build(&ctx).is_ok());
    }
}
