//! In-crate fixtures shared by the engine tests.

use crate::exec::{HttpResponse, HttpTransport, TransportError};
use crate::normalizer::ReportSink;
use async_trait::async_trait;
use recon_core::{
    ApiRequest, CapturedOutput, Collector, CollectorDescriptor, CommandRequest, Credentials, DerivedEntity, FailureCause,
    FailureRule, Normalized, ReportItem, Target,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Runs each script through `sh -c` with the target as `$1`. Lines of
/// stdout starting with `/` become paths; `report:` lines become report items.
pub struct ShellCollector {
    descriptor: CollectorDescriptor,
    scripts: Vec<String>,
    rules: Vec<FailureRule>,
}

impl ShellCollector {
    pub fn new(descriptor: CollectorDescriptor, script: &str) -> Self {
        ShellCollector { descriptor, scripts: vec![script.to_string()], rules: Vec::new() }
    }

    pub fn scripts(descriptor: CollectorDescriptor, scripts: &[&str]) -> Self {
        ShellCollector { descriptor, scripts: scripts.iter().map(|s| s.to_string()).collect(), rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: FailureRule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl Collector for ShellCollector {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        self.scripts
            .iter()
            .map(|s| CommandRequest::process(["sh".to_string(), "-c".into(), s.clone(), "sh".into(), target.to_string()]))
            .collect()
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        for line in output.stdout_lines() {
            if line.starts_with('/') {
                out.push(DerivedEntity::path(line.trim()));
            } else if let Some(msg) = line.strip_prefix("report:") {
                out.report(msg.trim());
            }
        }
        out
    }

    fn failure_rules(&self) -> &[FailureRule] {
        &self.rules
    }
}

/// API collector querying `https://api.test/<target>` with the key as a param.
pub struct EchoApi {
    descriptor: CollectorDescriptor,
}

impl EchoApi {
    pub fn new(descriptor: CollectorDescriptor) -> Self {
        EchoApi { descriptor }
    }
}

impl Collector for EchoApi {
    fn descriptor(&self) -> &CollectorDescriptor {
        &self.descriptor
    }

    fn materialize(&self, target: &Target) -> Vec<CommandRequest> {
        vec![CommandRequest::Api(ApiRequest::get(format!("https://api.test/{target}")))]
    }

    fn normalize(&self, _target: &Target, output: &CapturedOutput) -> Normalized {
        let mut out = Normalized::default();
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(&output.stdout) {
            for name in map.get("subdomains").and_then(|v| v.as_array()).into_iter().flatten() {
                if let Some(name) = name.as_str() {
                    out.push(DerivedEntity::host_name(name));
                }
            }
        }
        out
    }

    fn authorize(&self, request: ApiRequest, credentials: Option<&Credentials>) -> Result<ApiRequest, FailureCause> {
        match credentials {
            Some(c) => Ok(request.param("apikey", c.api_key.clone())),
            None => Ok(request),
        }
    }
}

/// Replays scripted responses and records what was sent.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    pub sent: Mutex<Vec<ApiRequest>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
        FakeTransport { responses: Mutex::new(responses.into()), ..Default::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response".into())))
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub items: Mutex<Vec<(String, ReportItem)>>,
}

impl ReportSink for MemorySink {
    fn report(&self, collector: &str, _target: &Target, item: &ReportItem) {
        self.items.lock().unwrap().push((collector.to_string(), item.clone()));
    }
}
