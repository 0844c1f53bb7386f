//! Execution of materialized commands.

mod api;
mod process;

pub use api::{ApiRunner, ArtifactStore, HttpOptions, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use process::{Escalation, ProcessRunner};

use recon_core::{CapturedOutput, Collector, CommandRequest, CommandStatus, Credentials, FailureCause, Target};
use recon_ledger::ExecutionRecord;
use std::collections::HashMap;

/// Dispatches a command to the process or HTTP path and applies the
/// collector's failure rules to the result.
pub struct Executor {
    process: ProcessRunner,
    api: ApiRunner,
    credentials: HashMap<String, Credentials>,
}

impl Executor {
    pub fn new(process: ProcessRunner, api: ApiRunner, credentials: HashMap<String, Credentials>) -> Self {
        Executor { process, api, credentials }
    }

    pub async fn execute(&self, collector: &dyn Collector, target: &Target, request: &CommandRequest) -> ExecutionRecord {
        let desc = collector.descriptor();
        let record = match request {
            CommandRequest::Process { argv } => self.process.run(argv, desc.timeout_enforced(), desc.privilege).await,
            CommandRequest::Api(req) => match collector.authorize(req.clone(), self.credentials.get(&desc.name)) {
                Ok(req) => self.api.run(&desc.name, target, &req, desc.timeout_enforced()).await,
                Err(cause) => ExecutionRecord::failed(cause, CapturedOutput::default()),
            },
        };
        apply_failure_rules(collector, record)
    }
}

fn apply_failure_rules(collector: &dyn Collector, record: ExecutionRecord) -> ExecutionRecord {
    if record.status != CommandStatus::Completed {
        return record;
    }
    let hit = collector.failure_rules().iter().find_map(|rule| rule.check(&record.output).map(str::to_string));
    match hit {
        Some(line) => ExecutionRecord::failed(FailureCause::ToolReportedFailure(line), record.output),
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoApi, FakeTransport, ShellCollector};
    use recon_core::{Capability, CollectorDescriptor, FailureRule, OutputStream, TargetKind};
    use std::sync::Arc;

    fn executor(fake: Arc<FakeTransport>) -> Executor {
        let creds = HashMap::from([("echo".to_string(), Credentials { api_key: "k3y".into() })]);
        Executor::new(ProcessRunner::new(Escalation::None, None), ApiRunner::new(fake), creds)
    }

    #[tokio::test]
    async fn failure_rule_overrides_completed() {
        let rule = FailureRule::new("no servers could be reached", OutputStream::Stdout).unwrap();
        let c = ShellCollector::new(
            CollectorDescriptor::new("dnshost", Capability::Domain),
            "echo ';; connection timed out; no servers could be reached'",
        )
        .with_rule(rule);
        let target = Target::domain("test.local");
        let req = c.materialize(&target).remove(0);
        let rec = executor(Arc::new(FakeTransport::default())).execute(&c, &target, &req).await;
        assert_eq!(rec.status, CommandStatus::Failed);
        assert!(matches!(rec.failure, Some(FailureCause::ToolReportedFailure(ref l)) if l.contains("no servers")));
        assert!(rec.output.stdout.contains("timed out"));
    }

    #[tokio::test]
    async fn credentials_are_attached_at_execution() {
        let fake = Arc::new(FakeTransport::new(vec![Ok(HttpResponse { status: 200, body: "{}".into() })]));
        let c = EchoApi::new(CollectorDescriptor::new("echo", Capability::Api(TargetKind::Domain)));
        let target = Target::domain("test.local");
        let req = c.materialize(&target).remove(0);
        assert!(!req.canonical().contains("k3y"));
        let rec = executor(fake.clone()).execute(&c, &target, &req).await;
        assert_eq!(rec.status, CommandStatus::Completed);
        let sent = fake.sent.lock().unwrap();
        assert_eq!(sent[0].params, [("apikey".to_string(), "k3y".to_string())]);
    }
}
