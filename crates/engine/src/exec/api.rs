//! HTTP execution for API collectors.

use async_trait::async_trait;
use rand::{thread_rng, Rng};
use recon_core::{ApiFailure, ApiRequest, CapturedOutput, FailureCause, Target};
use recon_ledger::ExecutionRecord;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below HTTP: DNS, connect, TLS, reset, client timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout_ms: u64,
    pub user_agent: String,
    pub proxy: Option<String>,
    /// Retries on transport errors only. Status codes are never retried.
    pub transport_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        HttpOptions {
            timeout_ms: 30_000,
            user_agent: concat!("recon/", env!("CARGO_PKG_VERSION")).to_string(),
            proxy: None,
            transport_retries: 0,
            retry_delay_ms: 500,
        }
    }
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(opts: &HttpOptions) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_millis(opts.timeout_ms))
            .user_agent(opts.user_agent.clone())
            .brotli(true)
            .gzip(true)
            .deflate(true);
        if let Some(proxy) = &opts.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(ReqwestTransport { client: builder.build()? })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError> {
        let mut req = self.client.get(&request.url).query(&request.params);
        for (k, v) in &request.headers {
            req = req.header(k, v);
        }
        let resp = req.send().await.map_err(|e| TransportError(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Raw response bodies on disk, one file per collector and target.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn path_for(&self, collector: &str, target: &Target) -> PathBuf {
        let key: String = target
            .key()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.root.join(collector).join(format!("{key}.json"))
    }

    pub fn write(&self, collector: &str, target: &Target, body: &str) -> std::io::Result<PathBuf> {
        let path = self.path_for(collector, target);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, body)?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

pub struct ApiRunner {
    transport: Arc<dyn HttpTransport>,
    retries: u32,
    retry_delay: Duration,
    artifacts: Option<ArtifactStore>,
}

impl ApiRunner {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        ApiRunner { transport, retries: 0, retry_delay: Duration::ZERO, artifacts: None }
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_artifacts(mut self, store: ArtifactStore) -> Self {
        self.artifacts = Some(store);
        self
    }

    pub async fn run(&self, collector: &str, target: &Target, request: &ApiRequest, timeout: Option<Duration>) -> ExecutionRecord {
        let response = match timeout {
            Some(t) => match tokio::time::timeout(t, self.send_with_retries(request)).await {
                Ok(r) => r,
                Err(_) => {
                    return ExecutionRecord::failed(FailureCause::TimeoutExceeded(t), CapturedOutput::default())
                }
            },
            None => self.send_with_retries(request).await,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => return ExecutionRecord::failed(FailureCause::Transport(e.0), CapturedOutput::default()),
        };
        let output = CapturedOutput {
            stdout: response.body,
            stderr: String::new(),
            exit_code: None,
            status_code: Some(response.status),
        };
        if let Some(failure) = ApiFailure::from_status(response.status) {
            return ExecutionRecord::failed(FailureCause::ApiRequestFailed { failure, status: response.status }, output);
        }
        if let Some(store) = &self.artifacts {
            match store.write(collector, target, &output.stdout) {
                Ok(path) => debug!(collector, path = %path.display(), "stored response"),
                Err(e) => warn!(collector, error = %e, "failed to store response artifact"),
            }
        }
        ExecutionRecord::completed(output)
    }

    async fn send_with_retries(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError> {
        let mut attempts = 0;
        loop {
            match self.transport.get(request).await {
                Ok(r) => return Ok(r),
                Err(e) if attempts < self.retries => {
                    attempts += 1;
                    let base = self.retry_delay.as_millis() as u64;
                    let exp = base.saturating_mul(1u64 << attempts.min(6));
                    let jitter = thread_rng().gen_range(0..(exp / 4 + 1));
                    debug!(attempt = attempts, error = %e, "transport error, retrying");
                    tokio::time::sleep(Duration::from_millis(exp + jitter)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use recon_core::CommandStatus;

    fn ok(status: u16, body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse { status, body: body.into() })
    }

    fn domain() -> Target {
        Target::domain("test.local")
    }

    #[tokio::test]
    async fn status_codes_map_to_failures() {
        for (status, failure) in [
            (204, ApiFailure::RateLimitExceeded),
            (400, ApiFailure::MalformedRequest),
            (403, ApiFailure::InsufficientPrivilege),
            (404, ApiFailure::NotFound),
            (502, ApiFailure::GenericFailure),
        ] {
            let fake = Arc::new(FakeTransport::new(vec![ok(status, "")]));
            let runner = ApiRunner::new(fake.clone()).with_retries(3, Duration::ZERO);
            let rec = runner.run("virustotal", &domain(), &ApiRequest::get("https://api.test"), None).await;
            assert_eq!(rec.status, CommandStatus::Failed);
            assert_eq!(rec.failure, Some(FailureCause::ApiRequestFailed { failure, status }));
            assert_eq!(rec.output.status_code, Some(status));
            assert_eq!(fake.calls(), 1, "status {status} must not be retried");
        }
    }

    #[tokio::test]
    async fn ok_body_is_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"subdomains":["www.test.local","mail.test.local"],"n":1.5}"#;
        let fake = Arc::new(FakeTransport::new(vec![ok(200, body)]));
        let store = ArtifactStore::new(dir.path());
        let runner = ApiRunner::new(fake).with_artifacts(store.clone());
        let rec = runner.run("virustotal", &domain(), &ApiRequest::get("https://api.test"), None).await;
        assert_eq!(rec.status, CommandStatus::Completed);
        assert_eq!(rec.output.stdout, body);
        let on_disk = std::fs::read_to_string(store.path_for("virustotal", &domain())).unwrap();
        assert_eq!(on_disk, body);
        assert!(store.path_for("virustotal", &domain()).ends_with("virustotal/domain_test.local.json"));
    }

    #[tokio::test]
    async fn transport_errors_are_retried_then_fail() {
        let fake = Arc::new(FakeTransport::new(vec![
            Err(TransportError("connection reset".into())),
            Err(TransportError("connection reset".into())),
            ok(200, "{}"),
        ]));
        let runner = ApiRunner::new(fake.clone()).with_retries(2, Duration::from_millis(1));
        let rec = runner.run("crtshdomain", &domain(), &ApiRequest::get("https://crt.sh"), None).await;
        assert_eq!(rec.status, CommandStatus::Completed);
        assert_eq!(fake.calls(), 3);

        let fake = Arc::new(FakeTransport::new(vec![Err(TransportError("dns".into()))]));
        let runner = ApiRunner::new(fake.clone());
        let rec = runner.run("crtshdomain", &domain(), &ApiRequest::get("https://crt.sh"), None).await;
        assert_eq!(rec.failure, Some(FailureCause::Transport("dns".into())));
        assert_eq!(fake.calls(), 1);
    }
}
