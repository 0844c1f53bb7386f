//! OS process execution with incremental capture, timeouts and privilege
//! escalation.

use recon_core::{CapturedOutput, FailureCause, Privilege};
use recon_ledger::ExecutionRecord;
use rand::{thread_rng, Rng};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How collectors requiring elevated privilege are run when the engine itself
/// is not root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escalation {
    /// Use `sudo -n` if it is installed, otherwise run the command as is and
    /// let the tool report its own failure.
    #[default]
    Auto,
    /// Always use `sudo -n`; without it elevated commands fail with
    /// `privilege-unavailable`.
    Sudo,
    /// Never escalate; elevated commands fail unless already root.
    None,
}

/// Grace period for reader tasks after the process is gone. Grandchildren
/// may keep the pipes open.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    escalation: Escalation,
    sudo: Option<PathBuf>,
    is_root: bool,
    delay_ms: Option<(u64, u64)>,
}

impl ProcessRunner {
    pub fn new(escalation: Escalation, sudo: Option<PathBuf>) -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let is_root = unsafe { libc::geteuid() } == 0;
        ProcessRunner { escalation, sudo, is_root, delay_ms: None }
    }

    /// Random pause in `[min, max]` milliseconds before each spawn.
    pub fn with_delay(mut self, min_ms: u64, max_ms: u64) -> Self {
        if max_ms > 0 {
            self.delay_ms = Some((min_ms.min(max_ms), max_ms));
        }
        self
    }

    fn resolve_argv(&self, argv: &[String], privilege: Privilege) -> Result<Vec<String>, FailureCause> {
        if privilege == Privilege::Normal || self.is_root {
            return Ok(argv.to_vec());
        }
        match (self.escalation, &self.sudo) {
            (Escalation::None, _) => Err(FailureCause::PrivilegeUnavailable(
                "not running as root and escalation is disabled".into(),
            )),
            (Escalation::Auto, None) => {
                debug!(program = ?argv.first(), "sudo not installed, running without escalation");
                Ok(argv.to_vec())
            }
            (Escalation::Sudo, None) => Err(FailureCause::PrivilegeUnavailable("sudo is not installed".into())),
            (_, Some(sudo)) => {
                let mut out = vec![sudo.to_string_lossy().into_owned(), "-n".into(), "--".into()];
                out.extend(argv.iter().cloned());
                Ok(out)
            }
        }
    }

    pub async fn run(&self, argv: &[String], timeout: Option<Duration>, privilege: Privilege) -> ExecutionRecord {
        let argv = match self.resolve_argv(argv, privilege) {
            Ok(a) => a,
            Err(cause) => return ExecutionRecord::failed(cause, CapturedOutput::default()),
        };
        let Some((program, args)) = argv.split_first() else {
            return ExecutionRecord::failed(FailureCause::SpawnFailed("empty argument vector".into()), CapturedOutput::default());
        };
        if let Some((min, max)) = self.delay_ms {
            let ms = thread_rng().gen_range(min..=max);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return ExecutionRecord::failed(FailureCause::SpawnFailed(format!("{program}: {e}")), CapturedOutput::default()),
        };
        debug!(pid = ?child.id(), program = %program, "spawned");

        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let readers = [
            child.stdout.take().map(|s| spawn_reader(s, stdout.clone())),
            child.stderr.take().map(|s| spawn_reader(s, stderr.clone())),
        ];

        let waited = match timeout {
            Some(t) => tokio::time::timeout(t, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };
        let status = match waited {
            Some(status) => Some(status),
            None => {
                kill_group(child.id());
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed out process");
                }
                None
            }
        };
        for reader in readers.into_iter().flatten() {
            let abort = reader.abort_handle();
            if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
                abort.abort();
            }
        }

        let mut output = CapturedOutput {
            stdout: take_text(&stdout),
            stderr: take_text(&stderr),
            exit_code: None,
            status_code: None,
        };
        let status = match status {
            Some(Ok(status)) => status,
            Some(Err(e)) => return ExecutionRecord::failed(FailureCause::ProcessKilled(e.to_string()), output),
            None => {
                return ExecutionRecord::failed(FailureCause::TimeoutExceeded(timeout.unwrap_or_default()), output);
            }
        };
        output.exit_code = status.code();
        if let Some(sig) = signal_of(&status) {
            return ExecutionRecord::failed(FailureCause::ProcessKilled(format!("terminated by signal {sig}")), output);
        }
        if program.ends_with("sudo") && output.exit_code == Some(1) && output.stderr.contains("a password is required") {
            return ExecutionRecord::failed(FailureCause::PrivilegeUnavailable("sudo requires a password".into()), output);
        }
        ExecutionRecord::completed(output)
    }
}

fn spawn_reader<R>(mut stream: R, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut out) = sink.lock() {
                        out.extend_from_slice(&buf[..n]);
                    }
                }
            }
        }
    })
}

fn take_text(buf: &Mutex<Vec<u8>>) -> String {
    match buf.lock() {
        Ok(mut b) => String::from_utf8_lossy(&std::mem::take(&mut *b)).into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: plain syscall on the process group created at spawn.
        unsafe {
            libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
