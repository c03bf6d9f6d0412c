//! Bounded graceful termination of a server child.
//!
//! SIGTERM is re-sent on every retry because the first one may be dropped
//! while the server is still installing its handlers. Once the stop timeout
//! runs out the child is killed.

use tokio::process::Child;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

use super::{ProcessPolicy, StopOutcome};

/// Result of asking the child to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitRequest {
    Sent,
    /// The process is already gone
    Gone,
    Unsupported,
}

#[cfg(unix)]
fn request_exit(pid: u32) -> ExitRequest {
    let Ok(raw) = i32::try_from(pid) else {
        return ExitRequest::Unsupported;
    };
    match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => ExitRequest::Sent,
        Err(Errno::ESRCH) => ExitRequest::Gone,
        Err(e) => {
            warn!("Failed to send SIGTERM to pid {pid}: {e}");
            ExitRequest::Sent
        }
    }
}

#[cfg(not(unix))]
fn request_exit(_pid: u32) -> ExitRequest {
    ExitRequest::Unsupported
}

pub(super) async fn terminate(child: &mut Child, pid: u32, policy: &ProcessPolicy) -> StopOutcome {
    let deadline = Instant::now() + policy.stop_timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Server pid {pid} exited with {status}");
                return StopOutcome::Clean;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to poll server pid {pid}: {e}");
                break;
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match request_exit(pid) {
            ExitRequest::Sent | ExitRequest::Gone => {}
            ExitRequest::Unsupported => break,
        }

        if let Ok(Ok(status)) = timeout(policy.stop_retry.min(remaining), child.wait()).await {
            debug!("Server pid {pid} exited with {status}");
            return StopOutcome::Clean;
        }
    }

    warn!("Server pid {pid} did not exit in time, killing it");
    if let Err(e) = child.kill().await {
        warn!("Failed to kill server pid {pid}: {e}");
    }
    StopOutcome::Forced
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    fn short_policy() -> ProcessPolicy {
        ProcessPolicy {
            start_grace: Duration::from_millis(100),
            stop_retry: Duration::from_millis(50),
            stop_timeout: Duration::from_millis(600),
        }
    }

    fn sh(script: &str) -> Child {
        Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_terminate_cooperative_child_is_clean() {
        let mut child = sh("exec sleep 30");
        let pid = child.id().unwrap();
        let outcome = terminate(&mut child, pid, &short_policy()).await;
        assert_eq!(outcome, StopOutcome::Clean);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminate_ignoring_child_is_forced() {
        let mut child = sh("trap '' TERM; while true; do sleep 1; done");
        let pid = child.id().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = terminate(&mut child, pid, &short_policy()).await;
        assert_eq!(outcome, StopOutcome::Forced);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminate_already_exited_child_is_clean() {
        let mut child = sh("exit 0");
        let pid = child.id().unwrap();
        child.wait().await.unwrap();
        let outcome = terminate(&mut child, pid, &short_policy()).await;
        assert_eq!(outcome, StopOutcome::Clean);
    }
}
