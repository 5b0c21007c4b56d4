//! Child process execution with a deadline, cancellation and bounded output.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

/// Poll interval while waiting on a child, bounding cancellation latency.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Shared cancellation flag; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a child did not run to completion.
#[derive(Debug)]
pub enum Interrupted {
    Cancelled,
    TimedOut,
    Spawn(io::Error),
    Wait(io::Error),
    Read(io::Error),
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command until it exits, `timeout` elapses, or `cancel` fires.
///
/// Output is read concurrently while the child runs so a chatty child cannot
/// deadlock on a full pipe. `output_limit_bytes` bounds what is kept per
/// stream; the rest is drained and counted.
pub fn run_command(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: Option<&CancelToken>,
) -> Result<CommandOutput, Interrupted> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if cancel.is_some_and(CancelToken::is_cancelled) {
        return Err(Interrupted::Cancelled);
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(Interrupted::Spawn(e));
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.wait_timeout(POLL_SLICE) {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(Interrupted::Wait(e)),
        }
        let reason = if cancel.is_some_and(CancelToken::is_cancelled) {
            Interrupted::Cancelled
        } else if Instant::now() >= deadline {
            Interrupted::TimedOut
        } else {
            continue;
        };
        warn!(?reason, "killing child process");
        let _ = child.kill();
        let _ = child.wait();
        // Readers are detached: a grandchild may still hold the pipes open.
        drop(stdout_handle);
        drop(stderr_handle);
        return Err(reason);
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle).map_err(Interrupted::Read)?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).map_err(Interrupted::Read)?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
    })
}

type Captured = io::Result<(Vec<u8>, usize)>;

fn join_reader(handle: thread::JoinHandle<Captured>) -> Captured {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(io::Error::other("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(reader: Option<R>, limit: usize) -> Captured {
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), 0));
    };
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(err = %e, "failed to read command output");
                return Err(e);
            }
        };
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let out = run_command(
            sh("echo out; echo err >&2; exit 3"),
            Duration::from_secs(10),
            1024,
            None,
        )
        .expect("run");
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stdout_text(), "out\n");
        assert_eq!(out.stderr_text(), "err\n");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command(sh("printf 0123456789"), Duration::from_secs(10), 4, None)
            .expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
    }

    #[test]
    fn times_out_long_running_child() {
        let err = run_command(sh("exec sleep 5"), Duration::from_millis(100), 1024, None)
            .expect_err("timeout");
        assert!(matches!(err, Interrupted::TimedOut));
    }

    #[test]
    fn cancellation_kills_child() {
        let token = CancelToken::new();
        let trigger = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });
        let started = Instant::now();
        let err = run_command(sh("exec sleep 5"), Duration::from_secs(30), 1024, Some(&token))
            .expect_err("cancelled");
        handle.join().expect("join");
        assert!(matches!(err, Interrupted::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn already_cancelled_token_skips_spawn() {
        let token = CancelToken::new();
        token.cancel();
        let err = run_command(sh("true"), Duration::from_secs(1), 1024, Some(&token))
            .expect_err("cancelled");
        assert!(matches!(err, Interrupted::Cancelled));
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[test]
    fn read_errors_are_reported() {
        let err = read_limited(Some(FailingReader), 16).expect_err("read error");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn missing_stream_reads_as_empty() {
        let (buf, truncated) = read_limited(None::<FailingReader>, 16).expect("no stream");
        assert!(buf.is_empty());
        assert_eq!(truncated, 0);
    }
}
