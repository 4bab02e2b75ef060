// src/process.rs - Subprocess execution bounded by the analysis deadline
use crate::error::{AnalysisError, Result};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cap on captured stdout/stderr per stream (16 MiB).
const MAX_OUTPUT_BYTES: u64 = 16 * 1024 * 1024;

/// Wall-clock budget shared by every step of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
    limit: Duration,
}

impl Deadline {
    /// Expires `limit` from now. A zero limit never expires.
    pub fn after(limit: Duration) -> Self {
        Self {
            at: (!limit.is_zero()).then(|| Instant::now() + limit),
            limit,
        }
    }

    pub fn unbounded() -> Self {
        Self::after(Duration::ZERO)
    }

    pub fn is_expired(&self) -> bool {
        self.at.map_or(false, |at| Instant::now() >= at)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_expired() {
            Err(self.timeout_error())
        } else {
            Ok(())
        }
    }

    pub fn timeout_error(&self) -> AnalysisError {
        AnalysisError::Timeout(self.limit.as_secs())
    }
}

pub fn is_timeout(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::TimedOut
}

/// Runs `command` to completion, feeding `input` on stdin and capturing
/// stdout/stderr.
///
/// Once `deadline` passes the child is killed and reaped, and the call fails
/// with `io::ErrorKind::TimedOut`. The child is always waited on, including
/// when it exits without reading its input.
pub fn run(
    command: &mut Command,
    input: Option<Vec<u8>>,
    deadline: Deadline,
) -> io::Result<Output> {
    if deadline.is_expired() {
        return Err(timed_out(&deadline));
    }

    let stdin = if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = command
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Best-effort write; a child that exits early closes the pipe on us.
    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), input) {
        thread::spawn(move || {
            let _ = pipe.write_all(&bytes);
        });
    }
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = wait(&mut child, &deadline)?;

    Ok(Output {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
    })
}

fn wait(child: &mut Child, deadline: &Deadline) -> io::Result<ExitStatus> {
    if deadline.at.is_none() {
        return child.wait();
    }

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if deadline.is_expired() {
            // kill fails only if the child already exited; wait reaps either way
            let _ = child.kill();
            child.wait()?;
            return Err(timed_out(deadline));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn timed_out(deadline: &Deadline) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("exceeded {:?} limit", deadline.limit),
    )
}

fn drain<R: Read + Send + 'static>(stream: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
