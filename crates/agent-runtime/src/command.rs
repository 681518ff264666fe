//! Time-bounded execution of external programs.

use crate::{Error, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared between a signal handler and the
/// code it should stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured result of a finished program.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status of the program.
    pub status: ExitStatus,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the program exited with status zero.
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Runs external programs with a hard time limit.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    cancel: CancelToken,
}

impl CommandRunner {
    /// Create a runner that kills programs running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancelToken::new(),
        }
    }

    /// Kill running programs as soon as `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The time limit applied to every program.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program` with `args` and capture its output.
    pub fn run<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        for arg in args {
            command.arg(AsRef::<str>::as_ref(arg));
        }
        self.run_command(program, command)
    }

    /// Run `program` on a script file.
    pub fn run_script(&self, program: &str, script: &Path) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        command.arg(script);
        self.run_command(program, command)
    }

    /// Run a prepared command.
    pub fn run_command(&self, program: &str, mut command: Command) -> Result<CommandOutput> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                program: program.to_string(),
            });
        }
        log::debug!("Executing: {command:?}");

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(program, &mut child)?;

        Ok(CommandOutput {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    fn wait(&self, program: &str, child: &mut Child) -> Result<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.cancel.is_cancelled() {
                kill(child);
                return Err(Error::Cancelled {
                    program: program.to_string(),
                });
            }
            if start.elapsed() > self.timeout {
                kill(child);
                return Err(Error::Timeout {
                    program: program.to_string(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Read a pipe to completion on its own thread so a chatty child never
/// blocks on a full pipe while we poll it.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
