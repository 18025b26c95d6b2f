use crate::backup::result_error::result::Result;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

static POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a child process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Exited(ExitStatus),
    TimedOut,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub completion: Completion,
    /// Stdout and stderr, interleaved in the order they were written
    pub output: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        matches!(self.completion, Completion::Exited(status) if status.success())
    }

    /// Output on a single line, for embedding into error messages.
    pub fn flattened_output(&self) -> String {
        String::from_utf8_lossy(&self.output)
            .replace('\n', " ")
            .trim_end()
            .to_owned()
    }
}

/// Runs `command` to completion, killing it once `timeout` has elapsed.
///
/// Both output streams go to the same anonymous temp file so their relative
/// order is kept without juggling two pipes.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let mut capture = tempfile::tempfile()?;
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::from(capture.try_clone()?))
        .stderr(Stdio::from(capture.try_clone()?))
        .spawn()?;

    let started = Instant::now();
    let completion = loop {
        if let Some(status) = child.try_wait()? {
            break Completion::Exited(status);
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            tracing::warn!(
                "Process {} exceeded timeout of {:?}, killing it",
                child.id(),
                timeout
            );
            if let Err(e) = child.kill() {
                tracing::warn!("Killing process {} failed: {}", child.id(), e);
            }
            child.wait()?;
            break Completion::TimedOut;
        }

        std::thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    };

    let mut output = Vec::new();
    capture.seek(SeekFrom::Start(0))?;
    capture.read_to_end(&mut output)?;

    Ok(CommandOutput { completion, output })
}
