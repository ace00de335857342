//! Shell command execution.
//!
//! Commands run through the platform shell with stdin closed. Output is
//! collected on reader threads while the parent polls the child, so a
//! timeout or a tripped [`CancellationToken`] can kill it mid-flight.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::{Result, RolloutError};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of executing a shell command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,
}

impl CommandResult {
    /// Create a success result.
    pub fn success(stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code: Some(0),
            stdout,
            stderr,
            duration,
            success: true,
        }
    }

    /// Create a failure result.
    pub fn failure(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
            success: false,
        }
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn last_output_line(&self) -> Option<&str> {
        fn last(text: &str) -> Option<&str> {
            text.lines()
                .rev()
                .map(str::trim)
                .find(|line| !line.is_empty())
        }
        last(&self.stderr).or_else(|| last(&self.stdout))
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with system env).
    pub env: HashMap<String, String>,

    /// Capture stdout (if false, inherits from parent).
    pub capture_stdout: bool,

    /// Capture stderr (if false, inherits from parent).
    pub capture_stderr: bool,

    /// Kill the command after this long.
    pub timeout: Option<Duration>,

    /// Kill the command when this token trips.
    pub cancel: Option<CancellationToken>,
}

impl CommandOptions {
    /// Options that capture both streams.
    pub fn captured() -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            ..Default::default()
        }
    }
}

/// Execute a shell command.
///
/// A non-zero exit is reported through [`CommandResult::success`], not as an
/// error. Errors are reserved for spawn failures, a command's own timeout
/// ([`RolloutError::CommandTimedOut`]) and run cancellation.
pub fn execute(command: &str, options: &CommandOptions) -> Result<CommandResult> {
    let start = Instant::now();

    let mut cmd = Command::new(shell_program());
    cmd.arg(shell_flag());
    cmd.arg(command);
    cmd.stdin(Stdio::null());

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    cmd.stdout(if options.capture_stdout {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    cmd.stderr(if options.capture_stderr {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });

    let mut child = cmd.spawn().map_err(|e| {
        debug!("Failed to spawn '{}': {}", command, e);
        RolloutError::CommandFailed {
            command: command.to_string(),
            code: None,
        }
    })?;

    let stdout_handle = child.stdout.take().map(spawn_reader);
    let stderr_handle = child.stderr.take().map(spawn_reader);

    // On kill the readers are detached: a grandchild may still hold the pipes.
    let status = wait_with_limits(&mut child, command, options, start)?;

    let stdout = join_reader(stdout_handle);
    let stderr = join_reader(stderr_handle);
    let duration = start.elapsed();

    if status.success() {
        Ok(CommandResult::success(stdout, stderr, duration))
    } else {
        Ok(CommandResult::failure(
            status.code(),
            stdout,
            stderr,
            duration,
        ))
    }
}

fn wait_with_limits(
    child: &mut Child,
    command: &str,
    options: &CommandOptions,
    start: Instant,
) -> Result<std::process::ExitStatus> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        let cancelled = options.cancel.as_ref().is_some_and(|c| c.is_cancelled());
        let timed_out = options.timeout.is_some_and(|t| start.elapsed() >= t);

        if cancelled || timed_out {
            let _ = child.kill();
            let _ = child.wait();
            if cancelled {
                return Err(RolloutError::Cancelled {
                    reason: format!("command interrupted: {}", command),
                });
            }
            return Err(RolloutError::CommandTimedOut {
                command: command.to_string(),
                timeout_secs: options.timeout.unwrap_or_default().as_secs(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

fn shell_program() -> &'static str {
    if cfg!(target_os = "windows") {
        "cmd.exe"
    } else {
        "/bin/sh"
    }
}

fn shell_flag() -> &'static str {
    if cfg!(target_os = "windows") {
        "/C"
    } else {
        "-c"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_successful_command() {
        let result = execute("echo hello", &CommandOptions::captured()).unwrap();

        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
    }

    #[test]
    fn execute_failing_command() {
        let result = execute("exit 3", &CommandOptions::captured()).unwrap();

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    fn execute_with_env() {
        let mut options = CommandOptions::captured();
        options
            .env
            .insert("MY_VAR".to_string(), "my_value".to_string());

        let cmd = if cfg!(target_os = "windows") {
            "echo %MY_VAR%"
        } else {
            "echo $MY_VAR"
        };

        let result = execute(cmd, &options).unwrap();

        assert!(result.success);
        assert!(result.stdout.contains("my_value"));
    }

    #[test]
    fn execute_with_cwd() {
        let temp = tempfile::TempDir::new().unwrap();
        let options = CommandOptions {
            cwd: Some(temp.path().to_path_buf()),
            ..CommandOptions::captured()
        };

        let cmd = if cfg!(target_os = "windows") {
            "cd"
        } else {
            "pwd"
        };

        let result = execute(cmd, &options).unwrap();

        assert!(result.success);
        let name = temp.path().file_name().unwrap().to_string_lossy();
        assert!(result.stdout.contains(name.as_ref()));
    }

    #[test]
    fn last_output_line_prefers_stderr() {
        let result = CommandResult::failure(
            Some(1),
            "out\n".into(),
            "first\nsecond\n\n".into(),
            Duration::ZERO,
        );
        assert_eq!(result.last_output_line(), Some("second"));
    }

    #[test]
    fn last_output_line_falls_back_to_stdout() {
        let result = CommandResult::failure(
            Some(1),
            "applying\n  done  \n".into(),
            " \n".into(),
            Duration::ZERO,
        );
        assert_eq!(result.last_output_line(), Some("done"));

        let silent = CommandResult::success(String::new(), String::new(), Duration::ZERO);
        assert_eq!(silent.last_output_line(), None);
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_long_command() {
        let options = CommandOptions {
            timeout: Some(Duration::from_millis(100)),
            ..CommandOptions::captured()
        };

        let started = Instant::now();
        let err = execute("sleep 5", &options).unwrap_err();

        assert!(matches!(err, RolloutError::CommandTimedOut { ref command, .. } if command == "sleep 5"));
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn cancelled_token_kills_command() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = CommandOptions {
            cancel: Some(cancel),
            ..CommandOptions::captured()
        };

        let err = execute("sleep 5", &options).unwrap_err();
        assert!(matches!(err, RolloutError::Cancelled { .. }));
        assert!(err.to_string().contains("interrupted"));
    }
}
