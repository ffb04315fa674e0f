//! Command execution gateway.
//!
//! The only place in the crate that spawns external programs. Every call
//! spawns exactly one child, captures its output, enforces a timeout and
//! reaps the child before returning, killing it first when the timeout fires.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::ExecutionError;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Seam between the engine and the operating system.
///
/// Implemented by [`SystemCommandRunner`] in production and by scripted
/// fakes in tests.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecutionError>>;
}

/// Runs commands as real child processes via tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, ExecutionError>> {
        Box::pin(run_command(program, args, timeout))
    }
}

/// Run `program` with `args`, never waiting longer than `limit`.
///
/// A non-zero exit with empty stdout is a failure. A non-zero exit that
/// still produced stdout is returned as success, since many OS tools emit
/// partial output alongside a warning status.
pub async fn run_command(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<CommandOutput, ExecutionError> {
    log::trace!("exec {} {:?}", program, args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::SpawnFailed {
            program: program.to_string(),
            source,
        })?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let collect = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (out_res, err_res, status) = tokio::join!(
            read_pipe(stdout_pipe.as_mut(), &mut stdout),
            read_pipe(stderr_pipe.as_mut(), &mut stderr),
            child.wait(),
        );
        out_res?;
        err_res?;
        Ok::<_, std::io::Error>((stdout, stderr, status?))
    };

    let outcome = tokio::time::timeout(limit, collect).await;

    let (stdout, stderr, status) = match outcome {
        Ok(Ok(captured)) => captured,
        Ok(Err(source)) => {
            reap(&mut child, program).await;
            return Err(ExecutionError::Io {
                program: program.to_string(),
                source,
            });
        }
        Err(_) => {
            reap(&mut child, program).await;
            return Err(ExecutionError::TimedOut {
                program: program.to_string(),
                timeout: limit,
            });
        }
    };

    let stdout = decode(program, stdout);
    let stderr = decode(program, stderr);

    if !status.success() {
        if stdout.trim().is_empty() {
            return Err(ExecutionError::Failed {
                program: program.to_string(),
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        log::debug!(
            "{} exited with {:?} but produced output; keeping it",
            program,
            status.code()
        );
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: status.code(),
    })
}

async fn read_pipe<R>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read_to_end(buf).await.map(|_| ()),
        None => Ok(()),
    }
}

/// Kill (if still running) and wait for the child so no zombie is left.
async fn reap(child: &mut tokio::process::Child, program: &str) {
    if let Err(e) = child.kill().await {
        log::warn!("failed to kill {}: {}", program, e);
    }
}

fn decode(program: &str, bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            log::warn!(
                "{}",
                ExecutionError::NonUtf8Truncated {
                    program: program.to_string()
                }
            );
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}
