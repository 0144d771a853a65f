//! Process execution capability.

use jfs_mcp::ToolError;
use std::{future::Future, io, process::Stdio, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinSet,
};

/// How long pipe readers may keep draining after a deadline kill.
const KILL_GRACE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: io::Error,
    },
    #[error("failed to collect output of {program}: {source}")]
    Io {
        program: String,
        source: io::Error,
    },
    #[error("{program} exited with {}", exit_description(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        output: String,
    },
    /// The executor's own deadline fired and the child was killed.
    #[error("{program} killed after {deadline:?}")]
    DeadlineExceeded {
        program: String,
        deadline: Duration,
        output: String,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_owned(),
    }
}

impl ExecError {
    /// Output captured before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Failed { output, .. } | Self::DeadlineExceeded { output, .. } => Some(output),
            Self::Spawn { .. } | Self::Io { .. } => None,
        }
    }
}

impl From<ExecError> for ToolError {
    fn from(e: ExecError) -> Self {
        match e.output().map(str::trim_end).filter(|o| !o.is_empty()) {
            Some(output) => ToolError::Process(format!("{e}\n{output}")),
            None => ToolError::Process(e.to_string()),
        }
    }
}

/// Runs external programs and returns their combined output.
pub trait Executor: Send + Sync + 'static {
    /// Run `program` to completion, or until `deadline` elapses.
    ///
    /// The returned text is stdout followed by stderr. A non-zero exit is
    /// [`ExecError::Failed`]; a deadline kill is
    /// [`ExecError::DeadlineExceeded`] carrying whatever was read.
    fn run(
        &self,
        program: &str,
        args: &[&str],
        deadline: Option<Duration>,
    ) -> impl Future<Output = Result<String, ExecError>> + Send;
}

/// [`Executor`] backed by real child processes.
///
/// Dropping a pending `run` kills the child and aborts its pipe readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

type PipeRead = (usize, io::Result<Vec<u8>>);

async fn read_pipe<R: AsyncRead + Unpin>(index: usize, mut pipe: R) -> PipeRead {
    let mut buf = Vec::new();
    let read = pipe.read_to_end(&mut buf).await.map(|_| buf);
    (index, read)
}

async fn collect(readers: &mut JoinSet<PipeRead>, program: &str) -> Result<String, ExecError> {
    let mut streams = [Vec::new(), Vec::new()];
    while let Some(joined) = readers.join_next().await {
        let io_error = |source| ExecError::Io {
            program: program.to_owned(),
            source,
        };
        let (index, read) = joined.map_err(|e| io_error(io::Error::other(e)))?;
        streams[index] = read.map_err(io_error)?;
    }
    Ok(String::from_utf8_lossy(&streams.concat()).into_owned())
}

impl Executor for ProcessExecutor {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        deadline: Option<Duration>,
    ) -> Result<String, ExecError> {
        tracing::debug!(program, ?args, ?deadline, "exec");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_owned(),
                source,
            })?;

        let mut readers = JoinSet::new();
        if let Some(stdout) = child.stdout.take() {
            readers.spawn(read_pipe(0, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.spawn(read_pipe(1, stderr));
        }

        let waited = match deadline {
            Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
            None => Some(child.wait().await),
        };

        let Some(status) = waited else {
            let limit = deadline.unwrap_or_default();
            if let Err(e) = child.kill().await {
                tracing::warn!(program, error = %e, "kill after deadline");
            }
            let output = match tokio::time::timeout(KILL_GRACE, collect(&mut readers, program)).await {
                Ok(output) => output?,
                Err(_) => {
                    // a grandchild still holds the pipes open
                    readers.abort_all();
                    String::new()
                }
            };
            tracing::debug!(program, deadline = ?limit, bytes = output.len(), "killed at deadline");
            return Err(ExecError::DeadlineExceeded {
                program: program.to_owned(),
                deadline: limit,
                output,
            });
        };

        let status = status.map_err(|source| ExecError::Io {
            program: program.to_owned(),
            source,
        })?;
        let output = collect(&mut readers, program).await?;
        if status.success() {
            Ok(output)
        } else {
            Err(ExecError::Failed {
                program: program.to_owned(),
                code: status.code(),
                output,
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::exec::{ExecError, Executor, ProcessExecutor};
    use jfs_mcp::ToolError;
    use std::time::Duration;

    #[tokio::test]
    async fn combines_stdout_and_stderr() {
        let out = ProcessExecutor
            .run("sh", &["-c", "echo out; echo err >&2"], None)
            .await
            .unwrap();
        assert_eq!(out, "out\nerr\n");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failure_with_output() {
        let err = ProcessExecutor
            .run("sh", &["-c", "echo partial; exit 3"], None)
            .await
            .unwrap_err();
        match &err {
            ExecError::Failed { code, output, .. } => {
                assert_eq!(*code, Some(3));
                assert_eq!(output, "partial\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let tool_error = ToolError::from(err);
        assert!(matches!(tool_error, ToolError::Process(ref m) if m.contains("status 3") && m.contains("partial")));
    }

    #[tokio::test]
    async fn deadline_kill_keeps_partial_output() {
        let err = ProcessExecutor
            .run(
                "sh",
                &["-c", "echo started; exec sleep 10"],
                Some(Duration::from_millis(300)),
            )
            .await
            .unwrap_err();
        match err {
            ExecError::DeadlineExceeded { output, deadline, .. } => {
                assert_eq!(output, "started\n");
                assert_eq!(deadline, Duration::from_millis(300));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// `None` once the process is gone or only a zombie awaiting reaping.
    fn process_state(pid: &str) -> Option<String> {
        let out = std::process::Command::new("ps")
            .args(["-o", "stat=", "-p", pid])
            .output()
            .unwrap();
        let stat = String::from_utf8_lossy(&out.stdout).trim().to_owned();
        (!stat.is_empty() && !stat.starts_with('Z')).then_some(stat)
    }

    #[tokio::test]
    async fn dropping_the_call_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
        let cancelled = tokio::time::timeout(
            Duration::from_secs(1),
            ProcessExecutor.run("sh", &["-c", &script], None),
        )
        .await;
        assert!(cancelled.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_owned();
        let mut state = process_state(&pid);
        for _ in 0..40 {
            if state.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            state = process_state(&pid);
        }
        assert_eq!(state, None, "sleep {pid} outlived the cancelled call");
    }

    #[tokio::test]
    async fn finishing_before_deadline_is_success() {
        let out = ProcessExecutor
            .run("sh", &["-c", "echo quick"], Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(out, "quick\n");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let err = ProcessExecutor
            .run("/nonexistent/juicefs", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
        assert!(err.output().is_none());
    }
}
