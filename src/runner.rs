//! Execution of the external deployment tool.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::runtime::{Builder, Runtime};
pub use tokio_util::sync::CancellationToken;

use crate::error::ProvisionError;

/// A single invocation of an external program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub dir: PathBuf,
    /// Written to the child's stdin, which is closed afterwards.
    pub stdin: Option<String>,
}

impl CommandRequest {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I, dir: &Path) -> CommandRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandRequest {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: dir.to_path_buf(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> CommandRequest {
        self.stdin = Some(input.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Stdout followed by stderr.
    pub combined: String,
}

pub trait CommandRunner {
    /// Locates `program` on the search path.
    fn resolve(&self, program: &str) -> Option<PathBuf>;

    /// Runs the request to completion. A non-zero exit is reported through
    /// [`CommandOutput::success`], not as an error.
    fn run(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ProvisionError>;
}

/// Runs real processes. The child is killed when `cancel` fires.
pub struct SystemRunner {
    search_path: Option<OsString>,
    rt: Runtime,
}

impl SystemRunner {
    pub fn new() -> Result<SystemRunner, ProvisionError> {
        Ok(SystemRunner {
            search_path: None,
            rt: Builder::new_current_thread().enable_all().build()?,
        })
    }

    /// Resolves programs in `search_path` instead of `PATH`.
    pub fn with_search_path(search_path: impl Into<OsString>) -> Result<SystemRunner, ProvisionError> {
        Ok(SystemRunner {
            search_path: Some(search_path.into()),
            ..SystemRunner::new()?
        })
    }

    async fn execute(
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ProvisionError> {
        let program = request.program.display().to_string();

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.dir)
            .stdin(match request.stdin {
                Some(_) => Stdio::piped(),
                None => Stdio::null(),
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ProvisionError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let run = async {
            let (fed, output) = tokio::join!(
                feed_stdin(stdin, request.stdin.as_deref()),
                child.wait_with_output()
            );
            if let Err(err) = fed {
                debug!("Writing stdin of '{}' failed: {}", program, err);
            }

            let output = output?;
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            debug!("'{}' exited with {}", program, output.status);

            Ok::<_, ProvisionError>(CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                combined,
            })
        };

        tokio::select! {
            result = run => result,
            _ = cancel.cancelled() => {
                debug!("Cancelled '{}', killing child", program);
                Err(ProvisionError::Cancelled)
            }
        }
    }
}

/// Writes `input` and closes the pipe. A child that exits without reading
/// its stdin is not an error, its exit status tells what happened.
async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&str>) -> io::Result<()> {
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return Ok(());
    };

    let written = match stdin.write_all(input.as_bytes()).await {
        Ok(()) => stdin.shutdown().await,
        Err(err) => Err(err),
    };

    match written {
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        written => written,
    }
}

impl CommandRunner for SystemRunner {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        let resolved = match &self.search_path {
            Some(search_path) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(program, Some(search_path), cwd)
            }
            None => which::which(program),
        };

        resolved.ok()
    }

    fn run(
        &self,
        request: &CommandRequest,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ProvisionError> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }

        debug!(
            "Running '{} {}' in '{}'",
            request.program.display(),
            request.args.join(" "),
            request.dir.display()
        );

        self.rt.block_on(SystemRunner::execute(request, cancel))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    fn sh(script: &str) -> CommandRequest {
        CommandRequest::new("/bin/sh", ["-c", script], &std::env::temp_dir())
    }

    #[test]
    fn run_captures_combined_output() {
        let runner = SystemRunner::new().unwrap();

        let output = runner
            .run(&sh("echo out; echo err >&2"), &CancellationToken::new())
            .unwrap();

        assert!(output.success);
        assert_eq!(output.code, Some(0));
        assert_eq!(output.combined, "out\nerr\n");
    }

    #[test]
    fn run_reports_failure_exit() {
        let runner = SystemRunner::new().unwrap();

        let output = runner
            .run(&sh("echo boom; exit 3"), &CancellationToken::new())
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.combined, "boom\n");
    }

    #[test]
    fn run_pipes_stdin() {
        let runner = SystemRunner::new().unwrap();

        let output = runner
            .run(&sh("cat").with_stdin("s3cr3t"), &CancellationToken::new())
            .unwrap();

        assert_eq!(output.combined, "s3cr3t");
    }

    #[test]
    fn run_uses_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new().unwrap();
        let request = CommandRequest::new("/bin/sh", ["-c", "touch marker"], dir.path());

        runner.run(&request, &CancellationToken::new()).unwrap();

        assert!(dir.path().join("marker").is_file());
    }

    #[test]
    fn run_cancelled_before_launch() {
        let runner = SystemRunner::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            runner.run(&sh("echo never"), &cancel),
            Err(ProvisionError::Cancelled)
        ));
    }

    #[test]
    fn run_cancellation_kills_child() {
        let runner = SystemRunner::new().unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            trigger.cancel();
        });

        let started = Instant::now();
        let result = runner.run(&sh("sleep 30"), &cancel);

        assert!(matches!(result, Err(ProvisionError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn run_keeps_output_when_child_ignores_stdin() {
        let runner = SystemRunner::new().unwrap();
        let payload = "x".repeat(1024 * 1024);

        let output = runner
            .run(
                &sh("echo 'not logged in'; exit 1").with_stdin(payload),
                &CancellationToken::new(),
            )
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.code, Some(1));
        assert_eq!(output.combined, "not logged in\n");
    }

    #[test]
    fn run_cancellation_kills_child_blocked_on_stdin() {
        let runner = SystemRunner::new().unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });

        let started = Instant::now();
        let request = sh("sleep 20").with_stdin("x".repeat(1024 * 1024));
        let result = runner.run(&request, &cancel);

        assert!(matches!(result, Err(ProvisionError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn run_missing_program() {
        let runner = SystemRunner::new().unwrap();
        let request = CommandRequest::new(
            "/definitely/not/here",
            Vec::<String>::new(),
            &std::env::temp_dir(),
        );

        assert!(matches!(
            runner.run(&request, &CancellationToken::new()),
            Err(ProvisionError::Spawn { .. })
        ));
    }

    #[test]
    fn resolve_in_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::with_search_path(dir.path().as_os_str()).unwrap();

        assert_eq!(runner.resolve("sh"), None);
        assert!(SystemRunner::new().unwrap().resolve("sh").is_some());
    }
}
