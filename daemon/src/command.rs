/// Host command port.
///
/// Everything that shells out (the `netsh` hotspot commands, the privilege
/// probe, the media player) goes through [`CommandRunner`] so the logic built
/// on top can be exercised against canned outputs instead of a real OS.
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};

/// A command to execute: program, arguments and an optional wall-clock bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Renders the command line for log messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr joined; `netsh` reports failures on either stream.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to launch `{program}`: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("`{program}` did not finish within {}s", .after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("I/O error while running `{program}`: {source}")]
    Io { program: String, source: io::Error },
}

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub code: Option<i32>,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Handle to a long-running child process.
///
/// `wait` must be cancel-safe: the supervisor races it against a stop signal.
#[async_trait]
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;
    async fn wait(&mut self) -> Result<ExitReport, CommandError>;
    /// Kills the process and reaps it.
    async fn kill(&mut self) -> Result<(), CommandError>;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` to completion and captures its output.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Launches `spec` detached from any output capture and returns its handle.
    fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>, CommandError>;
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null()).kill_on_drop(true);
        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW: keep netsh from flashing a console.
            cmd.creation_flags(0x0800_0000);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let child = Self::command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, and kill_on_drop reaps it.
        let pending = child.wait_with_output();
        let output = match spec.timeout {
            Some(after) => tokio::time::timeout(after, pending).await.map_err(|_| {
                CommandError::TimedOut {
                    program: spec.program.clone(),
                    after,
                }
            })?,
            None => pending.await,
        }
        .map_err(|source| CommandError::Io {
            program: spec.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>, CommandError> {
        let child = Self::command(spec)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: spec.program.clone(),
                source,
            })?;
        Ok(Box::new(SystemProcess {
            program: spec.program.clone(),
            child,
        }))
    }
}

struct SystemProcess {
    program: String,
    child: Child,
}

#[async_trait]
impl ProcessHandle for SystemProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<ExitReport, CommandError> {
        let status = self.child.wait().await.map_err(|source| CommandError::Io {
            program: self.program.clone(),
            source,
        })?;
        Ok(ExitReport {
            code: status.code(),
        })
    }

    async fn kill(&mut self) -> Result<(), CommandError> {
        self.child.kill().await.map_err(|source| CommandError::Io {
            program: self.program.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("netsh", ["wlan", "show", "drivers"]);
        assert_eq!(spec.display(), "netsh wlan show drivers");
        assert!(spec.timeout.is_none());
    }

    #[test]
    fn combined_skips_empty_streams() {
        let out = CommandOutput {
            exit_code: Some(1),
            stdout: "  \n".to_string(),
            stderr: "boom\n".to_string(),
        };
        assert_eq!(out.combined(), "boom");
        assert!(!out.success());
    }

    #[test]
    fn combined_keeps_both_streams() {
        let out = CommandOutput {
            exit_code: Some(0),
            stdout: "one".to_string(),
            stderr: "two".to_string(),
        };
        assert_eq!(out.combined(), "one\ntwo");
        assert!(out.success());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let spec = CommandSpec::new("holobridge-definitely-not-a-program", Vec::<String>::new());
        let err = SystemCommandRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_captures_streams_and_exit_code() {
        let spec = CommandSpec::new("sh", ["-c", "echo out; echo err 1>&2; exit 3"]);
        let out = SystemCommandRunner.run(&spec).await.unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_times_out() {
        let spec = CommandSpec::new("sleep", ["5"]).with_timeout(Duration::from_millis(100));
        let err = SystemCommandRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_process_can_be_killed() {
        let spec = CommandSpec::new("sleep", ["30"]);
        let mut handle = SystemCommandRunner.spawn(&spec).unwrap();
        assert!(handle.id().is_some());
        handle.kill().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_process_reports_exit_code() {
        let spec = CommandSpec::new("sh", ["-c", "exit 4"]);
        let mut handle = SystemCommandRunner.spawn(&spec).unwrap();
        let report = handle.wait().await.unwrap();
        assert_eq!(report.code, Some(4));
        assert!(!report.success());
    }
}

/// Scripted [`CommandRunner`] for unit tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::watch;

    enum Scripted {
        Output(CommandOutput),
        LaunchFailure,
    }

    /// Answers `run` from a table keyed by the rendered command line.
    /// Unscripted commands succeed with empty output.
    #[derive(Default)]
    pub struct FakeRunner {
        script: Mutex<HashMap<String, Scripted>>,
        calls: Mutex<Vec<String>>,
        spawned: Mutex<Vec<Arc<FakeProcess>>>,
        next_pid: AtomicU32,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn succeed(&self, line: &str, stdout: &str) {
            self.script.lock().unwrap().insert(
                line.to_string(),
                Scripted::Output(CommandOutput {
                    exit_code: Some(0),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }),
            );
        }

        pub fn fail(&self, line: &str, code: i32, stdout: &str) {
            self.script.lock().unwrap().insert(
                line.to_string(),
                Scripted::Output(CommandOutput {
                    exit_code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                }),
            );
        }

        /// Makes `run` or `spawn` of `line` fail as if the program were missing.
        pub fn fail_to_launch(&self, line: &str) {
            self.script
                .lock()
                .unwrap()
                .insert(line.to_string(), Scripted::LaunchFailure);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn spawned(&self) -> Vec<Arc<FakeProcess>> {
            self.spawned.lock().unwrap().clone()
        }

        fn launch_error(spec: &CommandSpec) -> CommandError {
            CommandError::Spawn {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "program not found"),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
            let line = spec.display();
            self.calls.lock().unwrap().push(line.clone());
            match self.script.lock().unwrap().get(&line) {
                Some(Scripted::Output(out)) => Ok(out.clone()),
                Some(Scripted::LaunchFailure) => Err(Self::launch_error(spec)),
                None => Ok(CommandOutput {
                    exit_code: Some(0),
                    ..CommandOutput::default()
                }),
            }
        }

        fn spawn(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>, CommandError> {
            let line = spec.display();
            self.calls.lock().unwrap().push(line.clone());
            if let Some(Scripted::LaunchFailure) = self.script.lock().unwrap().get(&line) {
                return Err(Self::launch_error(spec));
            }
            let (exit_tx, exit_rx) = watch::channel(None);
            let process = Arc::new(FakeProcess {
                pid: 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst),
                spec: spec.clone(),
                killed: AtomicBool::new(false),
                exit_tx,
            });
            self.spawned.lock().unwrap().push(Arc::clone(&process));
            Ok(Box::new(FakeHandle { process, exit_rx }))
        }
    }

    pub struct FakeProcess {
        pub pid: u32,
        pub spec: CommandSpec,
        killed: AtomicBool,
        exit_tx: watch::Sender<Option<i32>>,
    }

    impl FakeProcess {
        pub fn was_killed(&self) -> bool {
            self.killed.load(Ordering::SeqCst)
        }

        /// Simulates the process ending on its own.
        pub fn exit(&self, code: i32) {
            let _ = self.exit_tx.send(Some(code));
        }
    }

    struct FakeHandle {
        process: Arc<FakeProcess>,
        exit_rx: watch::Receiver<Option<i32>>,
    }

    #[async_trait]
    impl ProcessHandle for FakeHandle {
        fn id(&self) -> Option<u32> {
            Some(self.process.pid)
        }

        async fn wait(&mut self) -> Result<ExitReport, CommandError> {
            let code = match self.exit_rx.wait_for(Option::is_some).await {
                Ok(code) => *code,
                Err(_) => None,
            };
            Ok(ExitReport { code })
        }

        async fn kill(&mut self) -> Result<(), CommandError> {
            self.process.killed.store(true, Ordering::SeqCst);
            let _ = self.process.exit_tx.send(Some(-1));
            Ok(())
        }
    }
}
