//! Runs the CLI under test as a subprocess and captures its output.

use std::{
    ffi::OsStr,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::process::Command;
use tracing::debug;

use super::{HarnessConfig, HarnessError};

/// Captured result of one CLI invocation.
#[derive(Debug, Clone)]
pub struct CliOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Spawns a fixed program in a fixed working directory.
///
/// The invoker never interprets exit codes; callers inspect the output.
#[derive(Debug, Clone)]
pub struct CliInvoker {
    program: PathBuf,
    working_dir: PathBuf,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl CliInvoker {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            envs: Vec::new(),
            timeout: None,
        }
    }

    /// Invoker for the program, working directory, environment and timeout
    /// described by `config`.
    pub fn from_config(config: &HarnessConfig) -> Self {
        config
            .cli_env()
            .into_iter()
            .fold(
                Self::new(&config.program, &config.working_dir),
                |invoker, (name, value)| invoker.env(name, value),
            )
            .timeout(config.timeout)
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the program with `args` and wait for it to exit.
    pub async fn run<I, S>(&self, args: I) -> Result<CliOutput, HarnessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .current_dir(&self.working_dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        debug!("invoking {:?}", command.as_std());

        let pending = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| HarnessError::Timeout {
                    program: self.program.display().to_string(),
                    timeout: limit,
                })?,
            None => pending.await,
        }
        .map_err(|source| HarnessError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        Ok(CliOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Split `line` on whitespace and run it. Arguments cannot contain
    /// spaces this way; use [`CliInvoker::run`] for those.
    pub async fn run_line(&self, line: &str) -> Result<CliOutput, HarnessError> {
        self.run(line.split_whitespace()).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn captures_both_streams_without_judging_exit_code() {
        let dir = TempDir::new().unwrap();
        let invoker = CliInvoker::new("sh", dir.path()).env("GREETING", "hello");

        let output = invoker
            .run(["-c", "echo $GREETING; echo oops >&2; exit 3"])
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
        assert_eq!(output.combined(), "hello\noops\n");
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = TempDir::new().unwrap();
        let output = CliInvoker::new("pwd", dir.path()).run_line("").await.unwrap();

        let reported = PathBuf::from(output.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let err = CliInvoker::new(dir.path().join("no-such-program"), dir.path())
            .run(["upload"])
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_program_times_out() {
        let dir = TempDir::new().unwrap();
        let err = CliInvoker::new("sleep", dir.path())
            .timeout(Some(Duration::from_millis(50)))
            .run_line("5")
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { .. }));
    }
}
