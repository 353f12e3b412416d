//! Runner for the platform CLI under test.
//!
//! Wraps the distribution's command-line binary the way the suites invoke
//! it: build an invocation, execute it with a bounded budget, and observe
//! the exit code and captured output. The runner never parses the CLI's
//! output itself; assertions over stdout/stderr belong to the caller.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::probe::{Outcome, Probe};

/// Environment variable naming the CLI binary to drive.
pub const CLI_ENV: &str = "CONVERGE_CLI";

/// Default per-invocation budget.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from driving the CLI.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The binary could not be started at all.
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        /// The binary that failed to start.
        binary: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing piped input to the child failed.
    #[error("failed to write stdin for `{command}`: {source}")]
    Stdin {
        /// The rendered command line.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Collecting the child's output failed.
    #[error("failed to collect output of `{command}`: {source}")]
    Collect {
        /// The rendered command line.
        command: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The invocation exceeded its budget and was killed.
    #[error("`{command}` timed out after {budget:?}")]
    TimedOut {
        /// The rendered command line.
        command: String,
        /// The budget that was exceeded.
        budget: Duration,
    },

    /// The invocation exited non-zero where success was required.
    #[error("`{command}` exited with {code:?}: {stderr}")]
    NonZero {
        /// The rendered command line.
        command: String,
        /// The exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },
}

/// Captured result of one CLI invocation.
#[derive(Debug, Clone)]
pub struct CliOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CliOutput {
    /// True when the process exited zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout and stderr concatenated, for substring assertions that do
    /// not care which stream carried the text.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        combined.push_str(&self.stderr);
        combined
    }
}

/// Handle to the distribution CLI binary under test.
///
/// Cheap to clone; each invocation is independently scoped by the handle's
/// kubeconfig, namespace, and per-command budget.
#[derive(Debug, Clone)]
pub struct Cli {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
    namespace: Option<String>,
    command_timeout: Duration,
}

impl Cli {
    /// Handle for an explicit binary path.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig: None,
            namespace: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Handle from the environment: `CONVERGE_CLI` names the binary
    /// (default `oc`), `KUBECONFIG` scopes it if set.
    pub fn from_env() -> Self {
        let binary = std::env::var(CLI_ENV).unwrap_or_else(|_| "oc".to_string());
        let mut cli = Self::new(binary);
        if let Ok(path) = std::env::var("KUBECONFIG") {
            cli.kubeconfig = Some(PathBuf::from(path));
        }
        cli
    }

    /// Scope every invocation to a namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Scope every invocation to a kubeconfig file.
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Override the per-invocation budget.
    pub fn with_command_timeout(mut self, budget: Duration) -> Self {
        self.command_timeout = budget;
        self
    }

    /// The namespace this handle is scoped to, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Start building an invocation of `subcommand`.
    pub fn run(&self, subcommand: &str) -> CliCommand {
        CliCommand {
            cli: self.clone(),
            args: vec![subcommand.to_string()],
            stdin: None,
        }
    }

    /// Probe that is satisfied once `get <kind> <name>` exits zero.
    ///
    /// A non-zero exit is expected intermittent absence and maps to
    /// `Pending`, never `Failed`; only a spawn or timeout failure is hard.
    pub fn exists_probe(&self, kind: impl Into<String>, name: impl Into<String>) -> ExistsProbe {
        ExistsProbe {
            cli: self.clone(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Builder for a single CLI invocation.
pub struct CliCommand {
    cli: Cli,
    args: Vec<String>,
    stdin: Option<String>,
}

impl CliCommand {
    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Pipe `text` to the child's stdin (for `create -f -` style input).
    pub fn input(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// Run and require exit code zero; output is discarded.
    pub async fn execute(self) -> Result<(), CliError> {
        let rendered = self.rendered();
        let output = self.capture().await?;
        if output.success() {
            Ok(())
        } else {
            Err(CliError::NonZero {
                command: rendered,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Run and return stdout; a non-zero exit is an error carrying stderr.
    pub async fn output(self) -> Result<String, CliError> {
        let rendered = self.rendered();
        let output = self.capture().await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(CliError::NonZero {
                command: rendered,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Run and return the exit code and both streams without judging the
    /// code. Callers asserting on expected failures use this.
    pub async fn capture(self) -> Result<CliOutput, CliError> {
        let rendered = self.rendered();
        let binary = self.cli.binary.to_string_lossy().to_string();

        let mut command = Command::new(&self.cli.binary);
        if let Some(ref kubeconfig) = self.cli.kubeconfig {
            command.arg("--kubeconfig").arg(kubeconfig);
        }
        if let Some(ref namespace) = self.cli.namespace {
            command.arg("-n").arg(namespace);
        }
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %rendered, "invoking CLI");

        let mut child = command.spawn().map_err(|source| CliError::Spawn {
            binary: binary.clone(),
            source,
        })?;

        if let Some(text) = self.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|source| CliError::Stdin {
                    command: rendered.clone(),
                    source,
                })?;
            drop(stdin);
        }

        let waited = tokio::time::timeout(self.cli.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| CliError::TimedOut {
                command: rendered.clone(),
                budget: self.cli.command_timeout,
            })?;
        let output = waited.map_err(|source| CliError::Collect {
            command: rendered,
            source,
        })?;

        Ok(CliOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// The command line as a log-friendly string.
    fn rendered(&self) -> String {
        let mut rendered = self.cli.binary.to_string_lossy().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Existence probe backed by `get <kind> <name>`.
pub struct ExistsProbe {
    cli: Cli,
    kind: String,
    name: String,
}

#[async_trait]
impl Probe for ExistsProbe {
    async fn evaluate(&self) -> Outcome {
        let result = self
            .cli
            .run("get")
            .arg(self.kind.as_str())
            .arg(self.name.as_str())
            .capture()
            .await;
        match result {
            Ok(output) if output.success() => Outcome::Satisfied,
            Ok(output) => Outcome::pending(format!(
                "{} {} not present yet: {}",
                self.kind,
                self.name,
                output.stderr.trim()
            )),
            Err(error) => Outcome::failed(error.to_string()),
        }
    }
}
