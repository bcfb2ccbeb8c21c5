//! Centralized command execution with consistent error handling.
//!
//! Every external tool (mksquashfs, veritysetup, objcopy, sbsign, dracut) is
//! invoked through a [`Cmd`] with plain argument-list semantics. Nothing here
//! goes through a shell.
//!
//! Components never spawn processes directly; they take a [`CommandRunner`]
//! so the build pipeline can be exercised without the real binaries.

use anyhow::{bail, Context, Result};
use std::cell::RefCell;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// A successful result with the given stdout, for runners that do not
    /// spawn anything.
    pub fn ok(stdout: impl Into<String>) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            status: ExitStatus::from_raw(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        use std::os::unix::process::ExitStatusExt;
        Self {
            // Wait status layout: exit code lives in the second byte.
            status: ExitStatus::from_raw((code & 0xff) << 8),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Get stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Turn a non-zero exit into an error carrying the trimmed stderr.
    pub fn check(&self, result: CommandResult) -> Result<CommandResult> {
        if !result.success() {
            let prefix = self
                .error_prefix
                .clone()
                .unwrap_or_else(|| format!("'{}' failed", self.program));

            let stderr = result.stderr_trimmed();
            if stderr.is_empty() {
                bail!("{} (exit code {})", prefix, result.code());
            } else {
                bail!("{} (exit code {}):\n{}", prefix, result.code(), stderr);
            }
        }
        Ok(result)
    }

    /// Spawn the command, wait for it and capture output.
    pub fn run(&self) -> Result<CommandResult> {
        tracing::debug!("Running {:?}", self.argv());

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        self.check(result)
    }
}

/// Capability to run external commands.
pub trait CommandRunner {
    /// Run `cmd` to completion. Non-zero exits are errors.
    fn run(&self, cmd: &Cmd) -> Result<CommandResult>;
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        cmd.run()
    }
}

type Handler = Box<dyn Fn(&[String]) -> Result<CommandResult>>;

/// Records every command instead of running it.
///
/// An optional handler decides the outcome and may create the files a real
/// tool would have produced. Without a handler every command succeeds with
/// empty output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<Vec<String>>>,
    handler: Option<Handler>,
}

impl RecordingRunner {
    /// Runner where every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose outcomes come from `handler`, called with the argv.
    pub fn with_handler(handler: impl Fn(&[String]) -> Result<CommandResult> + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            handler: Some(Box::new(handler)),
        }
    }

    /// Argument vectors of every command seen so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }

    /// Programs invoked so far, in order.
    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c[0].clone()).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        let argv = cmd.argv();
        self.calls.borrow_mut().push(argv.clone());
        let result = match &self.handler {
            Some(handler) => handler(&argv)?,
            None => CommandResult::ok(""),
        };
        cmd.check(result)
    }
}

/// Check if a program exists in PATH.
///
/// Returns the full path if found, None otherwise.
pub fn which(program: &str) -> Option<String> {
    which::which(program)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}
