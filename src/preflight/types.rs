//! What each preflight check inspected and whether it blocks a build.

use std::fmt::{self, Write};

/// The thing a check looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSubject {
    /// An external program the build runs, looked up on `PATH`.
    Tool(&'static str),
    /// A configuration key whose value must point at something usable.
    ConfigKey(&'static str),
    /// A file expected inside the directory named by a configuration key.
    KeyFile {
        key: &'static str,
        file: &'static str,
    },
    /// A fixed host file.
    HostFile(&'static str),
}

impl fmt::Display for CheckSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckSubject::Tool(tool) => write!(f, "tool {}", tool),
            CheckSubject::ConfigKey(key) => f.write_str(key),
            CheckSubject::KeyFile { key, file } => write!(f, "{}/{}", key, file),
            CheckSubject::HostFile(path) => f.write_str(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    /// Worth a look, but the build can go ahead.
    Warn,
    /// The build would fail on this.
    Blocking,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub subject: CheckSubject,
    pub status: CheckStatus,
    /// What was found, or what is wrong. May be empty.
    pub detail: String,
}

impl CheckResult {
    pub fn ok(subject: CheckSubject, detail: impl Into<String>) -> Self {
        Self::new(subject, CheckStatus::Ok, detail)
    }

    pub fn warn(subject: CheckSubject, detail: impl Into<String>) -> Self {
        Self::new(subject, CheckStatus::Warn, detail)
    }

    pub fn blocking(subject: CheckSubject, detail: impl Into<String>) -> Self {
        Self::new(subject, CheckStatus::Blocking, detail)
    }

    fn new(subject: CheckSubject, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            subject,
            status,
            detail: detail.into(),
        }
    }
}

pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    /// Subjects that would make a build fail.
    pub fn blocking(&self) -> Vec<CheckSubject> {
        self.with_status(CheckStatus::Blocking)
    }

    pub fn warnings(&self) -> Vec<CheckSubject> {
        self.with_status(CheckStatus::Warn)
    }

    pub fn is_clear(&self) -> bool {
        self.blocking().is_empty()
    }

    fn with_status(&self, status: CheckStatus) -> Vec<CheckSubject> {
        self.checks
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.subject)
            .collect()
    }

    /// One line per check, then a summary naming what blocks `build`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let width = self
            .checks
            .iter()
            .map(|c| c.subject.to_string().len())
            .max()
            .unwrap_or(0);

        for check in &self.checks {
            let tag = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Warn => "WARN",
                CheckStatus::Blocking => "FAIL",
            };
            let subject = check.subject.to_string();
            if check.detail.is_empty() {
                let _ = writeln!(out, "  {:<4}  {}", tag, subject);
            } else {
                let _ = writeln!(out, "  {:<4}  {:<width$}  {}", tag, subject, check.detail);
            }
        }

        let ok = self
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Ok)
            .count();
        let _ = writeln!(out, "\n{} of {} checks ok", ok, self.checks.len());

        let warnings = self.warnings();
        if !warnings.is_empty() {
            let _ = writeln!(out, "Warnings: {}", join(&warnings));
        }
        let blocking = self.blocking();
        if blocking.is_empty() {
            let _ = writeln!(out, "Nothing blocks a build.");
        } else {
            let _ = writeln!(out, "Blocking build: {}", join(&blocking));
            let _ = writeln!(
                out,
                "`build --skip-preflight` skips these checks; the build then fails on the first one it reaches."
            );
        }
        out
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn join(subjects: &[CheckSubject]) -> String {
    subjects
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
