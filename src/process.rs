//! External process capability.
//!
//! Everything kiln runs (compilers, the linker, hooks, the built program) goes
//! through a [`ProcessRunner`], so the pipeline can be driven by a fake in tests.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A fully described program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Redirects stdin from this file instead of inheriting it.
    pub stdin: Option<PathBuf>,
    /// Redirects stdout into this file instead of inheriting it.
    pub stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            stdin: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// The path following `-o`, if any.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.args
            .iter()
            .position(|a| a == "-o")
            .and_then(|i| self.args.get(i + 1))
            .map(|out| self.cwd.join(out))
    }

    /// Shell-like rendering used in log lines.
    pub fn command_line(&self) -> String {
        let mut line = String::new();
        if let Some(stdin) = &self.stdin {
            line.push_str(&format!("{} | ", stdin.display()));
        }
        line.push_str(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(stdout) = &self.stdout {
            line.push_str(&format!(" > {}", stdout.display()));
        }
        line
    }
}

/// Runs an [`Invocation`] to completion and reports its exit code.
pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, invocation: &Invocation) -> Result<i32>;
}

/// Spawns real child processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn spawn(&self, invocation: &Invocation) -> Result<i32> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).current_dir(&invocation.cwd);

        if let Some(stdin) = &invocation.stdin {
            cmd.stdin(Stdio::from(open_input(&invocation.cwd, stdin)?));
        }
        if let Some(stdout) = &invocation.stdout {
            let path = invocation.cwd.join(stdout);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            cmd.stdout(Stdio::from(file));
        }

        let status = cmd
            .status()
            .with_context(|| format!("Failed to execute '{}'", invocation.program))?;
        // Killed by a signal: no code, treat as a generic failure.
        Ok(status.code().unwrap_or(-1))
    }
}

fn open_input(cwd: &Path, path: &Path) -> Result<File> {
    let path = cwd.join(path);
    File::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}
