use super::unit::Language;
use crate::config::KilnConfig;
use crate::process::{Invocation, ProcessRunner};
use crate::ui::Console;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the executable for `target` on this host.
pub fn executable_name(target: &str) -> String {
    format!("{}{}", target, std::env::consts::EXE_SUFFIX)
}

/// Links object files into one executable using the compiler driver.
pub struct LinkStage {
    root: PathBuf,
    config: Arc<KilnConfig>,
    runner: Arc<dyn ProcessRunner>,
    console: Console,
}

impl LinkStage {
    pub fn new(
        root: PathBuf,
        config: Arc<KilnConfig>,
        runner: Arc<dyn ProcessRunner>,
        console: Console,
    ) -> Self {
        Self {
            root,
            config,
            runner,
            console,
        }
    }

    /// The linker command; object and output paths are relative to the root.
    pub fn invocation(&self, objects: &[PathBuf], output: &Path, language: Language) -> Invocation {
        let toolchain = &self.config.toolchain;
        let build = &self.config.build;
        let driver = match language {
            Language::C => &toolchain.cc,
            Language::Cpp => &toolchain.cxx,
        };

        Invocation::new(driver.as_str(), &self.root)
            .args(build.debug_flags.iter().cloned())
            .args(build.arch_flags.iter().cloned())
            .args(build.lib_paths.iter().map(|dir| format!("-L{}", dir.display())))
            .args(objects.iter().map(|obj| obj.to_string_lossy().into_owned()))
            .args(build.libs.iter().map(|lib| format!("-l{}", lib)))
            .arg("-o")
            .arg(output.to_string_lossy())
    }

    /// Links `objects` into `output` and returns the linker's exit code.
    ///
    /// An empty object list is a no-op returning 0. The executable's existence
    /// is not checked here.
    pub fn link(&self, objects: &[PathBuf], output: &Path, language: Language) -> Result<i32> {
        if objects.is_empty() {
            return Ok(0);
        }
        if let Some(dir) = self.root.join(output).parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let invocation = self.invocation(objects, output, language);
        self.console.line(format!("   {} Linking...", "🔗".cyan()));
        self.console
            .line(format!("   {} {}", "$".dimmed(), invocation.command_line()));

        let code = self.runner.spawn(&invocation)?;
        if code != 0 {
            self.console
                .line(format!("   {} process exited with code {}", "x".red(), code));
        }
        Ok(code)
    }
}
