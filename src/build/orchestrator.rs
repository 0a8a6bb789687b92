//! Composes discovery, the compile batch, linking and running.

use super::batch::batch;
use super::compile::{CompileOutcome, CompileStage};
use super::error::BuildError;
use super::link::{LinkStage, executable_name};
use super::unit::{BuildTarget, Language, TranslationUnit};
use crate::config::KilnConfig;
use crate::process::{Invocation, ProcessRunner, SystemRunner};
use crate::ui::Console;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub struct UnitReport {
    pub unit: TranslationUnit,
    pub outcome: CompileOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// No objects to link.
    NotRun,
    /// At least one unit failed to compile.
    Skipped,
    /// Linker exit code.
    Linked(i32),
}

/// Result of one compile pass, units in input order.
#[derive(Debug)]
pub struct BuildReport {
    pub target: String,
    pub units: Vec<UnitReport>,
    pub link: LinkStatus,
    pub executable: PathBuf,
}

impl BuildReport {
    pub fn compiled(&self) -> usize {
        self.count(|o| matches!(o, CompileOutcome::Compiled))
    }

    pub fn up_to_date(&self) -> usize {
        self.count(|o| matches!(o, CompileOutcome::UpToDate))
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|r| !r.outcome.is_usable())
    }

    /// Every unit compiled (or was fresh) and the link exited 0.
    pub fn succeeded(&self) -> bool {
        self.failures().next().is_none() && self.link == LinkStatus::Linked(0)
    }

    fn count(&self, pred: impl Fn(&CompileOutcome) -> bool) -> usize {
        self.units.iter().filter(|r| pred(&r.outcome)).count()
    }
}

pub struct BuildOrchestrator {
    root: PathBuf,
    config: Arc<KilnConfig>,
    runner: Arc<dyn ProcessRunner>,
    console: Console,
}

impl BuildOrchestrator {
    pub fn new(root: impl Into<PathBuf>, config: KilnConfig) -> Self {
        Self {
            root: root.into(),
            config: Arc::new(config),
            runner: Arc::new(SystemRunner),
            console: Console::new(false),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.console = Console::new(verbose);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    pub fn build_dir(&self) -> PathBuf {
        self.root.join(&self.config.project.build_dir)
    }

    pub fn executable(&self, target: &str) -> PathBuf {
        self.build_dir().join(executable_name(target))
    }

    pub fn compile_stage(&self, console: Console) -> CompileStage {
        CompileStage::new(
            self.root.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
            console,
        )
    }

    pub fn resolve(&self, target: &str) -> Result<BuildTarget> {
        BuildTarget::resolve(&self.root, &self.config, target)
    }

    /// Compiles every unit of `target` and links them.
    pub fn compile(&self, target: &str) -> Result<BuildReport> {
        let resolved = self.resolve(target)?;
        self.build_units(target, resolved.units())
    }

    /// Compiles `units` in parallel, then links them into the executable for
    /// `target`. The link waits for every compile task to finish.
    pub fn build_units(&self, target: &str, units: Vec<TranslationUnit>) -> Result<BuildReport> {
        let start_time = Instant::now();
        self.run_hooks()?;

        println!(
            "{} Compiling {} ({} units, {} jobs)...",
            "⚙".blue(),
            target.bold(),
            units.len(),
            self.config.build.concurrency
        );

        let console = self.console.with_progress(units.len(), "Compiling...");
        let stage = Arc::new(self.compile_stage(console.clone()));
        let task_console = console.clone();
        let tasks = batch(self.config.build.concurrency, units.clone(), move |unit: TranslationUnit| {
            let outcome = stage.compile(&unit);
            task_console.advance();
            outcome
        })?;

        let mut outcomes: Vec<Option<CompileOutcome>> = (0..units.len()).map(|_| None).collect();
        for (index, outcome) in tasks {
            outcomes[index] = Some(outcome);
        }
        console.finish("Compilation complete");

        let units: Vec<UnitReport> = units
            .into_iter()
            .zip(outcomes)
            .filter_map(|(unit, outcome)| outcome.map(|outcome| UnitReport { unit, outcome }))
            .collect();

        let executable = self.executable(target);
        let link = if units.iter().any(|r| !r.outcome.is_usable()) {
            LinkStatus::Skipped
        } else if units.is_empty() {
            LinkStatus::NotRun
        } else {
            let objects: Vec<PathBuf> = units.iter().map(|r| r.unit.object_rel.clone()).collect();
            let language = if units.iter().any(|r| r.unit.language == Language::Cpp) {
                Language::Cpp
            } else {
                Language::C
            };
            let output = self
                .config
                .project
                .build_dir
                .join(executable_name(target));
            let linker = LinkStage::new(
                self.root.clone(),
                Arc::clone(&self.config),
                Arc::clone(&self.runner),
                self.console.clone(),
            );
            LinkStatus::Linked(linker.link(&objects, &output, language)?)
        };

        let report = BuildReport {
            target: target.to_string(),
            units,
            link,
            executable,
        };
        self.print_summary(&report, start_time);
        Ok(report)
    }

    fn print_summary(&self, report: &BuildReport, start_time: Instant) {
        for failure in report.failures() {
            if let CompileOutcome::Failed(e) = &failure.outcome {
                println!("   {} {}: {}", "x".red(), failure.unit.rel.display(), e);
            }
        }

        match report.link {
            LinkStatus::Skipped => println!(
                "{} Build failed: {} unit(s) did not compile, {} is not runnable",
                "x".red(),
                report.failures().count(),
                report.target
            ),
            LinkStatus::NotRun => println!("{} Nothing to link", "!".yellow()),
            LinkStatus::Linked(0) => println!(
                "{} Build finished in {:.2?} ({} compiled, {} up to date) -> {}",
                "✓".green(),
                start_time.elapsed(),
                report.compiled(),
                report.up_to_date(),
                report.executable.display()
            ),
            LinkStatus::Linked(code) => println!(
                "{} Linking failed with code {}, {} is not runnable",
                "x".red(),
                code,
                report.target
            ),
        }
    }

    fn run_hooks(&self) -> Result<()> {
        for hook in &self.config.hooks {
            let mut invocation =
                Invocation::new(hook.program.as_str(), &self.root).args(hook.args.iter().cloned());
            if let Some(stdin) = &hook.stdin {
                invocation = invocation.stdin_from(stdin);
            }
            if let Some(stdout) = &hook.stdout {
                invocation = invocation.stdout_to(stdout);
            }

            println!("   {} Running hook: {}", "📜".magenta(), invocation.command_line());
            let code = self.runner.spawn(&invocation)?;
            if code != 0 {
                return Err(BuildError::ToolInvocation {
                    program: hook.program.clone(),
                    code,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Removes and recreates the build directory.
    pub fn clean(&self) -> Result<()> {
        let dir = self.build_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| BuildError::filesystem(&dir, e))
                .context("Failed to remove build directory")?;
        }
        fs::create_dir_all(&dir)
            .map_err(|e| BuildError::filesystem(&dir, e))
            .context("Failed to create build directory")?;
        println!("{} Build directory cleaned", "✓".green());
        Ok(())
    }

    /// Runs the built executable for `target` from the build directory with
    /// inherited stdio, returning its exit code.
    pub fn run(&self, target: &str) -> Result<i32> {
        let exe = self.executable(target);
        if !exe.is_file() {
            return Err(BuildError::MissingExecutable(exe).into());
        }
        make_executable(&exe)?;

        println!("{} Running {}...\n", "▶".green(), target.bold());
        let code = self
            .runner
            .spawn(&Invocation::new(exe.to_string_lossy(), self.build_dir()))?;
        if code != 0 {
            println!("{} process exited with code {}", "!".yellow(), code);
        }
        Ok(code)
    }

    /// Compiles `target` and runs it when the build succeeded.
    pub fn build_and_run(&self, target: &str) -> Result<Option<i32>> {
        let report = self.compile(target)?;
        if !report.succeeded() {
            return Ok(None);
        }
        self.run(target).map(Some)
    }

    /// clean, compile, run; strictly in that order.
    pub fn all(&self, target: &str) -> Result<Option<i32>> {
        self.clean()?;
        self.build_and_run(target)
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| BuildError::filesystem(path, e))
        .context("Failed to mark executable")?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
