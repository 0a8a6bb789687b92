use super::error::BuildError;
use super::stale;
use super::unit::{Language, TranslationUnit};
use crate::config::KilnConfig;
use crate::process::{Invocation, ProcessRunner};
use crate::ui::Console;
use colored::*;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// What happened to one unit during a compile pass.
#[derive(Debug)]
pub enum CompileOutcome {
    /// Object was strictly newer than its source; compiler not invoked.
    UpToDate,
    Compiled,
    Failed(BuildError),
}

impl CompileOutcome {
    /// Whether the unit's object can go into the link.
    pub fn is_usable(&self) -> bool {
        !matches!(self, CompileOutcome::Failed(_))
    }
}

/// Compiles a single translation unit to its object file.
pub struct CompileStage {
    root: PathBuf,
    config: Arc<KilnConfig>,
    runner: Arc<dyn ProcessRunner>,
    console: Console,
}

impl CompileStage {
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

    /// The compiler command for `unit`, run from the project root.
    pub fn invocation(&self, unit: &TranslationUnit) -> Invocation {
        let toolchain = &self.config.toolchain;
        let build = &self.config.build;
        let (compiler, lang_flags) = match unit.language {
            Language::C => (&toolchain.cc, &toolchain.cflags),
            Language::Cpp => (&toolchain.cxx, &toolchain.cxxflags),
        };

        Invocation::new(compiler.as_str(), &self.root)
            .args(build.debug_flags.iter().cloned())
            .args(build.arch_flags.iter().cloned())
            .args(lang_flags.iter().cloned())
            .args(build.includes.iter().map(|dir| format!("-I{}", dir.display())))
            .arg(unit.rel.to_string_lossy())
            .args(["-c", "-o"])
            .arg(unit.object_rel.to_string_lossy())
    }

    pub fn compile(&self, unit: &TranslationUnit) -> CompileOutcome {
        if let Some(dir) = unit.object.parent()
            && let Err(e) = fs::create_dir_all(dir)
        {
            return CompileOutcome::Failed(BuildError::filesystem(dir, e));
        }

        match stale::is_stale(&unit.source, &unit.object) {
            Ok(false) => {
                self.console
                    .detail(format!("   {} {} (up to date)", "·".dimmed(), unit.rel.display()));
                return CompileOutcome::UpToDate;
            }
            Ok(true) => {}
            Err(e) => return CompileOutcome::Failed(BuildError::filesystem(&unit.source, e)),
        }

        let invocation = self.invocation(unit);
        self.console
            .line(format!("   {} {}", "$".dimmed(), invocation.command_line()));

        match self.runner.spawn(&invocation) {
            Ok(0) => CompileOutcome::Compiled,
            Ok(code) => {
                self.console.line(format!(
                    "   {} process exited with code {} ({})",
                    "x".red(),
                    code,
                    unit.rel.display()
                ));
                CompileOutcome::Failed(BuildError::ToolInvocation {
                    program: invocation.program,
                    code,
                })
            }
            Err(e) => CompileOutcome::Failed(BuildError::ToolUnavailable {
                program: invocation.program,
                reason: format!("{:#}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::Path;
    use std::sync::Mutex;

    struct ScriptedRunner {
        code: i32,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ProcessRunner for ScriptedRunner {
        fn spawn(&self, invocation: &Invocation) -> Result<i32> {
            if let Some(out) = invocation.output_path() {
                fs::write(out, b"obj")?;
            }
            self.calls.lock().unwrap().push(invocation.clone());
            Ok(self.code)
        }
    }

    fn stage(root: &Path, code: i32) -> (CompileStage, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner {
            code,
            calls: Mutex::new(Vec::new()),
        });
        let mut config = KilnConfig::default();
        config.build.includes = vec![PathBuf::from("include")];
        config.toolchain.cxxflags = vec!["-std=c++17".to_string()];
        let stage = CompileStage::new(
            root.to_path_buf(),
            Arc::new(config),
            runner.clone(),
            Console::new(false),
        );
        (stage, runner)
    }

    #[test]
    fn test_invocation_layout() {
        let (stage, _) = stage(Path::new("/proj"), 0);
        let unit =
            TranslationUnit::classify(Path::new("/proj"), Path::new("build"), "src/lib/a.c").unwrap();
        let inv = stage.invocation(&unit);

        assert_eq!(inv.program, "clang");
        assert_eq!(inv.cwd, PathBuf::from("/proj"));
        assert_eq!(
            inv.args,
            vec![
                "-O0",
                "-gdwarf",
                "-m64",
                "-Iinclude",
                "src/lib/a.c",
                "-c",
                "-o",
                "build/src/lib/a.c.o"
            ]
        );
    }

    #[test]
    fn test_cpp_units_use_cxx_driver() {
        let (stage, _) = stage(Path::new("/proj"), 0);
        let unit =
            TranslationUnit::classify(Path::new("/proj"), Path::new("build"), "src/x.cpp").unwrap();
        let inv = stage.invocation(&unit);
        assert_eq!(inv.program, "clang++");
        assert!(inv.args.contains(&"-std=c++17".to_string()));
    }

    #[test]
    fn test_stale_unit_is_compiled_then_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        let src = root.join("src/a.c");
        fs::write(&src, "int a;").unwrap();
        fs::File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(60))
            .unwrap();

        let (stage, runner) = stage(root, 0);
        let unit = TranslationUnit::classify(root, Path::new("build"), "src/a.c").unwrap();

        assert!(matches!(stage.compile(&unit), CompileOutcome::Compiled));
        assert!(unit.object.exists());
        assert!(matches!(stage.compile(&unit), CompileOutcome::UpToDate));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_non_zero_exit_marks_unit_failed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/bad.c"), "int").unwrap();

        let (stage, _) = stage(root, 1);
        let unit = TranslationUnit::classify(root, Path::new("build"), "src/bad.c").unwrap();
        let outcome = stage.compile(&unit);

        assert!(!outcome.is_usable());
        assert!(matches!(
            outcome,
            CompileOutcome::Failed(BuildError::ToolInvocation { code: 1, .. })
        ));
    }

    #[test]
    fn test_missing_source_is_a_filesystem_failure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let (stage, runner) = stage(root, 0);

        let unit = TranslationUnit::classify(root, Path::new("build"), "src/gone.c").unwrap();
        // Object present so the source stat is reached.
        fs::create_dir_all(unit.object.parent().unwrap()).unwrap();
        fs::write(&unit.object, b"old").unwrap();

        assert!(matches!(
            stage.compile(&unit),
            CompileOutcome::Failed(BuildError::Filesystem { .. })
        ));
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
