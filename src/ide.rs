use crate::build::{BuildOrchestrator, TranslationUnit, discover_sources};
use crate::ui::Console;
use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

pub const OUT_FILE: &str = "compile_commands.json";

/// One entry of a clang compilation database.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CompileCommand {
    pub directory: String,
    pub arguments: Vec<String>,
    pub file: String,
}

/// Builds database entries for every file matched by the `[ide]` globs, using
/// the same compiler arguments a build would.
pub fn compile_commands(orchestrator: &BuildOrchestrator) -> Result<Vec<CompileCommand>> {
    let root = orchestrator.root();
    let config = orchestrator.config();
    let build_dir = &config.project.build_dir;
    let stage = orchestrator.compile_stage(Console::new(false));

    let units: Vec<TranslationUnit> = discover_sources(root, &config.ide.sources, build_dir)?
        .into_iter()
        .filter_map(|rel| TranslationUnit::classify(root, build_dir, rel))
        .collect();

    Ok(units
        .iter()
        .map(|unit| {
            let invocation = stage.invocation(unit);
            CompileCommand {
                directory: invocation.cwd.to_string_lossy().into_owned(),
                arguments: std::iter::once(invocation.program)
                    .chain(invocation.args)
                    .collect(),
                file: unit.rel.to_string_lossy().into_owned(),
            }
        })
        .collect())
}

/// Writes `compile_commands.json` at the project root and returns its path.
pub fn write_compile_commands(orchestrator: &BuildOrchestrator) -> Result<PathBuf> {
    println!("{} Scanning sources...", "🔍".cyan());
    let commands = compile_commands(orchestrator)?;

    let path = orchestrator.root().join(OUT_FILE);
    let json = serde_json::to_string_pretty(&commands)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "{} Wrote {} ({} entries)",
        "✓".green(),
        OUT_FILE,
        commands.len()
    );
    Ok(path)
}
