//! Project configuration (`kiln.toml`).
//!
//! Every field has a default, so a project without `kiln.toml` builds with
//! `clang`, debug flags and the stock source globs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "kiln.toml";

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct KilnConfig {
    pub project: ProjectConfig,
    pub toolchain: ToolchainConfig,
    pub build: BuildConfig,
    pub watch: WatchConfig,
    pub ide: IdeConfig,
    pub hooks: Vec<HookConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ProjectConfig {
    /// Output directory, relative to the project root.
    pub build_dir: PathBuf,
    /// Directory holding `<target>.c` entry points.
    pub main_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            main_dir: PathBuf::from("src"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ToolchainConfig {
    pub cc: String,
    pub cxx: String,
    pub cflags: Vec<String>,
    pub cxxflags: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            cc: "clang".to_string(),
            cxx: "clang++".to_string(),
            cflags: Vec::new(),
            cxxflags: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BuildConfig {
    /// Maximum number of compiler processes in flight.
    pub concurrency: usize,
    pub debug_flags: Vec<String>,
    pub arch_flags: Vec<String>,
    pub includes: Vec<PathBuf>,
    pub lib_paths: Vec<PathBuf>,
    pub libs: Vec<String>,
    /// Globs for auxiliary translation units, relative to the project root.
    pub sources: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            debug_flags: vec!["-O0".to_string(), "-gdwarf".to_string()],
            arch_flags: vec!["-m64".to_string()],
            includes: Vec::new(),
            lib_paths: Vec::new(),
            libs: Vec::new(),
            sources: vec!["src/tests/unit/*.c".to_string(), "src/lib/*.c".to_string()],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WatchConfig {
    /// File or directory whose changes trigger a rebuild.
    pub trigger: PathBuf,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            trigger: PathBuf::from("src"),
            debounce_ms: 250,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct IdeConfig {
    /// Globs listed in `compile_commands.json`.
    pub sources: Vec<String>,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                "src/**/*.{c,cc,cpp,cxx}".to_string(),
                "tests/**/*.{c,cc,cpp,cxx}".to_string(),
            ],
        }
    }
}

/// An auxiliary tool run before compilation.
#[derive(Deserialize, Debug, Clone)]
pub struct HookConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// File fed to the tool's stdin, relative to the project root.
    pub stdin: Option<PathBuf>,
    /// File receiving the tool's stdout, relative to the project root.
    pub stdout: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl KilnConfig {
    pub fn parse(source: &str) -> Result<Self> {
        let mut config: KilnConfig = toml::from_str(source)
            .context("Failed to parse kiln.toml - check for syntax errors")?;
        config.build.concurrency = config.build.concurrency.max(1);
        Ok(config)
    }

    pub fn with_concurrency(mut self, jobs: usize) -> Self {
        self.build.concurrency = jobs.max(1);
        self
    }
}

/// Loads `kiln.toml` from `root`, falling back to defaults when it is absent.
pub fn load_config(root: &Path) -> Result<KilnConfig> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(KilnConfig::default());
    }
    let source = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    KilnConfig::parse(&source)
}
