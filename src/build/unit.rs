//! Translation units, build targets and glob-based source discovery.

use crate::config::KilnConfig;
use anyhow::{Context, Result};
use colored::*;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const OBJECT_SUFFIX: &str = ".o";

const C_EXTENSIONS: &[&str] = &["c"];
const CPP_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
}

impl Language {
    /// Classifies a source file by extension; `None` for headers and anything else.
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if C_EXTENSIONS.contains(&ext.as_str()) {
            Some(Language::C)
        } else if CPP_EXTENSIONS.contains(&ext.as_str()) {
            Some(Language::Cpp)
        } else {
            None
        }
    }
}

/// One source file compiled on its own into one object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    /// Source path relative to the project root; the unit's identity.
    pub rel: PathBuf,
    pub source: PathBuf,
    /// Object path relative to the project root.
    pub object_rel: PathBuf,
    pub object: PathBuf,
    pub language: Language,
}

impl TranslationUnit {
    pub fn new(root: &Path, build_dir: &Path, rel: impl Into<PathBuf>, language: Language) -> Self {
        let rel = rel.into();
        let mut object_name: OsString = rel.as_os_str().to_owned();
        object_name.push(OBJECT_SUFFIX);
        let object_rel = build_dir.join(object_name);

        Self {
            source: root.join(&rel),
            object: root.join(&object_rel),
            object_rel,
            rel,
            language,
        }
    }

    /// Builds a unit for `rel` if its extension names a known language.
    pub fn classify(root: &Path, build_dir: &Path, rel: impl Into<PathBuf>) -> Option<Self> {
        let rel = rel.into();
        let language = Language::from_path(&rel)?;
        Some(Self::new(root, build_dir, rel, language))
    }
}

/// An entry point unit plus the auxiliary units linked with it.
#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub name: String,
    pub main: TranslationUnit,
    pub auxiliary: Vec<TranslationUnit>,
}

impl BuildTarget {
    /// Resolves target `name`: `<main_dir>/<name>.<ext>` plus every file matched
    /// by the configured source globs.
    pub fn resolve(root: &Path, config: &KilnConfig, name: &str) -> Result<Self> {
        let build_dir = &config.project.build_dir;
        let main = main_unit(root, config, name);

        let auxiliary = discover_sources(root, &config.build.sources, build_dir)?
            .into_iter()
            .filter(|rel| *rel != main.rel)
            .filter_map(|rel| TranslationUnit::classify(root, build_dir, rel))
            .collect();

        Ok(Self {
            name: name.to_string(),
            main,
            auxiliary,
        })
    }

    /// Main unit first, then auxiliary units in discovery order.
    pub fn units(&self) -> Vec<TranslationUnit> {
        std::iter::once(self.main.clone())
            .chain(self.auxiliary.iter().cloned())
            .collect()
    }
}

fn main_unit(root: &Path, config: &KilnConfig, name: &str) -> TranslationUnit {
    let main_dir = &config.project.main_dir;
    let build_dir = &config.project.build_dir;

    for ext in C_EXTENSIONS.iter().chain(CPP_EXTENSIONS) {
        let rel = main_dir.join(format!("{}.{}", name, ext));
        if root.join(&rel).exists()
            && let Some(unit) = TranslationUnit::classify(root, build_dir, rel)
        {
            return unit;
        }
    }
    // Not found: keep the C path so the compile step reports the missing file.
    TranslationUnit::new(root, build_dir, main_dir.join(format!("{}.c", name)), Language::C)
}

/// Translates a glob (`*`, `**`, `?`, `[abc]`, `[!a-z]`, `{a,b}`) into an
/// anchored regex over `/`-separated relative paths. A `[` without a closing
/// `]` is literal.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::from("^");
    let mut in_group = false;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                if chars.get(i + 1) == Some(&'/') {
                    i += 1;
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '{' if !in_group => {
                in_group = true;
                re.push_str("(?:");
            }
            '}' if in_group => {
                in_group = false;
                re.push(')');
            }
            ',' if in_group => re.push('|'),
            '[' => match char_class(&chars[i + 1..]) {
                Some((class, consumed)) => {
                    re.push_str(&class);
                    i += consumed;
                }
                None => re.push_str(r"\["),
            },
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');

    Regex::new(&re).with_context(|| format!("Invalid source glob '{}'", pattern))
}

/// Translates the body of a bracket expression (the text after `[`) into a
/// regex class, returning it with the number of chars consumed including the
/// closing `]`. Classes never match `/`.
fn char_class(rest: &[char]) -> Option<(String, usize)> {
    let (negated, start) = match rest.first() {
        Some('!' | '^') => (true, 1),
        _ => (false, 0),
    };
    // A `]` right after the opening bracket is a member, not the end.
    let close = rest
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(_, c)| **c == ']')
        .map(|(idx, _)| idx)?;

    let mut class = String::from(if negated { "[^/" } else { "[" });
    for &c in &rest[start..close] {
        match c {
            '-' => class.push('-'),
            '/' => {}
            c => class.push_str(&regex::escape(&c.to_string())),
        }
    }
    class.push(']');
    if class == "[]" {
        return None;
    }
    Some((class, close + 1))
}

/// Returns every file under `root` matching any of `patterns`, relative to
/// `root`, sorted and de-duplicated. `exclude` (the build directory) and hidden
/// directories are not walked.
pub fn discover_sources(root: &Path, patterns: &[String], exclude: &Path) -> Result<Vec<PathBuf>> {
    if patterns.is_empty() {
        return Ok(Vec::new());
    }
    let matchers = patterns
        .iter()
        .map(|p| glob_to_regex(p))
        .collect::<Result<Vec<_>>>()?;
    let exclude = root.join(exclude);

    let mut found = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0 || (e.path() != exclude && !e.file_name().to_string_lossy().starts_with('.'))
    });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                println!("{} Skipping unreadable path: {}", "!".yellow(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = slash_path(rel);
        if matchers.iter().any(|m| m.is_match(&key)) {
            found.push(rel.to_path_buf());
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_language_classification() {
        assert_eq!(Language::from_path(Path::new("a.c")), Some(Language::C));
        assert_eq!(Language::from_path(Path::new("a.cpp")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("a.cc")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("a.h")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_object_path_appends_suffix() {
        let unit = TranslationUnit::classify(
            Path::new("/proj"),
            Path::new("build"),
            "src/lib/Hashmap.c",
        )
        .unwrap();
        assert_eq!(unit.object_rel, PathBuf::from("build/src/lib/Hashmap.c.o"));
        assert_eq!(unit.object, PathBuf::from("/proj/build/src/lib/Hashmap.c.o"));
        assert_eq!(unit.source, PathBuf::from("/proj/src/lib/Hashmap.c"));
    }

    #[test]
    fn test_same_stem_units_do_not_collide() {
        let a = TranslationUnit::classify(Path::new("/p"), Path::new("build"), "src/a/x.c").unwrap();
        let b = TranslationUnit::classify(Path::new("/p"), Path::new("build"), "src/b/x.c").unwrap();
        let c = TranslationUnit::classify(Path::new("/p"), Path::new("build"), "src/a/x.cpp").unwrap();
        assert_ne!(a.object, b.object);
        assert_ne!(a.object, c.object);
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("src/lib/*.c").unwrap();
        assert!(re.is_match("src/lib/Math2.c"));
        assert!(!re.is_match("src/lib/nested/Math2.c"));
        assert!(!re.is_match("src/lib/Math2.h"));

        let re = glob_to_regex("src/**/*.{c,cpp}").unwrap();
        assert!(re.is_match("src/main.c"));
        assert!(re.is_match("src/tests/unit/test001.c"));
        assert!(re.is_match("src/x/y.cpp"));
        assert!(!re.is_match("tests/x.c"));

        let re = glob_to_regex("./src/test00?.c").unwrap();
        assert!(re.is_match("src/test001.c"));
        assert!(!re.is_match("src/test0010.c"));
    }

    #[test]
    fn test_glob_character_classes() {
        let re = glob_to_regex("src/[ab]*.c").unwrap();
        assert!(re.is_match("src/alpha.c"));
        assert!(re.is_match("src/b.c"));
        assert!(!re.is_match("src/c.c"));

        let re = glob_to_regex("src/test[0-9][0-9].c").unwrap();
        assert!(re.is_match("src/test07.c"));
        assert!(!re.is_match("src/testab.c"));

        let re = glob_to_regex("src/[!m]*.c").unwrap();
        assert!(re.is_match("src/lib.c"));
        assert!(!re.is_match("src/main.c"));

        let re = glob_to_regex("src/[]x].c").unwrap();
        assert!(re.is_match("src/].c"));
        assert!(re.is_match("src/x.c"));

        let re = glob_to_regex("src/[abc.c").unwrap();
        assert!(re.is_match("src/[abc.c"));
    }

    #[test]
    fn test_discover_sources_skips_build_and_hidden_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/lib/Hashmap.c");
        touch(root, "src/lib/Math2.c");
        touch(root, "src/lib/Math2.h");
        touch(root, "build/src/lib/Stale.c");
        touch(root, ".git/hooks/x.c");

        let found = discover_sources(
            root,
            &["src/lib/*.c".to_string(), "**/*.c".to_string()],
            Path::new("build"),
        )
        .unwrap();
        assert_eq!(
            found,
            vec![
                PathBuf::from("src/lib/Hashmap.c"),
                PathBuf::from("src/lib/Math2.c")
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_sources_continues_past_unreadable_dirs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/lib/a.c");
        touch(root, "src/locked/b.c");
        let locked = root.join("src/locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let found = discover_sources(root, &["src/**/*.c".to_string()], Path::new("build"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let found = found.unwrap();
        assert!(found.contains(&PathBuf::from("src/lib/a.c")));
    }

    #[test]
    fn test_resolve_target_puts_main_first_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/main.c");
        touch(root, "src/lib/a.c");
        touch(root, "src/lib/b.cpp");

        let mut config = KilnConfig::default();
        config.build.sources = vec!["src/**/*.{c,cpp}".to_string()];

        let target = BuildTarget::resolve(root, &config, "main").unwrap();
        let rels: Vec<_> = target.units().into_iter().map(|u| u.rel).collect();
        assert_eq!(
            rels,
            vec![
                PathBuf::from("src/main.c"),
                PathBuf::from("src/lib/a.c"),
                PathBuf::from("src/lib/b.cpp"),
            ]
        );
        assert_eq!(target.auxiliary[1].language, Language::Cpp);
    }

    #[test]
    fn test_resolve_target_finds_cpp_main_and_keeps_missing_main() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "src/app.cpp");

        let config = KilnConfig::default();
        let target = BuildTarget::resolve(root, &config, "app").unwrap();
        assert_eq!(target.main.language, Language::Cpp);

        let missing = BuildTarget::resolve(root, &config, "nope").unwrap();
        assert_eq!(missing.main.rel, PathBuf::from("src/nope.c"));
        assert!(missing.auxiliary.is_empty());
    }
}
