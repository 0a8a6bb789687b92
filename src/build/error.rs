use std::path::PathBuf;

/// Failures the build pipeline reports to the user.
#[derive(Debug)]
pub enum BuildError {
    /// A compiler, linker or hook exited non-zero.
    ToolInvocation { program: String, code: i32 },
    /// The program could not be started at all.
    ToolUnavailable { program: String, reason: String },
    /// mkdir/stat/remove failed for a path.
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// `run` found nothing at the executable path.
    MissingExecutable(PathBuf),
    /// The platform file watcher could not be set up.
    WatchUnavailable(String),
}

impl BuildError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ToolInvocation { program, code } => {
                write!(f, "'{}' exited with code {}", program, code)
            }
            BuildError::ToolUnavailable { program, reason } => {
                write!(f, "could not run '{}': {}", program, reason)
            }
            BuildError::Filesystem { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            BuildError::MissingExecutable(path) => write!(
                f,
                "{} is missing. probably failed to compile.",
                path.display()
            ),
            BuildError::WatchUnavailable(reason) => write!(f, "watch unsupported: {}", reason),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Filesystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = BuildError::ToolInvocation {
            program: "clang".into(),
            code: 1,
        };
        assert_eq!(err.to_string(), "'clang' exited with code 1");

        let err = BuildError::MissingExecutable(PathBuf::from("build/main"));
        assert!(err.to_string().contains("build/main is missing"));
    }

    #[test]
    fn test_filesystem_error_exposes_source() {
        use std::error::Error;
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = BuildError::filesystem("build/src", io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("build/src"));
    }
}
