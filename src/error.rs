use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for per-unit pipeline operations.
pub type UnitResult<T> = Result<T, UnitError>;

/// Everything that can go wrong while consolidating a single unit.
///
/// All variants are unit-scoped: the orchestrator logs them, marks the unit
/// failed and moves on. The one run-fatal condition (merge tool missing from
/// PATH) is checked before any unit is attempted and never appears here.
#[derive(Debug, Error)]
pub enum UnitError {
    /// The unit directory has no descriptor file.
    #[error("descriptor file not found in {unit:?}")]
    DescriptorNotFound { unit: PathBuf },

    /// The descriptor exists but cannot be used.
    #[error("malformed descriptor in {unit:?}: {reason}")]
    MalformedMetadata { unit: PathBuf, reason: String },

    /// The descriptor declares a media type this tool does not know.
    #[error("unsupported media type tag {tag}")]
    UnsupportedMediaType { tag: i64 },

    /// A fragmented unit whose asset directory holds no fragments.
    #[error("no .{ext} fragments found in {dir:?}")]
    NoFragments { dir: PathBuf, ext: String },

    /// The merge tool could not be run or exited non-zero.
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Another unit in this run already claimed the same output name.
    #[error("output name '{title}' already claimed by another unit")]
    DuplicateTitle { title: String },

    /// Filesystem failure outside the cases above.
    #[error("io failure during {operation} on {path:?}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl UnitError {
    pub(crate) fn malformed(unit: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            unit: unit.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Short tag used in summary lines to group failures.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DescriptorNotFound { .. } => "descriptor not found",
            Self::MalformedMetadata { .. } => "malformed metadata",
            Self::UnsupportedMediaType { .. } => "unsupported media type",
            Self::NoFragments { .. } => "no fragments",
            Self::ExternalTool { .. } => "merge tool failure",
            Self::DuplicateTitle { .. } => "duplicate title",
            Self::Io { .. } => "io failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = UnitError::malformed("/cache/12", "missing both title fields");
        assert!(err.to_string().contains("/cache/12"));
        assert!(err.to_string().contains("missing both title fields"));

        let err = UnitError::UnsupportedMediaType { tag: 9 };
        assert!(err.to_string().contains('9'));

        let err = UnitError::ExternalTool {
            tool: "ffmpeg".to_string(),
            message: "exit code 1".to_string(),
        };
        assert!(err.to_string().contains("ffmpeg"));
    }

    #[test]
    fn test_io_preserves_source() {
        use std::error::Error;

        let err = UnitError::io(
            "read_dir",
            "/cache/12/64",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert_eq!(err.kind(), "io failure");
    }
}
