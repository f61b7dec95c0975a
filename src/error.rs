use crate::format::FormatTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorKind {
    ToolUnavailable,
    CorruptInput,
    PermissionDenied,
    UnsupportedSubformat,
    MissingSidecarTarget,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeErrorKind::ToolUnavailable => "tool unavailable",
            DecodeErrorKind::CorruptInput => "corrupt input",
            DecodeErrorKind::PermissionDenied => "permission denied",
            DecodeErrorKind::UnsupportedSubformat => "unsupported subformat",
            DecodeErrorKind::MissingSidecarTarget => "missing sidecar target",
        };
        f.write_str(s)
    }
}

/// Failure reported by a decoder adapter.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub message: String,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::CorruptInput, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(DecodeErrorKind::UnsupportedSubformat, message)
    }

    /// Lifts an I/O error touching `path` into a decode error.
    pub fn io(action: &str, path: &Path, err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => DecodeErrorKind::PermissionDenied,
            _ => DecodeErrorKind::CorruptInput,
        };
        Self::new(kind, format!("{} {}: {}", action, path.display(), err))
    }
}

/// Errors surfaced by the orchestrator to its caller.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("input blob does not exist: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("could not determine the format of {}", path.display())]
    ClassificationUnresolved { path: PathBuf },

    #[error("failed to decode {} as {format}: {source}", path.display())]
    Decode {
        path: PathBuf,
        format: FormatTag,
        #[source]
        source: DecodeError,
    },

    #[error("failed to write manifest {}: {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to scan output directory {}: {message}", path.display())]
    Scan { path: PathBuf, message: String },
}

impl ExtractError {
    /// The decode failure kind, when this error came from an adapter.
    pub fn decode_kind(&self) -> Option<DecodeErrorKind> {
        match self {
            ExtractError::Decode { source, .. } => Some(source.kind),
            _ => None,
        }
    }
}

pub type DecodeOutcome<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_permission_maps_to_permission_denied() {
        let err = DecodeError::io(
            "Failed to open",
            Path::new("/x/y"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.kind, DecodeErrorKind::PermissionDenied);
        assert!(err.message.contains("/x/y"));

        let err = DecodeError::io(
            "Failed to read",
            Path::new("/x/y"),
            io::Error::from(io::ErrorKind::UnexpectedEof),
        );
        assert_eq!(err.kind, DecodeErrorKind::CorruptInput);
    }

    #[test]
    fn test_decode_error_display_carries_context() {
        let err = ExtractError::Decode {
            path: PathBuf::from("fw/system.img"),
            format: FormatTag::SparseImage,
            source: DecodeError::new(DecodeErrorKind::ToolUnavailable, "simg2img not found"),
        };
        let text = err.to_string();
        assert!(text.contains("fw/system.img"));
        assert!(text.contains("sparse-image"));
        assert!(text.contains("simg2img not found"));
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::ToolUnavailable));
    }
}
