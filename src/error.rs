//! Crate-level error types.

use std::fmt;

use crate::gpu::compute_context::GpuContextError;

/// Errors produced by the anima crate.
#[derive(Debug)]
pub enum AnimaError {
    /// GPU context initialization failure.
    Gpu(GpuContextError),
    /// A required artifact is absent from its directory. Fatal for the
    /// figure being loaded; never retried.
    MissingArtifact {
        /// Directory the artifact was expected in.
        directory: String,
        /// Artifact file name.
        artifact: String,
    },
    /// An artifact was present but malformed or inconsistent.
    ArtifactDecode {
        /// Artifact file name.
        artifact: String,
        /// Decode failure detail.
        message: String,
    },
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/validation failure.
    OptionsParse(String),
}

impl fmt::Display for AnimaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::MissingArtifact { directory, artifact } => {
                write!(f, "missing artifact '{artifact}' in '{directory}'")
            }
            Self::ArtifactDecode { artifact, message } => {
                write!(f, "failed to decode '{artifact}': {message}")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
        }
    }
}

impl std::error::Error for AnimaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuContextError> for AnimaError {
    fn from(e: GpuContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for AnimaError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
