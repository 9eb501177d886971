//! Read-only artifact storage for figure data.
//!
//! Figure parameters and baked occlusion arrays live in a byte-keyed blob
//! store: a filesystem directory in production, an in-memory map in tests.
//! Absence of a required artifact is a fatal configuration error for the
//! figure being loaded; nothing here retries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::AnimaError;

/// Shaper parameters artifact (JSON).
pub const SHAPER_PARAMETERS: &str = "shaper-parameters.json";
/// Occluder parameters artifact (JSON, main figure only).
pub const OCCLUDER_PARAMETERS: &str = "occluder-parameters.json";
/// Packed per-vertex occlusion array (little-endian u32s).
pub const OCCLUSION_INFOS: &str = "occlusion-infos.array";
/// Packed parent-vertex occlusion influence array (attachments only).
pub const PARENT_OCCLUSION_INFOS: &str = "parent-occlusion-infos.array";
/// Subdirectory of a figure definition holding its unmorphed occlusion
/// data.
pub const OCCLUSION_SUBDIRECTORY: &str = "occlusion";

/// A read-only, byte-array-keyed blob store.
pub trait ArtifactDirectory: Send + Sync {
    /// Human-readable location for error messages.
    fn name(&self) -> String;

    /// Raw bytes of `artifact`, or `None` if absent.
    fn bytes(&self, artifact: &str) -> Option<Vec<u8>>;

    /// A nested directory (which may itself be empty).
    fn subdirectory(&self, name: &str) -> Arc<dyn ArtifactDirectory>;
}

/// Filesystem-backed artifact directory.
pub struct DirArtifacts {
    root: PathBuf,
}

impl DirArtifacts {
    /// An artifact directory rooted at `root`.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ArtifactDirectory for DirArtifacts {
    fn name(&self) -> String {
        self.root.display().to_string()
    }

    fn bytes(&self, artifact: &str) -> Option<Vec<u8>> {
        std::fs::read(self.root.join(artifact)).ok()
    }

    fn subdirectory(&self, name: &str) -> Arc<dyn ArtifactDirectory> {
        Arc::new(Self {
            root: self.root.join(name),
        })
    }
}

/// In-memory artifact directory for tests and generated data.
#[derive(Default)]
pub struct MemoryArtifacts {
    label: String,
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryArtifacts {
    /// An empty in-memory directory.
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            entries: HashMap::new(),
        }
    }

    /// Insert raw bytes under `artifact`. Nested names use `/` separators.
    pub fn insert(&mut self, artifact: &str, bytes: Vec<u8>) {
        let _ = self.entries.insert(artifact.to_owned(), bytes);
    }

    /// Insert a JSON-serialized value under `artifact`.
    pub fn insert_json<T: serde::Serialize>(&mut self, artifact: &str, value: &T) {
        if let Ok(bytes) = serde_json::to_vec(value) {
            self.insert(artifact, bytes);
        }
    }

    /// Insert a packed u32 array under `artifact`.
    pub fn insert_packed_u32s(&mut self, artifact: &str, values: &[u32]) {
        self.insert(artifact, bytemuck::cast_slice(values).to_vec());
    }
}

impl ArtifactDirectory for MemoryArtifacts {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn bytes(&self, artifact: &str) -> Option<Vec<u8>> {
        self.entries.get(artifact).cloned()
    }

    fn subdirectory(&self, name: &str) -> Arc<dyn ArtifactDirectory> {
        let prefix = format!("{name}/");
        let entries = self
            .entries
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .map(|rest| (rest.to_owned(), value.clone()))
            })
            .collect();
        Arc::new(Self {
            label: format!("{}/{name}", self.label),
            entries,
        })
    }
}

/// Raw bytes of a required artifact.
///
/// # Errors
///
/// `AnimaError::MissingArtifact` if absent.
pub fn require_bytes(
    dir: &dyn ArtifactDirectory,
    artifact: &str,
) -> Result<Vec<u8>, AnimaError> {
    dir.bytes(artifact).ok_or_else(|| AnimaError::MissingArtifact {
        directory: dir.name(),
        artifact: artifact.to_owned(),
    })
}

/// Decode a required JSON artifact.
///
/// # Errors
///
/// `MissingArtifact` if absent, `ArtifactDecode` if malformed.
pub fn read_json<T: DeserializeOwned>(
    dir: &dyn ArtifactDirectory,
    artifact: &str,
) -> Result<T, AnimaError> {
    let bytes = require_bytes(dir, artifact)?;
    serde_json::from_slice(&bytes).map_err(|e| AnimaError::ArtifactDecode {
        artifact: artifact.to_owned(),
        message: e.to_string(),
    })
}

/// Decode a required packed little-endian u32 array artifact.
///
/// # Errors
///
/// `MissingArtifact` if absent, `ArtifactDecode` if the byte length is not
/// a multiple of four.
pub fn read_packed_u32s(
    dir: &dyn ArtifactDirectory,
    artifact: &str,
) -> Result<Vec<u32>, AnimaError> {
    let bytes = require_bytes(dir, artifact)?;
    if bytes.len() % 4 != 0 {
        return Err(AnimaError::ArtifactDecode {
            artifact: artifact.to_owned(),
            message: format!("length {} is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
