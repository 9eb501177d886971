//! Static, shared figure definitions.

use std::sync::Arc;

use crate::assets::{ArtifactDirectory, OCCLUSION_SUBDIRECTORY};
use crate::pose::{BoneSystem, ChannelSystem};

/// Immutable, shared description of a figure type: its pose-evaluation
/// topology and the artifact directory holding its shape/occlusion data.
///
/// Owned by the composing layer; providers hold non-owning `Arc` clones.
pub struct FigureDefinition {
    name: String,
    channel_system: Arc<ChannelSystem>,
    bone_system: Arc<BoneSystem>,
    directory: Arc<dyn ArtifactDirectory>,
}

impl FigureDefinition {
    /// Assemble a figure definition.
    #[must_use]
    pub fn new(
        name: &str,
        channel_system: Arc<ChannelSystem>,
        bone_system: Arc<BoneSystem>,
        directory: Arc<dyn ArtifactDirectory>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            channel_system,
            bone_system,
            directory,
        }
    }

    /// Figure type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channel system. Its parent (or lack of one) decides the
    /// figure's role.
    #[must_use]
    pub fn channel_system(&self) -> &Arc<ChannelSystem> {
        &self.channel_system
    }

    /// The bone system.
    #[must_use]
    pub fn bone_system(&self) -> &Arc<BoneSystem> {
        &self.bone_system
    }

    /// The figure's artifact directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn ArtifactDirectory> {
        &self.directory
    }

    /// The figure's default (unmorphed) occlusion data directory.
    #[must_use]
    pub fn occlusion_directory(&self) -> Arc<dyn ArtifactDirectory> {
        self.directory.subdirectory(OCCLUSION_SUBDIRECTORY)
    }
}
