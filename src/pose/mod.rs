//! Pose evaluation: channel systems and bone transform derivation.
//!
//! Pure and deterministic: no GPU state, no side effects. The figure
//! pipeline treats this module as a function from pose parameters to
//! channel outputs and bone transforms.

/// Bone hierarchies and skinning transform derivation.
pub mod bones;
/// Named animation/shape channels and their evaluation.
pub mod channels;

pub use bones::{Bone, BoneSystem, BoneTransform};
pub use channels::{Channel, ChannelInputs, ChannelOutputs, ChannelSystem};
