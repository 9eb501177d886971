//! GPU resource management utilities.
//!
//! Provides wgpu device/queue initialization, typed storage buffers, the
//! staged CPU-readback ring, and compute shader/pipeline plumbing.

/// Typed fixed-size storage buffers.
pub mod buffers;
/// wgpu device and queue initialization (headless).
pub mod compute_context;
/// Shared wgpu boilerplate helpers for compute pipelines.
pub mod pipeline_helpers;
/// Compiled compute shader modules shared across figure providers.
pub mod shader_set;
/// Round-robin staging buffers for non-blocking GPU→CPU readback.
pub mod staging;

pub use buffers::StructuredBuffer;
pub use compute_context::ComputeContext;
pub use shader_set::ShaderSet;
pub use staging::StagingRing;
