//! The hierarchical figure deformation-and-occlusion pipeline.
//!
//! One [`ControlVertexProvider`] per figure instance drives, per frame,
//! pose evaluation → occlusion update → GPU shaping into a vertex store,
//! propagating occlusion between a figure and its attached children and
//! exposing a staged CPU readback of the previous frame's posed vertices.

/// Static figure definitions (pose topology + artifact directories).
pub mod definition;
/// Shape/visibility model state with typed change events.
pub mod model;
/// Packed per-vertex occlusion records.
pub mod occlusion;
/// The two occlusion strategies and their loading policy.
pub mod occluder;
/// Per-figure pipeline orchestration.
pub mod provider;
/// GPU compute stage turning pose into vertex positions.
pub mod shaper;

pub use definition::FigureDefinition;
pub use model::{FigureModel, ModelEvent, Shape};
pub use occlusion::{ControlVertexInfo, OcclusionInfo};
pub use occluder::{FigureRole, Occluder, OccluderParameters};
pub use provider::{ChildEndpoint, ControlVertexProvider, PosedVertexReader};
pub use shaper::{DeformationDelta, GpuShaper, ShaperParameters};
