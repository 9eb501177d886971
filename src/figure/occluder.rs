//! The two occlusion strategies and their loading policy.
//!
//! A figure's occlusion is either *computed* live from pose (the main
//! figure, whose shadowing changes as it bends and as garments come and
//! go) or *baked* (attachments, whose occlusion was precomputed against
//! their parent). Exactly two variants exist, selected once at load time
//! by a pure role-resolution rule; there is no open-ended polymorphism.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::assets::{
    self, ArtifactDirectory, OCCLUDER_PARAMETERS, OCCLUSION_INFOS,
    PARENT_OCCLUSION_INFOS,
};
use crate::error::AnimaError;
use crate::figure::occlusion::OcclusionInfo;
use crate::gpu::pipeline_helpers::{
    buffer_entry, create_compute_pipeline, dispatch_size, storage_buffer_read,
    storage_buffer_read_write, uniform_buffer,
};
use crate::gpu::{ShaderSet, StructuredBuffer};
use crate::pose::{ChannelOutputs, ChannelSystem};

/// A figure's place in the pose hierarchy, resolved once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureRole {
    /// Root of a pose hierarchy; computes occlusion live and performs CPU
    /// readback.
    Main,
    /// Attached figure (clothing, hair, props); occlusion is baked.
    Attachment,
}

impl FigureRole {
    /// A figure is main iff its channel system has no parent topology.
    #[must_use]
    pub fn resolve(channel_system: &ChannelSystem) -> Self {
        if channel_system.parent().is_none() {
            Self::Main
        } else {
            Self::Attachment
        }
    }

    /// Whether this is the main figure.
    #[must_use]
    pub fn is_main(self) -> bool {
        matches!(self, Self::Main)
    }
}

/// How one channel shifts the main figure's per-vertex front occlusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcclusionChannelResponse {
    /// Channel name, resolved against the figure's channel system.
    pub channel: String,
    /// Per-vertex response, one entry per control vertex.
    pub response: Vec<f32>,
}

/// Parameters describing how live occlusion is computed from pose.
/// Present only for main figures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OccluderParameters {
    /// Channel responses applied on top of the unmorphed base occlusion.
    #[serde(default)]
    pub channels: Vec<OcclusionChannelResponse>,
}

/// Resolve occluder channel names against a channel system and flatten
/// the responses channel-major for GPU upload.
///
/// # Errors
///
/// `ArtifactDecode` for an unknown channel name or a response row whose
/// length disagrees with `vertex_count`.
fn resolve_occlusion_channels(
    channel_system: &ChannelSystem,
    parameters: &OccluderParameters,
    vertex_count: usize,
) -> Result<(Vec<usize>, Vec<f32>), AnimaError> {
    let mut indices = Vec::with_capacity(parameters.channels.len());
    let mut responses = Vec::with_capacity(parameters.channels.len() * vertex_count);
    for entry in &parameters.channels {
        let index = channel_system.channel_index(&entry.channel).ok_or_else(|| {
            AnimaError::ArtifactDecode {
                artifact: OCCLUDER_PARAMETERS.to_owned(),
                message: format!("unknown channel '{}'", entry.channel),
            }
        })?;
        if entry.response.len() != vertex_count {
            return Err(AnimaError::ArtifactDecode {
                artifact: OCCLUDER_PARAMETERS.to_owned(),
                message: format!(
                    "channel '{}' has {} responses for {vertex_count} vertices",
                    entry.channel,
                    entry.response.len()
                ),
            });
        }
        indices.push(index);
        responses.extend_from_slice(&entry.response);
    }
    Ok((indices, responses))
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct OcclusionUniforms {
    vertex_count: u32,
    channel_count: u32,
    _pad: [u32; 2],
}

/// Live occlusion for the main figure: a compute pass over the unmorphed
/// base, channel responses, and the combined shadowing of visible
/// children.
pub struct DeformableOccluder {
    vertex_count: usize,
    channel_indices: Vec<usize>,
    values: StructuredBuffer<f32>,
    child_shadow: StructuredBuffer<u32>,
    result: StructuredBuffer<u32>,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    registered_children: usize,
}

impl DeformableOccluder {
    /// Build the live occluder from unmorphed base data and occluder
    /// parameters.
    ///
    /// # Errors
    ///
    /// `ArtifactDecode` when parameters do not resolve against the channel
    /// system or disagree with the vertex count.
    pub fn new(
        device: &wgpu::Device,
        shaders: &ShaderSet,
        channel_system: &ChannelSystem,
        base: &[OcclusionInfo],
        parameters: &OccluderParameters,
    ) -> Result<Self, AnimaError> {
        let vertex_count = base.len();
        let (channel_indices, responses) =
            resolve_occlusion_channels(channel_system, parameters, vertex_count)?;

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Occlusion Uniforms"),
            contents: bytemuck::bytes_of(&OcclusionUniforms {
                vertex_count: vertex_count as u32,
                channel_count: channel_indices.len() as u32,
                _pad: [0; 2],
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let base_buffer = StructuredBuffer::new_with_data(
            device,
            "Occlusion Base",
            &OcclusionInfo::pack_array(base),
            wgpu::BufferUsages::empty(),
        );
        let responses_buffer = StructuredBuffer::new_with_data(
            device,
            "Occlusion Responses",
            &responses,
            wgpu::BufferUsages::empty(),
        );
        let values = StructuredBuffer::new(
            device,
            "Occlusion Channel Values",
            channel_indices.len(),
            wgpu::BufferUsages::empty(),
        );
        let child_shadow = StructuredBuffer::new_with_data(
            device,
            "Occlusion Child Shadow",
            &vec![OcclusionInfo::FULLY_LIT.pack(); vertex_count.max(1)],
            wgpu::BufferUsages::empty(),
        );
        let result = StructuredBuffer::new(
            device,
            "Occlusion Result",
            vertex_count,
            wgpu::BufferUsages::empty(),
        );

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Occlusion Bind Group Layout"),
            entries: &[
                uniform_buffer(0),
                storage_buffer_read(1),
                storage_buffer_read(2),
                storage_buffer_read(3),
                storage_buffer_read(4),
                storage_buffer_read_write(5),
            ],
        });
        let pipeline = create_compute_pipeline(
            device,
            "Occlusion",
            &shaders.occlusion,
            "calculate_occlusion",
            &[&layout],
        );
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Occlusion Bind Group"),
            layout: &layout,
            entries: &[
                buffer_entry(0, &uniforms),
                buffer_entry(1, base_buffer.buffer()),
                buffer_entry(2, responses_buffer.buffer()),
                buffer_entry(3, values.buffer()),
                buffer_entry(4, child_shadow.buffer()),
                buffer_entry(5, result.buffer()),
            ],
        });

        Ok(Self {
            vertex_count,
            channel_indices,
            values,
            child_shadow,
            result,
            pipeline,
            bind_group,
            registered_children: 0,
        })
    }

    fn set_values(&self, queue: &wgpu::Queue, outputs: &ChannelOutputs) {
        if self.channel_indices.is_empty() {
            return;
        }
        let values: Vec<f32> = self
            .channel_indices
            .iter()
            .map(|&i| outputs.value(i))
            .collect();
        self.values.write(queue, &values);
    }

    fn calculate_occlusion(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Occlusion Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(dispatch_size(self.vertex_count), 1, 1);
    }

    fn register_child_occluders(
        &mut self,
        queue: &wgpu::Queue,
        influences: &[Arc<[OcclusionInfo]>],
    ) {
        let mut combined = vec![OcclusionInfo::FULLY_LIT; self.vertex_count];
        let mut folded = 0;
        for influence in influences {
            if influence.len() != self.vertex_count {
                log::warn!(
                    "child occluder influence has {} entries for {} vertices; skipping",
                    influence.len(),
                    self.vertex_count
                );
                continue;
            }
            for (slot, info) in combined.iter_mut().zip(influence.iter()) {
                slot.front *= info.front;
                slot.back *= info.back;
            }
            folded += 1;
        }
        self.child_shadow
            .write(queue, &OcclusionInfo::pack_array(&combined));
        self.registered_children = folded;
        log::debug!("registered {folded} child occluders");
    }
}

/// Baked occlusion for an attachment: its own per-vertex array plus its
/// influence on the parent's vertices, both loaded once.
pub struct StaticOccluder {
    result: StructuredBuffer<u32>,
    parent_influence: Arc<[OcclusionInfo]>,
    vertex_count: usize,
}

impl StaticOccluder {
    /// Upload baked occlusion data.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        own: &[OcclusionInfo],
        parent_influence: Vec<OcclusionInfo>,
    ) -> Self {
        let result = StructuredBuffer::new_with_data(
            device,
            "Static Occlusion",
            &OcclusionInfo::pack_array(own),
            wgpu::BufferUsages::empty(),
        );
        Self {
            result,
            parent_influence: parent_influence.into(),
            vertex_count: own.len(),
        }
    }
}

/// A figure's occlusion strategy. Exactly two variants exist.
pub enum Occluder {
    /// Computed live every frame (main figure).
    Deformable(DeformableOccluder),
    /// Loaded once from baked data (attachments).
    Static(StaticOccluder),
}

impl Occluder {
    /// Feed evaluated channel outputs into the occlusion computation.
    /// No-op for static occluders.
    pub fn set_values(&self, queue: &wgpu::Queue, outputs: &ChannelOutputs) {
        match self {
            Self::Deformable(occluder) => occluder.set_values(queue, outputs),
            Self::Static(_) => {}
        }
    }

    /// Record this frame's occlusion compute pass. No-op for static
    /// occluders.
    pub fn calculate_occlusion(&self, encoder: &mut wgpu::CommandEncoder) {
        match self {
            Self::Deformable(occluder) => occluder.calculate_occlusion(encoder),
            Self::Static(_) => {}
        }
    }

    /// Replace the set of child occluder influences, in child-list order.
    /// Static occluders do not support children; the call is logged and
    /// ignored.
    pub fn register_child_occluders(
        &mut self,
        queue: &wgpu::Queue,
        influences: &[Arc<[OcclusionInfo]>],
    ) {
        match self {
            Self::Deformable(occluder) => {
                occluder.register_child_occluders(queue, influences);
            }
            Self::Static(_) => {
                if !influences.is_empty() {
                    log::debug!("static occluder ignores child occluders");
                }
            }
        }
    }

    /// GPU-readable view of this figure's per-vertex occlusion.
    #[must_use]
    pub fn occlusion_view(&self) -> &wgpu::Buffer {
        match self {
            Self::Deformable(occluder) => occluder.result.buffer(),
            Self::Static(occluder) => occluder.result.buffer(),
        }
    }

    /// This occluder's baked influence on its parent's vertices, if any.
    #[must_use]
    pub fn parent_influence(&self) -> Option<Arc<[OcclusionInfo]>> {
        match self {
            Self::Deformable(_) => None,
            Self::Static(occluder) => Some(Arc::clone(&occluder.parent_influence)),
        }
    }

    /// Number of child occluders currently folded into the aggregation.
    #[must_use]
    pub fn registered_child_count(&self) -> usize {
        match self {
            Self::Deformable(occluder) => occluder.registered_children,
            Self::Static(_) => 0,
        }
    }

    /// Vertex count this occluder was built for.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Deformable(occluder) => occluder.vertex_count,
            Self::Static(occluder) => occluder.vertex_count,
        }
    }
}

/// Load the occlusion strategy appropriate to a figure's role.
///
/// Main figures *require* an occluder-parameters artifact in the resolved
/// occlusion directory and the unmorphed base array in their default
/// directory. Attachments require both their own and their parent's baked
/// occlusion arrays. Absence of any of these is a fatal configuration
/// error; nothing is retried. The figure's own occlusion array must have
/// exactly `vertex_count` entries.
///
/// # Errors
///
/// `MissingArtifact` / `ArtifactDecode` per the rules above.
pub fn load_occluder(
    device: &wgpu::Device,
    shaders: &ShaderSet,
    channel_system: &ChannelSystem,
    role: FigureRole,
    vertex_count: usize,
    unmorphed_occlusion_directory: &dyn ArtifactDirectory,
    occlusion_directory: &dyn ArtifactDirectory,
) -> Result<Occluder, AnimaError> {
    let occluder = match role {
        FigureRole::Main => {
            let parameters: OccluderParameters =
                assets::read_json(occlusion_directory, OCCLUDER_PARAMETERS)?;
            let base = OcclusionInfo::unpack_array(&assets::read_packed_u32s(
                unmorphed_occlusion_directory,
                OCCLUSION_INFOS,
            )?);
            Occluder::Deformable(DeformableOccluder::new(
                device,
                shaders,
                channel_system,
                &base,
                &parameters,
            )?)
        }
        FigureRole::Attachment => {
            let own = OcclusionInfo::unpack_array(&assets::read_packed_u32s(
                occlusion_directory,
                OCCLUSION_INFOS,
            )?);
            let parent = OcclusionInfo::unpack_array(&assets::read_packed_u32s(
                occlusion_directory,
                PARENT_OCCLUSION_INFOS,
            )?);
            Occluder::Static(StaticOccluder::new(device, &own, parent))
        }
    };
    if occluder.vertex_count() != vertex_count {
        return Err(AnimaError::ArtifactDecode {
            artifact: OCCLUSION_INFOS.to_owned(),
            message: format!(
                "occlusion array has {} entries for {vertex_count} vertices",
                occluder.vertex_count()
            ),
        });
    }
    Ok(occluder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Channel;

    fn channel_system(parent: Option<Arc<ChannelSystem>>) -> ChannelSystem {
        ChannelSystem::new(vec![Channel::new("bend", -1.0, 1.0)], parent)
    }

    #[test]
    fn role_resolution_follows_parent_topology() {
        let main = channel_system(None);
        assert_eq!(FigureRole::resolve(&main), FigureRole::Main);
        assert!(FigureRole::resolve(&main).is_main());

        let attachment = channel_system(Some(Arc::new(channel_system(None))));
        assert_eq!(FigureRole::resolve(&attachment), FigureRole::Attachment);
    }

    #[test]
    fn unknown_occlusion_channel_is_a_decode_error() {
        let system = channel_system(None);
        let parameters = OccluderParameters {
            channels: vec![OcclusionChannelResponse {
                channel: "no-such-channel".to_owned(),
                response: vec![0.0; 4],
            }],
        };
        let result = resolve_occlusion_channels(&system, &parameters, 4);
        assert!(matches!(result, Err(AnimaError::ArtifactDecode { .. })));
    }

    #[test]
    fn response_length_must_match_vertex_count() {
        let system = channel_system(None);
        let parameters = OccluderParameters {
            channels: vec![OcclusionChannelResponse {
                channel: "bend".to_owned(),
                response: vec![0.0; 3],
            }],
        };
        let result = resolve_occlusion_channels(&system, &parameters, 4);
        assert!(matches!(result, Err(AnimaError::ArtifactDecode { .. })));
    }

    #[test]
    fn responses_flatten_channel_major() {
        let system = channel_system(None);
        let parameters = OccluderParameters {
            channels: vec![OcclusionChannelResponse {
                channel: "bend".to_owned(),
                response: vec![0.1, 0.2],
            }],
        };
        let resolved = resolve_occlusion_channels(&system, &parameters, 2);
        assert!(
            matches!(resolved, Ok((ref i, ref r)) if i == &[0] && r == &[0.1, 0.2])
        );
    }

    // GPU tests; each bails out quietly when no adapter is available.

    fn context() -> Option<crate::gpu::ComputeContext> {
        crate::gpu::ComputeContext::new_blocking().ok()
    }

    #[test]
    fn occlusion_array_length_must_match_the_figure() {
        let Some(ctx) = context() else { return };
        let shaders = ShaderSet::new(&ctx.device);
        let system = channel_system(None);

        let mut dir = assets::MemoryArtifacts::new("main");
        dir.insert_json(OCCLUDER_PARAMETERS, &OccluderParameters::default());
        dir.insert_packed_u32s(OCCLUSION_INFOS, &[0xffff_ffff; 4]);

        // The figure has 8 vertices; a 4-entry array is inconsistent data,
        // not a figure with fewer vertices.
        let result =
            load_occluder(&ctx.device, &shaders, &system, FigureRole::Main, 8, &dir, &dir);
        assert!(matches!(result, Err(AnimaError::ArtifactDecode { .. })));

        let loaded =
            load_occluder(&ctx.device, &shaders, &system, FigureRole::Main, 4, &dir, &dir);
        assert!(matches!(loaded, Ok(ref o) if o.vertex_count() == 4));
    }

    #[test]
    fn mismatched_child_influences_are_not_counted() {
        let Some(ctx) = context() else { return };
        let shaders = ShaderSet::new(&ctx.device);
        let system = channel_system(None);
        let base = vec![OcclusionInfo::FULLY_LIT; 4];
        let Ok(mut occluder) = DeformableOccluder::new(
            &ctx.device,
            &shaders,
            &system,
            &base,
            &OccluderParameters::default(),
        ) else {
            unreachable!("default parameters resolve");
        };

        let good: Arc<[OcclusionInfo]> =
            vec![OcclusionInfo { front: 0.5, back: 0.5 }; 4].into();
        let short: Arc<[OcclusionInfo]> =
            vec![OcclusionInfo { front: 0.5, back: 0.5 }; 2].into();
        occluder.register_child_occluders(&ctx.queue, &[good, short]);
        assert_eq!(occluder.registered_children, 1);
    }
}
