//! The GPU compute stage turning an evaluated pose into posed control
//! vertices.
//!
//! One shaper per figure instance. All per-figure data (rest positions,
//! skin binding, sparse morph deltas, the parent vertex map) is uploaded
//! once at construction; per-frame traffic is limited to channel outputs
//! and bone transforms. Two entry points share the buffers: main figures
//! also emit per-vertex deformation deltas, attachments instead consume
//! their parent's deltas.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::error::AnimaError;
use crate::figure::occlusion::ControlVertexInfo;
use crate::gpu::pipeline_helpers::{
    buffer_entry, create_compute_pipeline, dispatch_size, storage_buffer_read,
    storage_buffer_read_write, uniform_buffer,
};
use crate::gpu::{ShaderSet, StructuredBuffer};
use crate::pose::{BoneTransform, ChannelOutputs, ChannelSystem};

/// Artifact the shaper-parameter decode errors are reported against.
const ARTIFACT: &str = crate::assets::SHAPER_PARAMETERS;

/// One sparse vertex offset within a morph channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorphVertexDelta {
    /// Control vertex index the offset applies to.
    pub vertex: u32,
    /// Rest-space offset at full channel value.
    pub offset: [f32; 3],
}

/// A channel-driven sparse morph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MorphChannel {
    /// Channel name, resolved against the figure's channel system.
    pub channel: String,
    /// Sparse per-vertex offsets.
    pub deltas: Vec<MorphVertexDelta>,
}

/// Per-figure deformation inputs, decoded from the shaper-parameters
/// artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaperParameters {
    /// Rest-pose control vertex positions.
    pub initial_positions: Vec<[f32; 3]>,
    /// Four bone indices per vertex.
    pub skin_indices: Vec<[u32; 4]>,
    /// Four bone weights per vertex, matching `skin_indices`.
    pub skin_weights: Vec<[f32; 4]>,
    /// Channel-driven sparse morphs.
    #[serde(default)]
    pub morphs: Vec<MorphChannel>,
    /// For attachments: each of this figure's vertices mapped to the
    /// parent vertex whose deformation delta it follows.
    #[serde(default)]
    pub parent_vertex_map: Option<Vec<u32>>,
}

impl ShaperParameters {
    /// Number of control vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.initial_positions.len()
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// `ArtifactDecode` when the skin arrays or parent vertex map disagree
    /// with the vertex count, or a morph delta indexes past it.
    pub fn validate(&self) -> Result<(), AnimaError> {
        let vertex_count = self.vertex_count();
        if self.skin_indices.len() != vertex_count
            || self.skin_weights.len() != vertex_count
        {
            return Err(decode_error(format!(
                "skin arrays ({}/{}) do not match {vertex_count} vertices",
                self.skin_indices.len(),
                self.skin_weights.len()
            )));
        }
        for morph in &self.morphs {
            for delta in &morph.deltas {
                if delta.vertex as usize >= vertex_count {
                    return Err(decode_error(format!(
                        "morph '{}' targets vertex {} of {vertex_count}",
                        morph.channel, delta.vertex
                    )));
                }
            }
        }
        if let Some(map) = &self.parent_vertex_map {
            if map.len() != vertex_count {
                return Err(decode_error(format!(
                    "parent vertex map has {} entries for {vertex_count} vertices",
                    map.len()
                )));
            }
        }
        Ok(())
    }
}

fn decode_error(message: String) -> AnimaError {
    AnimaError::ArtifactDecode {
        artifact: ARTIFACT.to_owned(),
        message,
    }
}

/// Per-vertex deformation delta as written by the GPU (xyz + pad).
pub type DeformationDelta = [f32; 4];

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SkinVertex {
    indices: [u32; 4],
    weights: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GpuMorphEntry {
    offset: [f32; 3],
    channel: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ShaperUniforms {
    vertex_count: u32,
    bone_count: u32,
    channel_count: u32,
    parent_vertex_count: u32,
}

/// Flatten sparse morphs into a vertex-sorted entry array plus a
/// per-vertex `[start, end)` range table, resolving channel names.
fn flatten_morphs(
    channel_system: &ChannelSystem,
    morphs: &[MorphChannel],
    vertex_count: usize,
) -> Result<(Vec<GpuMorphEntry>, Vec<[u32; 2]>), AnimaError> {
    let mut per_vertex: Vec<Vec<GpuMorphEntry>> = vec![Vec::new(); vertex_count];
    for morph in morphs {
        let channel = channel_system.channel_index(&morph.channel).ok_or_else(
            || decode_error(format!("unknown morph channel '{}'", morph.channel)),
        )?;
        for delta in &morph.deltas {
            per_vertex[delta.vertex as usize].push(GpuMorphEntry {
                offset: delta.offset,
                channel: channel as u32,
            });
        }
    }

    let mut entries = Vec::new();
    let mut ranges = Vec::with_capacity(vertex_count);
    for vertex_entries in per_vertex {
        let start = entries.len() as u32;
        entries.extend(vertex_entries);
        ranges.push([start, entries.len() as u32]);
    }
    Ok((entries, ranges))
}

/// GPU shaper: morphs, skins, and occlusion-tags one figure's control
/// vertices in a single compute dispatch per frame.
pub struct GpuShaper {
    vertex_count: usize,
    parent_vertex_count: usize,
    channel_values: StructuredBuffer<f32>,
    bone_transforms: StructuredBuffer<BoneTransform>,
    deltas_layout: wgpu::BindGroupLayout,
    deltas_pipeline: wgpu::ComputePipeline,
    parent_layout: wgpu::BindGroupLayout,
    parent_pipeline: wgpu::ComputePipeline,
    uniforms: wgpu::Buffer,
    initial_positions: StructuredBuffer<[f32; 4]>,
    skin: StructuredBuffer<SkinVertex>,
    morph_entries: StructuredBuffer<GpuMorphEntry>,
    morph_ranges: StructuredBuffer<[u32; 2]>,
    parent_map: StructuredBuffer<u32>,
}

impl GpuShaper {
    /// Upload shaper parameters and build both pose pipelines.
    ///
    /// # Errors
    ///
    /// `ArtifactDecode` when validation fails or a morph channel does not
    /// resolve against the channel system.
    pub fn new(
        device: &wgpu::Device,
        shaders: &ShaderSet,
        channel_system: &ChannelSystem,
        bone_count: usize,
        parameters: &ShaperParameters,
    ) -> Result<Self, AnimaError> {
        parameters.validate()?;
        let vertex_count = parameters.vertex_count();
        let (entries, ranges) =
            flatten_morphs(channel_system, &parameters.morphs, vertex_count)?;
        let parent_map_data = parameters.parent_vertex_map.clone().unwrap_or_default();
        let parent_vertex_count = parent_map_data
            .iter()
            .max()
            .map_or(0, |&max| max as usize + 1);

        let positions: Vec<[f32; 4]> = parameters
            .initial_positions
            .iter()
            .map(|&[x, y, z]| [x, y, z, 1.0])
            .collect();
        let skin_data: Vec<SkinVertex> = parameters
            .skin_indices
            .iter()
            .zip(&parameters.skin_weights)
            .map(|(&indices, &weights)| SkinVertex { indices, weights })
            .collect();

        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shaper Uniforms"),
            contents: bytemuck::bytes_of(&ShaperUniforms {
                vertex_count: vertex_count as u32,
                bone_count: bone_count as u32,
                channel_count: channel_system.channel_count() as u32,
                parent_vertex_count: parent_vertex_count as u32,
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let initial_positions = StructuredBuffer::new_with_data(
            device,
            "Shaper Rest Positions",
            &positions,
            wgpu::BufferUsages::empty(),
        );
        let skin = StructuredBuffer::new_with_data(
            device,
            "Shaper Skin",
            &skin_data,
            wgpu::BufferUsages::empty(),
        );
        let morph_entries = StructuredBuffer::new_with_data(
            device,
            "Shaper Morph Entries",
            &entries,
            wgpu::BufferUsages::empty(),
        );
        let morph_ranges = StructuredBuffer::new_with_data(
            device,
            "Shaper Morph Ranges",
            &ranges,
            wgpu::BufferUsages::empty(),
        );
        let channel_values = StructuredBuffer::new(
            device,
            "Shaper Channel Values",
            channel_system.channel_count(),
            wgpu::BufferUsages::empty(),
        );
        let bone_transforms = StructuredBuffer::new(
            device,
            "Shaper Bone Transforms",
            bone_count,
            wgpu::BufferUsages::empty(),
        );
        let parent_map = StructuredBuffer::new_with_data(
            device,
            "Shaper Parent Map",
            &parent_map_data,
            wgpu::BufferUsages::empty(),
        );

        let shared = [
            uniform_buffer(0),
            storage_buffer_read(1),
            storage_buffer_read(2),
            storage_buffer_read(3),
            storage_buffer_read(4),
            storage_buffer_read(5),
            storage_buffer_read(6),
            storage_buffer_read(7),
            storage_buffer_read_write(8),
        ];
        let mut deltas_entries = shared.to_vec();
        deltas_entries.push(storage_buffer_read_write(9));
        let deltas_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Shaper Deltas Bind Group Layout"),
                entries: &deltas_entries,
            });
        let deltas_pipeline = create_compute_pipeline(
            device,
            "Shaper Deltas",
            &shaders.shaper,
            "pose_with_deltas",
            &[&deltas_layout],
        );

        let mut parent_entries = shared.to_vec();
        parent_entries.push(storage_buffer_read(10));
        parent_entries.push(storage_buffer_read(11));
        let parent_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Shaper Parent Deltas Bind Group Layout"),
                entries: &parent_entries,
            });
        let parent_pipeline = create_compute_pipeline(
            device,
            "Shaper Parent Deltas",
            &shaders.shaper,
            "pose_with_parent_deltas",
            &[&parent_layout],
        );

        Ok(Self {
            vertex_count,
            parent_vertex_count,
            channel_values,
            bone_transforms,
            deltas_layout,
            deltas_pipeline,
            parent_layout,
            parent_pipeline,
            uniforms,
            initial_positions,
            skin,
            morph_entries,
            morph_ranges,
            parent_map,
        })
    }

    /// Number of control vertices this shaper poses.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of parent vertices the parent map references (0 when this
    /// figure has no parent map).
    #[must_use]
    pub fn parent_vertex_count(&self) -> usize {
        self.parent_vertex_count
    }

    /// Upload this frame's evaluated channel outputs and bone transforms.
    pub fn set_values(
        &self,
        queue: &wgpu::Queue,
        outputs: &ChannelOutputs,
        transforms: &[BoneTransform],
    ) {
        self.channel_values.write(queue, outputs.values());
        self.bone_transforms.write(queue, transforms);
    }

    fn shared_entries<'a>(
        &'a self,
        occlusion: &'a wgpu::Buffer,
        out: &'a StructuredBuffer<ControlVertexInfo>,
    ) -> Vec<wgpu::BindGroupEntry<'a>> {
        vec![
            buffer_entry(0, &self.uniforms),
            buffer_entry(1, self.initial_positions.buffer()),
            buffer_entry(2, self.skin.buffer()),
            buffer_entry(3, self.morph_entries.buffer()),
            buffer_entry(4, self.morph_ranges.buffer()),
            buffer_entry(5, self.channel_values.buffer()),
            buffer_entry(6, self.bone_transforms.buffer()),
            buffer_entry(7, occlusion),
            buffer_entry(8, out.buffer()),
        ]
    }

    fn dispatch(
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        vertex_count: usize,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Shaper Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(dispatch_size(vertex_count), 1, 1);
    }

    /// Record the main-figure pose pass: posed vertices into `out`, and
    /// per-vertex deltas (posed minus rest) into `deltas_out` for children
    /// to follow.
    pub fn calculate_positions_and_deltas(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        occlusion: &wgpu::Buffer,
        out: &StructuredBuffer<ControlVertexInfo>,
        deltas_out: &StructuredBuffer<DeformationDelta>,
    ) {
        let mut entries = self.shared_entries(occlusion, out);
        entries.push(buffer_entry(9, deltas_out.buffer()));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shaper Deltas Bind Group"),
            layout: &self.deltas_layout,
            entries: &entries,
        });
        Self::dispatch(encoder, &self.deltas_pipeline, &bind_group, self.vertex_count);
    }

    /// Record the attachment pose pass: posed vertices into `out`, each
    /// vertex shifted by its mapped parent delta.
    pub fn calculate_positions(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        occlusion: &wgpu::Buffer,
        out: &StructuredBuffer<ControlVertexInfo>,
        parent_deltas: &wgpu::Buffer,
    ) {
        let mut entries = self.shared_entries(occlusion, out);
        entries.push(buffer_entry(10, parent_deltas));
        entries.push(buffer_entry(11, self.parent_map.buffer()));
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shaper Parent Deltas Bind Group"),
            layout: &self.parent_layout,
            entries: &entries,
        });
        Self::dispatch(encoder, &self.parent_pipeline, &bind_group, self.vertex_count);
    }
}
