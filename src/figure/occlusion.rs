//! Packed per-vertex occlusion records and the GPU vertex record.

use bytemuck::{Pod, Zeroable};

/// Per-vertex ambient-occlusion data: a front visibility amount (1.0 =
/// fully lit) plus a back/auxiliary amount, packed as two unorm16 halves
/// of one `u32` for GPU residency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionInfo {
    /// Front ambient visibility in `[0, 1]`.
    pub front: f32,
    /// Back/auxiliary ambient visibility in `[0, 1]`.
    pub back: f32,
}

impl OcclusionInfo {
    /// Packed size on the GPU.
    pub const PACKED_SIZE_IN_BYTES: usize = 4;

    /// Fully lit: no occlusion at all.
    pub const FULLY_LIT: Self = Self {
        front: 1.0,
        back: 1.0,
    };

    /// Pack to the GPU representation, clamping to `[0, 1]`.
    #[must_use]
    pub fn pack(self) -> u32 {
        let front = (self.front.clamp(0.0, 1.0) * 65535.0 + 0.5) as u32;
        let back = (self.back.clamp(0.0, 1.0) * 65535.0 + 0.5) as u32;
        front | (back << 16)
    }

    /// Unpack from the GPU representation.
    #[must_use]
    pub fn unpack(packed: u32) -> Self {
        Self {
            front: (packed & 0xffff) as f32 / 65535.0,
            back: (packed >> 16) as f32 / 65535.0,
        }
    }

    /// Unpack a whole artifact array.
    #[must_use]
    pub fn unpack_array(packed: &[u32]) -> Vec<Self> {
        packed.iter().map(|&p| Self::unpack(p)).collect()
    }

    /// Pack a whole array for upload.
    #[must_use]
    pub fn pack_array(infos: &[Self]) -> Vec<u32> {
        infos.iter().map(|i| i.pack()).collect()
    }
}

/// One posed control vertex as computed on the GPU: position plus packed
/// occlusion. Layout matches the WGSL `ControlVertexInfo` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ControlVertexInfo {
    /// Posed position in figure space.
    pub position: [f32; 3],
    /// Packed occlusion (see [`OcclusionInfo`]).
    pub occlusion: u32,
}

impl ControlVertexInfo {
    /// Size of one record on the GPU.
    pub const SIZE_IN_BYTES: usize = 12 + OcclusionInfo::PACKED_SIZE_IN_BYTES;
}
