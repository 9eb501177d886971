//! Compiled compute shader modules shared across figure providers.

/// The crate's WGSL modules, compiled once per device and passed by
/// shared reference to every figure provider. Read-only after creation;
/// no internal locking required.
pub struct ShaderSet {
    /// Morph + skinning shader (`pose_with_deltas`,
    /// `pose_with_parent_deltas`).
    pub shaper: wgpu::ShaderModule,
    /// Live occlusion shader (`calculate_occlusion`).
    pub occlusion: wgpu::ShaderModule,
}

impl ShaderSet {
    /// Compile all shader modules on the given device.
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            shaper: device.create_shader_module(wgpu::include_wgsl!(
                "../../assets/shaders/shaper.wgsl"
            )),
            occlusion: device.create_shader_module(wgpu::include_wgsl!(
                "../../assets/shaders/occlusion.wgsl"
            )),
        }
    }
}
