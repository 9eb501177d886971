//! Bone hierarchies and skinning transform derivation.

use bytemuck::{Pod, Zeroable};
use glam::{EulerRot, Mat4, Vec3};

use super::channels::ChannelOutputs;

/// A single bone: a pivot in figure space plus up to three rotation
/// channels (X, Y, Z order).
#[derive(Debug, Clone)]
pub struct Bone {
    /// Bone name.
    pub name: String,
    /// Parent bone index. Must precede this bone in the bone list; the
    /// first bone is the root.
    pub parent: Option<usize>,
    /// Rotation pivot in figure (rest) space.
    pub pivot: Vec3,
    /// Channel indices supplying X/Y/Z rotation in radians.
    pub rotation_channels: [Option<usize>; 3],
}

/// A skinning matrix in figure space, column-major, GPU-uploadable.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BoneTransform {
    /// Column-major 4×4 matrix (matches WGSL `mat4x4<f32>`).
    pub matrix: [[f32; 4]; 4],
}

impl From<Mat4> for BoneTransform {
    fn from(m: Mat4) -> Self {
        Self {
            matrix: m.to_cols_array_2d(),
        }
    }
}

impl BoneTransform {
    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Mat4::IDENTITY.into()
    }
}

/// The bone hierarchy of one figure, in topological (parent-first) order.
pub struct BoneSystem {
    bones: Vec<Bone>,
}

impl BoneSystem {
    /// Build a bone system. Bones must be listed parent-first; a parent
    /// index that does not precede its child is treated as root.
    #[must_use]
    pub fn new(bones: Vec<Bone>) -> Self {
        debug_assert!(bones
            .iter()
            .enumerate()
            .all(|(i, b)| b.parent.is_none_or(|p| p < i)));
        Self { bones }
    }

    /// Number of bones.
    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Derive figure-space skinning matrices from evaluated channel
    /// outputs. Pure and deterministic; identity at the rest pose.
    #[must_use]
    pub fn bone_transforms(&self, outputs: &ChannelOutputs) -> Vec<BoneTransform> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.bones.len());
        for (i, bone) in self.bones.iter().enumerate() {
            let [rx, ry, rz] = bone
                .rotation_channels
                .map(|c| c.map_or(0.0, |index| outputs.value(index)));
            // Rotate about the bone's pivot: vertices stay in figure space.
            let local = Mat4::from_translation(bone.pivot)
                * Mat4::from_euler(EulerRot::XYZ, rx, ry, rz)
                * Mat4::from_translation(-bone.pivot);
            let transform = match bone.parent {
                Some(p) if p < i => world[p] * local,
                _ => local,
            };
            world.push(transform);
        }
        world.into_iter().map(Into::into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::channels::{Channel, ChannelInputs, ChannelSystem};

    fn arm_system() -> (ChannelSystem, BoneSystem) {
        let channels = ChannelSystem::new(
            vec![
                Channel::new("shoulder/rotZ", -2.0, 2.0),
                Channel::new("elbow/rotZ", -2.0, 2.0),
            ],
            None,
        );
        let bones = BoneSystem::new(vec![
            Bone {
                name: "shoulder".to_owned(),
                parent: None,
                pivot: Vec3::ZERO,
                rotation_channels: [None, None, Some(0)],
            },
            Bone {
                name: "elbow".to_owned(),
                parent: Some(0),
                pivot: Vec3::new(1.0, 0.0, 0.0),
                rotation_channels: [None, None, Some(1)],
            },
        ]);
        (channels, bones)
    }

    fn evaluate(system: &ChannelSystem, set: &[(usize, f32)]) -> ChannelInputs {
        let mut inputs = system.default_inputs();
        for &(index, value) in set {
            inputs.set(index, value);
        }
        inputs
    }

    #[test]
    fn rest_pose_is_identity() {
        let (channels, bones) = arm_system();
        let outputs = channels.evaluate(None, &channels.default_inputs());
        let transforms = bones.bone_transforms(&outputs);
        assert_eq!(transforms.len(), 2);
        for t in transforms {
            assert_eq!(t, BoneTransform::identity());
        }
    }

    #[test]
    fn child_accumulates_parent_rotation() {
        let (channels, bones) = arm_system();
        let half_pi = std::f32::consts::FRAC_PI_2;
        let inputs = evaluate(&channels, &[(0, half_pi)]);
        let outputs = channels.evaluate(None, &inputs);
        let transforms = bones.bone_transforms(&outputs);

        // The elbow pivot at (1,0,0) swings to (0,1,0) under the
        // shoulder's 90° Z rotation, carried by the child transform.
        let elbow = Mat4::from_cols_array_2d(&transforms[1].matrix);
        let moved = elbow.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((moved - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }
}
