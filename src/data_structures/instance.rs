//! Object transforms.
//!
//! An [`Instance`] is the position, rotation and scale of one scene object.
//! It is uploaded as an [`InstanceRaw`] uniform when the object is attached
//! and again whenever the transform changes.

use cgmath::{InnerSpace, One, Rotation3, SquareMatrix};

/// Position, rotation (as quaternion) and scale of a scene object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        let world_matrix = self.to_matrix();
        InstanceRaw {
            model: world_matrix.into(),
            normal: cgmath::Matrix3::from(self.rotation).into(),
            handedness: world_matrix.determinant().signum(),
        }
    }

    /// Rotate about `axis` (need not be normalized) by `angle`.
    pub fn rotate(&mut self, axis: cgmath::Vector3<f32>, angle: cgmath::Deg<f32>) {
        if axis.magnitude2() == 0.0 {
            return;
        }
        self.rotation = cgmath::Quaternion::from_axis_angle(axis.normalize(), angle) * self.rotation;
    }
}

impl From<cgmath::Vector3<f32>> for Instance {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is what ends up in the object's uniform buffer.
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    handedness: f32,
}

impl InstanceRaw {
    pub fn model(&self) -> [[f32; 4]; 4] {
        self.model
    }
}
