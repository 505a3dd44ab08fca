//! Core mesh types.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// A mesh vertex as uploaded to the GPU.
///
/// The layout matches the vertex input of the voxelization program:
/// position, normal and color at locations 0..2, uv at 3, material id at 4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Diffuse color of the owning material (RGB, 0.0-1.0)
    pub color: [f32; 3],
    /// Texture coordinate, v already flipped for Vulkan
    pub uv: [f32; 2],
    /// Index into the mesh material table, or [`Vertex::NO_MATERIAL`]
    pub material_id: u32,
}

impl Vertex {
    /// Material id of faces without a material assignment
    pub const NO_MATERIAL: u32 = u32::MAX;

    /// Size in bytes (stride of the vertex buffer).
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Default color for faces without a material.
    pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

    /// Position as a glam vector.
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Returns true if the vertex references a material
    #[inline]
    pub const fn has_material(&self) -> bool {
        self.material_id != Self::NO_MATERIAL
    }
}
