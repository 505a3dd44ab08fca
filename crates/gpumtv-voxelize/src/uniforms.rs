//! GPU-visible per-sector data.

use glam::Mat4;
use gpumtv_core::Sector;

/// Push constants of the voxelization program.
///
/// This structure must match the block shared by all three stages:
/// ```glsl
/// layout(push_constant) uniform PushConstants {
///     mat4 view_proj;     // 64 bytes
///     vec2 resolution;    // 8 bytes
///     uint frame;         // 4 bytes
/// } pc;
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VoxelizePushConstants {
    /// Mesh space to the sector's clip space, column-major.
    pub view_proj: [[f32; 4]; 4],
    /// Chunk resolution on x and y (the viewport size).
    pub resolution: [f32; 2],
    /// Monotonic sector counter.
    pub frame: u32,
    /// Padding to a 16-byte multiple.
    pub _padding: u32,
}

impl VoxelizePushConstants {
    /// Size in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(view_proj: Mat4, chunk_resolution: u32, frame: u32) -> Self {
        let res = chunk_resolution as f32;
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            resolution: [res, res],
            frame,
            _padding: 0,
        }
    }
}

/// Uniform buffer contents (set 0, binding 0).
///
/// ```glsl
/// layout(set = 0, binding = 0) uniform SectorUniforms {
///     uvec4 sector_start;
///     uvec4 sector_end;
///     vec4 chunk_res;
/// };
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SectorUniforms {
    /// First grid voxel of the sector (w unused).
    pub sector_start: [u32; 4],
    /// One past the last grid voxel (w unused).
    pub sector_end: [u32; 4],
    /// Chunk resolution in all three components, w = 1.
    pub chunk_res: [f32; 4],
}

impl SectorUniforms {
    /// Size in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn for_sector(sector: &Sector) -> Self {
        let start = sector.start();
        let end = sector.end();
        let res = sector.resolution() as f32;
        Self {
            sector_start: [start.x, start.y, start.z, 0],
            sector_end: [end.x, end.y, end.z, 0],
            chunk_res: [res, res, res, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpumtv_core::SectorGrid;

    #[test]
    fn push_constants_layout() {
        assert_eq!(VoxelizePushConstants::SIZE, 80);
        assert!(VoxelizePushConstants::SIZE <= 128, "exceeds guaranteed push constant space");
        assert_eq!(std::mem::offset_of!(VoxelizePushConstants, view_proj), 0);
        assert_eq!(std::mem::offset_of!(VoxelizePushConstants, resolution), 64);
        assert_eq!(std::mem::offset_of!(VoxelizePushConstants, frame), 72);
    }

    #[test]
    fn uniforms_layout() {
        assert_eq!(SectorUniforms::SIZE, 48);
        assert_eq!(std::mem::offset_of!(SectorUniforms, sector_start), 0);
        assert_eq!(std::mem::offset_of!(SectorUniforms, sector_end), 16);
        assert_eq!(std::mem::offset_of!(SectorUniforms, chunk_res), 32);
    }

    #[test]
    fn uniforms_for_sector() {
        let grid = SectorGrid::new(16, 4).unwrap();
        let sector = grid.sector(grid.linear_index(glam::UVec3::new(1, 2, 3))).unwrap();
        let uniforms = SectorUniforms::for_sector(&sector);
        assert_eq!(uniforms.sector_start, [4, 8, 12, 0]);
        assert_eq!(uniforms.sector_end, [8, 12, 16, 0]);
        assert_eq!(uniforms.chunk_res, [4.0, 4.0, 4.0, 1.0]);
    }

    #[test]
    fn push_constants_carry_matrix() {
        let matrix = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let pc = VoxelizePushConstants::new(matrix, 64, 7);
        assert_eq!(pc.view_proj[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(pc.resolution, [64.0, 64.0]);
        assert_eq!(pc.frame, 7);
    }
}
