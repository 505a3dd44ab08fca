//! Bounding-box-to-grid projection.
//!
//! The mesh bounding box is mapped into the grid cuboid `[0, G]³` (grid
//! units, one unit per voxel). Per sector only a translation and the fixed
//! chunk-to-clip mapping are applied on top, so the expensive part is
//! computed once per run.

use glam::{Mat4, Vec3};

use crate::constants::MIN_EXTENT;
use crate::{Aabb, Error, Result, Sector};

/// Tunables of the projection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionOptions {
    /// Per-axis scale applied after normalization, each in `(0, 1]`
    pub axis_scale: Vec3,
    /// Multiplier of the depth range, at least 1
    pub depth_scale: f32,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            axis_scale: Vec3::ONE,
            depth_scale: 1.0,
        }
    }
}

impl ProjectionOptions {
    /// Set the per-axis scale.
    #[must_use]
    pub const fn with_axis_scale(mut self, axis_scale: Vec3) -> Self {
        self.axis_scale = axis_scale;
        self
    }

    /// Set the depth-range multiplier.
    #[must_use]
    pub const fn with_depth_scale(mut self, depth_scale: f32) -> Self {
        self.depth_scale = depth_scale;
        self
    }

    /// Check that the options describe a finite, non-degenerate mapping.
    pub fn validate(&self) -> Result<()> {
        let scale = self.axis_scale.to_array();
        if scale.iter().any(|s| !s.is_finite() || *s <= 0.0 || *s > 1.0) {
            return Err(Error::Configuration(format!(
                "axis scale must lie in (0, 1] per axis, got {}",
                self.axis_scale
            )));
        }
        if !self.depth_scale.is_finite() || self.depth_scale < 1.0 {
            return Err(Error::Configuration(format!(
                "depth scale must be at least 1, got {}",
                self.depth_scale
            )));
        }
        Ok(())
    }
}

/// Mapping from mesh space into grid units.
#[derive(Clone, Copy, Debug)]
pub struct ChunkProjection {
    grid_from_world: Mat4,
    scale: Vec3,
    grid_resolution: u32,
}

impl ChunkProjection {
    /// Compute the projection of `bounds` into a grid of `grid_resolution`
    /// voxels per axis.
    ///
    /// The box is centered and scaled uniformly by its largest extent so
    /// voxels stay cubic. The depth range is `max_extent * depth_scale`
    /// instead of the raw box depth, which keeps a flat mesh finite.
    pub fn new(bounds: &Aabb, grid_resolution: u32, options: ProjectionOptions) -> Result<Self> {
        if bounds.is_empty() || !bounds.min.is_finite() || !bounds.max.is_finite() {
            return Err(Error::AssetLoad(
                "mesh bounding box is empty or not finite".to_string(),
            ));
        }
        if grid_resolution == 0 {
            return Err(Error::Configuration(
                "grid resolution must be non-zero".to_string(),
            ));
        }
        options.validate()?;

        let grid = grid_resolution as f32;
        let max_dim = bounds.max_extent().max(MIN_EXTENT);
        let depth_range = max_dim * options.depth_scale;
        let scale = Vec3::new(grid / max_dim, grid / max_dim, grid / depth_range) * options.axis_scale;

        let grid_from_world = Mat4::from_translation(Vec3::splat(grid * 0.5))
            * Mat4::from_scale(scale)
            * Mat4::from_translation(-bounds.center());

        if !grid_from_world.is_finite() {
            return Err(Error::Configuration(format!(
                "projection of {bounds:?} into a {grid_resolution}^3 grid is not finite"
            )));
        }

        Ok(Self {
            grid_from_world,
            scale,
            grid_resolution,
        })
    }

    /// Matrix taking mesh-space points into grid units.
    #[inline]
    pub const fn grid_from_world(&self) -> Mat4 {
        self.grid_from_world
    }

    /// Grid units per mesh unit along each axis.
    #[inline]
    pub const fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Grid resolution this projection was built for
    #[inline]
    pub const fn grid_resolution(&self) -> u32 {
        self.grid_resolution
    }

    /// Project a mesh-space point into grid units.
    #[inline]
    pub fn to_grid(&self, point: Vec3) -> Vec3 {
        self.grid_from_world.transform_point3(point)
    }

    /// Map chunk coordinates `[0, C]³` to Vulkan clip space
    /// (x, y in `[-1, 1]`, z in `[0, 1]`).
    pub fn clip_from_chunk(chunk_resolution: u32) -> Mat4 {
        let c = chunk_resolution.max(1) as f32;
        Mat4::from_translation(Vec3::new(-1.0, -1.0, 0.0))
            * Mat4::from_scale(Vec3::new(2.0 / c, 2.0 / c, 1.0 / c))
    }

    /// Matrix taking mesh-space points into the clip space of one sector.
    pub fn sector_view_proj(&self, sector: &Sector) -> Mat4 {
        Self::clip_from_chunk(sector.resolution())
            * Mat4::from_translation(-sector.start().as_vec3())
            * self.grid_from_world
    }
}
