//! Core types, math, and grid layout for gpu-mtv.
//!
//! This crate provides the foundational types shared by the loader, the
//! serializer and the voxelization engine:
//! - Mesh vertex layout and bounding boxes
//! - Bounding-box-to-grid projection
//! - Sector decomposition of large grids into hardware-sized chunks
//! - Occupancy chunks and the common error taxonomy

pub mod error;
pub mod math;
pub mod occupancy;
pub mod projection;
pub mod sector;
pub mod types;

pub use error::{Error, Result};
pub use math::Aabb;
pub use occupancy::OccupancyChunk;
pub use projection::{ChunkProjection, ProjectionOptions};
pub use sector::{Sector, SectorGrid, SectorIter, MAX_GRID_RESOLUTION};
pub use types::Vertex;

/// Engine-wide constants
pub mod constants {
    /// Default voxel grid resolution per axis
    pub const DEFAULT_GRID_RESOLUTION: u32 = 256;
    /// Default single-pass chunk resolution per axis
    pub const DEFAULT_CHUNK_RESOLUTION: u32 = 256;
    /// Smallest extent treated as non-degenerate by the projection
    pub const MIN_EXTENT: f32 = 1.0e-6;
    /// Largest chunk resolution whose voxel count still fits a `u32`
    pub const MAX_CHUNK_RESOLUTION: u32 = 1625;
}
