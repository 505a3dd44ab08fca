//! Sector-chunked voxelization engine for gpu-mtv.
//!
//! A mesh is projected onto a cubic grid of `G³` voxels which is rendered
//! one `C³` sector at a time, so grids far larger than a single GPU image
//! can be produced. Sectors are visited in z-major order and streamed to a
//! `.bvox` file as they complete.
//!
//! Two backends compute sector occupancy:
//! - [`GpuVoxelizer`]: attachment-less Vulkan rasterization into a 3D
//!   storage image, with a configurable number of frames in flight
//! - [`CpuVoxelizer`]: a rayon-parallel host reference

pub mod backend;
pub mod config;
pub mod driver;
pub mod frame;
pub mod gpu;
pub mod reference;
pub mod run;
pub mod uniforms;

pub use backend::{OccupancyBackend, SectorFrame};
pub use config::{BackendKind, Compression, ShaderPaths, VoxelizeConfig};
pub use driver::{voxelize, DeviceTimeStats, RunSummary, VoxelizePlan};
pub use frame::{FrameState, FrameTracker};
pub use gpu::{GpuVoxelizer, TargetFormat};
pub use reference::CpuVoxelizer;
pub use run::run;
pub use uniforms::{SectorUniforms, VoxelizePushConstants};
