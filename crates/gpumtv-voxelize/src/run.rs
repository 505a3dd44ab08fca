//! End-to-end conversion of one OBJ file.

use gpumtv_bvox::{BvoxHeader, BvoxWriter};
use gpumtv_core::Result;
use gpumtv_gpu::GpuContextBuilder;
use gpumtv_mesh::load_obj;
use tracing::{info, warn};

use crate::config::{check_descriptor_capacity, BackendKind, Compression, VoxelizeConfig};
use crate::driver::{voxelize, RunSummary, VoxelizePlan};
use crate::gpu::GpuVoxelizer;
use crate::reference::CpuVoxelizer;

/// Load, voxelize and serialize according to `config`.
///
/// The output header is written before the first sector renders; every
/// failure after that leaves a header plus the chunks completed so far.
pub fn run(config: &VoxelizeConfig) -> Result<RunSummary> {
    config.validate()?;

    if config.morton {
        warn!("Morton ordering is not supported, writing linear order");
    }
    if config.compression == Compression::Rle {
        warn!("RLE compression is not supported, writing uncompressed chunks");
    }
    if config.chunk_resolution > config.grid_resolution {
        info!(
            requested = config.chunk_resolution,
            used = config.grid_resolution,
            "Chunk resolution clamped to grid resolution"
        );
    }

    let material_dir = config.resolved_material_dir();
    let mesh = load_obj(&config.input, Some(&material_dir))?;
    check_descriptor_capacity(mesh.diffuse_textures().len())?;

    let grid = config.sector_grid()?;
    let plan = VoxelizePlan::for_bounds(
        &mesh.bounds,
        grid.grid_resolution(),
        grid.chunk_resolution(),
        config.projection,
    )?;

    match config.backend {
        BackendKind::Gpu => {
            let ctx = GpuContextBuilder::new()
                .validation(config.validation)
                .build()?;
            info!(device = %ctx.capabilities().summary(), "Using GPU");
            config.check_device_limits(ctx.capabilities().max_image_dimension_3d)?;

            let mut backend = GpuVoxelizer::new(&ctx, &mesh, config)?;
            let mut writer = BvoxWriter::create(&config.output, BvoxHeader::for_grid(&grid)?)?;
            voxelize(&mut backend, &plan, &mut writer)
        }
        BackendKind::Cpu => {
            let mut backend = CpuVoxelizer::new(&mesh, grid.chunk_resolution())
                .with_frames_in_flight(config.frames_in_flight as usize);
            let mut writer = BvoxWriter::create(&config.output, BvoxHeader::for_grid(&grid)?)?;
            voxelize(&mut backend, &plan, &mut writer)
        }
    }
}
