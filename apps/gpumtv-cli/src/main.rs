//! gpu-mtv: GPU mesh to voxel converter
//!
//! Converts a Wavefront OBJ mesh into a `.bvox` occupancy grid by
//! rasterizing it one sector at a time.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -p gpumtv-cli -- [OPTIONS] -i <INPUT.obj> -o <OUTPUT.bvox>
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # 256³ grid in a single sector
//! cargo run --release -p gpumtv-cli -- -i bunny.obj -o bunny.bvox
//!
//! # 1024³ grid rendered as 64 sectors of 256³, two in flight
//! cargo run --release -p gpumtv-cli -- -r 1024 --chunk 256 --frames-in-flight 2 \
//!     -i sponza/sponza.obj -z sponza -o sponza.bvox
//!
//! # Without a Vulkan device
//! cargo run --release -p gpumtv-cli -- --cpu -r 128 -i bunny.obj -o bunny.bvox
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod args;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::args::{parse_args, print_help, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(Command::Convert(config)) => config,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Err(error) => {
            print_help();
            return Err(error.into());
        }
    };

    info!(
        grid = config.grid_resolution,
        chunk = config.effective_chunk_resolution(),
        input = %config.input.display(),
        output = %config.output.display(),
        materials = %config.resolved_material_dir().display(),
        morton = config.morton,
        compression = ?config.compression,
        backend = ?config.backend,
        "Voxelization parameters"
    );

    let summary = gpumtv_voxelize::run(&config)
        .with_context(|| format!("failed to voxelize {}", config.input.display()))?;

    info!(
        sectors = summary.sectors,
        occupied = summary.occupied_voxels,
        "Wrote {} ({} bytes) in {:.2?}",
        config.output.display(),
        summary.bytes_written,
        summary.elapsed
    );
    Ok(())
}
