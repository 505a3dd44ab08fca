//! Command line parsing.

use std::time::Duration;

use gpumtv_core::{Error, Result};
use gpumtv_voxelize::{BackendKind, Compression, VoxelizeConfig};
use tracing::warn;

/// What the command line asks for.
#[derive(Debug)]
pub enum Command {
    Help,
    Convert(VoxelizeConfig),
}

/// Parse `args`, where `args[0]` is the program name.
///
/// Unknown flags and missing or malformed values are configuration errors;
/// file checks are left to [`VoxelizeConfig::validate`].
pub fn parse_args(args: &[String]) -> Result<Command> {
    let mut config = VoxelizeConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || next_value(args, &mut i, flag);

        match flag {
            "-h" | "--help" => return Ok(Command::Help),
            "-r" | "--resolution" => config.grid_resolution = parse_number(flag, value()?)?,
            "--chunk" => config.chunk_resolution = parse_number(flag, value()?)?,
            "-z" | "--materials" => config.material_dir = Some(value()?.into()),
            "-i" | "--input" => config.input = value()?.into(),
            "-o" | "--output" => config.output = value()?.into(),
            "-m" | "--morton" => config.morton = true,
            "-c" | "--compression" => config.compression = value()?.parse::<Compression>()?,
            "-t" | "--textures" => warn!("Texture palettes are not supported, ignoring {flag}"),
            "--frames-in-flight" => config.frames_in_flight = parse_number(flag, value()?)?,
            "--fence-timeout-ms" => {
                config.fence_timeout = Duration::from_millis(parse_number(flag, value()?)?);
            }
            "--shader-dir" => config.shader_dir = value()?.into(),
            "--depth-scale" => {
                let scale: f32 = parse_number(flag, value()?)?;
                config.projection = config.projection.with_depth_scale(scale);
            }
            "--validation" => config.validation = true,
            "--cpu" => config.backend = BackendKind::Cpu,
            other => {
                return Err(Error::Configuration(format!(
                    "unknown argument '{other}', see --help"
                )))
            }
        }
        i += 1;
    }

    Ok(Command::Convert(config))
}

/// Consume the argument following the flag at `*i`.
fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| Error::Configuration(format!("{flag} expects a value")))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Configuration(format!("{flag}: '{value}' is not a valid number")))
}

pub fn print_help() {
    eprintln!(
        "gpu-mtv: convert a triangle mesh into a binary voxel grid

USAGE:
    gpu-mtv [OPTIONS] -i <INPUT.obj> -o <OUTPUT.bvox>

OPTIONS:
    -h, --help                  Print this help message
    -r, --resolution <N>        Voxel grid resolution per axis (default: 256)
    --chunk <N>                 Sector resolution per axis, must divide the grid
                                resolution (default: 256, clamped to the grid)
    -z, --materials <DIR>       Directory holding the .mtl libraries
                                Default: directory of the input file
    -i, --input <FILE>          Wavefront OBJ input
    -o, --output <FILE>         Output .bvox file
    -m, --morton                Morton encode the output (accepted, not supported)
    -c, --compression <METHOD>  Compression method, available: [rle] (accepted, not supported)
    -t, --textures              Use textures and generate a color palette (not supported)

ENGINE OPTIONS:
    --frames-in-flight <N>      Sectors rendered concurrently, 1-8 (default: 1)
    --fence-timeout-ms <MS>     Bound on each GPU wait (default: 10000)
    --shader-dir <DIR>          Directory with voxelize.{{vert,geom,frag}}.spv
                                Default: shaders
    --depth-scale <S>           Divide the depth axis scale by S >= 1 (default: 1)
    --validation                Enable Vulkan validation layers
    --cpu                       Voxelize on the CPU instead of the GPU

ENVIRONMENT VARIABLES:
    RUST_LOG                    Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("gpu-mtv")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    fn convert(list: &[&str]) -> VoxelizeConfig {
        match parse_args(&args(list)).unwrap() {
            Command::Convert(config) => config,
            Command::Help => panic!("expected a conversion"),
        }
    }

    #[test]
    fn defaults() {
        let config = convert(&["-i", "mesh.obj", "-o", "mesh.bvox"]);
        assert_eq!(config.input.to_str(), Some("mesh.obj"));
        assert_eq!(config.output.to_str(), Some("mesh.bvox"));
        assert_eq!(config.grid_resolution, 256);
        assert_eq!(config.chunk_resolution, 256);
        assert_eq!(config.frames_in_flight, 1);
        assert_eq!(config.backend, BackendKind::Gpu);
        assert!(!config.morton);
        assert_eq!(config.compression, Compression::None);
        assert!(config.material_dir.is_none());
    }

    #[test]
    fn all_flags() {
        let config = convert(&[
            "-r", "1024", "--chunk", "256", "-z", "mats", "-i", "in.obj", "-o", "out.bvox", "-m",
            "-c", "rle", "-t", "--frames-in-flight", "3", "--fence-timeout-ms", "2500",
            "--shader-dir", "spv", "--depth-scale", "2", "--validation", "--cpu",
        ]);

        assert_eq!(config.grid_resolution, 1024);
        assert_eq!(config.chunk_resolution, 256);
        assert_eq!(config.material_dir.as_deref().and_then(|p| p.to_str()), Some("mats"));
        assert!(config.morton);
        assert_eq!(config.compression, Compression::Rle);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.fence_timeout, Duration::from_millis(2500));
        assert_eq!(config.shader_dir.to_str(), Some("spv"));
        assert!((config.projection.depth_scale - 2.0).abs() < f32::EPSILON);
        assert!(config.validation);
        assert_eq!(config.backend, BackendKind::Cpu);
    }

    #[test]
    fn help_wins() {
        assert!(matches!(
            parse_args(&args(&["-r", "64", "-h"])).unwrap(),
            Command::Help
        ));
    }

    #[test]
    fn rejects_bad_input() {
        for bad in [
            &["-r"][..],
            &["-r", "lots"],
            &["-c", "zip"],
            &["--unknown"],
            &["--depth-scale", "deep"],
        ] {
            assert!(
                matches!(parse_args(&args(bad)), Err(Error::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
