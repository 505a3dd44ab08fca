//! Run configuration.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use gpumtv_core::constants::{DEFAULT_CHUNK_RESOLUTION, DEFAULT_GRID_RESOLUTION, MAX_CHUNK_RESOLUTION};
use gpumtv_core::{Error, ProjectionOptions, Result, SectorGrid};

/// Diffuse textures a single descriptor array can bind.
pub const MAX_DIFFUSE_TEXTURES: usize = 32;

/// Upper bound on frame slots.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 8;

/// Default bound on a single fence wait.
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// File names of the voxelization program stages inside the shader directory.
pub const VERTEX_SHADER: &str = "voxelize.vert.spv";
pub const GEOMETRY_SHADER: &str = "voxelize.geom.spv";
pub const FRAGMENT_SHADER: &str = "voxelize.frag.spv";

/// Output compression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    /// Run-length encoding (accepted, not implemented)
    Rle,
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "rle" => Ok(Self::Rle),
            other => Err(Error::Configuration(format!(
                "unknown compression method '{other}', available: rle"
            ))),
        }
    }
}

/// Where occupancy is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Vulkan rasterization
    #[default]
    Gpu,
    /// Host reference implementation
    Cpu,
}

/// Paths of the three program stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub geometry: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    /// Stage files inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            vertex: dir.join(VERTEX_SHADER),
            geometry: dir.join(GEOMETRY_SHADER),
            fragment: dir.join(FRAGMENT_SHADER),
        }
    }
}

/// Everything a voxelization run needs to know.
#[derive(Clone, Debug)]
pub struct VoxelizeConfig {
    /// Wavefront OBJ input
    pub input: PathBuf,
    /// `.bvox` output
    pub output: PathBuf,
    /// Directory holding the MTL libraries; defaults to the input's directory
    pub material_dir: Option<PathBuf>,
    /// Voxels per grid axis
    pub grid_resolution: u32,
    /// Voxels per axis rendered in one pass; clamped to the grid resolution
    pub chunk_resolution: u32,
    /// Morton-order the output (accepted, not implemented)
    pub morton: bool,
    pub compression: Compression,
    /// Sectors rendered concurrently; 1 is fully synchronous
    pub frames_in_flight: u32,
    /// Bound on every fence wait
    pub fence_timeout: Duration,
    /// Directory of the precompiled SPIR-V stages
    pub shader_dir: PathBuf,
    pub projection: ProjectionOptions,
    /// Request Vulkan validation layers
    pub validation: bool,
    pub backend: BackendKind,
}

impl Default for VoxelizeConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            material_dir: None,
            grid_resolution: DEFAULT_GRID_RESOLUTION,
            chunk_resolution: DEFAULT_CHUNK_RESOLUTION,
            morton: false,
            compression: Compression::None,
            frames_in_flight: 1,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
            shader_dir: PathBuf::from("shaders"),
            projection: ProjectionOptions::default(),
            validation: false,
            backend: BackendKind::Gpu,
        }
    }
}

impl VoxelizeConfig {
    /// Configuration converting `input` into `output` with default settings.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_grid_resolution(mut self, resolution: u32) -> Self {
        self.grid_resolution = resolution;
        self
    }

    #[must_use]
    pub const fn with_chunk_resolution(mut self, resolution: u32) -> Self {
        self.chunk_resolution = resolution;
        self
    }

    #[must_use]
    pub fn with_material_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.material_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    #[must_use]
    pub const fn with_fence_timeout(mut self, timeout: Duration) -> Self {
        self.fence_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_depth_scale(mut self, depth_scale: f32) -> Self {
        self.projection = self.projection.with_depth_scale(depth_scale);
        self
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Chunk resolution actually used: never larger than the grid.
    pub fn effective_chunk_resolution(&self) -> u32 {
        self.chunk_resolution.min(self.grid_resolution)
    }

    /// Directory MTL libraries are resolved against.
    pub fn resolved_material_dir(&self) -> PathBuf {
        self.material_dir.clone().unwrap_or_else(|| {
            self.input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }

    /// Sector layout of this run.
    pub fn sector_grid(&self) -> Result<SectorGrid> {
        SectorGrid::new(self.grid_resolution, self.effective_chunk_resolution())
    }

    pub fn shader_paths(&self) -> ShaderPaths {
        ShaderPaths::in_dir(&self.shader_dir)
    }

    /// Check everything that can be checked before touching the GPU.
    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(Error::Configuration("no input file specified".to_string()));
        }
        let is_obj = self
            .input
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("obj"));
        if !is_obj {
            return Err(Error::Configuration(format!(
                "input file must be an .obj file: {}",
                self.input.display()
            )));
        }
        if !self.input.is_file() {
            return Err(Error::Configuration(format!(
                "input file does not exist: {}",
                self.input.display()
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::Configuration("no output file specified".to_string()));
        }
        if let Some(dir) = &self.material_dir {
            if !dir.is_dir() {
                return Err(Error::Configuration(format!(
                    "material directory is not a directory: {}",
                    dir.display()
                )));
            }
        }

        if self.grid_resolution == 0 || self.chunk_resolution == 0 {
            return Err(Error::Configuration(
                "grid and chunk resolution must be non-zero".to_string(),
            ));
        }
        let chunk = self.effective_chunk_resolution();
        if chunk > MAX_CHUNK_RESOLUTION {
            return Err(Error::Configuration(format!(
                "chunk resolution {chunk} exceeds {MAX_CHUNK_RESOLUTION}"
            )));
        }
        self.sector_grid()?;

        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Configuration(format!(
                "frames in flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.fence_timeout.is_zero() {
            return Err(Error::Configuration(
                "fence timeout must be non-zero".to_string(),
            ));
        }
        self.projection.validate()
    }

    /// Check the chunk resolution against the device's 3D image limit.
    pub fn check_device_limits(&self, max_image_dimension_3d: u32) -> Result<()> {
        let chunk = self.effective_chunk_resolution();
        if chunk > max_image_dimension_3d {
            return Err(Error::Configuration(format!(
                "chunk resolution {chunk} exceeds the device's 3D image limit {max_image_dimension_3d}; \
                 pass a smaller --chunk"
            )));
        }
        Ok(())
    }
}

/// Fail if more diffuse textures are referenced than can be bound.
pub fn check_descriptor_capacity(texture_count: usize) -> Result<()> {
    if texture_count > MAX_DIFFUSE_TEXTURES {
        return Err(Error::Configuration(format!(
            "mesh references {texture_count} diffuse textures, at most {MAX_DIFFUSE_TEXTURES} are supported"
        )));
    }
    Ok(())
}
