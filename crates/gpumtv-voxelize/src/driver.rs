//! Sector iteration: drives a backend over every sector and streams the
//! chunks into the output file.

use std::time::{Duration, Instant};

use gpumtv_bvox::BvoxWriter;
use gpumtv_core::{
    Aabb, ChunkProjection, Error, OccupancyChunk, ProjectionOptions, Result, Sector, SectorGrid,
};
use tracing::{debug, info, trace, trace_span};

use crate::backend::{OccupancyBackend, SectorFrame};

/// Projection and sector layout of one run.
#[derive(Clone, Copy, Debug)]
pub struct VoxelizePlan {
    pub grid: SectorGrid,
    pub projection: ChunkProjection,
}

impl VoxelizePlan {
    pub const fn new(grid: SectorGrid, projection: ChunkProjection) -> Self {
        Self { grid, projection }
    }

    /// Plan a run over a mesh with the given bounds.
    pub fn for_bounds(
        bounds: &Aabb,
        grid_resolution: u32,
        chunk_resolution: u32,
        options: ProjectionOptions,
    ) -> Result<Self> {
        let grid = SectorGrid::new(grid_resolution, chunk_resolution)?;
        let projection = ChunkProjection::new(bounds, grid_resolution, options)?;
        Ok(Self { grid, projection })
    }

    /// Per-sector render data.
    pub fn frame(&self, sector: Sector, frame_index: u64) -> SectorFrame {
        SectorFrame {
            sector,
            view_proj: self.projection.sector_view_proj(&sector),
            frame_index,
        }
    }
}

/// Per-sector device render times of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceTimeStats {
    pub samples: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl DeviceTimeStats {
    fn first(sample: Duration) -> Self {
        Self {
            samples: 1,
            total: sample,
            min: sample,
            max: sample,
        }
    }

    fn record(&mut self, sample: Duration) {
        self.samples += 1;
        self.total += sample;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    pub fn mean(&self) -> Duration {
        let nanos = self.total.as_nanos() / u128::from(self.samples.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub sectors: u64,
    pub occupied_voxels: u64,
    pub bytes_written: u64,
    pub elapsed: Duration,
    /// `None` when the backend does not measure device time
    pub device_time: Option<DeviceTimeStats>,
}

/// Render every sector of `plan` with `backend` and append the chunks to
/// `output` in sector order.
///
/// Before submitting into a full pipeline the oldest sector is completed,
/// so a frame slot is never reused while its previous sector is pending.
pub fn voxelize<B: OccupancyBackend + ?Sized>(
    backend: &mut B,
    plan: &VoxelizePlan,
    output: &mut BvoxWriter,
) -> Result<RunSummary> {
    let start = Instant::now();
    let grid = plan.grid;

    info!(
        backend = backend.name(),
        grid = grid.grid_resolution(),
        chunk = grid.chunk_resolution(),
        sectors = grid.sector_count(),
        frames_in_flight = backend.max_in_flight(),
        "Voxelizing"
    );

    let mut drain = Drain {
        chunk: OccupancyChunk::new(grid.chunk_resolution()),
        next_index: 0,
        occupied_voxels: 0,
        device_time: None,
    };

    for sector in &grid {
        let _span = trace_span!("sector", index = sector.index()).entered();

        while backend.in_flight() >= backend.max_in_flight() {
            drain.complete_one(backend, output)?;
        }

        trace!(start = %sector.start(), end = %sector.end(), "Submitting");
        backend.submit(&plan.frame(sector, sector.index()))?;
    }

    while backend.in_flight() > 0 {
        drain.complete_one(backend, output)?;
    }

    let summary = RunSummary {
        sectors: drain.next_index,
        occupied_voxels: drain.occupied_voxels,
        bytes_written: output.bytes_written(),
        elapsed: start.elapsed(),
        device_time: drain.device_time,
    };

    info!(
        sectors = summary.sectors,
        occupied = summary.occupied_voxels,
        bytes = summary.bytes_written,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Voxelization complete"
    );
    if let Some(stats) = summary.device_time {
        info!(
            samples = stats.samples,
            mean_us = stats.mean().as_micros() as u64,
            min_us = stats.min.as_micros() as u64,
            max_us = stats.max.as_micros() as u64,
            "Device render time per sector"
        );
    }

    Ok(summary)
}

/// Completion side of the loop: the reused host chunk plus counters.
struct Drain {
    chunk: OccupancyChunk,
    next_index: u64,
    occupied_voxels: u64,
    device_time: Option<DeviceTimeStats>,
}

impl Drain {
    fn complete_one<B: OccupancyBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        output: &mut BvoxWriter,
    ) -> Result<()> {
        let sector = backend.complete_oldest(&mut self.chunk)?;
        if sector.index() != self.next_index {
            return Err(Error::InvalidData(format!(
                "backend completed sector {} out of order, expected {}",
                sector.index(),
                self.next_index
            )));
        }

        let occupied = self.chunk.occupied_count();
        output.append_chunk(&self.chunk)?;

        if let Some(sample) = backend.last_device_time() {
            trace!(index = sector.index(), device_us = sample.as_micros() as u64, "Sector timed");
            match &mut self.device_time {
                Some(stats) => stats.record(sample),
                None => self.device_time = Some(DeviceTimeStats::first(sample)),
            }
        }

        debug!(index = sector.index(), occupied, "Sector written");
        self.occupied_voxels += occupied;
        self.next_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec3;
    use gpumtv_bvox::{BvoxHeader, BvoxReader};
    use std::collections::VecDeque;
    use std::path::PathBuf;

    /// Backend filling each chunk with its sector index, recording the
    /// maximum concurrency it saw.
    struct EchoBackend {
        slots: usize,
        pending: VecDeque<Sector>,
        peak: usize,
        submitted: Vec<u64>,
    }

    impl EchoBackend {
        fn new(slots: usize) -> Self {
            Self {
                slots,
                pending: VecDeque::new(),
                peak: 0,
                submitted: Vec::new(),
            }
        }
    }

    impl OccupancyBackend for EchoBackend {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn max_in_flight(&self) -> usize {
            self.slots
        }

        fn in_flight(&self) -> usize {
            self.pending.len()
        }

        fn submit(&mut self, frame: &SectorFrame) -> Result<()> {
            assert!(self.pending.len() < self.slots, "submitted into a full pipeline");
            assert!(frame.view_proj.is_finite());
            self.pending.push_back(frame.sector);
            self.submitted.push(frame.frame_index);
            self.peak = self.peak.max(self.pending.len());
            Ok(())
        }

        fn complete_oldest(&mut self, chunk: &mut OccupancyChunk) -> Result<Sector> {
            let sector = self.pending.pop_front().expect("nothing in flight");
            chunk.as_bytes_mut().fill(sector.index() as u8 + 1);
            Ok(sector)
        }
    }

    fn plan(grid: u32, chunk: u32) -> VoxelizePlan {
        let bounds = Aabb::new(glam::Vec3::ZERO, glam::Vec3::ONE);
        VoxelizePlan::for_bounds(&bounds, grid, chunk, ProjectionOptions::default()).unwrap()
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gpumtv-driver-{}-{name}.bvox", std::process::id()))
    }

    fn run_with(slots: usize, name: &str) -> (RunSummary, Vec<u8>, EchoBackend) {
        let plan = plan(8, 2);
        let path = temp_path(name);
        let mut writer = BvoxWriter::create(&path, BvoxHeader::for_grid(&plan.grid).unwrap()).unwrap();
        let mut backend = EchoBackend::new(slots);

        let summary = voxelize(&mut backend, &plan, &mut writer).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(path).ok();
        (summary, bytes, backend)
    }

    #[test]
    fn writes_sectors_in_order() {
        let (summary, bytes, backend) = run_with(1, "sync");
        assert_eq!(summary.sectors, 64);
        assert_eq!(summary.occupied_voxels, 64 * 8);
        assert_eq!(bytes.len() as u64, summary.bytes_written);
        assert_eq!(backend.peak, 1);
        assert_eq!(summary.device_time, None);

        for (index, chunk) in bytes[9..].chunks_exact(8).enumerate() {
            assert!(chunk.iter().all(|&b| b == index as u8 + 1));
        }
    }

    #[test]
    fn pipelined_run_is_output_equivalent() {
        let (_, sync_bytes, _) = run_with(1, "pipe-1");
        let (summary, pipelined_bytes, backend) = run_with(3, "pipe-3");

        assert_eq!(backend.peak, 3);
        assert_eq!(backend.submitted, (0..64).collect::<Vec<_>>());
        assert_eq!(summary.sectors, 64);
        assert_eq!(sync_bytes, pipelined_bytes);
    }

    #[test]
    fn reconstructs_after_run() {
        let plan = plan(4, 2);
        let path = temp_path("reconstruct");
        let mut writer = BvoxWriter::create(&path, BvoxHeader::for_grid(&plan.grid).unwrap()).unwrap();
        voxelize(&mut EchoBackend::new(2), &plan, &mut writer).unwrap();

        let voxels = BvoxReader::open(&path)
            .unwrap()
            .reconstruct_grid(&plan.grid)
            .unwrap();
        // Voxel (3, 0, 0) lives in sector (1, 0, 0)
        assert_eq!(voxels[3], 2);
        // Voxel (0, 0, 3) lives in sector (0, 0, 1) = index 4
        assert_eq!(voxels[3 * 16], 5);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn out_of_order_completion_is_rejected() {
        struct Reversed(Vec<Sector>);

        impl OccupancyBackend for Reversed {
            fn name(&self) -> &'static str {
                "reversed"
            }
            fn max_in_flight(&self) -> usize {
                2
            }
            fn in_flight(&self) -> usize {
                self.0.len()
            }
            fn submit(&mut self, frame: &SectorFrame) -> Result<()> {
                self.0.push(frame.sector);
                Ok(())
            }
            fn complete_oldest(&mut self, _chunk: &mut OccupancyChunk) -> Result<Sector> {
                Ok(self.0.pop().unwrap())
            }
        }

        let plan = plan(4, 2);
        let path = temp_path("reversed");
        let mut writer = BvoxWriter::create(&path, BvoxHeader::for_grid(&plan.grid).unwrap()).unwrap();
        let result = voxelize(&mut Reversed(Vec::new()), &plan, &mut writer);
        assert!(matches!(result, Err(Error::InvalidData(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn frame_maps_sector_onto_clip_volume() {
        let bounds = Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0));
        let plan = VoxelizePlan::for_bounds(&bounds, 8, 4, ProjectionOptions::default()).unwrap();

        // Sector (1, 0, 1) covers grid [4, 8) x [0, 4) x [4, 8), i.e. mesh
        // [0, 2] x [-2, 0] x [0, 2]
        let sector = plan.grid.sector_at(glam::UVec3::new(1, 0, 1)).unwrap();
        let frame = plan.frame(sector, 5);
        assert_eq!(frame.frame_index, 5);

        let low = frame.view_proj.project_point3(Vec3::new(0.0, -2.0, 0.0));
        let high = frame.view_proj.project_point3(Vec3::new(2.0, 0.0, 2.0));
        for (actual, expected) in [(low, [-1.0, -1.0, 0.0]), (high, [1.0, 1.0, 1.0])] {
            for axis in 0..3 {
                assert_relative_eq!(actual[axis], expected[axis], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn device_times_are_aggregated() {
        /// Sector `i` takes `i + 1` microseconds on the device.
        struct Timed {
            pending: VecDeque<Sector>,
            last: Option<Duration>,
        }

        impl OccupancyBackend for Timed {
            fn name(&self) -> &'static str {
                "timed"
            }
            fn max_in_flight(&self) -> usize {
                2
            }
            fn in_flight(&self) -> usize {
                self.pending.len()
            }
            fn submit(&mut self, frame: &SectorFrame) -> Result<()> {
                self.pending.push_back(frame.sector);
                Ok(())
            }
            fn complete_oldest(&mut self, _chunk: &mut OccupancyChunk) -> Result<Sector> {
                let sector = self.pending.pop_front().unwrap();
                self.last = Some(Duration::from_micros(sector.index() + 1));
                Ok(sector)
            }
            fn last_device_time(&self) -> Option<Duration> {
                self.last
            }
        }

        let plan = plan(4, 2);
        let path = temp_path("timed");
        let mut writer = BvoxWriter::create(&path, BvoxHeader::for_grid(&plan.grid).unwrap()).unwrap();
        let mut backend = Timed {
            pending: VecDeque::new(),
            last: None,
        };
        let summary = voxelize(&mut backend, &plan, &mut writer).unwrap();
        std::fs::remove_file(path).ok();

        let stats = summary.device_time.unwrap();
        assert_eq!(stats.samples, 8);
        assert_eq!(stats.min, Duration::from_micros(1));
        assert_eq!(stats.max, Duration::from_micros(8));
        assert_eq!(stats.total, Duration::from_micros(36));
        assert_eq!(stats.mean(), Duration::from_nanos(4500));
    }
}
