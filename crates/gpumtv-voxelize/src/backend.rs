//! Occupancy backends.

use std::time::Duration;

use glam::Mat4;
use gpumtv_core::{OccupancyChunk, Result, Sector};

/// Everything a backend needs to render one sector.
#[derive(Clone, Copy, Debug)]
pub struct SectorFrame {
    pub sector: Sector,
    /// Mesh space to the sector's clip space
    pub view_proj: Mat4,
    /// Position of this sector in the run, used as the frame counter
    pub frame_index: u64,
}

/// Computes the occupancy of sectors, possibly several at once.
///
/// Sectors complete in submission order. Callers must not submit while
/// [`in_flight`](Self::in_flight) equals [`max_in_flight`](Self::max_in_flight);
/// they complete the oldest sector first, which is what makes reusing a
/// frame slot safe.
pub trait OccupancyBackend {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Sectors that can be pending at once.
    fn max_in_flight(&self) -> usize;

    /// Sectors submitted but not yet completed.
    fn in_flight(&self) -> usize;

    /// Start computing a sector.
    fn submit(&mut self, frame: &SectorFrame) -> Result<()>;

    /// Wait for the oldest pending sector and copy its occupancy into
    /// `chunk`.
    fn complete_oldest(&mut self, chunk: &mut OccupancyChunk) -> Result<Sector>;

    /// Device time spent rendering the sector most recently completed, if
    /// the backend measures it.
    fn last_device_time(&self) -> Option<Duration> {
        None
    }
}
