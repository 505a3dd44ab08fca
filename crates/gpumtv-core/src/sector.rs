//! Decomposition of the voxel grid into hardware-sized sectors.
//!
//! A grid of `G` voxels per axis is split into `(G / C)³` sectors of `C`
//! voxels per axis. Sectors are visited in z-major order: z outermost, then
//! y, x innermost, i.e. `index = x + n * (y + n * z)` with `n = G / C`.
//! This is the same order as voxels inside a chunk and fixes the layout of
//! the `.bvox` payload.

use glam::UVec3;

use crate::{Error, Result};

/// Largest grid resolution accepted; `G³` then still fits in a `u64`.
pub const MAX_GRID_RESOLUTION: u32 = 1 << 21;

/// One chunk of the grid, rendered in a single pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Sector {
    coord: UVec3,
    index: u64,
    resolution: u32,
}

impl Sector {
    /// Sector coordinate in `[0, sectors_per_axis)` per axis.
    #[inline]
    pub const fn coord(&self) -> UVec3 {
        self.coord
    }

    /// Position in the visitation order.
    #[inline]
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Chunk resolution `C`
    #[inline]
    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    /// First voxel covered by this sector, in grid units (inclusive).
    #[inline]
    pub fn start(&self) -> UVec3 {
        self.coord * self.resolution
    }

    /// End of the covered range in grid units (exclusive).
    #[inline]
    pub fn end(&self) -> UVec3 {
        (self.coord + UVec3::ONE) * self.resolution
    }

    /// Returns true if the grid voxel lies in `[start, end)`.
    #[inline]
    pub fn contains(&self, voxel: UVec3) -> bool {
        voxel.cmpge(self.start()).all() && voxel.cmplt(self.end()).all()
    }
}

/// Sector layout of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectorGrid {
    grid_resolution: u32,
    chunk_resolution: u32,
    sectors_per_axis: u32,
}

impl SectorGrid {
    /// Split a `grid_resolution³` grid into chunks of `chunk_resolution³`.
    ///
    /// Both must be non-zero, the grid resolution at most
    /// [`MAX_GRID_RESOLUTION`], and the chunk resolution must divide the grid
    /// resolution evenly.
    pub fn new(grid_resolution: u32, chunk_resolution: u32) -> Result<Self> {
        if grid_resolution == 0 || chunk_resolution == 0 {
            return Err(Error::Configuration(format!(
                "grid ({grid_resolution}) and chunk ({chunk_resolution}) resolution must be non-zero"
            )));
        }
        if grid_resolution > MAX_GRID_RESOLUTION {
            return Err(Error::Configuration(format!(
                "grid resolution {grid_resolution} exceeds {MAX_GRID_RESOLUTION}"
            )));
        }
        if grid_resolution % chunk_resolution != 0 {
            return Err(Error::Configuration(format!(
                "chunk resolution {chunk_resolution} does not divide grid resolution {grid_resolution}"
            )));
        }

        Ok(Self {
            grid_resolution,
            chunk_resolution,
            sectors_per_axis: grid_resolution / chunk_resolution,
        })
    }

    /// Grid resolution `G`
    #[inline]
    pub const fn grid_resolution(&self) -> u32 {
        self.grid_resolution
    }

    /// Chunk resolution `C`
    #[inline]
    pub const fn chunk_resolution(&self) -> u32 {
        self.chunk_resolution
    }

    /// `G / C`
    #[inline]
    pub const fn sectors_per_axis(&self) -> u32 {
        self.sectors_per_axis
    }

    /// Total number of sectors, `(G / C)³`.
    #[inline]
    pub const fn sector_count(&self) -> u64 {
        let n = self.sectors_per_axis as u64;
        n * n * n
    }

    /// Voxels (and bytes) per chunk, `C³`.
    #[inline]
    pub const fn chunk_voxel_count(&self) -> u64 {
        let c = self.chunk_resolution as u64;
        c * c * c
    }

    /// Voxels in the whole grid, `G³`.
    #[inline]
    pub const fn grid_voxel_count(&self) -> u64 {
        let g = self.grid_resolution as u64;
        g * g * g
    }

    /// Linear visitation index of a sector coordinate.
    #[inline]
    pub fn linear_index(&self, coord: UVec3) -> u64 {
        let n = u64::from(self.sectors_per_axis);
        u64::from(coord.x) + n * (u64::from(coord.y) + n * u64::from(coord.z))
    }

    /// Sector at a visitation index.
    pub fn sector(&self, index: u64) -> Option<Sector> {
        if index >= self.sector_count() {
            return None;
        }
        let n = u64::from(self.sectors_per_axis);
        let coord = UVec3::new(
            (index % n) as u32,
            ((index / n) % n) as u32,
            (index / (n * n)) as u32,
        );
        Some(Sector {
            coord,
            index,
            resolution: self.chunk_resolution,
        })
    }

    /// Sector at a sector coordinate.
    pub fn sector_at(&self, coord: UVec3) -> Option<Sector> {
        if coord.cmpge(UVec3::splat(self.sectors_per_axis)).any() {
            return None;
        }
        self.sector(self.linear_index(coord))
    }

    /// Sector owning a grid voxel, plus the voxel's position inside it.
    pub fn locate(&self, voxel: UVec3) -> Option<(Sector, UVec3)> {
        let sector = self.sector_at(voxel / self.chunk_resolution)?;
        Some((sector, voxel - sector.start()))
    }

    /// Iterate over all sectors in visitation order.
    pub const fn iter(&self) -> SectorIter {
        SectorIter {
            grid: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &SectorGrid {
    type Item = Sector;
    type IntoIter = SectorIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the sectors of a [`SectorGrid`] in z-major order.
#[derive(Clone, Debug)]
pub struct SectorIter {
    grid: SectorGrid,
    next: u64,
}

impl Iterator for SectorIter {
    type Item = Sector;

    fn next(&mut self) -> Option<Sector> {
        let sector = self.grid.sector(self.next)?;
        self.next += 1;
        Some(sector)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.grid.sector_count() - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SectorIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_resolutions() {
        assert!(matches!(SectorGrid::new(0, 4), Err(Error::Configuration(_))));
        assert!(matches!(SectorGrid::new(16, 0), Err(Error::Configuration(_))));
        assert!(matches!(SectorGrid::new(100, 32), Err(Error::Configuration(_))));
        assert!(SectorGrid::new(96, 32).is_ok());
    }

    #[test]
    fn counts_stay_in_range_at_the_resolution_cap() {
        let grid = SectorGrid::new(MAX_GRID_RESOLUTION, 1).unwrap();
        assert_eq!(grid.sector_count(), 1 << 63);
        assert_eq!(grid.grid_voxel_count(), 1 << 63);

        let err = SectorGrid::new(1 << 22, 1).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn single_sector_when_chunk_equals_grid() {
        let grid = SectorGrid::new(256, 256).unwrap();
        assert_eq!(grid.sector_count(), 1);
        let sector = grid.iter().next().unwrap();
        assert_eq!(sector.start(), UVec3::ZERO);
        assert_eq!(sector.end(), UVec3::splat(256));
    }

    #[test]
    fn large_grid_sector_budget() {
        let grid = SectorGrid::new(1024, 256).unwrap();
        assert_eq!(grid.sectors_per_axis(), 4);
        assert_eq!(grid.sector_count(), 64);
        assert_eq!(grid.chunk_voxel_count(), 16_777_216);
        assert_eq!(grid.sector_count() * grid.chunk_voxel_count(), 1_073_741_824);
        assert_eq!(grid.iter().len(), 64);
    }

    #[test]
    fn z_major_order() {
        let grid = SectorGrid::new(12, 4).unwrap();
        let coords: Vec<UVec3> = grid.iter().take(4).map(|s| s.coord()).collect();
        assert_eq!(
            coords,
            vec![
                UVec3::new(0, 0, 0),
                UVec3::new(1, 0, 0),
                UVec3::new(2, 0, 0),
                UVec3::new(0, 1, 0),
            ]
        );

        for (i, sector) in grid.iter().enumerate() {
            assert_eq!(sector.index(), i as u64);
            assert_eq!(grid.linear_index(sector.coord()), i as u64);
        }
        assert_eq!(grid.sector(9).unwrap().coord(), UVec3::new(0, 0, 1));
        assert!(grid.sector(27).is_none());
    }

    #[test]
    fn sectors_are_disjoint_and_cover_grid() {
        let grid = SectorGrid::new(8, 2).unwrap();
        let mut owners = vec![0u32; 8 * 8 * 8];

        for sector in &grid {
            let (start, end) = (sector.start(), sector.end());
            for z in start.z..end.z {
                for y in start.y..end.y {
                    for x in start.x..end.x {
                        owners[(x + 8 * (y + 8 * z)) as usize] += 1;
                    }
                }
            }
        }

        assert!(owners.iter().all(|&count| count == 1));
    }

    #[test]
    fn locate_voxel() {
        let grid = SectorGrid::new(16, 4).unwrap();
        let (sector, local) = grid.locate(UVec3::new(5, 0, 15)).unwrap();
        assert_eq!(sector.coord(), UVec3::new(1, 0, 3));
        assert_eq!(local, UVec3::new(1, 0, 3));
        assert!(sector.contains(UVec3::new(5, 0, 15)));
        assert!(grid.locate(UVec3::new(16, 0, 0)).is_none());
    }
}
