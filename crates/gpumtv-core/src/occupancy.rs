//! Occupancy chunks produced by one render and readback cycle.

use glam::UVec3;

/// Dense occupancy of one sector: `C³` bytes, x fastest, then y, then z.
///
/// 0 is empty, anything else is occupied. The same chunk is reused across
/// sectors to avoid reallocating the host buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OccupancyChunk {
    resolution: u32,
    voxels: Vec<u8>,
}

impl OccupancyChunk {
    /// Allocate an empty chunk of `resolution³` voxels.
    pub fn new(resolution: u32) -> Self {
        let len = (resolution as usize).pow(3);
        Self {
            resolution,
            voxels: vec![0; len],
        }
    }

    /// Chunk resolution `C`
    #[inline]
    pub const fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of voxels (and bytes).
    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// Raw payload as written to the `.bvox` file.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.voxels
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.voxels
    }

    /// Reset every voxel to empty.
    pub fn clear(&mut self) {
        self.voxels.fill(0);
    }

    /// Linear index of a chunk-local voxel.
    #[inline]
    pub fn voxel_index(&self, local: UVec3) -> usize {
        let c = self.resolution as usize;
        local.x as usize + c * (local.y as usize + c * local.z as usize)
    }

    /// Returns true if the chunk-local voxel is occupied.
    #[inline]
    pub fn is_occupied(&self, local: UVec3) -> bool {
        self.voxels[self.voxel_index(local)] != 0
    }

    /// Set a chunk-local voxel.
    #[inline]
    pub fn set(&mut self, local: UVec3, value: u8) {
        let index = self.voxel_index(local);
        self.voxels[index] = value;
    }

    /// Count of non-empty voxels.
    pub fn occupied_count(&self) -> u64 {
        self.voxels.iter().filter(|&&v| v != 0).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_x_fastest() {
        let mut chunk = OccupancyChunk::new(4);
        assert_eq!(chunk.len(), 64);
        assert_eq!(chunk.voxel_index(UVec3::new(1, 0, 0)), 1);
        assert_eq!(chunk.voxel_index(UVec3::new(0, 1, 0)), 4);
        assert_eq!(chunk.voxel_index(UVec3::new(0, 0, 1)), 16);

        chunk.set(UVec3::new(3, 2, 1), 255);
        assert_eq!(chunk.as_bytes()[3 + 4 * (2 + 4)], 255);
        assert!(chunk.is_occupied(UVec3::new(3, 2, 1)));
        assert_eq!(chunk.occupied_count(), 1);

        chunk.clear();
        assert_eq!(chunk.occupied_count(), 0);
    }
}
