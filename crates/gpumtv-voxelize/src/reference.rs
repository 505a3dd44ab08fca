//! Host reference backend.
//!
//! Computes the same occupancy the voxelization program produces, a voxel
//! being occupied when any triangle touches its cell, without a GPU. Depth
//! slices of a sector are processed in parallel with rayon.

use std::collections::VecDeque;

use glam::{Mat4, Vec3};
use gpumtv_core::math::triangle_intersects_box;
use gpumtv_core::{ChunkProjection, Error, OccupancyChunk, Result, Sector};
use gpumtv_mesh::Mesh;
use rayon::prelude::*;
use tracing::trace;

use crate::backend::{OccupancyBackend, SectorFrame};

/// Value written for occupied voxels.
pub const OCCUPIED: u8 = 255;

/// CPU implementation of [`OccupancyBackend`].
pub struct CpuVoxelizer {
    triangles: Vec<[Vec3; 3]>,
    chunk_resolution: u32,
    max_in_flight: usize,
    pending: VecDeque<(Sector, Vec<u8>)>,
    spare: Vec<Vec<u8>>,
}

impl CpuVoxelizer {
    /// Voxelize `mesh` in chunks of `chunk_resolution³`.
    pub fn new(mesh: &Mesh, chunk_resolution: u32) -> Self {
        Self::from_triangles(mesh.triangles().collect(), chunk_resolution)
    }

    /// Voxelize a raw triangle soup in mesh space.
    pub fn from_triangles(triangles: Vec<[Vec3; 3]>, chunk_resolution: u32) -> Self {
        Self {
            triangles,
            chunk_resolution,
            max_in_flight: 1,
            pending: VecDeque::new(),
            spare: Vec::new(),
        }
    }

    /// Allow `frames` sectors to be queued before completion is required.
    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_in_flight = frames.max(1);
        self
    }

    fn rasterize(&self, view_proj: Mat4, voxels: &mut [u8]) {
        let c = self.chunk_resolution as usize;
        let limit = self.chunk_resolution as f32;

        // Undo the chunk-to-clip mapping to work in voxel units
        let chunk_from_world =
            ChunkProjection::clip_from_chunk(self.chunk_resolution).inverse() * view_proj;

        let triangles: Vec<([Vec3; 3], Vec3, Vec3)> = self
            .triangles
            .iter()
            .map(|tri| {
                let t = tri.map(|p| chunk_from_world.transform_point3(p));
                let min = t[0].min(t[1]).min(t[2]);
                let max = t[0].max(t[1]).max(t[2]);
                (t, min, max)
            })
            .filter(|(_, min, max)| {
                max.cmpge(Vec3::ZERO).all() && min.cmple(Vec3::splat(limit)).all()
            })
            .collect();

        voxels.fill(0);
        if triangles.is_empty() {
            return;
        }

        let half = Vec3::splat(0.5);
        voxels.par_chunks_mut(c * c).enumerate().for_each(|(z, slice)| {
            let z0 = z as f32;
            for (tri, min, max) in &triangles {
                if max.z < z0 || min.z > z0 + 1.0 {
                    continue;
                }

                let x_range = cell_range(min.x, max.x, c);
                let y_range = cell_range(min.y, max.y, c);
                for y in y_range {
                    for x in x_range.clone() {
                        let cell = &mut slice[x + c * y];
                        if *cell != 0 {
                            continue;
                        }
                        let center = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z0 + 0.5);
                        if triangle_intersects_box(center, half, *tri) {
                            *cell = OCCUPIED;
                        }
                    }
                }
            }
        });
    }
}

/// Cells of `0..c` whose closed interval `[i, i + 1]` meets `[lo, hi]`.
fn cell_range(lo: f32, hi: f32, c: usize) -> std::ops::Range<usize> {
    let first = (lo.floor() - 1.0).max(0.0) as usize;
    let last = (hi.floor() + 1.0).clamp(0.0, c as f32) as usize;
    first.min(c)..last.max(first.min(c))
}

impl OccupancyBackend for CpuVoxelizer {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    fn in_flight(&self) -> usize {
        self.pending.len()
    }

    fn submit(&mut self, frame: &SectorFrame) -> Result<()> {
        if self.pending.len() >= self.max_in_flight {
            return Err(Error::Gpu(format!(
                "sector {} submitted with {} sectors already in flight",
                frame.sector.index(),
                self.pending.len()
            )));
        }
        if frame.sector.resolution() != self.chunk_resolution {
            return Err(Error::Configuration(format!(
                "sector resolution {} does not match backend resolution {}",
                frame.sector.resolution(),
                self.chunk_resolution
            )));
        }

        let len = (self.chunk_resolution as usize).pow(3);
        let mut voxels = self.spare.pop().unwrap_or_else(|| vec![0; len]);
        self.rasterize(frame.view_proj, &mut voxels);

        trace!(sector = frame.sector.index(), "Rasterized on host");
        self.pending.push_back((frame.sector, voxels));
        Ok(())
    }

    fn complete_oldest(&mut self, chunk: &mut OccupancyChunk) -> Result<Sector> {
        let (sector, voxels) = self
            .pending
            .pop_front()
            .ok_or_else(|| Error::Gpu("no sector in flight".to_string()))?;

        if chunk.len() != voxels.len() {
            return Err(Error::InvalidData(format!(
                "chunk holds {} voxels, sector produced {}",
                chunk.len(),
                voxels.len()
            )));
        }
        chunk.as_bytes_mut().copy_from_slice(&voxels);
        self.spare.push(voxels);
        Ok(sector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{voxelize, VoxelizePlan};
    use gpumtv_bvox::{BvoxHeader, BvoxReader, BvoxWriter};
    use gpumtv_core::{Aabb, ProjectionOptions};
    use glam::UVec3;

    /// Projection where mesh units equal grid units on an 8³ grid.
    fn identity_plan(chunk: u32) -> VoxelizePlan {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(8.0));
        VoxelizePlan::for_bounds(&bounds, 8, chunk, ProjectionOptions::default()).unwrap()
    }

    /// Right triangle in the plane z = 2.5 covering x, y in [1.5, 5.25].
    fn plane_triangle() -> [Vec3; 3] {
        [
            Vec3::new(1.5, 1.5, 2.5),
            Vec3::new(5.25, 1.5, 2.5),
            Vec3::new(1.5, 5.25, 2.5),
        ]
    }

    fn expected_plane_voxels() -> Vec<UVec3> {
        let mut voxels = Vec::new();
        for y in 1..6u32 {
            for x in 1..6u32 {
                // Cell [x, x+1] x [y, y+1] meets x' + y' <= 6.75 with x', y' >= 1.5
                if x as f32 + y as f32 <= 6.75 {
                    voxels.push(UVec3::new(x, y, 2));
                }
            }
        }
        voxels
    }

    fn run_single_chunk(triangles: Vec<[Vec3; 3]>) -> OccupancyChunk {
        let plan = identity_plan(8);
        let mut backend = CpuVoxelizer::from_triangles(triangles, 8);
        let sector = plan.grid.sector(0).unwrap();
        backend.submit(&plan.frame(sector, 0)).unwrap();
        let mut chunk = OccupancyChunk::new(8);
        assert_eq!(backend.complete_oldest(&mut chunk).unwrap(), sector);
        chunk
    }

    #[test]
    fn single_triangle_marks_touched_cells() {
        let chunk = run_single_chunk(vec![plane_triangle()]);
        let expected = expected_plane_voxels();

        assert_eq!(chunk.occupied_count(), expected.len() as u64);
        for voxel in expected {
            assert!(chunk.is_occupied(voxel), "{voxel} should be occupied");
        }
        // Nothing leaks into neighbouring slices
        assert!(!chunk.is_occupied(UVec3::new(2, 2, 1)));
        assert!(!chunk.is_occupied(UVec3::new(2, 2, 3)));
    }

    #[test]
    fn geometry_outside_the_grid_is_ignored() {
        let outside = plane_triangle().map(|p| p + Vec3::new(20.0, 0.0, 0.0));
        let chunk = run_single_chunk(vec![outside]);
        assert_eq!(chunk.occupied_count(), 0);
    }

    #[test]
    fn sectors_match_single_pass() {
        let triangles = vec![
            plane_triangle(),
            [
                Vec3::new(0.25, 6.5, 0.5),
                Vec3::new(7.5, 6.75, 7.25),
                Vec3::new(3.3, 0.2, 5.9),
            ],
        ];

        let run = |chunk: u32, frames: usize, name: &str| -> Vec<u8> {
            let plan = identity_plan(chunk);
            let path = std::env::temp_dir().join(format!(
                "gpumtv-reference-{}-{name}.bvox",
                std::process::id()
            ));
            let mut writer =
                BvoxWriter::create(&path, BvoxHeader::for_grid(&plan.grid).unwrap()).unwrap();
            let mut backend =
                CpuVoxelizer::from_triangles(triangles.clone(), chunk).with_frames_in_flight(frames);
            voxelize(&mut backend, &plan, &mut writer).unwrap();

            let voxels = BvoxReader::open(&path)
                .unwrap()
                .reconstruct_grid(&plan.grid)
                .unwrap();
            std::fs::remove_file(path).ok();
            voxels
        };

        let whole = run(8, 1, "whole");
        let split = run(4, 1, "split");
        let pipelined = run(2, 3, "pipelined");

        assert!(whole.iter().any(|&v| v != 0));
        assert_eq!(whole, split);
        assert_eq!(whole, pipelined);

        // The plane triangle shows up at its grid position after reassembly
        for voxel in expected_plane_voxels() {
            let index = (voxel.x + 8 * (voxel.y + 8 * voxel.z)) as usize;
            assert_eq!(whole[index], OCCUPIED);
        }
    }

    #[test]
    fn full_pipeline_is_rejected() {
        let plan = identity_plan(4);
        let mut backend = CpuVoxelizer::from_triangles(vec![plane_triangle()], 4);
        let first = plan.frame(plan.grid.sector(0).unwrap(), 0);
        backend.submit(&first).unwrap();
        assert!(backend.submit(&plan.frame(plan.grid.sector(1).unwrap(), 1)).is_err());

        let mut chunk = OccupancyChunk::new(4);
        backend.complete_oldest(&mut chunk).unwrap();
        assert!(backend.complete_oldest(&mut chunk).is_err());
    }

    #[test]
    fn cell_ranges() {
        assert_eq!(cell_range(1.5, 5.25, 8), 0..6);
        assert_eq!(cell_range(-3.0, -2.0, 8), 0..0);
        assert_eq!(cell_range(6.5, 20.0, 8), 5..8);
    }
}
