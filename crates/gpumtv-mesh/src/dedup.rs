//! Vertex deduplication.

use glam::Vec3;
use gpumtv_core::{Aabb, Error, Result, Vertex};
use hashbrown::HashMap;

/// Identity of a vertex: bit patterns of position, normal and uv.
///
/// Comparison is exact on IEEE bits, except that `-0.0` is folded into
/// `0.0` so both spellings of zero collapse to one vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct VertexKey([u32; 8]);

impl VertexKey {
    fn of(vertex: &Vertex) -> Self {
        let [px, py, pz] = vertex.position;
        let [nx, ny, nz] = vertex.normal;
        let [u, v] = vertex.uv;
        Self([px, py, pz, nx, ny, nz, u, v].map(canonical_bits))
    }
}

#[inline]
fn canonical_bits(value: f32) -> u32 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Builds an indexed vertex list from a stream of triangle corners.
///
/// Corners with the same position, normal and uv share one stored vertex;
/// the first corner seen supplies its color and material. The bounding box
/// grows with every corner.
#[derive(Debug, Default)]
pub struct VertexDeduplicator {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    lookup: HashMap<VertexKey, u32>,
    bounds: Aabb,
}

impl VertexDeduplicator {
    /// Create an empty deduplicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one corner and return the index it was assigned.
    pub fn push(&mut self, vertex: Vertex) -> Result<u32> {
        self.bounds.expand_to_include(Vec3::from_array(vertex.position));

        let key = VertexKey::of(&vertex);
        let index = if let Some(&index) = self.lookup.get(&key) {
            index
        } else {
            let index = u32::try_from(self.vertices.len()).map_err(|_| {
                Error::AssetLoad("mesh has more unique vertices than fit a u32 index".to_string())
            })?;
            self.vertices.push(vertex);
            self.lookup.insert(key, index);
            index
        };

        self.indices.push(index);
        Ok(index)
    }

    /// Unique vertices stored so far
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// One index per pushed corner
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Bounds of every pushed corner
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Consume the deduplicator, returning vertices, indices and bounds.
    pub fn finish(self) -> (Vec<Vertex>, Vec<u32>, Aabb) {
        (self.vertices, self.indices, self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3], normal: [f32; 3]) -> Vertex {
        Vertex {
            position,
            normal,
            ..Vertex::default()
        }
    }

    #[test]
    fn shared_corners_collapse() {
        let mut dedup = VertexDeduplicator::new();
        let a = vertex([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]);
        let b = vertex([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]);

        assert_eq!(dedup.push(a).unwrap(), 0);
        assert_eq!(dedup.push(b).unwrap(), 1);
        assert_eq!(dedup.push(a).unwrap(), 0);

        assert_eq!(dedup.vertices().len(), 2);
        assert_eq!(dedup.indices(), &[0, 1, 0]);
    }

    #[test]
    fn different_normals_stay_distinct() {
        let mut dedup = VertexDeduplicator::new();
        dedup.push(vertex([0.0; 3], [0.0, 0.0, 1.0])).unwrap();
        dedup.push(vertex([0.0; 3], [0.0, 1.0, 0.0])).unwrap();
        assert_eq!(dedup.vertices().len(), 2);
    }

    #[test]
    fn negative_zero_matches_zero() {
        let mut dedup = VertexDeduplicator::new();
        dedup.push(vertex([0.0, 1.0, 0.0], [0.0, 0.0, 1.0])).unwrap();
        dedup.push(vertex([-0.0, 1.0, 0.0], [-0.0, 0.0, 1.0])).unwrap();
        assert_eq!(dedup.vertices().len(), 1);
    }

    #[test]
    fn first_corner_keeps_attributes() {
        let mut dedup = VertexDeduplicator::new();
        let red = Vertex {
            color: [1.0, 0.0, 0.0],
            material_id: 3,
            ..vertex([0.0; 3], [0.0, 0.0, 1.0])
        };
        let blue = Vertex {
            color: [0.0, 0.0, 1.0],
            material_id: 7,
            ..red
        };
        dedup.push(red).unwrap();
        dedup.push(blue).unwrap();

        let (vertices, indices, _) = dedup.finish();
        assert_eq!(vertices, vec![red]);
        assert_eq!(indices, vec![0, 0]);
    }

    #[test]
    fn bounds_track_every_corner() {
        let mut dedup = VertexDeduplicator::new();
        assert!(dedup.bounds().is_empty());
        dedup.push(vertex([1.0, -2.0, 3.0], [0.0; 3])).unwrap();
        dedup.push(vertex([-1.0, 2.0, 0.0], [0.0; 3])).unwrap();
        let bounds = dedup.bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn deduplicated_vertices_pass_through_unchanged() {
        let corners = [
            vertex([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([1.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            vertex([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let mut first = VertexDeduplicator::new();
        for corner in corners {
            first.push(corner).unwrap();
        }
        let (vertices, indices, bounds) = first.finish();
        assert_eq!(vertices.len(), 4);
        assert!(vertices.len() <= indices.len());

        let mut second = VertexDeduplicator::new();
        for &v in &vertices {
            second.push(v).unwrap();
        }
        let (again, again_indices, again_bounds) = second.finish();

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let again_bytes: &[u8] = bytemuck::cast_slice(&again);
        assert_eq!(bytes, again_bytes);
        assert_eq!(again_indices, (0..vertices.len() as u32).collect::<Vec<_>>());
        assert_eq!(again_bounds, bounds);
    }
}
