//! Math utilities: bounding boxes and triangle/box overlap.

use glam::Vec3;

/// Axis-aligned bounds of a mesh or sector.
///
/// Starts out empty (`min = +inf`, `max = -inf`) and only ever grows, so the
/// result of accumulating a set of points does not depend on their order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Bounds containing nothing.
    #[inline]
    pub const fn empty() -> Self {
        Self::new(Vec3::INFINITY, Vec3::NEG_INFINITY)
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::empty(), |mut aabb, point| {
            aabb.expand_to_include(point);
            aabb
        })
    }

    /// True until the first point is added.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest extent over the three axes.
    #[inline]
    pub fn max_extent(&self) -> f32 {
        self.extent().max_element()
    }

    #[inline]
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// The eight corners, x varying fastest.
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }
}

/// Separating-axis test between a triangle and an axis-aligned box.
///
/// Touching counts as overlap, which makes the test conservative: a voxel
/// sharing only a face or edge with the triangle is reported as covered.
/// Degenerate triangles are tested against their bounds and edges only.
pub fn triangle_intersects_box(center: Vec3, half_extents: Vec3, triangle: [Vec3; 3]) -> bool {
    let v = triangle.map(|p| p - center);

    // Box face normals
    let tri_min = v[0].min(v[1]).min(v[2]);
    let tri_max = v[0].max(v[1]).max(v[2]);
    if tri_min.cmpgt(half_extents).any() || tri_max.cmplt(-half_extents).any() {
        return false;
    }

    let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];

    // Triangle plane
    if !overlaps_on_axis(edges[0].cross(edges[1]), &v, half_extents) {
        return false;
    }

    // Edge cross products
    for edge in edges {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            if !overlaps_on_axis(axis.cross(edge), &v, half_extents) {
                return false;
            }
        }
    }

    true
}

#[inline]
fn overlaps_on_axis(axis: Vec3, vertices: &[Vec3; 3], half_extents: Vec3) -> bool {
    let p = vertices.map(|v| axis.dot(v));
    let radius = half_extents.dot(axis.abs());
    let min = p[0].min(p[1]).min(p[2]);
    let max = p[0].max(p[1]).max(p[2]);
    min <= radius && max >= -radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_aabb() {
        let aabb = Aabb::empty();
        assert!(aabb.is_empty());
        assert_eq!(Aabb::default(), aabb);

        let mut grown = aabb;
        grown.expand_to_include(Vec3::ONE);
        assert!(!grown.is_empty());
        assert_eq!(grown.extent(), Vec3::ZERO);
        assert_eq!(grown.center(), Vec3::ONE);
    }

    #[test]
    fn aabb_order_independent() {
        let points = [
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-4.0, 5.0, 0.5),
            Vec3::new(0.0, 0.0, -7.0),
            Vec3::new(2.5, 1.0, 1.0),
        ];
        let forward = Aabb::from_points(points);
        let backward = Aabb::from_points(points.into_iter().rev());

        assert_eq!(forward, backward);
        assert!(forward.min.cmple(forward.max).all());
        assert_eq!(forward.min, Vec3::new(-4.0, -2.0, -7.0));
        assert_eq!(forward.max, Vec3::new(2.5, 5.0, 3.0));
    }

    #[test]
    fn aabb_corners() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let corners = aabb.corners();
        assert_eq!(corners[0], Vec3::ZERO);
        assert_eq!(corners[1], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(corners[7], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(Aabb::from_points(corners), aabb);
        assert_eq!(aabb.max_extent(), 3.0);
    }

    #[test]
    fn triangle_box_overlap() {
        let half = Vec3::splat(0.5);
        let triangle = [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!(triangle_intersects_box(Vec3::ZERO, half, triangle));

        // Plane of the triangle misses the box
        assert!(!triangle_intersects_box(Vec3::new(0.0, 0.0, 2.0), half, triangle));

        // Inside the bounds of the triangle but past the hypotenuse
        let triangle = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
        ];
        assert!(!triangle_intersects_box(Vec3::new(3.5, 3.5, 0.0), half, triangle));
        assert!(triangle_intersects_box(Vec3::new(1.5, 1.5, 0.0), half, triangle));
    }

    #[test]
    fn touching_counts_as_overlap() {
        let triangle = [
            Vec3::new(0.5, -1.0, -1.0),
            Vec3::new(0.5, 1.0, -1.0),
            Vec3::new(0.5, 0.0, 1.0),
        ];
        assert!(triangle_intersects_box(Vec3::ZERO, Vec3::splat(0.5), triangle));
        assert!(!triangle_intersects_box(
            Vec3::new(-0.01, 0.0, 0.0),
            Vec3::splat(0.5),
            triangle
        ));
    }
}
