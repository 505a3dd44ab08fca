//! Loaded mesh data.

use glam::Vec3;
use gpumtv_core::{Aabb, Vertex};

/// Surface material resolved from an MTL library.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Name given by `newmtl`
    pub name: String,
    /// Diffuse color (`Kd`), white when the library omits it
    pub diffuse: [f32; 3],
    /// Diffuse texture (`map_Kd`), as written in the library
    pub diffuse_texture: Option<String>,
}

/// An indexed triangle mesh.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    /// Unique vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list, three indices per triangle
    pub indices: Vec<u32>,
    /// Bounds of all vertex positions
    pub bounds: Aabb,
    /// Material table indexed by [`Vertex::material_id`]
    pub materials: Vec<Material>,
    /// Non-fatal problems found while loading
    pub warnings: Vec<String>,
}

impl Mesh {
    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterate over triangle corner positions.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|tri| {
            [
                self.vertices[tri[0] as usize].position(),
                self.vertices[tri[1] as usize].position(),
                self.vertices[tri[2] as usize].position(),
            ]
        })
    }

    /// Distinct diffuse texture names referenced by the materials, in
    /// material order.
    pub fn diffuse_textures(&self) -> Vec<&str> {
        let mut textures: Vec<&str> = Vec::new();
        for texture in self.materials.iter().filter_map(|m| m.diffuse_texture.as_deref()) {
            if !textures.contains(&texture) {
                textures.push(texture);
            }
        }
        textures
    }

    /// Size of the vertex buffer in bytes.
    pub fn vertex_bytes(&self) -> u64 {
        (self.vertices.len() * std::mem::size_of::<Vertex>()) as u64
    }

    /// Size of the index buffer in bytes.
    pub fn index_bytes(&self) -> u64 {
        (self.indices.len() * std::mem::size_of::<u32>()) as u64
    }
}
