//! Wavefront OBJ loader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use gpumtv_core::{Error, Result, Vertex};
use obj::{IndexTuple, MtlLibsLoadError, Obj, ObjData, ObjMaterial};
use tracing::{debug, info, warn};

use crate::{Material, Mesh, VertexDeduplicator};

/// Load an OBJ file.
///
/// Material libraries are resolved relative to `material_dir`, or to the
/// directory of `path` when none is given.
pub fn load_obj(path: impl AsRef<Path>, material_dir: Option<&Path>) -> Result<Mesh> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::AssetLoad(format!("cannot open {}: {e}", path.display())))?;

    let material_dir = material_dir.map_or_else(
        || path.parent().map(Path::to_path_buf).unwrap_or_default(),
        Path::to_path_buf,
    );

    info!(path = %path.display(), material_dir = %material_dir.display(), "Loading mesh");
    load_obj_from_reader(BufReader::new(file), material_dir)
}

/// Load OBJ data from any reader, resolving material libraries relative to
/// `material_dir`.
pub fn load_obj_from_reader(reader: impl Read, material_dir: impl Into<PathBuf>) -> Result<Mesh> {
    let data = ObjData::load_buf(reader)
        .map_err(|e| Error::AssetLoad(format!("failed to parse OBJ: {e}")))?;

    let mut obj = Obj {
        data,
        path: material_dir.into(),
    };

    let mut warnings = Vec::new();
    if let Err(MtlLibsLoadError(errors)) = obj.load_mtls() {
        for (library, error) in errors {
            warnings.push(format!("material library {library} not loaded: {error:?}"));
        }
    }

    build_mesh(&obj.data, warnings)
}

/// Material lookup built from every loaded library; first definition of a
/// name wins.
struct MaterialTable {
    materials: Vec<Material>,
}

impl MaterialTable {
    fn new(data: &ObjData) -> Self {
        let mut materials: Vec<Material> = Vec::new();
        for material in data.material_libs.iter().flat_map(|lib| &lib.materials) {
            if materials.iter().any(|m| m.name == material.name) {
                continue;
            }
            materials.push(Material {
                name: material.name.clone(),
                diffuse: material.kd.unwrap_or(Vertex::WHITE),
                diffuse_texture: material.map_kd.clone(),
            });
        }
        Self { materials }
    }

    /// Resolve a group material to `(material_id, color)`.
    fn resolve(&self, material: Option<&ObjMaterial>, warnings: &mut Vec<String>) -> (u32, [f32; 3]) {
        let name = match material {
            None => return (Vertex::NO_MATERIAL, Vertex::WHITE),
            Some(ObjMaterial::Mtl(material)) => material.name.as_str(),
            Some(ObjMaterial::Ref(name)) => name.as_str(),
        };

        match self.materials.iter().position(|m| m.name == name) {
            Some(index) => (index as u32, self.materials[index].diffuse),
            None => {
                let warning = format!("unknown material {name}");
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
                (Vertex::NO_MATERIAL, Vertex::WHITE)
            }
        }
    }
}

fn build_mesh(data: &ObjData, mut warnings: Vec<String>) -> Result<Mesh> {
    if data.normal.is_empty() {
        return Err(Error::AssetLoad("mesh has no normals".to_string()));
    }

    let table = MaterialTable::new(data);
    let mut dedup = VertexDeduplicator::new();
    let mut degenerate = 0usize;

    for object in &data.objects {
        for group in &object.groups {
            let (material_id, color) = table.resolve(group.material.as_ref(), &mut warnings);

            for polygon in &group.polys {
                let corners = &polygon.0;
                if corners.len() < 3 {
                    degenerate += 1;
                    continue;
                }

                // Fan triangulation around the first corner
                for i in 1..corners.len() - 1 {
                    for corner in [&corners[0], &corners[i], &corners[i + 1]] {
                        let vertex = make_vertex(data, corner, color, material_id)?;
                        dedup.push(vertex)?;
                    }
                }
            }
        }
    }

    if degenerate > 0 {
        warnings.push(format!("skipped {degenerate} faces with fewer than 3 corners"));
    }
    if dedup.indices().is_empty() {
        return Err(Error::AssetLoad("mesh has no faces".to_string()));
    }

    for warning in &warnings {
        warn!("{warning}");
    }

    let corners = dedup.indices().len();
    let (vertices, indices, bounds) = dedup.finish();

    info!(
        triangles = indices.len() / 3,
        vertices = vertices.len(),
        materials = table.materials.len(),
        "Mesh loaded"
    );
    debug!(
        corners,
        min = %bounds.min,
        max = %bounds.max,
        "Deduplicated vertices"
    );

    Ok(Mesh {
        vertices,
        indices,
        bounds,
        materials: table.materials,
        warnings,
    })
}

fn make_vertex(data: &ObjData, corner: &IndexTuple, color: [f32; 3], material_id: u32) -> Result<Vertex> {
    let &IndexTuple(position_index, uv_index, normal_index) = corner;

    let position = *data.position.get(position_index).ok_or_else(|| {
        Error::AssetLoad(format!("position index {} out of range", position_index + 1))
    })?;

    let normal_index = normal_index
        .ok_or_else(|| Error::AssetLoad("face corner without a normal".to_string()))?;
    let normal = *data.normal.get(normal_index).ok_or_else(|| {
        Error::AssetLoad(format!("normal index {} out of range", normal_index + 1))
    })?;

    let uv = match uv_index {
        Some(index) => {
            let [u, v] = *data.texture.get(index).ok_or_else(|| {
                Error::AssetLoad(format!("texture coordinate index {} out of range", index + 1))
            })?;
            [u, 1.0 - v]
        }
        None => [0.0, 0.0],
    };

    Ok(Vertex {
        position,
        normal,
        color,
        uv,
        material_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::io::Cursor;

    const QUAD: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    const CUBE: &str = "\
v -1 -1 -1
v  1 -1 -1
v  1  1 -1
v -1  1 -1
v -1 -1  1
v  1 -1  1
v  1  1  1
v -1  1  1
vn  0  0 -1
vn  0  0  1
vn  0 -1  0
vn  0  1  0
vn -1  0  0
vn  1  0  0
f 1//1 4//1 3//1 2//1
f 5//2 6//2 7//2 8//2
f 1//3 2//3 6//3 5//3
f 4//4 8//4 7//4 3//4
f 1//5 5//5 8//5 4//5
f 2//6 3//6 7//6 6//6
";

    fn load(source: &str) -> Result<Mesh> {
        load_obj_from_reader(Cursor::new(source.as_bytes()), std::env::temp_dir())
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gpumtv-mesh-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let mesh = load(QUAD).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(mesh.vertices.iter().all(|v| v.material_id == Vertex::NO_MATERIAL));
        assert!(mesh.vertices.iter().all(|v| v.color == Vertex::WHITE));
    }

    #[test]
    fn cube_dedups_per_face() {
        let mesh = load(CUBE).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert_eq!(mesh.indices.len(), 36);
        // Each position is shared by three faces with different normals
        assert_eq!(mesh.vertices.len(), 24);
        assert!(mesh.vertices.len() <= mesh.indices.len());
        assert_eq!(mesh.bounds.min, Vec3::splat(-1.0));
        assert_eq!(mesh.bounds.max, Vec3::splat(1.0));
    }

    #[test]
    fn loading_is_deterministic() {
        let a = load(CUBE).unwrap();
        let b = load(CUBE).unwrap();
        assert_eq!(a.vertices, b.vertices);
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.bounds, b.bounds);
    }

    #[test]
    fn bounds_ignore_face_order() {
        let (header, faces) = CUBE.split_at(CUBE.find("f ").unwrap());
        let reversed: String = faces.lines().rev().map(|l| format!("{l}\n")).collect();

        let forward = load(CUBE).unwrap();
        let backward = load(&format!("{header}{reversed}")).unwrap();
        assert_eq!(forward.bounds, backward.bounds);
        assert_eq!(forward.vertices.len(), backward.vertices.len());
    }

    #[test]
    fn uv_v_is_flipped() {
        let source = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0.25 0.0
vt 0.5 0.75
vn 0 0 1
f 1/1/1 2/2/1 3/1/1
";
        let mesh = load(source).unwrap();
        assert_eq!(mesh.vertices[0].uv, [0.25, 1.0]);
        assert_eq!(mesh.vertices[1].uv, [0.5, 0.25]);
    }

    #[test]
    fn missing_normals_are_rejected() {
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert!(matches!(load(source), Err(Error::AssetLoad(_))));

        // Normals exist but a corner does not reference one
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3\n";
        assert!(matches!(load(source), Err(Error::AssetLoad(_))));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let source = "v 0 0 0\nv 1 0 0\nvn 0 0 1\nf 1//1 2//1 9//1\n";
        assert!(load(source).is_err());
    }

    #[test]
    fn mesh_without_faces_is_rejected() {
        let source = "v 0 0 0\nvn 0 0 1\n";
        assert!(matches!(load(source), Err(Error::AssetLoad(_))));
    }

    #[test]
    fn missing_file_is_an_asset_error() {
        let result = load_obj("/nonexistent/gpumtv/mesh.obj", None);
        assert!(matches!(result, Err(Error::AssetLoad(_))));
    }

    #[test]
    fn materials_color_vertices() {
        let dir = scratch_dir("materials");
        std::fs::write(
            dir.join("test.mtl"),
            "newmtl red\nKd 1 0 0\nmap_Kd red.png\n\nnewmtl blue\nKd 0 0 1\n",
        )
        .unwrap();

        let source = "\
mtllib test.mtl
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
vn 0 0 1
usemtl blue
f 1//1 2//1 3//1
usemtl red
f 1//1 3//1 4//1
";
        let mesh = load_obj_from_reader(Cursor::new(source.as_bytes()), &dir).unwrap();
        assert_eq!(mesh.materials.len(), 2);
        assert_eq!(mesh.diffuse_textures(), vec!["red.png"]);

        let blue = mesh.vertices[mesh.indices[1] as usize];
        assert_eq!(blue.material_id, 1);
        assert_eq!(blue.color, [0.0, 0.0, 1.0]);

        let red = mesh.vertices[mesh.indices[5] as usize];
        assert_eq!(red.material_id, 0);
        assert_eq!(red.color, [1.0, 0.0, 0.0]);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_material_library_is_a_warning() {
        let dir = scratch_dir("no-library");
        let source = format!("mtllib absent.mtl\nusemtl ghost\n{QUAD}");
        let mesh = load_obj_from_reader(Cursor::new(source.into_bytes()), &dir).unwrap();

        assert_eq!(mesh.triangle_count(), 2);
        assert!(!mesh.warnings.is_empty());
        assert!(mesh.vertices.iter().all(|v| v.material_id == Vertex::NO_MATERIAL));

        std::fs::remove_dir_all(dir).ok();
    }
}
