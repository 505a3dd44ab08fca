//! Geometry loading for gpu-mtv.
//!
//! Reads Wavefront OBJ meshes (with optional MTL material libraries) into a
//! deduplicated, indexed vertex list ready for upload, and accumulates the
//! mesh bounding box while doing so.

pub mod dedup;
pub mod loader;
pub mod mesh;

pub use dedup::VertexDeduplicator;
pub use loader::{load_obj, load_obj_from_reader};
pub use mesh::{Material, Mesh};
