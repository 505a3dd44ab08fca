//! `.bvox` occupancy grid files.
//!
//! A `.bvox` file is a 9-byte little-endian header followed by one payload
//! of `C³` bytes per sector, in the z-major sector order of
//! [`gpumtv_core::SectorGrid`]. Chunks are appended one at a time, so a run
//! that dies midway still leaves a valid header plus the complete chunks
//! written so far.
//!
//! ```text
//! offset  size  field
//! 0       1     version (1)
//! 1       4     chunk resolution C
//! 5       4     chunk voxel count C³
//! 9       C³    sector 0 payload, x fastest, then y, then z
//! ...
//! ```

pub mod header;
pub mod reader;
pub mod writer;

pub use header::{expected_file_size, BvoxHeader, BVOX_VERSION, HEADER_SIZE};
pub use reader::BvoxReader;
pub use writer::BvoxWriter;
