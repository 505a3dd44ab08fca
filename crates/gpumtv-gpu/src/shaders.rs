//! SPIR-V module loading.
//!
//! Programs are compiled outside the engine and loaded from disk at
//! runtime.

use std::path::Path;

use crate::error::{GpuError, Result};

/// SPIR-V magic number in host word order.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Convert SPIR-V bytes to words, checking alignment and the magic number.
pub fn bytes_to_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 || bytes.is_empty() {
        return Err(GpuError::ShaderLoad(format!(
            "SPIR-V size {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(GpuError::ShaderLoad(format!(
            "bad SPIR-V magic {:#010x}",
            words[0]
        )));
    }

    Ok(words)
}

/// Read a `.spv` file.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))?;
    bytes_to_spirv(&bytes).map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))
}
