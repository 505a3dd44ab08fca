//! Append-only writer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use gpumtv_core::{Error, OccupancyChunk, Result};
use tracing::{debug, info};

use crate::{BvoxHeader, HEADER_SIZE};

/// Writes a `.bvox` file chunk by chunk.
///
/// The file is truncated and the header written once in
/// [`BvoxWriter::create`]. Every [`BvoxWriter::append`] reopens the file in
/// append mode and closes it again, so completed chunks reach the file
/// system even if the process dies before the run finishes.
#[derive(Debug)]
pub struct BvoxWriter {
    path: PathBuf,
    header: BvoxHeader,
    chunks_written: u64,
}

impl BvoxWriter {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: impl AsRef<Path>, header: BvoxHeader) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = File::create(&path).map_err(|e| Error::serialization(&path, e))?;
        header
            .write_to(&mut file)
            .and_then(|()| file.flush())
            .map_err(|e| Error::serialization(&path, e))?;

        info!(
            path = %path.display(),
            chunk_resolution = header.chunk_resolution,
            "Created bvox file"
        );

        Ok(Self {
            path,
            header,
            chunks_written: 0,
        })
    }

    /// Append one chunk payload.
    ///
    /// A payload of the wrong length is rejected before the file is opened.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() as u64 != self.header.chunk_bytes() {
            return Err(Error::InvalidData(format!(
                "chunk payload is {} bytes, expected {}",
                payload.len(),
                self.header.chunk_bytes()
            )));
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::serialization(&self.path, e))?;
        file.write_all(payload)
            .and_then(|()| file.flush())
            .map_err(|e| Error::serialization(&self.path, e))?;

        self.chunks_written += 1;
        debug!(chunk = self.chunks_written - 1, "Appended chunk");
        Ok(())
    }

    /// Append an occupancy chunk, checking its resolution against the header.
    pub fn append_chunk(&mut self, chunk: &OccupancyChunk) -> Result<()> {
        if chunk.resolution() != self.header.chunk_resolution {
            return Err(Error::InvalidData(format!(
                "chunk resolution {} does not match file resolution {}",
                chunk.resolution(),
                self.header.chunk_resolution
            )));
        }
        self.append(chunk.as_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn header(&self) -> &BvoxHeader {
        &self.header
    }

    /// Chunks appended so far
    pub const fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Bytes the file should hold right now.
    pub const fn bytes_written(&self) -> u64 {
        HEADER_SIZE as u64 + self.chunks_written * self.header.chunk_bytes()
    }
}
