//! Reading `.bvox` files back.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use gpumtv_core::{Error, OccupancyChunk, Result, SectorGrid};

use crate::{BvoxHeader, HEADER_SIZE};

/// Random access to the chunks of a `.bvox` file.
#[derive(Debug)]
pub struct BvoxReader {
    path: PathBuf,
    file: File,
    header: BvoxHeader,
    chunk_count: u64,
}

impl BvoxReader {
    /// Open a file and validate its header and payload length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| Error::serialization(&path, e))?;

        let bytes = BvoxHeader::read_bytes(&mut file).map_err(|e| Error::serialization(&path, e))?;
        let header = BvoxHeader::from_bytes(&bytes)?;

        let len = file
            .metadata()
            .map_err(|e| Error::serialization(&path, e))?
            .len();
        let payload = len - HEADER_SIZE as u64;
        if payload % header.chunk_bytes() != 0 {
            return Err(Error::InvalidData(format!(
                "{}: payload of {payload} bytes is not a whole number of {}-byte chunks",
                path.display(),
                header.chunk_bytes()
            )));
        }

        Ok(Self {
            path,
            file,
            header,
            chunk_count: payload / header.chunk_bytes(),
        })
    }

    pub const fn header(&self) -> &BvoxHeader {
        &self.header
    }

    /// Number of complete chunks in the file
    pub const fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Read the chunk at `index` into `chunk`.
    pub fn read_chunk(&mut self, index: u64, chunk: &mut OccupancyChunk) -> Result<()> {
        if index >= self.chunk_count {
            return Err(Error::InvalidData(format!(
                "chunk {index} out of range ({} chunks)",
                self.chunk_count
            )));
        }
        if chunk.resolution() != self.header.chunk_resolution {
            return Err(Error::InvalidData(format!(
                "chunk resolution {} does not match file resolution {}",
                chunk.resolution(),
                self.header.chunk_resolution
            )));
        }

        let offset = HEADER_SIZE as u64 + index * self.header.chunk_bytes();
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(chunk.as_bytes_mut()))
            .map_err(|e| Error::serialization(&self.path, e))
    }

    /// Reassemble the dense grid, `G³` bytes with x fastest, then y, then z.
    ///
    /// The file must hold exactly one chunk per sector of `grid`.
    pub fn reconstruct_grid(&mut self, grid: &SectorGrid) -> Result<Vec<u8>> {
        if grid.chunk_resolution() != self.header.chunk_resolution {
            return Err(Error::InvalidData(format!(
                "grid chunk resolution {} does not match file resolution {}",
                grid.chunk_resolution(),
                self.header.chunk_resolution
            )));
        }
        if grid.sector_count() != self.chunk_count {
            return Err(Error::InvalidData(format!(
                "file holds {} chunks, grid needs {}",
                self.chunk_count,
                grid.sector_count()
            )));
        }

        let g = grid.grid_resolution() as usize;
        let c = grid.chunk_resolution() as usize;
        let mut voxels = vec![0u8; grid.grid_voxel_count() as usize];
        let mut chunk = OccupancyChunk::new(grid.chunk_resolution());

        for sector in grid {
            self.read_chunk(sector.index(), &mut chunk)?;
            let start = sector.start();
            let bytes = chunk.as_bytes();

            for z in 0..c {
                for y in 0..c {
                    let src = c * (y + c * z);
                    let dst = start.x as usize + g * (start.y as usize + y + g * (start.z as usize + z));
                    voxels[dst..dst + c].copy_from_slice(&bytes[src..src + c]);
                }
            }
        }

        Ok(voxels)
    }
}
