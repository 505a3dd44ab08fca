//! File header.

use std::io::{Read, Write};

use gpumtv_core::constants::MAX_CHUNK_RESOLUTION;
use gpumtv_core::{Error, Result, SectorGrid};

/// Current format version.
pub const BVOX_VERSION: u8 = 1;

/// Encoded header size in bytes.
pub const HEADER_SIZE: usize = 9;

/// Header of a `.bvox` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BvoxHeader {
    /// Format version
    pub version: u8,
    /// Voxels per axis of every chunk
    pub chunk_resolution: u32,
    /// Bytes per chunk payload, `chunk_resolution³`
    pub chunk_voxel_count: u32,
}

impl BvoxHeader {
    /// Header for chunks of `chunk_resolution³` voxels.
    pub fn new(chunk_resolution: u32) -> Result<Self> {
        if chunk_resolution == 0 || chunk_resolution > MAX_CHUNK_RESOLUTION {
            return Err(Error::Configuration(format!(
                "chunk resolution {chunk_resolution} outside 1..={MAX_CHUNK_RESOLUTION}"
            )));
        }
        Ok(Self {
            version: BVOX_VERSION,
            chunk_resolution,
            chunk_voxel_count: chunk_resolution.pow(3),
        })
    }

    /// Header for the chunks of a sector grid.
    pub fn for_grid(grid: &SectorGrid) -> Result<Self> {
        Self::new(grid.chunk_resolution())
    }

    /// Payload size of one chunk in bytes
    #[inline]
    pub const fn chunk_bytes(&self) -> u64 {
        self.chunk_voxel_count as u64
    }

    /// Encode as little-endian bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..5].copy_from_slice(&self.chunk_resolution.to_le_bytes());
        bytes[5..9].copy_from_slice(&self.chunk_voxel_count.to_le_bytes());
        bytes
    }

    /// Decode and validate a header.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let version = bytes[0];
        let chunk_resolution = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let chunk_voxel_count = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        if version != BVOX_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported bvox version {version}"
            )));
        }
        let expected = Self::new(chunk_resolution)
            .map_err(|_| Error::InvalidData(format!("invalid chunk resolution {chunk_resolution}")))?;
        if expected.chunk_voxel_count != chunk_voxel_count {
            return Err(Error::InvalidData(format!(
                "chunk voxel count {chunk_voxel_count} does not match resolution {chunk_resolution}"
            )));
        }

        Ok(expected)
    }

    /// Write the encoded header.
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Read the raw header bytes; validation happens in [`BvoxHeader::from_bytes`].
    pub fn read_bytes(reader: &mut impl Read) -> std::io::Result<[u8; HEADER_SIZE]> {
        let mut bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

/// Size of a complete file holding `sector_count` chunks.
pub fn expected_file_size(header: &BvoxHeader, sector_count: u64) -> u64 {
    HEADER_SIZE as u64 + sector_count * header.chunk_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encoding() {
        let header = BvoxHeader::new(256).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..5], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[5..9], &16_777_216u32.to_le_bytes());
        assert_eq!(BvoxHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn rejects_corrupt_headers() {
        let mut bytes = BvoxHeader::new(4).unwrap().to_bytes();
        bytes[0] = 2;
        assert!(matches!(
            BvoxHeader::from_bytes(&bytes),
            Err(Error::InvalidData(_))
        ));

        let mut bytes = BvoxHeader::new(4).unwrap().to_bytes();
        bytes[5] = 63;
        assert!(BvoxHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn chunk_resolution_limits() {
        assert!(BvoxHeader::new(0).is_err());
        assert!(BvoxHeader::new(MAX_CHUNK_RESOLUTION).is_ok());
        assert!(BvoxHeader::new(MAX_CHUNK_RESOLUTION + 1).is_err());
    }

    #[test]
    fn file_size_of_large_grid() {
        let grid = SectorGrid::new(1024, 256).unwrap();
        let header = BvoxHeader::for_grid(&grid).unwrap();
        assert_eq!(
            expected_file_size(&header, grid.sector_count()),
            9 + 1_073_741_824
        );
    }
}
