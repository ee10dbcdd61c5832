//! Physical file layout.
//!
//! ```text
//! [0, 16)                          header: mapper_offset (u64 LE), metadata_offset (u64 LE)
//! [16, mapper_offset)              blob region: concatenated zlib payloads
//! [mapper_offset, metadata_offset) mapper table: 64-byte records
//! [metadata_offset, EOF)           metadata catalog: one zlib stream
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Region, StoreError, StoreResult};
use crate::mapper::ENTRY_LEN;

/// Size of the fixed header, and the offset of the first blob.
pub const HEADER_LEN: u64 = 16;

/// Buffer size used when compacting the blob region.
const COPY_CHUNK: usize = 1 << 20;

/// Region boundaries recorded at the start of the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub mapper_offset: u64,
    pub metadata_offset: u64,
}

impl Header {
    /// Header of a file with no images.
    pub const EMPTY: Self = Self {
        mapper_offset: HEADER_LEN,
        metadata_offset: HEADER_LEN,
    };

    pub fn to_bytes(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[..8].copy_from_slice(&self.mapper_offset.to_le_bytes());
        buf[8..].copy_from_slice(&self.metadata_offset.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_LEN as usize]) -> Self {
        let mut mapper = [0u8; 8];
        let mut metadata = [0u8; 8];
        mapper.copy_from_slice(&buf[..8]);
        metadata.copy_from_slice(&buf[8..]);
        Self {
            mapper_offset: u64::from_le_bytes(mapper),
            metadata_offset: u64::from_le_bytes(metadata),
        }
    }

    /// Read and validate the header against the file length.
    pub fn read_from(file: &mut File, file_len: u64) -> StoreResult<Self> {
        if file_len < HEADER_LEN {
            return Err(StoreError::corrupt(
                Region::Header,
                format!("file is {file_len} bytes, shorter than the header"),
            ));
        }
        let mut buf = [0u8; HEADER_LEN as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let header = Self::from_bytes(&buf);
        header.validate(file_len)?;
        Ok(header)
    }

    /// Check `16 <= mapper_offset <= metadata_offset <= file_len` and that the
    /// mapper holds whole records.
    pub fn validate(&self, file_len: u64) -> StoreResult<()> {
        if self.mapper_offset < HEADER_LEN
            || self.mapper_offset > self.metadata_offset
            || self.metadata_offset > file_len
        {
            return Err(StoreError::corrupt(
                Region::Header,
                format!(
                    "offsets out of order: mapper {}, metadata {}, file length {file_len}",
                    self.mapper_offset, self.metadata_offset
                ),
            ));
        }
        if self.mapper_len() % ENTRY_LEN as u64 != 0 {
            return Err(StoreError::corrupt(
                Region::Mapper,
                format!("length {} is not a multiple of {ENTRY_LEN}", self.mapper_len()),
            ));
        }
        Ok(())
    }

    pub fn blob_len(&self) -> u64 {
        self.mapper_offset - HEADER_LEN
    }

    pub fn mapper_len(&self) -> u64 {
        self.metadata_offset - self.mapper_offset
    }
}

/// Read `len` bytes at `offset`; a short read means the region is truncated.
pub(crate) fn read_region(
    file: &mut File,
    offset: u64,
    len: u64,
    region: Region,
) -> StoreResult<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => StoreError::corrupt(
            region,
            format!("truncated: wanted {len} bytes at offset {offset}"),
        ),
        _ => StoreError::Io(e),
    })?;
    Ok(buf)
}

pub(crate) fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

/// Move the bytes in `[start, end)` down to `dest` (`dest <= start`).
pub(crate) fn shift_left(file: &mut File, start: u64, end: u64, dest: u64) -> io::Result<()> {
    debug_assert!(dest <= start && start <= end);
    let mut buf = vec![0u8; COPY_CHUNK.min((end - start) as usize)];
    let (mut src, mut dst) = (start, dest);
    while src < end {
        let n = ((end - src) as usize).min(buf.len());
        file.seek(SeekFrom::Start(src))?;
        file.read_exact(&mut buf[..n])?;
        file.seek(SeekFrom::Start(dst))?;
        file.write_all(&buf[..n])?;
        src += n as u64;
        dst += n as u64;
    }
    Ok(())
}
