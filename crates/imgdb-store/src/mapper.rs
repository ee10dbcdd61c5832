//! Fixed-width offset mapper.
//!
//! Layout of one record (64 bytes, no separators):
//!
//! ```text
//! [16 bytes: identity salt]
//! [32 bytes: identity digest]
//! [ 8 bytes: blob offset (little-endian u64)]
//! [ 8 bytes: blob length (little-endian u64)]
//! ```
//!
//! The table carries no secondary index; lookups are linear scans.

use imgdb_types::{Identity, DIGEST_LEN, SALT_LEN};

use crate::error::{Region, StoreError, StoreResult};

/// Size of one encoded mapper record.
pub const ENTRY_LEN: usize = 64;

const OFFSET_AT: usize = SALT_LEN + DIGEST_LEN;
const LENGTH_AT: usize = OFFSET_AT + 8;

/// Location of one compressed image inside the blob region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapperEntry {
    pub identity: Identity,
    pub offset: u64,
    pub length: u64,
}

impl MapperEntry {
    /// One past the last byte of the blob.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[..SALT_LEN].copy_from_slice(self.identity.salt());
        buf[SALT_LEN..OFFSET_AT].copy_from_slice(self.identity.digest());
        buf[OFFSET_AT..LENGTH_AT].copy_from_slice(&self.offset.to_le_bytes());
        buf[LENGTH_AT..].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; ENTRY_LEN]) -> Self {
        let mut salt = [0u8; SALT_LEN];
        let mut digest = [0u8; DIGEST_LEN];
        let mut offset = [0u8; 8];
        let mut length = [0u8; 8];
        salt.copy_from_slice(&buf[..SALT_LEN]);
        digest.copy_from_slice(&buf[SALT_LEN..OFFSET_AT]);
        offset.copy_from_slice(&buf[OFFSET_AT..LENGTH_AT]);
        length.copy_from_slice(&buf[LENGTH_AT..]);
        Self {
            identity: Identity::from_parts(salt, digest),
            offset: u64::from_le_bytes(offset),
            length: u64::from_le_bytes(length),
        }
    }

    fn matches(buf: &[u8; ENTRY_LEN], identity: &Identity) -> bool {
        &buf[..SALT_LEN] == identity.salt() && &buf[SALT_LEN..OFFSET_AT] == identity.digest()
    }
}

/// Encode entries back to back.
pub fn encode_mapper(entries: &[MapperEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * ENTRY_LEN);
    for entry in entries {
        buf.extend_from_slice(&entry.to_bytes());
    }
    buf
}

/// Decode a mapper table. The length must be a multiple of [`ENTRY_LEN`].
pub fn decode_mapper(bytes: &[u8]) -> StoreResult<Vec<MapperEntry>> {
    Ok(records(bytes)?.map(MapperEntry::from_bytes).collect())
}

/// Linear scan of an encoded table for one identity.
pub fn find_entry(bytes: &[u8], identity: &Identity) -> StoreResult<Option<MapperEntry>> {
    Ok(records(bytes)?
        .find(|buf| MapperEntry::matches(buf, identity))
        .map(MapperEntry::from_bytes))
}

fn records(bytes: &[u8]) -> StoreResult<impl Iterator<Item = &[u8; ENTRY_LEN]>> {
    if bytes.len() % ENTRY_LEN != 0 {
        return Err(StoreError::corrupt(
            Region::Mapper,
            format!("length {} is not a multiple of {ENTRY_LEN}", bytes.len()),
        ));
    }
    Ok(bytes.chunks_exact(ENTRY_LEN).filter_map(|c| <&[u8; ENTRY_LEN]>::try_from(c).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(n: u8, offset: u64, length: u64) -> MapperEntry {
        MapperEntry {
            identity: Identity::from_parts([n; SALT_LEN], [n.wrapping_add(1); DIGEST_LEN]),
            offset,
            length,
        }
    }

    #[test]
    fn record_layout() {
        let bytes = entry(0xaa, 0x0102, 0x0304).to_bytes();
        assert_eq!(&bytes[..16], &[0xaa; 16]);
        assert_eq!(&bytes[16..48], &[0xab; 32]);
        assert_eq!(&bytes[48..56], &0x0102u64.to_le_bytes());
        assert_eq!(&bytes[56..64], &0x0304u64.to_le_bytes());
    }

    #[test]
    fn table_is_concatenated_records() {
        let entries = vec![entry(1, 16, 10), entry(2, 26, 5), entry(3, 31, 1)];
        let bytes = encode_mapper(&entries);
        assert_eq!(bytes.len(), 3 * ENTRY_LEN);
        assert_eq!(decode_mapper(&bytes).unwrap(), entries);
    }

    #[test]
    fn empty_table() {
        assert!(encode_mapper(&[]).is_empty());
        assert!(decode_mapper(&[]).unwrap().is_empty());
    }

    #[test]
    fn ragged_table_is_corrupt() {
        let mut bytes = encode_mapper(&[entry(1, 16, 10)]);
        bytes.push(0);
        let err = decode_mapper(&bytes).unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptStore {
                region: Region::Mapper,
                ..
            }
        ));
    }

    #[test]
    fn find_scans_for_identity() {
        let entries = vec![entry(1, 16, 10), entry(2, 26, 5)];
        let bytes = encode_mapper(&entries);
        assert_eq!(find_entry(&bytes, &entries[1].identity).unwrap(), Some(entries[1]));
        assert_eq!(find_entry(&bytes, &entry(9, 0, 0).identity).unwrap(), None);
    }

    #[test]
    fn find_requires_salt_and_digest() {
        let stored = entry(1, 16, 10);
        let bytes = encode_mapper(&[stored]);
        let same_digest = Identity::from_parts([7; SALT_LEN], *stored.identity.digest());
        assert_eq!(find_entry(&bytes, &same_digest).unwrap(), None);
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            rows in proptest::collection::vec((any::<u8>(), any::<u64>(), any::<u64>()), 0..16)
        ) {
            let entries: Vec<_> = rows.iter().map(|&(n, o, l)| entry(n, o, l)).collect();
            prop_assert_eq!(decode_mapper(&encode_mapper(&entries)).unwrap(), entries);
        }
    }
}
