use std::collections::HashSet;
use std::fs::File;

use imgdb_types::{Identity, ImageRecord};

use crate::catalog::decode_catalog;
use crate::error::{Region, StoreError, StoreResult};
use crate::layout::{read_region, Header, HEADER_LEN};
use crate::mapper::{decode_mapper, MapperEntry, ENTRY_LEN};

/// Fully decoded header, mapper, and catalog of one file generation.
///
/// Mutations edit the snapshot in memory; [`Snapshot::layout`] then derives
/// the new region boundaries in one pass.
#[derive(Clone, Debug)]
pub(crate) struct Snapshot {
    pub header: Header,
    pub entries: Vec<MapperEntry>,
    pub records: Vec<ImageRecord>,
}

impl Snapshot {
    /// State of a file with no images.
    pub fn empty() -> Self {
        Self {
            header: Header::EMPTY,
            entries: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Load and cross-check every region except the blob payloads.
    pub fn load(file: &mut File) -> StoreResult<Self> {
        let file_len = file.metadata()?.len();
        let header = Header::read_from(file, file_len)?;
        let mapper = read_region(file, header.mapper_offset, header.mapper_len(), Region::Mapper)?;
        let catalog = read_region(
            file,
            header.metadata_offset,
            file_len - header.metadata_offset,
            Region::Catalog,
        )?;
        let snapshot = Self {
            header,
            entries: decode_mapper(&mapper)?,
            records: decode_catalog(&catalog)?,
        };
        snapshot.check()?;
        Ok(snapshot)
    }

    /// Mapper/catalog correspondence and exact tiling of the blob region.
    fn check(&self) -> StoreResult<()> {
        if self.entries.len() != self.records.len() {
            return Err(StoreError::corrupt(
                Region::Catalog,
                format!(
                    "{} catalog rows for {} mapper entries",
                    self.records.len(),
                    self.entries.len()
                ),
            ));
        }
        let rows: HashSet<&Identity> = self.records.iter().map(|r| &r.identity).collect();
        if rows.len() != self.records.len() {
            return Err(StoreError::corrupt(Region::Catalog, "duplicate identity rows"));
        }
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !rows.contains(&entry.identity) {
                return Err(StoreError::corrupt(
                    Region::Mapper,
                    format!("entry {} has no catalog row", entry.identity.short_id()),
                ));
            }
            if !seen.insert(entry.identity) {
                return Err(StoreError::corrupt(
                    Region::Mapper,
                    format!("duplicate entry {}", entry.identity.short_id()),
                ));
            }
        }

        let mut spans: Vec<(u64, u64)> = self.entries.iter().map(|e| (e.offset, e.length)).collect();
        spans.sort_unstable();
        let mut cursor = HEADER_LEN;
        for (offset, length) in spans {
            if offset != cursor {
                return Err(StoreError::corrupt(
                    Region::Blob,
                    format!("blob at offset {offset}, expected {cursor}"),
                ));
            }
            cursor = offset.checked_add(length).ok_or_else(|| {
                StoreError::corrupt(Region::Blob, format!("blob length {length} overflows"))
            })?;
        }
        if cursor != self.header.mapper_offset {
            return Err(StoreError::corrupt(
                Region::Blob,
                format!(
                    "blobs end at {cursor}, mapper starts at {}",
                    self.header.mapper_offset
                ),
            ));
        }
        Ok(())
    }

    pub fn entry_index(&self, identity: &Identity) -> Option<usize> {
        self.entries.iter().position(|e| e.identity == *identity)
    }

    pub fn record_index(&self, identity: &Identity) -> Option<usize> {
        self.records.iter().position(|r| r.identity == *identity)
    }

    /// End of the blob region implied by the current entries.
    pub fn blob_end(&self) -> u64 {
        HEADER_LEN + self.entries.iter().map(|e| e.length).sum::<u64>()
    }

    /// Register a blob of `length` bytes at the end of the blob region.
    pub fn append_blob(&mut self, identity: Identity, length: u64) -> MapperEntry {
        let entry = MapperEntry {
            identity,
            offset: self.blob_end(),
            length,
        };
        self.entries.push(entry);
        entry
    }

    /// Remove an entry and slide every later blob down over its slot.
    pub fn vacate(&mut self, index: usize) -> MapperEntry {
        let removed = self.entries.remove(index);
        for entry in &mut self.entries {
            if entry.offset >= removed.end() {
                entry.offset -= removed.length;
            }
        }
        removed
    }

    /// Region boundaries for the current entries.
    pub fn layout(&self) -> Header {
        let mapper_offset = self.blob_end();
        Header {
            mapper_offset,
            metadata_offset: mapper_offset + (self.entries.len() * ENTRY_LEN) as u64,
        }
    }

    /// Entries in blob-region order.
    pub fn entries_by_offset(&self) -> Vec<MapperEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.offset);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgdb_types::GenerationParams;

    fn id(n: u8) -> Identity {
        Identity::from_parts([n; 16], [n; 32])
    }

    fn snapshot(lengths: &[u64]) -> Snapshot {
        let mut s = Snapshot::empty();
        for (n, &len) in lengths.iter().enumerate() {
            let identity = id(n as u8);
            s.append_blob(identity, len);
            s.records.push(ImageRecord::new(
                identity,
                GenerationParams::new(n as i64, "cat", "", 8, 8, 1, 1.0),
            ));
        }
        s.header = s.layout();
        s
    }

    #[test]
    fn append_tiles_blob_region() {
        let s = snapshot(&[10, 20, 5]);
        let offsets: Vec<u64> = s.entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![16, 26, 46]);
        assert_eq!(s.layout(), Header { mapper_offset: 51, metadata_offset: 51 + 3 * 64 });
        assert!(s.check().is_ok());
    }

    #[test]
    fn vacate_compacts_later_blobs() {
        let mut s = snapshot(&[10, 20, 5]);
        let removed = s.vacate(1);
        assert_eq!((removed.offset, removed.length), (26, 20));
        assert_eq!(s.entries[0].offset, 16);
        assert_eq!(s.entries[1].offset, 26);
        assert_eq!(s.entries[1].length, 5);
        assert_eq!(s.blob_end(), 31);
    }

    #[test]
    fn vacate_last_blob_moves_nothing() {
        let mut s = snapshot(&[10, 20]);
        s.vacate(1);
        assert_eq!(s.entries[0].offset, 16);
        assert_eq!(s.blob_end(), 26);
    }

    #[test]
    fn check_detects_gap() {
        let mut s = snapshot(&[10, 20]);
        s.entries[1].offset += 1;
        assert!(matches!(
            s.check().unwrap_err(),
            StoreError::CorruptStore { region: Region::Blob, .. }
        ));
    }

    #[test]
    fn check_detects_row_mismatch() {
        let mut s = snapshot(&[10, 20]);
        s.records.pop();
        assert!(matches!(
            s.check().unwrap_err(),
            StoreError::CorruptStore { region: Region::Catalog, .. }
        ));
    }

    #[test]
    fn check_detects_orphan_entry() {
        let mut s = snapshot(&[10, 20]);
        s.entries[0].identity = id(99);
        assert!(matches!(
            s.check().unwrap_err(),
            StoreError::CorruptStore { region: Region::Mapper, .. }
        ));
    }

    #[test]
    fn check_detects_short_blob_region() {
        let mut s = snapshot(&[10, 20]);
        s.header.mapper_offset += 4;
        assert!(s.check().is_err());
    }

    #[test]
    fn entries_by_offset_sorts() {
        let mut s = snapshot(&[10, 20, 5]);
        let first = s.vacate(0);
        s.append_blob(first.identity, first.length);
        let order: Vec<Identity> = s.entries_by_offset().iter().map(|e| e.identity).collect();
        assert_eq!(order, vec![id(1), id(2), id(0)]);
    }
}
