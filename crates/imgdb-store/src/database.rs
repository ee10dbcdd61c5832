use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use imgdb_crypto::IdentityCodec;
use imgdb_types::{GenerationParams, Identity, ImageRecord};
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{decode_catalog, encode_catalog};
use crate::config::StoreConfig;
use crate::error::{Region, StoreError, StoreResult};
use crate::layout::{read_region, shift_left, write_at, Header, HEADER_LEN};
use crate::lock::StoreLock;
use crate::mapper::{encode_mapper, find_entry, MapperEntry};
use crate::request::PutRequest;
use crate::snapshot::Snapshot;
use crate::traits::ImageStore;
use crate::zlib;

/// Counts gathered by [`ImageDatabase::verify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub images: usize,
    pub blob_bytes: u64,
    pub mapper_bytes: u64,
    pub catalog_bytes: u64,
}

/// Work prepared for `put` before the write lock is taken.
enum Pending {
    Insert {
        identity: Identity,
        params: GenerationParams,
        blob: Vec<u8>,
    },
    Update {
        identity: Identity,
        blob: Option<Vec<u8>>,
    },
}

/// Blob moves implied by one mutation, applied before the tables are
/// rewritten.
#[derive(Default)]
struct BlobMoves {
    vacated: Option<MapperEntry>,
    appended: Option<(MapperEntry, Vec<u8>)>,
}

/// Single-file image database.
///
/// Every mutation loads the header, mapper, and catalog into a snapshot,
/// edits it in memory, and writes it back in a fixed order: blob bytes,
/// mapper, catalog, truncation, then the header.
pub struct ImageDatabase {
    config: StoreConfig,
    codec: IdentityCodec,
    lock: Arc<StoreLock>,
}

impl ImageDatabase {
    /// Handle on the configured file. Nothing is read or created until the
    /// first operation.
    ///
    /// Handles opened on the same file share one process-wide lock.
    pub fn open(config: StoreConfig) -> Self {
        let lock = StoreLock::for_path(&config.path);
        Self::with_lock(config, lock)
    }

    /// Handle guarded by `lock` instead of the file's process-wide lock.
    pub fn with_lock(config: StoreConfig, lock: Arc<StoreLock>) -> Self {
        Self {
            codec: config.identity_codec(),
            config,
            lock,
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self::open(StoreConfig::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn lock(&self) -> &Arc<StoreLock> {
        &self.lock
    }

    pub fn codec(&self) -> &IdentityCodec {
        &self.codec
    }

    /// Store a training image with sentinel generation parameters.
    pub fn insert_training_image(&self, image: Vec<u8>, width: u32, height: u32) -> StoreResult<Identity> {
        self.insert(image, GenerationParams::training(width, height))
    }

    /// Identities at the given positions of the blob region, in blob order.
    /// Positions past the end are ignored.
    pub fn select_by_position(&self, positions: &[usize]) -> StoreResult<Vec<Identity>> {
        let _guard = self.lock.read();
        let Some(mut file) = self.open_existing(false)? else {
            return Ok(Vec::new());
        };
        let snapshot = Snapshot::load(&mut file)?;
        Ok(positioned(&snapshot, positions).collect())
    }

    /// Catalog rows at the given blob positions, in blob order, read from a
    /// single generation of the file.
    pub fn records_by_position(&self, positions: &[usize]) -> StoreResult<Vec<ImageRecord>> {
        let _guard = self.lock.read();
        let Some(mut file) = self.open_existing(false)? else {
            return Ok(Vec::new());
        };
        let mut snapshot = Snapshot::load(&mut file)?;
        let selected: Vec<Identity> = positioned(&snapshot, positions).collect();
        let mut records = std::mem::take(&mut snapshot.records);
        records.retain(|r| selected.contains(&r.identity));
        records.sort_by_key(|r| selected.iter().position(|id| *id == r.identity));
        Ok(records)
    }

    /// Check every structural invariant and decompress every blob.
    pub fn verify(&self) -> StoreResult<VerifyReport> {
        let _guard = self.lock.read();
        let Some(mut file) = self.open_existing(false)? else {
            return Ok(VerifyReport::default());
        };
        let file_len = file.metadata()?.len();
        let snapshot = Snapshot::load(&mut file)?;
        for entry in &snapshot.entries {
            read_blob(&mut file, &snapshot.header, entry)?;
        }
        let header = snapshot.header;
        let report = VerifyReport {
            images: snapshot.entries.len(),
            blob_bytes: header.blob_len(),
            mapper_bytes: header.mapper_len(),
            catalog_bytes: file_len - header.metadata_offset,
        };
        debug!(images = report.images, blob_bytes = report.blob_bytes, "store verified");
        Ok(report)
    }

    /// Open the file if it exists and is non-empty. Both cases read as an
    /// empty store.
    pub(crate) fn open_existing(&self, write: bool) -> StoreResult<Option<File>> {
        let file = match OpenOptions::new().read(true).write(write).open(&self.config.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        Ok(Some(file))
    }

    /// Open for a mutation, initializing a missing or empty file.
    fn open_for_update(&self) -> StoreResult<File> {
        if let Some(file) = self.open_existing(true)? {
            return Ok(file);
        }
        let path = &self.config.path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&Header::EMPTY.to_bytes())?;
        file.write_all(&encode_catalog(&[], self.config.compression())?)?;
        file.flush()?;
        info!(path = %path.display(), "initialized image database");
        Ok(file)
    }

    fn plan_insert(
        &self,
        snapshot: &mut Snapshot,
        identity: Identity,
        params: GenerationParams,
        request: &PutRequest,
        blob: Vec<u8>,
    ) -> BlobMoves {
        let entry = snapshot.append_blob(identity, blob.len() as u64);
        let mut record = ImageRecord::new(identity, params);
        request.apply_label(&mut record);
        snapshot.records.push(record);
        debug!(
            identity = %identity.short_id(),
            offset = entry.offset,
            length = entry.length,
            "inserting image"
        );
        BlobMoves {
            vacated: None,
            appended: Some((entry, blob)),
        }
    }

    fn plan_update(
        &self,
        snapshot: &mut Snapshot,
        identity: &Identity,
        request: &PutRequest,
        blob: Option<Vec<u8>>,
    ) -> StoreResult<(Identity, BlobMoves)> {
        let row = snapshot
            .record_index(identity)
            .ok_or(StoreError::NotFound(*identity))?;
        let slot = snapshot.entry_index(identity).ok_or_else(|| {
            StoreError::corrupt(
                Region::Mapper,
                format!("no entry for catalog row {}", identity.short_id()),
            )
        })?;

        let mut record = snapshot.records[row].clone();
        request.apply_semantic(&mut record);
        let mut current = *identity;
        if request.has_semantic_changes() && !self.codec.matches(&record.params(), identity)? {
            current = self.codec.mint(&record.params())?;
            record.identity = current;
            snapshot.entries[slot].identity = current;
            debug!(
                old = %identity.short_id(),
                new = %current.short_id(),
                "identity rotated"
            );
        }
        request.apply_label(&mut record);
        snapshot.records[row] = record;

        let mut moves = BlobMoves::default();
        if let Some(blob) = blob {
            let vacated = snapshot.vacate(slot);
            let entry = snapshot.append_blob(current, blob.len() as u64);
            debug!(
                identity = %current.short_id(),
                old_offset = vacated.offset,
                old_length = vacated.length,
                offset = entry.offset,
                length = entry.length,
                "replacing image"
            );
            moves = BlobMoves {
                vacated: Some(vacated),
                appended: Some((entry, blob)),
            };
        }
        Ok((current, moves))
    }

    /// Persist a mutated snapshot over the generation it was loaded from.
    fn write_back(&self, file: &mut File, previous: Header, next: &Snapshot, moves: BlobMoves) -> StoreResult<()> {
        let layout = next.layout();
        let vacated_len = moves.vacated.map_or(0, |e| e.length);
        let appended_len = moves.appended.as_ref().map_or(0, |(e, _)| e.length);
        if previous.mapper_offset - vacated_len + appended_len != layout.mapper_offset {
            return Err(StoreError::corrupt(
                Region::Blob,
                format!(
                    "blob region would end at {}, expected {}",
                    layout.mapper_offset,
                    previous.mapper_offset - vacated_len + appended_len
                ),
            ));
        }
        let mapper = encode_mapper(&next.entries);
        let catalog = encode_catalog(&next.records, self.config.compression())?;

        if let Some(vacated) = moves.vacated {
            shift_left(file, vacated.end(), previous.mapper_offset, vacated.offset)?;
        }
        if let Some((entry, blob)) = &moves.appended {
            write_at(file, entry.offset, blob)?;
        }
        write_at(file, layout.mapper_offset, &mapper)?;
        write_at(file, layout.metadata_offset, &catalog)?;
        file.set_len(layout.metadata_offset + catalog.len() as u64)?;
        write_at(file, 0, &layout.to_bytes())?;
        file.flush()?;
        if self.config.sync_on_commit {
            file.sync_all()?;
        }
        Ok(())
    }
}

impl ImageStore for ImageDatabase {
    fn put(&self, identity: Option<&Identity>, request: PutRequest) -> StoreResult<Identity> {
        // Inserts are validated, compressed, and hashed before the lock is taken.
        request.validate()?;
        let pending = match identity {
            None => {
                let image = request
                    .image
                    .as_deref()
                    .ok_or(StoreError::MissingField("image"))?;
                let params = request.params()?;
                let blob = zlib::compress(image, self.config.compression())?;
                Pending::Insert {
                    identity: self.codec.mint(&params)?,
                    params,
                    blob,
                }
            }
            Some(identity) => Pending::Update {
                identity: *identity,
                blob: request
                    .image
                    .as_deref()
                    .map(|image| zlib::compress(image, self.config.compression()))
                    .transpose()?,
            },
        };

        let _guard = self.lock.write();
        let mut file = self.open_for_update()?;
        let mut snapshot = Snapshot::load(&mut file)?;
        let previous = snapshot.header;
        let (identity, moves) = match pending {
            Pending::Insert {
                identity,
                params,
                blob,
            } => {
                let moves = self.plan_insert(&mut snapshot, identity, params, &request, blob);
                (identity, moves)
            }
            Pending::Update { identity, blob } => {
                self.plan_update(&mut snapshot, &identity, &request, blob)?
            }
        };
        self.write_back(&mut file, previous, &snapshot, moves)?;
        Ok(identity)
    }

    fn get(&self, identity: &Identity) -> StoreResult<Option<Vec<u8>>> {
        let _guard = self.lock.read();
        let Some(mut file) = self.open_existing(false)? else {
            return Ok(None);
        };
        let file_len = file.metadata()?.len();
        let header = Header::read_from(&mut file, file_len)?;
        let mapper = read_region(&mut file, header.mapper_offset, header.mapper_len(), Region::Mapper)?;
        let Some(entry) = find_entry(&mapper, identity)? else {
            debug!(identity = %identity.short_id(), "image not found");
            return Ok(None);
        };
        debug!(
            identity = %identity.short_id(),
            offset = entry.offset,
            length = entry.length,
            "reading image"
        );
        read_blob(&mut file, &header, &entry).map(Some)
    }

    fn delete(&self, identity: &Identity) -> StoreResult<bool> {
        let _guard = self.lock.write();
        let Some(mut file) = self.open_existing(true)? else {
            return Ok(false);
        };
        let mut snapshot = Snapshot::load(&mut file)?;
        let Some(slot) = snapshot.entry_index(identity) else {
            return Ok(false);
        };
        let row = snapshot.record_index(identity).ok_or_else(|| {
            StoreError::corrupt(
                Region::Catalog,
                format!("no row for mapper entry {}", identity.short_id()),
            )
        })?;
        let previous = snapshot.header;
        let vacated = snapshot.vacate(slot);
        snapshot.records.remove(row);
        let moves = BlobMoves {
            vacated: Some(vacated),
            appended: None,
        };
        self.write_back(&mut file, previous, &snapshot, moves)?;
        info!(
            identity = %identity.short_id(),
            offset = vacated.offset,
            length = vacated.length,
            "deleted image"
        );
        Ok(true)
    }

    fn list_metadata(&self) -> StoreResult<Vec<ImageRecord>> {
        let _guard = self.lock.read();
        let Some(mut file) = self.open_existing(false)? else {
            return Ok(Vec::new());
        };
        let file_len = file.metadata()?.len();
        let header = Header::read_from(&mut file, file_len)?;
        let catalog = read_region(
            &mut file,
            header.metadata_offset,
            file_len - header.metadata_offset,
            Region::Catalog,
        )?;
        decode_catalog(&catalog)
    }
}

/// Identities at `positions` of the blob region, in blob order.
fn positioned<'a>(snapshot: &Snapshot, positions: &'a [usize]) -> impl Iterator<Item = Identity> + 'a {
    snapshot
        .entries_by_offset()
        .into_iter()
        .enumerate()
        .filter(move |(i, _)| positions.contains(i))
        .map(|(_, e)| e.identity)
}

/// Read and inflate one blob, bounds-checked against the blob region.
pub(crate) fn read_blob(file: &mut File, header: &Header, entry: &MapperEntry) -> StoreResult<Vec<u8>> {
    let in_bounds = entry.offset >= HEADER_LEN
        && entry
            .offset
            .checked_add(entry.length)
            .is_some_and(|end| end <= header.mapper_offset);
    if !in_bounds {
        return Err(StoreError::corrupt(
            Region::Blob,
            format!(
                "entry {} spans [{}, +{}) outside the blob region",
                entry.identity.short_id(),
                entry.offset,
                entry.length
            ),
        ));
    }
    let blob = read_region(file, entry.offset, entry.length, Region::Blob)?;
    zlib::decompress(&blob).map_err(|e| {
        StoreError::corrupt(
            Region::Blob,
            format!("image {}: {e}", entry.identity.short_id()),
        )
    })
}
