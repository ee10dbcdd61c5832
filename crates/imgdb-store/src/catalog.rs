//! Metadata catalog codec: bincode-encoded, versioned table of
//! [`ImageRecord`]s wrapped in a single zlib stream.

use flate2::Compression;
use imgdb_types::ImageRecord;
use serde::{Deserialize, Serialize};

use crate::error::{Region, StoreError, StoreResult};
use crate::zlib;

/// Current catalog table format.
pub const CATALOG_VERSION: u32 = 1;

#[derive(Serialize)]
struct CatalogTableRef<'a> {
    version: u32,
    rows: &'a [ImageRecord],
}

#[derive(Deserialize)]
struct CatalogTable {
    version: u32,
    rows: Vec<ImageRecord>,
}

/// Serialize and compress the full ordered catalog.
pub fn encode_catalog(records: &[ImageRecord], level: Compression) -> StoreResult<Vec<u8>> {
    let table = CatalogTableRef {
        version: CATALOG_VERSION,
        rows: records,
    };
    let raw = bincode::serialize(&table).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(zlib::compress(&raw, level)?)
}

/// Decompress and deserialize a catalog. Empty input is an empty catalog.
pub fn decode_catalog(bytes: &[u8]) -> StoreResult<Vec<ImageRecord>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let raw = zlib::decompress(bytes).map_err(|e| StoreError::corrupt(Region::Catalog, e))?;
    let table: CatalogTable = bincode::deserialize(&raw)
        .map_err(|e| StoreError::corrupt(Region::Catalog, e.to_string()))?;
    if table.version != CATALOG_VERSION {
        return Err(StoreError::corrupt(
            Region::Catalog,
            format!("unsupported catalog version {}", table.version),
        ));
    }
    Ok(table.rows)
}
