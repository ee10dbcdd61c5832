use std::path::PathBuf;

use flate2::Compression;
use imgdb_crypto::{IdentityCodec, DEFAULT_ITERATIONS};
use serde::{Deserialize, Serialize};

/// Default database file name.
pub const DEFAULT_PATH: &str = "datav2.imdb";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the database file. Created lazily on the first insert.
    pub path: PathBuf,
    /// zlib level (0-9) for image payloads and the catalog.
    pub compression_level: u32,
    /// `fsync` the file after every committed mutation.
    pub sync_on_commit: bool,
    /// PBKDF2 rounds used to derive identities.
    pub kdf_iterations: u32,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub(crate) fn compression(&self) -> Compression {
        Compression::new(self.compression_level.min(9))
    }

    pub(crate) fn identity_codec(&self) -> IdentityCodec {
        IdentityCodec::with_iterations(self.kdf_iterations)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            compression_level: 6,
            sync_on_commit: false,
            kdf_iterations: DEFAULT_ITERATIONS,
        }
    }
}
