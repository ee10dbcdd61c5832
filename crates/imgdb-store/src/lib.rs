//! Single-file, content-addressed image database.
//!
//! One file holds every image and its generation metadata:
//!
//! ```text
//! [header 16B][blob region][mapper table][metadata catalog]
//! ```
//!
//! Images are zlib-compressed and packed back to back in the blob region.
//! The mapper table maps each salted [`Identity`](imgdb_types::Identity) to
//! the offset and length of its blob, and the catalog holds one
//! [`ImageRecord`](imgdb_types::ImageRecord) per image. Deleting an image
//! compacts the blob region in place, so the file never contains gaps.
//!
//! # Design Rules
//!
//! 1. The header is written last. It always points at a complete generation
//!    of mapper and catalog as long as no write is interrupted.
//! 2. Every mutation rewrites the mapper and catalog in full and truncates
//!    the file to their end.
//! 3. Readers share a [`StoreLock`]; writers hold it exclusively.
//! 4. Corruption is reported as [`StoreError::CorruptStore`] and never
//!    repaired.

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod layout;
pub mod lock;
pub mod mapper;
pub mod query;
pub mod request;
mod snapshot;
pub mod traits;
mod zlib;

pub use config::{StoreConfig, DEFAULT_PATH};
pub use database::{ImageDatabase, VerifyReport};
pub use error::{Region, StoreError, StoreResult};
pub use export::{ExportMode, ExportReport};
pub use layout::{Header, HEADER_LEN};
pub use lock::StoreLock;
pub use mapper::{MapperEntry, ENTRY_LEN};
pub use query::{collect_tags, CatalogFilter};
pub use request::PutRequest;
pub use traits::ImageStore;
