//! Foundation types for imgdb, the single-file image database.
//!
//! Every other imgdb crate depends on `imgdb-types`.
//!
//! # Key Types
//!
//! - [`Identity`] -- salted content identity (`hex(salt)$hex(digest)`)
//! - [`ImageRecord`] -- one catalog row describing a stored image
//! - [`GenerationParams`] -- the seven semantic fields an identity is derived from
//! - [`normalize_tags`] -- canonical comma-joined prompt form

pub mod error;
pub mod identity;
pub mod record;

pub use error::TypeError;
pub use identity::{Identity, DIGEST_LEN, SALT_LEN};
pub use record::{normalize_tags, split_tags, GenerationParams, ImageRecord};
