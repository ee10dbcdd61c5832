//! Identity derivation for imgdb.
//!
//! An image's identity is a salted PBKDF2-HMAC-SHA256 digest of the canonical
//! JSON encoding of its generation parameters. This crate mints identities,
//! recomputes them, and validates them in constant time.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod codec;

pub use codec::{IdentityCodec, IdentityError, DEFAULT_ITERATIONS};
