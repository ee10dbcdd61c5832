use std::io;

use imgdb_types::{GenerationParams, Identity, DIGEST_LEN, SALT_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::ser::Formatter;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// PBKDF2 iteration count used for every persisted identity.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Canonical hash input: keys in sorted order, serialized without whitespace.
///
/// Field declaration order is the key order serde_json emits, so it must stay
/// alphabetical.
#[derive(Serialize)]
struct CanonicalParams<'a> {
    guidance_scale: f64,
    height: u32,
    negative_prompt: &'a str,
    prompt: &'a str,
    seed: i64,
    steps: i32,
    width: u32,
}

/// Compact JSON with every character outside printable ASCII written as a
/// `\uXXXX` escape (UTF-16 surrogate pairs above the BMP).
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if matches!(ch, ' '..='~') {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Derives and validates salted content identities.
///
/// `digest = PBKDF2-HMAC-SHA256(canonical_json(params), salt, iterations, 32)`.
/// The same salt and parameters always produce the same identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityCodec {
    iterations: u32,
}

impl IdentityCodec {
    /// Codec with the persisted iteration count.
    pub const fn new() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Codec with a custom iteration count.
    ///
    /// Identities derived this way do not validate under [`IdentityCodec::new`].
    pub const fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// The PBKDF2 iteration count.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Canonical JSON bytes of the (normalized) parameters.
    ///
    /// `guidance_scale` must be finite: JSON has no encoding for NaN or the
    /// infinities.
    pub fn canonical_input(&self, params: &GenerationParams) -> Result<Vec<u8>, IdentityError> {
        if !params.guidance_scale.is_finite() {
            return Err(IdentityError::NonFinite("guidance_scale"));
        }
        let params = params.clone().normalized();
        let canonical = CanonicalParams {
            guidance_scale: params.guidance_scale,
            height: params.height,
            negative_prompt: &params.negative_prompt,
            prompt: &params.prompt,
            seed: params.seed,
            steps: params.steps,
            width: params.width,
        };
        let mut out = Vec::with_capacity(128);
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiFormatter);
        canonical
            .serialize(&mut serializer)
            .map_err(|e| IdentityError::Serialization(e.to_string()))?;
        Ok(out)
    }

    /// Derive the identity of `params` under a given salt.
    pub fn derive(
        &self,
        salt: [u8; SALT_LEN],
        params: &GenerationParams,
    ) -> Result<Identity, IdentityError> {
        let input = self.canonical_input(params)?;
        Ok(Identity::from_parts(salt, self.digest(&input, &salt)))
    }

    /// Mint a new identity with a fresh random salt.
    pub fn mint(&self, params: &GenerationParams) -> Result<Identity, IdentityError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        self.derive(salt, params)
    }

    /// Validate a hex-encoded hash input against an identity.
    ///
    /// Recomputes the digest from the identity's embedded salt and compares in
    /// constant time.
    pub fn validate(&self, claimed_input_hex: &str, identity: &Identity) -> Result<bool, IdentityError> {
        let input = hex::decode(claimed_input_hex)
            .map_err(|e| IdentityError::InvalidInput(e.to_string()))?;
        Ok(self.verify_input(&input, identity))
    }

    /// Whether `params` still hash to `identity`.
    ///
    /// A `false` result means the record's semantic fields changed and its
    /// identity must be rotated.
    pub fn matches(&self, params: &GenerationParams, identity: &Identity) -> Result<bool, IdentityError> {
        let input = self.canonical_input(params)?;
        Ok(self.verify_input(&input, identity))
    }

    /// Constant-time check of a raw hash input against an identity.
    pub fn verify_input(&self, input: &[u8], identity: &Identity) -> bool {
        let expected = self.digest(input, identity.salt());
        expected[..].ct_eq(&identity.digest()[..]).into()
    }

    fn digest(&self, input: &[u8], salt: &[u8; SALT_LEN]) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(input, salt, self.iterations, &mut out);
        out
    }
}

impl Default for IdentityCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors from identity operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid hash input: {0}")]
    InvalidInput(String),

    #[error("{0} must be a finite number")]
    NonFinite(&'static str),
}
