use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of the random salt embedded in every identity.
pub const SALT_LEN: usize = 16;

/// Length of the PBKDF2-HMAC-SHA256 digest.
pub const DIGEST_LEN: usize = 32;

/// Salted content identity of an image record.
///
/// An `Identity` pairs a random 16-byte salt with a 32-byte digest derived
/// from the record's semantic fields. The textual form is
/// `hex(salt) + "$" + hex(digest)`, which is also the serialized form.
///
/// This type only carries the bytes; deriving and validating digests lives in
/// `imgdb-crypto`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
}

impl Identity {
    /// Separator between the salt and digest in the textual form.
    pub const SEPARATOR: char = '$';

    /// Assemble an identity from raw salt and digest bytes.
    pub const fn from_parts(salt: [u8; SALT_LEN], digest: [u8; DIGEST_LEN]) -> Self {
        Self { salt, digest }
    }

    /// The raw salt.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// The raw digest.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Full textual form: `hex(salt)$hex(digest)`.
    pub fn to_hex(&self) -> String {
        format!(
            "{}{}{}",
            hex::encode(self.salt),
            Self::SEPARATOR,
            hex::encode(self.digest)
        )
    }

    /// Short identifier (first 8 hex characters of the digest).
    pub fn short_id(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Parse the textual form `hex(salt)$hex(digest)`.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let (salt_hex, digest_hex) = s
            .trim()
            .split_once(Self::SEPARATOR)
            .ok_or_else(|| TypeError::MalformedIdentity(s.to_string()))?;
        Ok(Self {
            salt: decode_fixed(salt_hex)?,
            digest: decode_fixed(digest_hex)?,
        })
    }
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], TypeError> {
    let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
    bytes.try_into().map_err(|b: Vec<u8>| TypeError::InvalidLength {
        expected: N,
        actual: b.len(),
    })
}

impl FromStr for Identity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.to_hex()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.short_id())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Identity {
        Identity::from_parts([0xab; SALT_LEN], [0x01; DIGEST_LEN])
    }

    #[test]
    fn textual_form() {
        let text = sample().to_hex();
        assert_eq!(text.len(), 32 + 1 + 64);
        assert!(text.starts_with(&"ab".repeat(16)));
        assert_eq!(text.chars().nth(32), Some('$'));
    }

    #[test]
    fn hex_roundtrip() {
        let id = sample();
        let parsed: Identity = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_accepts_uppercase() {
        let upper = sample().to_hex().to_uppercase();
        assert_eq!(Identity::from_hex(&upper).unwrap(), sample());
    }

    #[test]
    fn parse_missing_separator() {
        let err = Identity::from_hex(&"ab".repeat(48)).unwrap_err();
        assert!(matches!(err, TypeError::MalformedIdentity(_)));
    }

    #[test]
    fn parse_bad_hex() {
        let err = Identity::from_hex("zz$00").unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn parse_wrong_salt_length() {
        let text = format!("{}${}", "ab".repeat(8), "01".repeat(32));
        let err = Identity::from_hex(&text).unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 16,
                actual: 8
            }
        );
    }

    #[test]
    fn serde_uses_textual_form() {
        let id = sample();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let parsed: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn bincode_roundtrip() {
        let id = sample();
        let bytes = bincode::serialize(&id).unwrap();
        let parsed: Identity = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn short_id_is_digest_prefix() {
        assert_eq!(sample().short_id(), "01010101");
    }
}
