//! Store-assigned document identifiers.
//!
//! # Responsibility
//! - Allocate 12-byte identifiers at insert time.
//! - Convert between the binary form and the 24-char hex external form.
//!
//! # Invariants
//! - Layout is `[seconds:4][process:5][counter:3]`, all big-endian.
//! - Within one process, byte order equals allocation order.

use once_cell::sync::Lazy;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const OBJECT_ID_LEN: usize = 12;
const COUNTER_MASK: u32 = 0x00ff_ffff;
// Seed in the lower half so a process can allocate millions of ids before wrapping.
const COUNTER_SEED_MASK: u32 = 0x007f_ffff;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| rand::random());
static COUNTER: Lazy<AtomicU32> =
    Lazy::new(|| AtomicU32::new(rand::random::<u32>() & COUNTER_SEED_MASK));

/// Opaque document identifier, ordered by allocation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

/// Hex parse failure for [`ObjectId::parse_hex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdParseError {
    input: String,
}

impl Display for ObjectIdParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid object id `{}`: expected {} hex characters",
            self.input,
            OBJECT_ID_LEN * 2
        )
    }
}

impl Error for ObjectIdParseError {}

impl ObjectId {
    /// Allocates a new identifier from the clock and the process counter.
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or(0);
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) & COUNTER_MASK;

        let mut bytes = [0u8; OBJECT_ID_LEN];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(PROCESS_UNIQUE.as_slice());
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Parses the 24-char hex form. Upper and lower case are accepted.
    pub fn parse_hex(value: &str) -> Result<Self, ObjectIdParseError> {
        let invalid = || ObjectIdParseError {
            input: value.to_string(),
        };
        if value.len() != OBJECT_ID_LEN * 2 {
            return Err(invalid());
        }
        let mut bytes = [0u8; OBJECT_ID_LEN];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl serde::Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for ObjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse_hex(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectId;

    #[test]
    fn hex_form_roundtrips_through_parse() {
        let id = ObjectId::new();
        let text = id.to_hex();
        assert_eq!(text.len(), 24);
        assert_eq!(ObjectId::parse_hex(&text).unwrap(), id);
        assert_eq!(ObjectId::parse_hex(&text.to_uppercase()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_wrong_length_and_non_hex() {
        assert!(ObjectId::parse_hex("").is_err());
        assert!(ObjectId::parse_hex("abc").is_err());
        assert!(ObjectId::parse_hex("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
        assert!(ObjectId::parse_hex("0123456789abcdef012345678").is_err());
    }

    #[test]
    fn allocation_order_matches_byte_order() {
        let ids: Vec<ObjectId> = (0..1000).map(|_| ObjectId::new()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }
}
