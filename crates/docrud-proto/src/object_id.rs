//! Twelve-byte document identifiers.
//!
//! Layout: `[seconds since epoch (4 bytes, BE)][process nonce (5 bytes)][counter (3 bytes, BE)]`.
//! Byte order therefore sorts ids by creation time first.

use crate::error::Error;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Size of an object id in bytes.
pub const OBJECT_ID_SIZE: usize = 12;

/// Length of the hexadecimal representation.
pub const OBJECT_ID_HEX_LEN: usize = OBJECT_ID_SIZE * 2;

const COUNTER_MASK: u32 = 0x00ff_ffff;

static COUNTER: AtomicU32 = AtomicU32::new(0);
static PROCESS_NONCE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER_SEED: OnceLock<u32> = OnceLock::new();

/// Identifier assigned to every stored document.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; OBJECT_ID_SIZE]);

impl ObjectId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let nonce = PROCESS_NONCE.get_or_init(rand::random::<[u8; 5]>);
        let seed = *COUNTER_SEED.get_or_init(|| rand::random::<u32>() & COUNTER_MASK);
        let counter = seed.wrapping_add(COUNTER.fetch_add(1, Ordering::SeqCst)) & COUNTER_MASK;

        let mut bytes = [0u8; OBJECT_ID_SIZE];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(nonce);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Build an id from raw bytes.
    pub fn from_bytes(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse the 24-character hexadecimal form.
    pub fn parse_str(s: &str) -> Result<Self, Error> {
        if s.len() != OBJECT_ID_HEX_LEN {
            return Err(Error::InvalidObjectId(s.to_string()));
        }
        let mut bytes = [0u8; OBJECT_ID_SIZE];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| Error::InvalidObjectId(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Check whether a string is a syntactically valid id.
    pub fn is_valid(s: &str) -> bool {
        Self::parse_str(s).is_ok()
    }

    /// Raw bytes of the id.
    pub fn bytes(&self) -> [u8; OBJECT_ID_SIZE] {
        self.0
    }

    /// Lowercase hexadecimal representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time encoded in the id (second precision).
    pub fn timestamp(&self) -> DateTime<Utc> {
        let mut secs = [0u8; 4];
        secs.copy_from_slice(&self.0[..4]);
        Utc.timestamp_opt(u32::from_be_bytes(secs) as i64, 0)
            .single()
            .unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(serde::de::Error::custom)
    }
}
