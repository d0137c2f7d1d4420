use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ImageError;

/// The raw width of an image identifier in bytes.
pub const ID_LEN: usize = 12;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(rand::random);
static COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff));

/// A fixed width, time-derived and globally unique image identifier.
///
/// The layout is 4 bytes of big-endian unix seconds, 5 bytes which are
/// random per process and a 3 byte wrapping counter. Identifiers therefore
/// sort roughly by creation time.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId([u8; ID_LEN]);

impl ImageId {
    /// Generates a new identifier for the current time.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    pub fn generate_at(at: DateTime<Utc>) -> Self {
        let mut buf = [0u8; ID_LEN];
        let secs = at.timestamp().clamp(0, u32::MAX as i64) as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        buf[..4].copy_from_slice(&secs.to_be_bytes());
        buf[4..9].copy_from_slice(PROCESS_UNIQUE.as_ref());
        buf[9..].copy_from_slice(&count.to_be_bytes()[1..]);

        Self(buf)
    }

    #[cfg(test)]
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// The creation time encoded in the identifier.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let mut secs = [0u8; 4];
        secs.copy_from_slice(&self.0[..4]);
        Utc.timestamp_opt(u32::from_be_bytes(secs) as i64, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ImageId {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LEN * 2 {
            return Err(ImageError::BadRequest(format!("malformed image id {:?}", s)));
        }

        let mut buf = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut buf)
            .map_err(|_| ImageError::BadRequest(format!("malformed image id {:?}", s)))?;

        Ok(Self(buf))
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageId({})", self.to_hex())
    }
}

impl Serialize for ImageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ImageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
