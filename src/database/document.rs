use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored document. `_id` holds the 24-hex identifier.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// 12-byte document identifier rendered as 24 hex digits:
/// 4 bytes of big-endian Unix seconds followed by 8 random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let secs = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..].copy_from_slice(&Uuid::new_v4().as_bytes()[..8]);
        Self(bytes)
    }

    /// True for exactly 24 hexadecimal digits, either case
    pub fn is_valid(s: &str) -> bool {
        s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        if !Self::is_valid(s) {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s).ok_or_else(|| format!("invalid objectId '{}'", s))
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
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Current time in the format stored for `createdAt`/`updatedAt`
pub fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Canonical (lower-case) form of an identifier string
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}

pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Fields that carry a unique index per collection
pub fn unique_fields(collection: &str) -> &'static [&'static str] {
    match collection {
        "user" => &["username", "email"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(ObjectId::is_valid(&a.to_hex()));
        assert_eq!(a.to_hex().len(), 24);
    }

    #[test]
    fn parses_round_trip_and_rejects_garbage() {
        let id = ObjectId::new();
        assert_eq!(ObjectId::parse_str(&id.to_hex()), Some(id));
        assert_eq!(ObjectId::parse_str(&id.to_hex().to_uppercase()), Some(id));
        assert!(ObjectId::parse_str("not-an-id").is_none());
        assert!(ObjectId::parse_str("65a1b2c3d4e5f60718293a4").is_none());
        assert!(ObjectId::parse_str("65a1b2c3d4e5f60718293a4g").is_none());
    }

    #[test]
    fn embeds_creation_time() {
        let before = Utc::now().timestamp() as u32;
        let id = ObjectId::new();
        assert!(id.timestamp() >= before);
    }
}
