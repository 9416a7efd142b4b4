//! Keys, key ranges and cursor directions.

use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::error::KvError;

/// Type tags of the encoded key. Their order is the cross-type key order.
const TAG_INT: u8 = 0x01;
const TAG_TEXT: u8 = 0x02;

/// A primary key or secondary-index value.
///
/// Integers sort before strings; integers compare numerically and strings by
/// their UTF-8 bytes. [`Key::encode`] preserves this order byte-wise, which is
/// what lets range scans run directly on the engine's sorted keyspaces.
///
/// # Example
///
/// ```ignore
/// use obj_kv::Key;
///
/// assert!(Key::from(-5) < Key::from(3));
/// assert!(Key::from(1_000_000) < Key::from("a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Order-preserving binary encoding.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Int(n) => {
                let mut out = Vec::with_capacity(9);
                out.push(TAG_INT);
                // Flipping the sign bit makes two's complement sort as unsigned.
                out.extend_from_slice(&((*n as u64) ^ (1 << 63)).to_be_bytes());
                out
            }
            Key::Text(s) => {
                let mut out = Vec::with_capacity(1 + s.len());
                out.push(TAG_TEXT);
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }

    /// Decode a key produced by [`Key::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, KvError> {
        match bytes.split_first() {
            Some((&TAG_INT, rest)) => {
                let raw: [u8; 8] = rest.try_into().map_err(|_| {
                    KvError::InvalidFormat(format!("integer key has {} bytes", rest.len()))
                })?;
                Ok(Key::Int((u64::from_be_bytes(raw) ^ (1 << 63)) as i64))
            }
            Some((&TAG_TEXT, rest)) => std::str::from_utf8(rest)
                .map(|s| Key::Text(s.to_string()))
                .map_err(|e| KvError::InvalidFormat(format!("text key is not UTF-8: {}", e))),
            Some((tag, _)) => Err(KvError::InvalidFormat(format!("unknown key tag {:#04x}", tag))),
            None => Err(KvError::InvalidFormat("empty key".to_string())),
        }
    }

    /// Convert a JSON value into a key.
    ///
    /// Only integers that fit in `i64` and strings are keys; anything else
    /// (floats, booleans, null, arrays, objects) returns `None`, which keeps
    /// the record out of the corresponding index.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Key::Int),
            serde_json::Value::String(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(n) => Some(*n),
            Key::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Int(_) => None,
            Key::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{}", n),
            Key::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Text(s.clone())
    }
}

/// A range over primary keys, each end inclusive, exclusive or unbounded.
///
/// # Example
///
/// ```ignore
/// use obj_kv::KeyRange;
///
/// // 0 <= id <= 20
/// let range = KeyRange::bound(0, 20, false, false);
/// // id > 100
/// let tail = KeyRange::lower_bound(100, true);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<Key>,
    upper: Bound<Key>,
}

impl KeyRange {
    /// Every key.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    /// Keys above `lower`; `open` excludes `lower` itself.
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: make_bound(lower.into(), open),
            upper: Bound::Unbounded,
        }
    }

    /// Keys below `upper`; `open` excludes `upper` itself.
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: make_bound(upper.into(), open),
        }
    }

    /// Keys between `lower` and `upper`.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        Self {
            lower: make_bound(lower.into(), lower_open),
            upper: make_bound(upper.into(), upper_open),
        }
    }

    pub fn lower(&self) -> Bound<&Key> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Bound<&Key> {
        self.upper.as_ref()
    }

    /// Whether `key` lies inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Whether no key can satisfy the range.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }

    /// The part of this range a cursor still has to visit after `last`.
    pub(crate) fn resume_after(&self, last: &Key, direction: Direction) -> Self {
        if direction.is_reverse() {
            Self {
                lower: self.lower.clone(),
                upper: Bound::Excluded(last.clone()),
            }
        } else {
            Self {
                lower: Bound::Excluded(last.clone()),
                upper: self.upper.clone(),
            }
        }
    }

    /// The range expressed over encoded keys.
    pub(crate) fn encoded(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        (encode_bound(&self.lower), encode_bound(&self.upper))
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

fn make_bound(key: Key, open: bool) -> Bound<Key> {
    if open {
        Bound::Excluded(key)
    } else {
        Bound::Included(key)
    }
}

fn encode_bound(bound: &Bound<Key>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(k) => Bound::Included(k.encode()),
        Bound::Excluded(k) => Bound::Excluded(k.encode()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Cursor iteration order.
///
/// Primary keys are unique, so the `*Unique` variants walk the same records
/// as their plain counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Next,
    NextUnique,
    Prev,
    PrevUnique,
}

impl Direction {
    pub fn is_reverse(self) -> bool {
        matches!(self, Direction::Prev | Direction::PrevUnique)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_preserves_order() {
        let keys = vec![
            Key::from(i64::MIN),
            Key::from(-1_000),
            Key::from(-1),
            Key::from(0),
            Key::from(1),
            Key::from(255),
            Key::from(256),
            Key::from(i64::MAX),
            Key::from(""),
            Key::from("a"),
            Key::from("ab"),
            Key::from("b"),
        ];
        for (a, b) in keys.iter().zip(keys.iter().skip(1)) {
            assert!(a < b, "{} < {}", a, b);
            assert!(a.encode() < b.encode(), "encoded {} < {}", a, b);
        }
    }

    #[test]
    fn test_decode_inverts_encode() {
        for key in [Key::from(-42), Key::from(7), Key::from("2001857")] {
            assert_eq!(Key::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Key::decode(&[]).is_err());
        assert!(Key::decode(&[0x09, 1, 2]).is_err());
        assert!(Key::decode(&[TAG_INT, 1, 2]).is_err());
        assert!(Key::decode(&[TAG_TEXT, 0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Key::from_json(&serde_json::json!(20)), Some(Key::Int(20)));
        assert_eq!(
            Key::from_json(&serde_json::json!("x")),
            Some(Key::Text("x".to_string()))
        );
        assert_eq!(Key::from_json(&serde_json::json!(1.5)), None);
        assert_eq!(Key::from_json(&serde_json::json!(null)), None);
        assert_eq!(Key::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_range_contains() {
        let range = KeyRange::bound(0, 20, false, true);
        assert!(range.contains(&Key::from(0)));
        assert!(range.contains(&Key::from(19)));
        assert!(!range.contains(&Key::from(20)));
        assert!(!range.contains(&Key::from(-1)));
        assert!(!range.contains(&Key::from("0")));

        assert!(KeyRange::only("a").contains(&Key::from("a")));
        assert!(KeyRange::all().contains(&Key::from(i64::MIN)));
    }

    #[test]
    fn test_range_is_empty() {
        assert!(KeyRange::bound(5, 4, false, false).is_empty());
        assert!(KeyRange::bound(5, 5, true, false).is_empty());
        assert!(!KeyRange::bound(5, 5, false, false).is_empty());
        assert!(!KeyRange::lower_bound(5, true).is_empty());
    }

    #[test]
    fn test_resume_after() {
        let range = KeyRange::bound(0, 10, false, false);

        let forward = range.resume_after(&Key::from(3), Direction::Next);
        assert!(!forward.contains(&Key::from(3)));
        assert!(forward.contains(&Key::from(4)));
        assert!(forward.contains(&Key::from(10)));

        let backward = range.resume_after(&Key::from(3), Direction::Prev);
        assert!(!backward.contains(&Key::from(3)));
        assert!(backward.contains(&Key::from(0)));
        assert!(!backward.contains(&Key::from(4)));
    }
}
