//! Content hashing for state equality checks.
//!
//! Two steps:
//!
//! 1. `canonicalize` renders a value as compact JSON with every object's keys
//!    sorted; list order is kept and primitives use their standard JSON form.
//! 2. `fnv1a32` folds the canonical bytes into a 32-bit digest.
//!
//! Identical canonical input always gives the identical `StateHash`, across
//! processes and platforms. Collision resistance is not a goal.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::core::GameState;

#[derive(Clone, Debug)]
struct Fnv1a32 {
    hash: u32,
}

impl Fnv1a32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    fn new() -> Self {
        Self {
            hash: Self::OFFSET_BASIS,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.hash ^= u32::from(b);
            self.hash = self.hash.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(&self) -> u32 {
        self.hash
    }
}

/// FNV-1a over raw bytes.
#[must_use]
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hasher = Fnv1a32::new();
    hasher.write(bytes);
    hasher.finish()
}

/// Fixed-width digest of a canonicalized value.
///
/// Displays and serializes as 8 lowercase hex characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateHash(u32);

impl StateHash {
    /// Hash canonical bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(fnv1a32(bytes))
    }

    /// Raw digest.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Not an 8-digit hex string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid state hash {0:?}")]
pub struct InvalidStateHash(pub String);

impl FromStr for StateHash {
    type Err = InvalidStateHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 8 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(InvalidStateHash(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(StateHash)
            .map_err(|_| InvalidStateHash(s.to_string()))
    }
}

impl Serialize for StateHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Render any serializable value in canonical form.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

/// Canonical form of an already-built JSON value.
#[must_use]
pub fn canonical_value(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a JSON string value gives the escaped, quoted form.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        primitive => out.push_str(&primitive.to_string()),
    }
}

/// Digest of any serializable value.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<StateHash, serde_json::Error> {
    canonicalize(value).map(|text| StateHash::of_bytes(text.as_bytes()))
}

/// Digest of the whole state value, envelope and payload.
pub fn state_hash(state: &GameState) -> Result<StateHash, serde_json::Error> {
    content_hash(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GameId, Seats};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(fnv1a32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_hash_display_is_fixed_width() {
        assert_eq!(StateHash(0x1f).to_string(), "0000001f");
        assert_eq!(StateHash::of_bytes(b"").to_string(), "811c9dc5");
    }

    #[test]
    fn test_hash_parse() {
        assert_eq!("0000001f".parse::<StateHash>(), Ok(StateHash(0x1f)));
        assert!("1f".parse::<StateHash>().is_err());
        assert!("0000001F".parse::<StateHash>().is_err());
    }

    #[test]
    fn test_hash_serializes_as_string() {
        let json = serde_json::to_value(StateHash(0xdeadbeef)).unwrap();
        assert_eq!(json, json!("deadbeef"));
        assert_eq!(serde_json::from_value::<StateHash>(json).unwrap(), StateHash(0xdeadbeef));
    }

    #[test]
    fn test_canonical_sorts_nested_keys() {
        let value = json!({"b": [3, {"z": 1, "a": null}], "a": "x\"y"});

        assert_eq!(canonical_value(&value), r#"{"a":"x\"y","b":[3,{"a":null,"z":1}]}"#);
    }

    #[test]
    fn test_list_order_matters() {
        let a = content_hash(&json!([1, 2])).unwrap();
        let b = content_hash(&json!([2, 1])).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_state_hash_tracks_payload() {
        let state = GameState::new(GameId::Gomoku, "m1", Seats::from_ids(["p1", "p2"]));
        let mut changed = state.clone();
        changed.payload.insert("stones", json!(1));

        assert_eq!(state_hash(&state).unwrap(), state_hash(&state.clone()).unwrap());
        assert_ne!(state_hash(&state).unwrap(), state_hash(&changed).unwrap());
    }

    /// Serializes as a JSON object with entries in the given order.
    struct Ordered(Vec<(String, i32)>);

    impl Serialize for Ordered {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeMap;
            let mut map = serializer.serialize_map(Some(self.0.len()))?;
            for (key, value) in &self.0 {
                map.serialize_entry(key, value)?;
            }
            map.end()
        }
    }

    #[derive(Serialize)]
    struct Unsorted {
        zeta: u8,
        alpha: Vec<u8>,
        mid: bool,
    }

    #[test]
    fn test_declared_field_order_is_ignored() {
        let value = Unsorted {
            zeta: 1,
            alpha: vec![2],
            mid: true,
        };

        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"zeta":1,"alpha":[2],"mid":true}"#);
        assert_eq!(canonicalize(&value).unwrap(), r#"{"alpha":[2],"mid":true,"zeta":1}"#);
    }

    proptest! {
        #[test]
        fn prop_key_order_does_not_change_hash(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..12),
            rotate in 0usize..12,
        ) {
            let sorted: Vec<(String, i32)> = entries.into_iter().collect();
            let mut shuffled = sorted.clone();
            if !shuffled.is_empty() {
                let by = rotate % shuffled.len();
                shuffled.rotate_left(by);
            }
            shuffled.reverse();

            let raw = serde_json::to_string(&Ordered(shuffled.clone())).unwrap();
            let expected = format!(
                "{{{}}}",
                sorted.iter().map(|(k, v)| format!("\"{}\":{}", k, v)).collect::<Vec<_>>().join(",")
            );
            if shuffled != sorted {
                prop_assert_ne!(&raw, &expected);
            }

            prop_assert_eq!(canonicalize(&Ordered(shuffled.clone())).unwrap(), expected.clone());
            prop_assert_eq!(
                content_hash(&Ordered(shuffled)).unwrap(),
                content_hash(&Ordered(sorted)).unwrap()
            );
        }
    }
}
