// src/values/checksum.rs

//! Values checksums for idempotent change detection.
//!
//! A checksum is the hex SHA-256 of the canonical JSON serialization of a
//! values tree. Canonical form: object keys emitted in ascending byte
//! order, no insignificant whitespace. Two consecutive checksums are equal
//! iff the serialized snapshots are byte-identical.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::Values;

/// Serialize a JSON value with object keys sorted ascending
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            // serde_json::Map is key-ordered by default, but sort
            // explicitly so the canonical form does not depend on the
            // preserve_order feature.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(
                    serde_json::to_string(key).expect("string serialization").as_bytes(),
                );
                out.push(b':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => {
            out.extend_from_slice(
                serde_json::to_string(scalar).expect("scalar serialization").as_bytes(),
            );
        }
    }
}

/// Hex SHA-256 over the canonical serialization of a values tree
pub fn checksum_hex(values: &Values) -> String {
    let bytes = canonical_bytes(&values.as_value());
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_sorts_keys() {
        let v = json!({"b": 1, "a": {"z": true, "m": [1, "x"]}});
        assert_eq!(
            String::from_utf8(canonical_bytes(&v)).unwrap(),
            r#"{"a":{"m":[1,"x"],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_checksum_is_stable() {
        let a = Values::from_value(json!({"x": 1, "y": [1, 2]})).unwrap();
        let b = Values::from_value(json!({"y": [1, 2], "x": 1})).unwrap();
        assert_eq!(checksum_hex(&a), checksum_hex(&b));
    }

    #[test]
    fn test_checksum_detects_change() {
        let a = Values::from_value(json!({"x": 1})).unwrap();
        let b = Values::from_value(json!({"x": 2})).unwrap();
        assert_ne!(checksum_hex(&a), checksum_hex(&b));
    }

    #[test]
    fn test_empty_tree_checksum() {
        assert_eq!(
            checksum_hex(&Values::new()),
            checksum_hex(&Values::from_value(json!({})).unwrap())
        );
    }
}
