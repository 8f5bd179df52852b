//! Resource identifier fingerprints.
//!
//! A resource id maps to the base64 form of its SHA-256 digest. The same
//! function builds store keys inside the locker, so callers can use it to
//! predict which key a resource will occupy.

use crate::error::{LockError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash a resource identifier into its lock key.
pub fn hash(value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(LockError::InvalidArgument(
            "could not hash an empty value".to_string(),
        ));
    }

    let digest = Sha256::digest(value.as_bytes());
    Ok(BASE64.encode(digest))
}

/// Hash a dynamically typed value. Only non-empty strings are accepted.
pub fn hash_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => hash(s),
        Value::Null => Err(LockError::InvalidArgument(
            "could not hash a null value".to_string(),
        )),
        other => Err(LockError::InvalidArgument(format!(
            "can not hash value which is not a string: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_known_digest() {
        assert_eq!(
            hash("resource").unwrap(),
            "XelTGfF0Z+1txY5OCxbBGToTs11g3Ei88Gv2t77rvmw="
        );
        assert_eq!(
            hash("hello").unwrap(),
            "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ="
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        for s in ["a", "order_001", "lock:resource", "中文"] {
            assert_eq!(hash(s).unwrap(), hash(s).unwrap());
        }
        assert_ne!(hash("a").unwrap(), hash("b").unwrap());
    }

    #[test]
    fn test_hash_fixed_length() {
        // 32 byte digest -> 44 base64 chars
        assert_eq!(hash("x").unwrap().len(), 44);
        assert_eq!(hash(&"x".repeat(10_000)).unwrap().len(), 44);
    }

    #[test]
    fn test_hash_rejects_empty() {
        assert!(matches!(hash(""), Err(LockError::InvalidArgument(_))));
    }

    #[test]
    fn test_hash_value_rejects_non_text() {
        for value in [json!(null), json!(42), json!(""), json!(true), json!(["a"])] {
            assert!(
                matches!(hash_value(&value), Err(LockError::InvalidArgument(_))),
                "expected InvalidArgument for {}",
                value
            );
        }
        assert_eq!(hash_value(&json!("resource")).unwrap(), hash("resource").unwrap());
    }
}
