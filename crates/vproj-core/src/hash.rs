//! Stable hashing helpers for schemas and compiled write plans.
//!
//! Fingerprints key the compile cache and show up in logs/run summaries.

use blake3::Hasher;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// First 12 hex chars; enough to tell plans apart in a log line.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    let out = h.finalize();
    Hash256(out.into())
}

/// Hash any serde-serializable value deterministically (via JSON).
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(v).map_err(|e| crate::error::Error::Hash(e.to_string()))?;
    Ok(hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field, Schema};

    #[test]
    fn equal_schemas_hash_equal() {
        let a = Schema::new(vec![Field::new("a", DataType::Int32, false)]);
        let b = a.clone();
        let c = Schema::new(vec![Field::new("a", DataType::Int64, false)]);
        assert_eq!(hash_serde(&a).unwrap(), hash_serde(&b).unwrap());
        assert_ne!(hash_serde(&a).unwrap(), hash_serde(&c).unwrap());
    }

    #[test]
    fn short_hex_is_prefix() {
        let h = hash_bytes(b"projection");
        assert_eq!(h.to_hex().len(), 64);
        assert!(h.to_hex().starts_with(&h.short()));
    }
}
