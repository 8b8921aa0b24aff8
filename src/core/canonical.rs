//! Canonical serialization and content hashing.
//!
//! Two values that mean the same thing must produce byte-identical text:
//!
//! - Object members whose value is `null` are dropped (at every depth).
//! - Object keys are sorted lexicographically (at every depth).
//! - Integral floats are written as integers, so `1.0` and `1` agree.
//!
//! Array elements keep their position; a `null` inside an array stays.
//!
//! The digest of the canonical text is the content address used for
//! `spec_id`, `action_hash` and state hashes.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use super::error::CanonicalError;

/// Algorithm tag prefixed to every digest.
pub const DIGEST_PREFIX: &str = "sha256:";

/// Largest integer an IEEE double holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Canonicalize a JSON value.
///
/// Idempotent: `canonicalize(&canonicalize(x)) == canonicalize(x)`.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Number(n) => Value::Number(normalize_number(n)),
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Number::from(f as i64),
        _ => n.clone(),
    }
}

/// Canonical text of a JSON value.
#[must_use]
pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Canonical text of any serializable value.
pub fn to_canonical<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_string(&value))
}

/// Digest of a text, tagged with the algorithm: `sha256:<64 hex chars>`.
#[must_use]
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{DIGEST_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Digest of the canonical form of a JSON value.
#[must_use]
pub fn hash_value(value: &Value) -> String {
    digest(&canonical_string(value))
}

/// Digest of the canonical form of any serializable value.
pub fn hash_of<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(digest(&to_canonical(value)?))
}
