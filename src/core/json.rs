/*!
 * JSON Serialization
 * Smart JSON parsing with SIMD acceleration for large payloads
 */

use serde::{de::DeserializeOwned, Serialize};

/// Threshold for using SIMD-JSON (1KB)
/// Below this size, use serde_json for simplicity
const SIMD_THRESHOLD: usize = 1024;

/// Result type for JSON operations
pub type JsonResult<T> = Result<T, JsonError>;

/// JSON operation errors
#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Serialize to a JSON string
///
/// Record documents are serialized with serde_json; field order follows
/// declaration order, which keeps the output canonical.
#[inline]
pub fn to_string<T: Serialize>(value: &T) -> JsonResult<String> {
    serde_json::to_string(value).map_err(|e| JsonError::Serialization(e.to_string()))
}

/// Serialize to pretty-printed JSON, for diagnostics only
#[inline]
pub fn to_string_pretty<T: Serialize>(value: &T) -> JsonResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| JsonError::Serialization(e.to_string()))
}

/// Deserialize from JSON bytes with automatic optimization
///
/// Uses SIMD-JSON for large payloads (>1KB), serde_json for small ones.
#[inline]
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> JsonResult<T> {
    if bytes.len() > SIMD_THRESHOLD {
        from_slice_simd(bytes)
    } else {
        from_slice_std(bytes)
    }
}

/// Deserialize from JSON bytes using SIMD acceleration
///
/// Note: simd-json requires mutable bytes for in-place parsing.
#[inline]
pub fn from_slice_simd<T: DeserializeOwned>(bytes: &[u8]) -> JsonResult<T> {
    let mut mutable_bytes = bytes.to_vec();
    simd_json::from_slice(&mut mutable_bytes).map_err(|e| JsonError::Deserialization(e.to_string()))
}

/// Deserialize from JSON bytes using standard serde_json
#[inline]
pub fn from_slice_std<T: DeserializeOwned>(bytes: &[u8]) -> JsonResult<T> {
    serde_json::from_slice(bytes).map_err(|e| JsonError::Deserialization(e.to_string()))
}

/// Deserialize from a JSON string with automatic optimization
#[inline]
pub fn from_str<T: DeserializeOwned>(s: &str) -> JsonResult<T> {
    from_slice(s.as_bytes())
}
