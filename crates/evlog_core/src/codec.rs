//! CBOR wire codec helpers.
//!
//! All types that cross a device/server boundary encode to CBOR through
//! these two functions so the wire format is defined in one place.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::encoding(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::decoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let value = (42u64, "hello".to_string(), vec![1u8, 2, 3]);
        let bytes = to_cbor(&value).unwrap();
        let decoded: (u64, String, Vec<u8>) = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_garbage_fails() {
        let result: CoreResult<u64> = from_cbor(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }
}
