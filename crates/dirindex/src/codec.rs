//! Byte encodings for keys and values.
//!
//! The tree serializer and the master table snapshot store keys and values
//! as length-prefixed byte strings.  A [`Codec`] converts between a value and
//! its bytes; the length prefix is added by the caller.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{DecodeError, IndexError};

/// Converts values of type `T` to and from bytes.
pub trait Codec<T>: Send + Sync {
    /// Appends the encoding of `value` to `buf`.
    fn encode(&self, value: &T, buf: &mut Vec<u8>) -> Result<(), IndexError>;

    /// Decodes a value from exactly `bytes`.
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

/// Codec for `()`, which encodes to no bytes at all.
#[derive(Copy, Clone, Debug, Default)]
pub struct UnitCodec;

impl Codec<()> for UnitCodec {
    fn encode(&self, _value: &(), _buf: &mut Vec<u8>) -> Result<(), IndexError> {
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<(), DecodeError> {
        if bytes.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Codec(format!(
                "expected no bytes for a unit value, found {}",
                bytes.len()
            )))
        }
    }
}

/// Big-endian codec for `u64`, so that byte order matches numeric order.
#[derive(Copy, Clone, Debug, Default)]
pub struct U64Codec;

impl Codec<u64> for U64Codec {
    fn encode(&self, value: &u64, buf: &mut Vec<u8>) -> Result<(), IndexError> {
        buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<u64, DecodeError> {
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| DecodeError::Codec(format!("expected 8 bytes, found {}", bytes.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

/// Big-endian codec for `i64`.
#[derive(Copy, Clone, Debug, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn encode(&self, value: &i64, buf: &mut Vec<u8>) -> Result<(), IndexError> {
        buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, DecodeError> {
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| DecodeError::Codec(format!("expected 8 bytes, found {}", bytes.len())))?;
        Ok(i64::from_be_bytes(bytes))
    }
}

/// UTF-8 codec for strings.
#[derive(Copy, Clone, Debug, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String, buf: &mut Vec<u8>) -> Result<(), IndexError> {
        buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        String::from_utf8(bytes.to_vec()).map_err(|error| DecodeError::Codec(error.to_string()))
    }
}

/// Identity codec for byte strings.
#[derive(Copy, Clone, Debug, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>, buf: &mut Vec<u8>) -> Result<(), IndexError> {
        buf.extend_from_slice(value);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(bytes.to_vec())
    }
}

/// Codec for any serde type, encoded as JSON.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T, buf: &mut Vec<u8>) -> Result<(), IndexError> {
        serde_json::to_writer(buf, value).map_err(|error| IndexError::Encode(error.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        serde_json::from_slice(bytes).map_err(|error| DecodeError::Codec(error.to_string()))
    }
}
