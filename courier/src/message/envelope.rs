/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Self-describing message envelopes.
//!
//! An envelope tags an opaque payload with the id of the codec that produced it,
//! so routing never needs to understand payload encodings.
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────┐
//! │ codec id (LEB128, 1-10 bytes)│ payload (0+ bytes)   │
//! └──────────────────────────────┴──────────────────────┘
//! ```
//!
//! The router only ever reads the codec id and the encoded length. Payload
//! decoding is left to the receiving component.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::message::CodecError;

/// Well-known codec ids, taken from the multicodec table.
pub mod codecs {
    /// Raw, uninterpreted bytes.
    pub const RAW: u64 = 0x55;
    /// CBOR (RFC 8949).
    pub const CBOR: u64 = 0x51;
    /// UTF-8 JSON.
    pub const JSON: u64 = 0x0200;
    /// Borsh binary serialization.
    pub const BORSH: u64 = 0x0701;
}

/// Longest LEB128 encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// A payload tagged with the codec that encoded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    codec_id: u64,
    payload: Vec<u8>,
}

impl Envelope {
    /// Wraps `payload` under `codec_id`.
    pub fn new(codec_id: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            codec_id,
            payload: payload.into(),
        }
    }

    /// Wraps uninterpreted bytes under [`codecs::RAW`].
    pub fn raw(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(codecs::RAW, payload)
    }

    /// Serializes `value` as JSON under [`codecs::JSON`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if `value` cannot be serialized.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
        Ok(Self::new(codecs::JSON, payload))
    }

    /// Deserializes a JSON payload.
    ///
    /// # Errors
    ///
    /// [`CodecError::CodecMismatch`] when the envelope is not tagged as JSON,
    /// [`CodecError::Serialization`] when the payload does not parse as `T`.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        if self.codec_id != codecs::JSON {
            return Err(CodecError::CodecMismatch {
                expected: codecs::JSON,
                actual: self.codec_id,
            });
        }
        serde_json::from_slice(&self.payload).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    /// The codec tag.
    #[inline]
    #[must_use]
    pub const fn codec_id(&self) -> u64 {
        self.codec_id
    }

    /// The payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Length of [`Envelope::encode`]'s output, computed without encoding.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        varint_len(self.codec_id) + self.payload.len()
    }

    /// Encodes to `[varint codec_id][payload]`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        encode_varint(self.codec_id, &mut buf);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes `[varint codec_id][payload]`.
    ///
    /// # Errors
    ///
    /// [`CodecError::Truncated`] if the codec id is incomplete,
    /// [`CodecError::VarintOverflow`] if it does not fit a `u64`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (codec_id, consumed) = decode_varint(bytes)?;
        Ok(Self::new(codec_id, &bytes[consumed..]))
    }
}

/// Appends the LEB128 encoding of `value` to `buf`.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        #[allow(clippy::cast_possible_truncation)]
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    buf.push(value as u8);
}

/// Decodes a LEB128 `u64` from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
///
/// # Errors
///
/// [`CodecError::Truncated`] when `bytes` ends inside the varint,
/// [`CodecError::VarintOverflow`] when the value exceeds `u64::MAX`.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value: u64 = 0;
    for (index, byte) in bytes.iter().enumerate() {
        if index == MAX_VARINT_LEN - 1 && *byte > 0x01 {
            return Err(CodecError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }
        if index == MAX_VARINT_LEN - 1 {
            return Err(CodecError::VarintOverflow);
        }
    }
    Err(CodecError::Truncated)
}

/// Number of bytes `value` occupies as LEB128.
#[must_use]
pub const fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    if bits == 0 {
        1
    } else {
        bits.div_ceil(7)
    }
}
