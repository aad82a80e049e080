// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte encodings shared by hashes, keys and signatures: hex strings for human readable formats
//! (JSON, configs), plain byte strings for CBOR.
use std::fmt::Display;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::{ByteBuf, Bytes};

pub fn serialize_hex<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        hex::serde::serialize(value, serializer)
    } else {
        Bytes::new(value).serialize(serializer)
    }
}

pub fn deserialize_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    if deserializer.is_human_readable() {
        hex::serde::deserialize(deserializer)
    } else {
        ByteBuf::deserialize(deserializer).map(ByteBuf::into_vec)
    }
}

/// Decodes bytes with [`deserialize_hex`] and converts them into a fixed-size type, reporting
/// length mismatches through the type's own error.
pub fn deserialize_fixed<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: for<'a> TryFrom<&'a [u8]>,
    for<'a> <T as TryFrom<&'a [u8]>>::Error: Display,
{
    let bytes = deserialize_hex(deserializer)?;
    T::try_from(bytes.as_slice()).map_err(D::Error::custom)
}
