use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ProtoError, Result};

/// Maximum size of an encoded, compressed frame — a Datagram must fit in one
/// 1024 B UDP read (see the on-wire layout in the datagram module).
pub const MAX_WIRE_SIZE: usize = 1024;

/// Serializes `value` to a self-describing msgpack map, then deflates it.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let packed = rmp_serde::to_vec_named(value)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&packed)?;
    Ok(encoder.finish()?)
}

/// Inflates `data` and deserializes the resulting msgpack map.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let mut decoder = ZlibDecoder::new(data);
    let mut packed = Vec::new();
    decoder.read_to_end(&mut packed)?;
    Ok(rmp_serde::from_slice(&packed)?)
}

/// Encodes and checks the result still fits a single datagram.
pub fn encode_bounded<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let frame = encode(value)?;
    if frame.len() > MAX_WIRE_SIZE {
        return Err(ProtoError::FrameTooLarge(frame.len()));
    }
    Ok(frame)
}
