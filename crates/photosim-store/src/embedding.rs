//! Embedding blob codec: little-endian f32, exact round-trip.

use ndarray::Array1;

/// Encode an embedding as little-endian `f32` bytes.
pub fn encode_f32_le(embedding: &Array1<f32>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding.iter() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Returns None if the length is not a multiple of 4.
pub fn decode_f32_le(bytes: &[u8]) -> Option<Array1<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(Array1::from_iter(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    ))
}
