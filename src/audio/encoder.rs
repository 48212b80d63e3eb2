//! PCM frame encoding for the outbound stream.
//!
//! Audio chunks travel as signed 16-bit samples packed little-endian, so a
//! block of `n` samples always encodes to exactly `2 * n` bytes.

/// Pack samples into little-endian bytes
pub fn encode(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Unpack little-endian bytes into samples. A trailing odd byte is ignored.
pub fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}
