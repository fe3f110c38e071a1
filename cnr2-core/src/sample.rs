//! Integer sample types the filter is instantiated for.
//!
//! 8-bit clips use `u8`; everything from 9 to 16 bits is stored in `u16`.

/// A single plane sample.
pub trait Sample: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    /// Storage width in bytes
    const BYTES: usize;
    /// Largest bit depth this storage can carry
    const MAX_DEPTH: u32;

    fn to_i32(self) -> i32;

    /// Narrow a value that is already known to be in range.
    fn from_i32(value: i32) -> Self;

    /// Decode one sample from little-endian bytes.
    ///
    /// `bytes` must be exactly `BYTES` long, as the chunks of
    /// `chunks_exact(BYTES)` are. Shorter input panics.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding of this sample.
    fn extend_le(self, out: &mut Vec<u8>);
}

impl Sample for u8 {
    const BYTES: usize = 1;
    const MAX_DEPTH: u32 = 8;

    #[inline]
    fn to_i32(self) -> i32 {
        self as i32
    }

    #[inline]
    fn from_i32(value: i32) -> Self {
        value as u8
    }

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::BYTES);
        bytes[0]
    }

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
}

impl Sample for u16 {
    const BYTES: usize = 2;
    const MAX_DEPTH: u32 = 16;

    #[inline]
    fn to_i32(self) -> i32 {
        self as i32
    }

    #[inline]
    fn from_i32(value: i32) -> Self {
        value as u16
    }

    #[inline]
    fn from_le_slice(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), Self::BYTES);
        u16::from_le_bytes([bytes[0], bytes[1]])
    }

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_is_little_endian() {
        assert_eq!(u16::from_le_slice(&[0x34, 0x12]), 0x1234);

        let mut out = Vec::new();
        0x0302u16.extend_le(&mut out);
        assert_eq!(out, vec![0x02, 0x03]);
    }

    #[test]
    fn decodes_exact_chunks() {
        let bytes = [0x00, 0x01, 0xff, 0x03];
        let samples: Vec<u16> = bytes.chunks_exact(u16::BYTES).map(u16::from_le_slice).collect();
        assert_eq!(samples, vec![0x0100, 0x03ff]);
    }

    #[test]
    #[should_panic]
    fn short_input_panics() {
        u16::from_le_slice(&[0x01]);
    }
}
