//! Internet checksum arithmetic (RFC 1071)
//!
//! Sums are accumulated in a `u32` and folded with end-around carry. Keeping
//! the partial sums separate from the final complement lets callers combine
//! pieces computed at different times, which is what the tunnel engine does
//! to derive the outer UDP checksum from the inner one.
//!
//! # Examples
//!
//! ```
//! use gtpu_tunnel::packet::checksum;
//!
//! // RFC 1071 section 3 example
//! let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
//! let sum = checksum::sum_words(0, &data);
//! assert_eq!(checksum::fold(sum), 0xddf2);
//! assert_eq!(checksum::finish(sum), !0xddf2u16);
//! ```

/// Adds `bytes` as big-endian 16-bit words to `initial`.
///
/// A trailing odd byte is padded with zero on the right.
#[inline]
pub fn sum_words(initial: u32, bytes: &[u8]) -> u32 {
    let mut sum = initial as u64;
    let mut chunks = bytes.chunks_exact(2);
    for word in &mut chunks {
        sum += u16::from_be_bytes([word[0], word[1]]) as u64;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u64) << 8;
    }
    fold64(sum)
}

#[inline]
fn fold64(mut sum: u64) -> u32 {
    while sum >> 32 != 0 {
        sum = (sum & 0xFFFF_FFFF) + (sum >> 32);
    }
    sum as u32
}

/// Folds a 32-bit accumulator down to 16 bits.
#[inline]
pub fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Folds and complements: the value written into a checksum field.
#[inline]
pub fn finish(sum: u32) -> u16 {
    !fold(sum)
}

/// One's-complement addition of two folded sums.
#[inline]
pub fn combine(a: u16, b: u16) -> u16 {
    fold(a as u32 + b as u32)
}

/// Transport checksums use `0xFFFF` on the wire for a computed zero,
/// since zero means "no checksum" for UDP over IPv4.
#[inline]
pub fn transport_finish(sum: u32) -> u16 {
    match finish(sum) {
        0 => 0xFFFF,
        cs => cs,
    }
}
