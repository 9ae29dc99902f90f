//! Conversion between the cache's one-byte-per-pixel blocks and the packed
//! bit depths held by the backing store.
//!
//! Bit order is MSB-first for every depth: the first pixel of a packed byte
//! lives in its highest bits.

use crate::cache::layout::BLOCK_LEN;

/// Derive the packing shift for a palette of `colors` entries.
///
/// `8 >> shift` is the number of bits stored per pixel.
pub fn pixel_shift_for_colors(colors: u32) -> u8 {
    let mut shift: u8 = 3;
    let mut i: u64 = 2;
    while i < colors as u64 && shift > 0 {
        i *= i;
        shift -= 1;
    }
    shift
}

/// Bits stored per pixel at `shift`.
#[inline(always)]
pub fn bits_per_pixel(shift: u8) -> u32 {
    8 >> shift
}

/// Number of packed bytes holding one `BLOCK_LEN` block at `shift`.
#[inline(always)]
pub fn packed_len(shift: u8) -> usize {
    BLOCK_LEN >> shift
}

/// Expand `packed` into one byte per pixel.
///
/// Writes `packed.len() << shift` pixels into the front of `out`.
pub fn unpack(shift: u8, packed: &[u8], out: &mut [u8]) {
    debug_assert!(out.len() >= packed.len() << shift);
    match shift {
        0 => out[..packed.len()].copy_from_slice(packed),
        1 => {
            for (byte, pair) in packed.iter().zip(out.chunks_exact_mut(2)) {
                pair[0] = byte >> 4;
                pair[1] = byte & 0x0f;
            }
        }
        2 => {
            for (byte, quad) in packed.iter().zip(out.chunks_exact_mut(4)) {
                for (k, pixel) in quad.iter_mut().enumerate() {
                    *pixel = (byte >> (6 - 2 * k)) & 0x03;
                }
            }
        }
        3 => {
            for (byte, octet) in packed.iter().zip(out.chunks_exact_mut(8)) {
                for (k, pixel) in octet.iter_mut().enumerate() {
                    *pixel = (byte >> (7 - k)) & 0x01;
                }
            }
        }
        _ => unreachable!("pixel shift {shift} out of range"),
    }
}

/// Pack one byte per pixel into `out`, the inverse of [`unpack`].
///
/// Each pixel is masked to the stored depth; higher bits are dropped.
pub fn pack(shift: u8, pixels: &[u8], out: &mut [u8]) {
    debug_assert!(out.len() << shift >= pixels.len());
    let per_byte = 1usize << shift;
    let bits = bits_per_pixel(shift);
    let mask = ((1u16 << bits) - 1) as u8;
    if shift == 0 {
        out[..pixels.len()].copy_from_slice(pixels);
        return;
    }
    for (group, byte) in pixels.chunks_exact(per_byte).zip(out.iter_mut()) {
        *byte = group
            .iter()
            .fold(0u8, |acc, &pixel| (acc << bits) | (pixel & mask));
    }
}
