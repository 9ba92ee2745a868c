//! Content hashing for graph change detection.
//!
//! [`ContentHasher`] is a 64-bit FNV-1a [`Hasher`]. It is deterministic within
//! a process, which is all the compiled-frame cache needs: a hash is only ever
//! compared against the hash of the previous frame's graph.
//!
//! Inside one pass or pipeline, fields are fed in a fixed order, so the
//! result is order sensitive. Across passes, per-pass hashes are folded with
//! [`combine_unordered`], which does not depend on the fold order.

use std::hash::Hasher;

/// FNV-1a 64-bit offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hasher over the bytes fed to it.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    state: u64,
}

impl ContentHasher {
    /// Create a hasher at the offset basis.
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for ContentHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Fold a sub-hash into an accumulator without depending on fold order.
///
/// `acc ^= value * FNV_PRIME`, the same mixing step used per byte by
/// [`ContentHasher`], applied to whole 64-bit values.
pub fn combine_unordered(acc: u64, value: u64) -> u64 {
    acc ^ value.wrapping_mul(FNV_PRIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hash;

    #[test]
    fn test_empty_input_is_offset_basis() {
        assert_eq!(ContentHasher::new().finish(), FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_known_fnv1a_vector() {
        // FNV-1a 64 of "a".
        let mut hasher = ContentHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_order_sensitive_within_hasher() {
        let mut ab = ContentHasher::new();
        1u32.hash(&mut ab);
        2u32.hash(&mut ab);

        let mut ba = ContentHasher::new();
        2u32.hash(&mut ba);
        1u32.hash(&mut ba);

        assert_ne!(ab.finish(), ba.finish());
    }

    #[test]
    fn test_combine_unordered_is_commutative() {
        let a = 0x1234_5678_9abc_def0;
        let b = 0x0fed_cba9_8765_4321;
        let left = combine_unordered(combine_unordered(FNV_OFFSET_BASIS, a), b);
        let right = combine_unordered(combine_unordered(FNV_OFFSET_BASIS, b), a);
        assert_eq!(left, right);
    }
}
