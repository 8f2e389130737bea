//! Unsigned key types accepted by the trie.

/// An unsigned integer usable as an address key.
///
/// All bit arithmetic inside the trie happens on `u128`, so an implementation
/// only needs a lossless round trip through it.
pub trait Key: Copy + Eq + Ord + std::fmt::Debug {
    /// Native width of the type in bits. Caps the trie width.
    const BITS: u32;

    fn to_u128(self) -> u128;

    /// Narrow back from `u128`. Callers only pass values below `2^BITS`.
    fn from_u128(v: u128) -> Self;
}

macro_rules! impl_key {
    ($($t:ty),*) => {
        $(
            impl Key for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn to_u128(self) -> u128 {
                    self as u128
                }

                #[inline]
                fn from_u128(v: u128) -> Self {
                    debug_assert!(v <= <$t>::MAX as u128);
                    v as $t
                }
            }
        )*
    };
}

impl_key!(u8, u16, u32, u64, u128);

/// Mask selecting the low `width` bits.
#[inline]
pub(crate) fn low_mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Branch bit for the node at `level` (`level >= 1`).
#[inline]
pub(crate) fn branch_bit(key: u128, level: u32) -> usize {
    debug_assert!(level >= 1);
    ((key >> (level - 1)) & 1) as usize
}

/// Smallest key above `key` whose bit at `level` is set and whose lower bits
/// are clear. Only called when that bit is currently 0, so no carry escapes
/// into the upper bits.
#[inline]
pub(crate) fn round_up_at(key: u128, level: u32) -> u128 {
    debug_assert!(level >= 1);
    debug_assert_eq!(branch_bit(key, level), 0);
    let step = 1u128 << (level - 1);
    (key + step) & !(step - 1)
}
