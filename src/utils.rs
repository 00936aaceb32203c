use std::ops::Shl;

use num::Integer;

/// Make an n_bits-long mask (all ones)
pub fn mask<T>(n_bits: T) -> T
where
    T: Integer + Shl<Output = T>,
{
    (T::one() << n_bits) - T::one()
}

/// Obtain the size-bit field of word starting at bit pos.
/// Requires pos + size <= 32.
pub fn get_bits(word: u32, pos: u32, size: u32) -> u32 {
    mask::<u32>(size) & (word >> pos)
}

/// Return word with the size-bit field starting at bit pos replaced
/// by value. Requires pos + size <= 32.
pub fn set_bits(word: u32, value: u32, pos: u32, size: u32) -> u32 {
    (word & !(mask::<u32>(size) << pos)) | ((value & mask(size)) << pos)
}

/// A 9-bit B or C operand selects the constant pool when bit 8 is set
pub fn is_rk_constant(rk: u32) -> bool {
    rk & (1 << 8) != 0
}

/// Constant-pool index held in the low 8 bits of an RK operand
pub fn rk_to_constant_index(rk: u32) -> u32 {
    rk & 0xff
}
