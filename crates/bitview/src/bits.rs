//! Low-level bit read and write primitives over shared byte cells.
//!
//! Buffers are seen as `&[Cell<u8>]` so several views can read and write the
//! same bytes through shared references. Bit numbering depends on [BitOrder]:
//!
//! - `LsbFirst`: bit 0 is the low bit of the first byte and multi-bit values
//!   are little-endian (bit `k` of the value is buffer bit `offset + k`).
//! - `MsbFirst`: bit 0 is the high bit of the first byte and values are
//!   assembled most-significant bit first.

use std::cell::Cell;

use crate::errors::{ReadError, WriteError};

/// Bit numbering used to address a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BitOrder {
    #[default]
    LsbFirst,
    MsbFirst,
}

fn mask_of(bit_pos: usize, order: BitOrder) -> u8 {
    match order {
        BitOrder::LsbFirst => 1 << (bit_pos % 8),
        BitOrder::MsbFirst => 1 << (7 - bit_pos % 8),
    }
}

fn in_bounds(data: &[Cell<u8>], bit_pos: usize, n: usize) -> bool {
    bit_pos
        .checked_add(n)
        .is_some_and(|end| end <= data.len() * 8)
}

/// Reads a single bit at `bit_pos`. Returns 0 or 1.
pub fn read_bit_at(data: &[Cell<u8>], bit_pos: usize, order: BitOrder) -> Result<u8, ReadError> {
    let byte = data.get(bit_pos / 8).ok_or(ReadError::OutOfBounds)?;

    Ok(u8::from(byte.get() & mask_of(bit_pos, order) != 0))
}

/// Writes a single bit at `bit_pos`, leaving the other bits of the byte untouched.
pub fn write_bit_at(
    data: &[Cell<u8>],
    bit_pos: usize,
    bit: bool,
    order: BitOrder,
) -> Result<(), WriteError> {
    let byte = data.get(bit_pos / 8).ok_or(WriteError::OutOfBounds)?;
    let mask = mask_of(bit_pos, order);

    if bit {
        byte.set(byte.get() | mask);
    } else {
        byte.set(byte.get() & !mask);
    }

    Ok(())
}

/// Reads `n` bits starting at `bit_pos` as an unsigned value (max 64 bits).
pub fn read_bits_at(
    data: &[Cell<u8>],
    bit_pos: usize,
    n: usize,
    order: BitOrder,
) -> Result<u64, ReadError> {
    if n > 64 {
        return Err(ReadError::TooManyBitsRead);
    }

    if !in_bounds(data, bit_pos, n) {
        return Err(ReadError::OutOfBounds);
    }

    let mut value = 0u64;

    for i in 0..n {
        let bit = read_bit_at(data, bit_pos + i, order)? as u64;
        match order {
            BitOrder::LsbFirst => value |= bit << i,
            BitOrder::MsbFirst => value = (value << 1) | bit,
        }
    }

    Ok(value)
}

/// Writes the low `n` bits of `value` starting at `bit_pos` (max 64 bits).
///
/// Fails without touching the buffer if the range is out of bounds or `value`
/// does not fit in `n` bits.
pub fn write_bits_at(
    data: &[Cell<u8>],
    bit_pos: usize,
    n: usize,
    value: u64,
    order: BitOrder,
) -> Result<(), WriteError> {
    if n > 64 {
        return Err(WriteError::TooManyBitsWritten);
    }

    if n < 64 && value >> n != 0 {
        return Err(WriteError::InvalidValue(n));
    }

    if !in_bounds(data, bit_pos, n) {
        return Err(WriteError::OutOfBounds);
    }

    for i in 0..n {
        let bit = match order {
            BitOrder::LsbFirst => (value >> i) & 1,
            BitOrder::MsbFirst => (value >> (n - 1 - i)) & 1,
        };
        write_bit_at(data, bit_pos + i, bit != 0, order)?;
    }

    Ok(())
}

/// Largest value representable in `bits` bits.
pub fn max_value(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
