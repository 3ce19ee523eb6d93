//! Borrowed, fixed-length byte region addressed by bit ranges.

use std::cell::Cell;

use crate::{
    bits::{self, BitOrder},
    errors::{ReadError, WriteError},
};

/// A caller-owned byte region viewed as shared cells.
///
/// Copying a `BitBuffer` copies the borrow, never the bytes. Length is fixed
/// for the lifetime of the borrow.
#[derive(Debug, Clone, Copy)]
pub struct BitBuffer<'a> {
    cells: &'a [Cell<u8>],
    order: BitOrder,
}

impl<'a> BitBuffer<'a> {
    pub fn new(data: &'a mut [u8], order: BitOrder) -> Self {
        Self::from_cells(Cell::from_mut(data).as_slice_of_cells(), order)
    }

    pub fn from_cells(cells: &'a [Cell<u8>], order: BitOrder) -> Self {
        Self { cells, order }
    }

    pub fn len_bits(&self) -> usize {
        self.cells.len() * 8
    }

    pub fn order(&self) -> BitOrder {
        self.order
    }

    /// Copy of the current bytes in fresh cells, detached from the caller's buffer.
    pub fn snapshot(&self) -> Vec<Cell<u8>> {
        self.cells.iter().map(|c| Cell::new(c.get())).collect()
    }

    pub fn read_bits(&self, offset_bits: usize, width_bits: usize) -> Result<u64, ReadError> {
        bits::read_bits_at(self.cells, offset_bits, width_bits, self.order)
    }

    pub fn write_bits(
        &self,
        offset_bits: usize,
        width_bits: usize,
        value: u64,
    ) -> Result<(), WriteError> {
        bits::write_bits_at(self.cells, offset_bits, width_bits, value, self.order)
    }
}
