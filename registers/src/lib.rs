// Licensed under the Apache-2.0 license
//
#![no_std]

mod aes;

pub use aes::*;

/// Returned by [`Mmio::poll_until`] when the expected value was never observed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PollTimeout;

/// Word access to a memory-mapped register space.
///
/// Offsets are byte offsets relative to the base of the block.
pub trait Mmio {
    /// Read the 32-bit register at `offset`
    fn read32(&self, offset: u32) -> u32;

    /// Write `val` to the 32-bit register at `offset`
    fn write32(&mut self, offset: u32, val: u32);

    /// Spin until `read32(offset) & mask == expected`
    ///
    /// # Arguments
    ///
    /// * `offset` - Register offset
    /// * `mask` - Bits to compare
    /// * `expected` - Expected value of the masked bits
    /// * `budget` - Maximum number of reads before giving up
    fn poll_until(
        &self,
        offset: u32,
        mask: u32,
        expected: u32,
        budget: u32,
    ) -> Result<(), PollTimeout> {
        for _ in 0..budget {
            if self.read32(offset) & mask == expected {
                return Ok(());
            }
        }
        Err(PollTimeout)
    }
}

impl<T: Mmio + ?Sized> Mmio for &mut T {
    fn read32(&self, offset: u32) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&mut self, offset: u32, val: u32) {
        (**self).write32(offset, val)
    }

    fn poll_until(
        &self,
        offset: u32,
        mask: u32,
        expected: u32,
        budget: u32,
    ) -> Result<(), PollTimeout> {
        (**self).poll_until(offset, mask, expected, budget)
    }
}
