/*++

Licensed under the Apache-2.0 license.

File Name:

    dma.rs

Abstract:

    File contains the DMA adapter contract and the unaligned transfer
    splitter used to feed whole bursts to the bulk DMA path.

--*/

use bitflags::bitflags;
use core::ops::Add;
use pmc_error::{PmcError, PmcResult};

/// Number of words in one bulk DMA burst (one AES block)
pub const DMA_BURST_WORDS: u32 = 4;

const DMA_BURST_BYTES: u32 = DMA_BURST_WORDS * 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxiAddr {
    pub lo: u32,
    pub hi: u32,
}

impl AxiAddr {
    pub fn is_null(self) -> bool {
        self.lo == 0 && self.hi == 0
    }

    pub fn is_word_aligned(self) -> bool {
        self.lo & 0x3 == 0
    }
}

impl Add<u32> for AxiAddr {
    type Output = Self;

    fn add(self, rhs: u32) -> Self {
        AxiAddr::from(u64::from(self) + rhs as u64)
    }
}

impl Add<u64> for AxiAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self {
        AxiAddr::from(u64::from(self) + rhs)
    }
}

impl From<u32> for AxiAddr {
    fn from(addr: u32) -> Self {
        Self { lo: addr, hi: 0 }
    }
}

impl From<u64> for AxiAddr {
    fn from(addr: u64) -> Self {
        Self {
            lo: addr as u32,
            hi: (addr >> 32) as u32,
        }
    }
}

impl From<AxiAddr> for u64 {
    fn from(addr: AxiAddr) -> Self {
        (addr.hi as u64) << 32 | (addr.lo as u64)
    }
}

bitflags! {
    pub struct DmaFlags: u32 {
        /// Marks the end of the message on the source channel
        const LAST_CHUNK = 1 << 0;
        /// Swap the byte order of every word on both channels
        const BYTE_SWAP = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaRoute {
    /// Source channel feeds the crypto engine, destination channel drains it
    Engine,
    /// Plain memory to memory copy
    Loopback,
}

/// One blocking DMA request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaTransfer {
    pub route: DmaRoute,
    pub src: Option<AxiAddr>,
    pub dst: Option<AxiAddr>,
    pub len_words: u32,
    /// Valid bytes in the last source word; 0 means the whole word
    pub tail_bytes: u8,
    pub flags: DmaFlags,
}

impl DmaTransfer {
    /// Feed `len_words` from memory into the engine
    pub fn to_engine(src: AxiAddr, len_words: u32, flags: DmaFlags) -> Self {
        Self {
            route: DmaRoute::Engine,
            src: Some(src),
            dst: None,
            len_words,
            tail_bytes: 0,
            flags,
        }
    }

    /// Feed `len_words` into the engine and write its output to `dst`
    pub fn through_engine(src: AxiAddr, dst: AxiAddr, len_words: u32, flags: DmaFlags) -> Self {
        Self {
            route: DmaRoute::Engine,
            src: Some(src),
            dst: Some(dst),
            len_words,
            tail_bytes: 0,
            flags,
        }
    }

    /// Copy `len_words` from `src` to `dst` without touching the engine
    pub fn loopback(src: AxiAddr, dst: AxiAddr, len_words: u32) -> Self {
        Self {
            route: DmaRoute::Loopback,
            src: Some(src),
            dst: Some(dst),
            len_words,
            tail_bytes: 0,
            flags: DmaFlags::empty(),
        }
    }

    /// Feed exactly `len_bytes` into the engine, rounding the memory side up to whole words
    pub fn bytes_to_engine(src: AxiAddr, len_bytes: u32, flags: DmaFlags) -> Self {
        Self {
            tail_bytes: (len_bytes % 4) as u8,
            ..Self::to_engine(src, len_bytes.div_ceil(4), flags)
        }
    }
}

/// Blocking DMA and single-word memory access, supplied by the platform.
pub trait DmaAdapter {
    /// Issue `xfer` and poll it to completion
    ///
    /// # Arguments
    ///
    /// * `xfer` - Transfer description
    ///
    /// # Returns
    ///
    /// * `PmcResult<()>` - `DRIVER_DMA_TRANSFER_FAILURE` or `DRIVER_DMA_TIMEOUT` on failure
    fn transfer(&mut self, xfer: &DmaTransfer) -> PmcResult<()>;

    /// Drain `out.len()` words of engine output into a driver-local buffer
    ///
    /// Words land in `out` as they would in little-endian memory.
    fn drain_engine(&mut self, out: &mut [u32], flags: DmaFlags) -> PmcResult<()>;

    /// Read one word of DMA-visible memory
    fn read_word(&mut self, addr: AxiAddr) -> u32;

    /// Write one word of DMA-visible memory
    fn write_word(&mut self, addr: AxiAddr, val: u32);
}

impl<T: DmaAdapter + ?Sized> DmaAdapter for &mut T {
    fn transfer(&mut self, xfer: &DmaTransfer) -> PmcResult<()> {
        (**self).transfer(xfer)
    }

    fn drain_engine(&mut self, out: &mut [u32], flags: DmaFlags) -> PmcResult<()> {
        (**self).drain_engine(out, flags)
    }

    fn read_word(&mut self, addr: AxiAddr) -> u32 {
        (**self).read_word(addr)
    }

    fn write_word(&mut self, addr: AxiAddr, val: u32) {
        (**self).write_word(addr, val)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnalignedMode {
    /// Peel words until the source reaches a burst boundary
    AlignSrc,
    /// Peel words until the destination reaches a burst boundary
    AlignDst,
    /// Peel the words that do not fill a whole burst
    AlignLen,
}

/// Outcome of [`split_unaligned`]: the words copied by register and what is left for the bulk path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitTransfer {
    pub prefix_words: u32,
    pub src: AxiAddr,
    pub dst: AxiAddr,
    pub len_words: u32,
}

fn words_to_boundary(addr: AxiAddr) -> u32 {
    (DMA_BURST_WORDS - ((addr.lo & (DMA_BURST_BYTES - 1)) / 4)) % DMA_BURST_WORDS
}

/// Compute how many leading words must be moved by register so the rest
/// satisfies `mode`. Never exceeds `len_words`.
///
/// # Arguments
///
/// * `src` - Source address, word aligned
/// * `dst` - Destination address, word aligned
/// * `len_words` - Transfer length in words
/// * `mode` - Alignment requirement of the bulk transfer
pub fn split_unaligned(
    src: AxiAddr,
    dst: AxiAddr,
    len_words: u32,
    mode: UnalignedMode,
) -> SplitTransfer {
    let count = match mode {
        UnalignedMode::AlignSrc => words_to_boundary(src),
        UnalignedMode::AlignDst => words_to_boundary(dst),
        UnalignedMode::AlignLen => len_words % DMA_BURST_WORDS,
    };
    let count = count.min(len_words);

    SplitTransfer {
        prefix_words: count,
        src: src + count * 4,
        dst: dst + count * 4,
        len_words: len_words - count,
    }
}

/// Copy the unaligned prefix of a transfer word by word and return the remainder.
pub fn unaligned_xfer<D: DmaAdapter>(
    dma: &mut D,
    src: AxiAddr,
    dst: AxiAddr,
    len_words: u32,
    mode: UnalignedMode,
) -> PmcResult<SplitTransfer> {
    if !src.is_word_aligned() || !dst.is_word_aligned() {
        Err(PmcError::DRIVER_DMA_INVALID_PARAM)?;
    }

    let split = split_unaligned(src, dst, len_words, mode);
    for i in 0..split.prefix_words {
        let word = dma.read_word(src + i * 4);
        dma.write_word(dst + i * 4, word);
    }
    Ok(split)
}

/// Memory to memory copy of `len_words` words between arbitrary word-aligned
/// addresses: destination head by register, whole bursts by DMA, tail by register.
pub fn transfer_unaligned<D: DmaAdapter>(
    dma: &mut D,
    src: AxiAddr,
    dst: AxiAddr,
    len_words: u32,
) -> PmcResult<()> {
    let head = unaligned_xfer(dma, src, dst, len_words, UnalignedMode::AlignDst)?;

    let bulk_words = head.len_words - head.len_words % DMA_BURST_WORDS;
    if bulk_words != 0 {
        dma.transfer(&DmaTransfer::loopback(head.src, head.dst, bulk_words))?;
    }

    unaligned_xfer(
        dma,
        head.src + bulk_words * 4,
        head.dst + bulk_words * 4,
        head.len_words - bulk_words,
        UnalignedMode::AlignLen,
    )?;
    Ok(())
}
