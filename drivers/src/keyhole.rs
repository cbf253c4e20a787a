/*++

Licensed under the Apache-2.0 license.

File Name:

    keyhole.rs

Abstract:

    File contains the keyhole transfer: a stream of arbitrary length relayed
    through a small fixed window that the consumer drains out of band.

--*/

use crate::dma::{transfer_unaligned, AxiAddr, DmaAdapter};
use pmc_error::{PmcError, PmcResult};

/// Window description plus the write cursor that persists across transfers.
///
/// The cursor always satisfies `base <= cursor < base + window_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyholeParams {
    base: u64,
    cursor: u64,
    window_size: u32,
}

impl KeyholeParams {
    /// Create a keyhole whose cursor starts at `base`
    ///
    /// # Arguments
    ///
    /// * `base` - First address of the window, word aligned
    /// * `window_size` - Window size in bytes, a power of two of at least one word
    pub fn new(base: AxiAddr, window_size: u32) -> PmcResult<Self> {
        if !window_size.is_power_of_two() || window_size < 4 || !base.is_word_aligned() {
            Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)?;
        }
        let base = u64::from(base);
        if base.checked_add(window_size as u64).is_none() {
            Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)?;
        }
        Ok(Self {
            base,
            cursor: base,
            window_size,
        })
    }

    /// Create a keyhole resuming at `cursor`, which must lie inside the window
    pub fn with_cursor(base: AxiAddr, window_size: u32, cursor: AxiAddr) -> PmcResult<Self> {
        let mut params = Self::new(base, window_size)?;
        let cursor = u64::from(cursor);
        if cursor < params.base || cursor >= params.end() || cursor & 0x3 != 0 {
            Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)?;
        }
        params.cursor = cursor;
        Ok(params)
    }

    pub fn base(&self) -> AxiAddr {
        self.base.into()
    }

    pub fn cursor(&self) -> AxiAddr {
        self.cursor.into()
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    fn end(&self) -> u64 {
        self.base + self.window_size as u64
    }

    /// Plan the chunks that relay `len` bytes from `src` into the window
    pub fn chunks(&self, src: AxiAddr, len: u32) -> KeyholeChunks {
        KeyholeChunks {
            base: self.base,
            end: self.end(),
            cursor: self.cursor,
            src: u64::from(src),
            remaining: len,
        }
    }

    /// Move the cursor to where `chunks` left it
    pub fn commit(&mut self, chunks: &KeyholeChunks) {
        self.cursor = chunks.cursor;
    }
}

/// One contiguous piece of a keyhole transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyholeChunk {
    pub src: AxiAddr,
    pub dst: AxiAddr,
    pub len: u32,
}

/// Iterator over the chunks of a keyhole transfer.
///
/// The first chunk fills the room left between the cursor and the end of the
/// window; every later chunk restarts at the window base and moves at most
/// one window.
#[derive(Debug, Clone)]
pub struct KeyholeChunks {
    base: u64,
    end: u64,
    cursor: u64,
    src: u64,
    remaining: u32,
}

impl KeyholeChunks {
    /// Destination cursor after the chunks yielded so far
    pub fn cursor(&self) -> AxiAddr {
        self.cursor.into()
    }

    /// Bytes not yet yielded
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Iterator for KeyholeChunks {
    type Item = KeyholeChunk;

    fn next(&mut self) -> Option<KeyholeChunk> {
        if self.remaining == 0 {
            return None;
        }

        let room = self.end - self.cursor;
        let len = (self.remaining as u64).min(room) as u32;
        let chunk = KeyholeChunk {
            src: self.src.into(),
            dst: self.cursor.into(),
            len,
        };

        self.src += len as u64;
        self.remaining -= len;
        self.cursor += len as u64;
        if self.cursor == self.end {
            self.cursor = self.base;
        }
        Some(chunk)
    }
}

/// Relay `len` bytes from `src` through the keyhole.
///
/// Each chunk goes through [`transfer_unaligned`], so the loopback DMA only
/// sees whole bursts and the misaligned edges of a chunk are moved by register.
///
/// # Arguments
///
/// * `dma` - DMA adapter
/// * `keyhole` - Window and cursor; the cursor is advanced on success
/// * `src` - Source address, word aligned
/// * `len` - Length in bytes, a multiple of 4
pub fn keyhole_transfer<D: DmaAdapter>(
    dma: &mut D,
    keyhole: &mut KeyholeParams,
    src: AxiAddr,
    len: u32,
) -> PmcResult<()> {
    if len % 4 != 0 || !src.is_word_aligned() {
        Err(PmcError::DRIVER_KEYHOLE_INVALID_PARAM)?;
    }

    let mut chunks = keyhole.chunks(src, len);
    for chunk in chunks.by_ref() {
        transfer_unaligned(dma, chunk.src, chunk.dst, chunk.len / 4)?;
    }
    keyhole.commit(&chunks);
    Ok(())
}
