/*++

Licensed under the Apache-2.0 license.

File Name:

    dma.rs

Abstract:

    File contains the DMA controller model: memory to engine, engine to
    memory and loopback transfers over the shared memory model.

--*/

use crate::{AesEngine, Memory};
use pmc_drivers::{
    AxiAddr, DmaAdapter, DmaFlags, DmaRoute, DmaTransfer, PmcError, PmcResult, DMA_BURST_WORDS,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
pub(crate) struct DmaState {
    pub(crate) log: Vec<DmaTransfer>,
    pub(crate) fail_next: bool,
}

/// DMA controller wired to one engine and one memory
pub struct EmuDma {
    engine: Rc<RefCell<AesEngine>>,
    memory: Rc<RefCell<Memory>>,
    state: Rc<RefCell<DmaState>>,
}

/// Memory word to stream port bytes
fn to_stream(word: u32, flags: DmaFlags) -> [u8; 4] {
    let word = if flags.contains(DmaFlags::BYTE_SWAP) {
        word.swap_bytes()
    } else {
        word
    };
    word.to_be_bytes()
}

/// Stream port bytes to memory word
fn from_stream(bytes: &[u8], flags: DmaFlags) -> u32 {
    let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if flags.contains(DmaFlags::BYTE_SWAP) {
        word.swap_bytes()
    } else {
        word
    }
}

impl EmuDma {
    pub(crate) fn new(
        engine: Rc<RefCell<AesEngine>>,
        memory: Rc<RefCell<Memory>>,
        state: Rc<RefCell<DmaState>>,
    ) -> Self {
        Self {
            engine,
            memory,
            state,
        }
    }

    fn read_stream(&self, src: AxiAddr, xfer: &DmaTransfer) -> Vec<u8> {
        let memory = self.memory.borrow();
        let base = u64::from(src);
        let mut bytes: Vec<u8> = (0..xfer.len_words as u64)
            .flat_map(|i| to_stream(memory.read_u32(base + i * 4), xfer.flags))
            .collect();
        if xfer.tail_bytes != 0 && !bytes.is_empty() {
            let excess = 4 - (xfer.tail_bytes as usize).min(4);
            bytes.truncate(bytes.len() - excess);
        }
        bytes
    }

    fn write_stream(&self, dst: AxiAddr, bytes: &[u8], flags: DmaFlags) {
        let mut memory = self.memory.borrow_mut();
        let base = u64::from(dst);
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            memory.write_u32(base + i as u64 * 4, from_stream(chunk, flags));
        }
    }

    fn engine_transfer(&mut self, xfer: &DmaTransfer) -> PmcResult<()> {
        if xfer.src.is_none() && xfer.dst.is_none() {
            Err(PmcError::DRIVER_DMA_INVALID_PARAM)?;
        }

        if let Some(src) = xfer.src {
            let bytes = self.read_stream(src, xfer);
            self.engine
                .borrow_mut()
                .push_input(&bytes, xfer.flags.contains(DmaFlags::LAST_CHUNK));
        }
        if let Some(dst) = xfer.dst {
            let bytes = self
                .engine
                .borrow_mut()
                .pop_output(xfer.len_words as usize * 4)
                .ok_or(PmcError::DRIVER_DMA_TIMEOUT)?;
            self.write_stream(dst, &bytes, xfer.flags);
        }
        Ok(())
    }

    fn loopback_transfer(&mut self, xfer: &DmaTransfer) -> PmcResult<()> {
        let (Some(src), Some(dst)) = (xfer.src, xfer.dst) else {
            return Err(PmcError::DRIVER_DMA_INVALID_PARAM);
        };
        // The memory side only moves whole bursts into burst-aligned destinations.
        if xfer.len_words % DMA_BURST_WORDS != 0 || dst.lo % (DMA_BURST_WORDS * 4) != 0 {
            Err(PmcError::DRIVER_DMA_INVALID_PARAM)?;
        }

        let mut memory = self.memory.borrow_mut();
        let (src, dst) = (u64::from(src), u64::from(dst));
        for i in 0..xfer.len_words as u64 {
            let word = memory.read_u32(src + i * 4);
            memory.write_u32(dst + i * 4, word);
        }
        // The channel is shared with the engine output port.
        self.engine.borrow_mut().discard_output();
        Ok(())
    }
}

impl DmaAdapter for EmuDma {
    fn transfer(&mut self, xfer: &DmaTransfer) -> PmcResult<()> {
        {
            let mut state = self.state.borrow_mut();
            state.log.push(*xfer);
            if state.fail_next {
                state.fail_next = false;
                Err(PmcError::DRIVER_DMA_TRANSFER_FAILURE)?;
            }
        }

        let misaligned = [xfer.src, xfer.dst]
            .iter()
            .flatten()
            .any(|addr| !addr.is_word_aligned());
        if misaligned {
            Err(PmcError::DRIVER_DMA_INVALID_PARAM)?;
        }

        match xfer.route {
            DmaRoute::Engine => self.engine_transfer(xfer),
            DmaRoute::Loopback => self.loopback_transfer(xfer),
        }
    }

    fn drain_engine(&mut self, out: &mut [u32], flags: DmaFlags) -> PmcResult<()> {
        let bytes = self
            .engine
            .borrow_mut()
            .pop_output(out.len() * 4)
            .ok_or(PmcError::DRIVER_DMA_TIMEOUT)?;
        for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = from_stream(chunk, flags);
        }
        Ok(())
    }

    fn read_word(&mut self, addr: AxiAddr) -> u32 {
        self.memory.borrow().read_u32(addr.into())
    }

    fn write_word(&mut self, addr: AxiAddr, val: u32) {
        self.memory.borrow_mut().write_u32(addr.into(), val)
    }
}
