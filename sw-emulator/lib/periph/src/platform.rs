/*++

Licensed under the Apache-2.0 license.

File Name:

    platform.rs

Abstract:

    File contains the emulated platform: one AES engine, one DMA controller
    and the memory they share, plus the adapters handed to the driver.

--*/

use crate::dma::DmaState;
use crate::{AesEngine, EmuDma, Memory};
use pmc_drivers::DmaTransfer;
use pmc_registers::{KeySelect, Mmio};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

const DEFAULT_PUF_SEED: u64 = 0x5055_465F_4B45_5921;

/// Register window of the engine, as seen by the driver
pub struct EmuAesRegs {
    engine: Rc<RefCell<AesEngine>>,
}

impl Mmio for EmuAesRegs {
    fn read32(&self, offset: u32) -> u32 {
        self.engine.borrow().read(offset)
    }

    fn write32(&mut self, offset: u32, val: u32) {
        self.engine.borrow_mut().write(offset, val)
    }
}

pub struct EmuPlatform {
    engine: Rc<RefCell<AesEngine>>,
    memory: Rc<RefCell<Memory>>,
    dma: Rc<RefCell<DmaState>>,
    puf_key: [u8; 32],
}

impl Default for EmuPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl EmuPlatform {
    /// Create a platform with a PUF key derived from a fixed seed
    pub fn new() -> Self {
        Self::with_puf_seed(DEFAULT_PUF_SEED)
    }

    pub fn with_puf_seed(seed: u64) -> Self {
        let mut puf_key = [0u8; 32];
        SmallRng::seed_from_u64(seed).fill(&mut puf_key[..]);

        let mut engine = AesEngine::new();
        engine.provision(KeySelect::PUF, &puf_key);

        Self {
            engine: Rc::new(RefCell::new(engine)),
            memory: Rc::new(RefCell::new(Memory::new())),
            dma: Rc::new(RefCell::new(DmaState::default())),
            puf_key,
        }
    }

    /// Register adapter for the driver
    pub fn regs(&self) -> EmuAesRegs {
        EmuAesRegs {
            engine: self.engine.clone(),
        }
    }

    /// DMA adapter for the driver
    pub fn dma(&self) -> EmuDma {
        EmuDma::new(self.engine.clone(), self.memory.clone(), self.dma.clone())
    }

    pub fn engine(&self) -> Ref<AesEngine> {
        self.engine.borrow()
    }

    pub fn engine_mut(&self) -> RefMut<AesEngine> {
        self.engine.borrow_mut()
    }

    pub fn memory(&self) -> Ref<Memory> {
        self.memory.borrow()
    }

    pub fn memory_mut(&self) -> RefMut<Memory> {
        self.memory.borrow_mut()
    }

    /// Device key the engine was provisioned with
    pub fn puf_key(&self) -> &[u8; 32] {
        &self.puf_key
    }

    /// Every transfer issued so far, in order
    pub fn dma_log(&self) -> Vec<DmaTransfer> {
        self.dma.borrow().log.clone()
    }

    pub fn clear_dma_log(&self) {
        self.dma.borrow_mut().log.clear();
    }

    /// Make the next transfer report a bus error
    pub fn fail_next_dma(&self) {
        self.dma.borrow_mut().fail_next = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmc_drivers::{AxiAddr, DmaAdapter, DmaFlags, PmcError};
    use pmc_registers::{offsets, AesKeySize};

    #[test]
    fn test_puf_is_provisioned() {
        let platform = EmuPlatform::new();
        let mut regs = platform.regs();
        regs.write32(offsets::KEY_SIZE, AesKeySize::Aes256 as u32);
        assert_eq!(
            platform.engine().slot_key(KeySelect::PUF).unwrap(),
            platform.puf_key().to_vec()
        );
        assert_ne!(platform.puf_key(), &[0u8; 32]);
    }

    #[test]
    fn test_loopback_copies_and_discards_engine_output() {
        let platform = EmuPlatform::new();
        let data: Vec<u8> = (1u8..=16).collect();
        platform.memory_mut().write(0x1004, &data);

        let mut dma = platform.dma();
        dma.transfer(&DmaTransfer::loopback(
            AxiAddr::from(0x1004u32),
            AxiAddr::from(0x2000u32),
            4,
        ))
        .unwrap();
        assert_eq!(platform.memory().read(0x2000, 16), data);
        assert_eq!(platform.dma_log().len(), 1);
    }

    #[test]
    fn test_misaligned_and_failed_transfers() {
        let platform = EmuPlatform::new();
        let mut dma = platform.dma();

        let xfer = DmaTransfer::loopback(AxiAddr::from(0x1002u32), AxiAddr::from(0x2000u32), 4);
        assert_eq!(dma.transfer(&xfer), Err(PmcError::DRIVER_DMA_INVALID_PARAM));

        platform.fail_next_dma();
        let xfer = DmaTransfer::loopback(AxiAddr::from(0x1000u32), AxiAddr::from(0x2000u32), 4);
        assert_eq!(dma.transfer(&xfer), Err(PmcError::DRIVER_DMA_TRANSFER_FAILURE));
        assert_eq!(dma.transfer(&xfer), Ok(()));
    }

    #[test]
    fn test_loopback_requires_whole_aligned_bursts() {
        let platform = EmuPlatform::new();
        platform.memory_mut().write(0x1000, &[0xa5; 32]);
        let mut dma = platform.dma();

        for (dst, len_words) in [(0x2000u32, 2u32), (0x2004, 4), (0x2008, 5)] {
            let xfer = DmaTransfer::loopback(AxiAddr::from(0x1000u32), AxiAddr::from(dst), len_words);
            assert_eq!(dma.transfer(&xfer), Err(PmcError::DRIVER_DMA_INVALID_PARAM));
        }
        assert_eq!(platform.memory().read(0x2000, 32), vec![0; 32]);
    }

    #[test]
    fn test_drain_empty_engine_times_out() {
        let platform = EmuPlatform::new();
        let mut dma = platform.dma();
        let mut out = [0u32; 4];
        assert_eq!(
            dma.drain_engine(&mut out, DmaFlags::BYTE_SWAP),
            Err(PmcError::DRIVER_DMA_TIMEOUT)
        );
    }
}
