/*++

Licensed under the Apache-2.0 license.

File Name:

    mod.rs

Abstract:

    File contains the host test harness: an AES driver wired to the emulated
    engine, DMA and memory, plus reference AES-GCM results.

--*/

#![allow(dead_code)]

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use pmc_drivers::{Aes, AesConfig, AxiAddr};
use pmc_emu_periph::{EmuAesRegs, EmuDma, EmuPlatform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const IV_ADDR: u32 = 0x1000;
pub const TAG_ADDR: u32 = 0x1100;
pub const AAD_ADDR: u32 = 0x2000;
pub const AAD2_ADDR: u32 = 0x3000;
pub const INPUT_ADDR: u32 = 0x1_0000;
pub const OUTPUT_ADDR: u32 = 0x2_0000;
pub const PLAIN_ADDR: u32 = 0x3_0000;
pub const KEYHOLE_ADDR: u32 = 0x8_0000;
pub const SCRATCH_ADDR: u32 = 0x9_0000;

pub type EmuAes = Aes<EmuAesRegs, EmuDma>;

pub fn addr(a: u32) -> AxiAddr {
    AxiAddr::from(a)
}

pub struct Harness {
    pub platform: EmuPlatform,
    pub aes: EmuAes,
}

impl Harness {
    /// Engine on the default configuration, already initialized
    pub fn new() -> Self {
        Self::with_config(&AesConfig::DEFAULT)
    }

    pub fn with_config(cfg: &'static AesConfig) -> Self {
        let mut harness = Self::uninitialized(cfg);
        harness.aes.initialize().unwrap();
        harness
    }

    pub fn uninitialized(cfg: &'static AesConfig) -> Self {
        let platform = EmuPlatform::new();
        let aes = Aes::new(cfg, platform.regs(), platform.dma());
        Self { platform, aes }
    }

    pub fn write_mem(&self, addr: u32, data: &[u8]) {
        self.platform.memory_mut().write(addr as u64, data);
    }

    pub fn read_mem(&self, addr: u32, len: usize) -> Vec<u8> {
        self.platform.memory().read(addr as u64, len)
    }

    /// Store a 12-byte IV plus pad word at [`IV_ADDR`]
    pub fn write_iv(&self, iv: &[u8; 12]) -> AxiAddr {
        self.write_mem(IV_ADDR, iv);
        self.write_mem(IV_ADDR + 12, &[0; 4]);
        addr(IV_ADDR)
    }

    pub fn write_tag(&self, tag: &[u8; 16]) -> AxiAddr {
        self.write_mem(TAG_ADDR, tag);
        addr(TAG_ADDR)
    }

    pub fn read_tag(&self) -> [u8; 16] {
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&self.read_mem(TAG_ADDR, 16));
        tag
    }
}

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(0x00C0_FFEE)
}

pub fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}

pub fn random_iv(rng: &mut StdRng) -> [u8; 12] {
    let mut iv = [0u8; 12];
    rng.fill(&mut iv[..]);
    iv
}

/// Reference AES-GCM encryption
pub fn gcm_encrypt(key: &[u8], iv: &[u8; 12], aad: &[u8], pt: &[u8]) -> (Vec<u8>, [u8; 16]) {
    let nonce = GenericArray::from_slice(&iv[..]);
    let mut buffer = pt.to_vec();
    let tag = match key.len() {
        16 => Aes128Gcm::new_from_slice(key)
            .unwrap()
            .encrypt_in_place_detached(nonce, aad, &mut buffer)
            .unwrap(),
        32 => Aes256Gcm::new_from_slice(key)
            .unwrap()
            .encrypt_in_place_detached(nonce, aad, &mut buffer)
            .unwrap(),
        len => panic!("unsupported key length {len}"),
    };
    (buffer, tag.into())
}
