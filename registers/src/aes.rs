/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    Register map of the PMC AES-GCM engine and typed accessors over it.

--*/

use crate::{Mmio, PollTimeout};
use bitfield::bitfield;
use bitflags::bitflags;

pub mod offsets {
    pub const STATUS: u32 = 0x00;
    pub const KEY_SEL: u32 = 0x04;
    pub const KEY_LOAD: u32 = 0x08;
    pub const START_MSG: u32 = 0x0C;
    pub const SOFT_RST: u32 = 0x10;
    pub const KEY_CLEAR: u32 = 0x14;
    pub const MODE: u32 = 0x18;
    pub const KUP_WR: u32 = 0x1C;
    pub const IV_0: u32 = 0x40;
    pub const IV_1: u32 = 0x44;
    pub const IV_2: u32 = 0x48;
    pub const IV_3: u32 = 0x4C;
    pub const KEY_ZEROED_STATUS: u32 = 0x50;
    pub const KEY_SIZE: u32 = 0x70;
    pub const KEY_DEC: u32 = 0x74;
    pub const KEY_DEC_SEL: u32 = 0x78;
    pub const KEY_DEC_TRIG: u32 = 0x7C;
    pub const AAD: u32 = 0x80;
    pub const CM_EN: u32 = 0x84;

    /// User key 0, 8 words; user key `n` is at `USER_KEY_0_0 + n * USER_KEY_STRIDE`
    pub const USER_KEY_0_0: u32 = 0x120;
    pub const USER_KEY_STRIDE: u32 = 0x20;

    /// Number of 32-bit words in a key register block
    pub const KEY_REG_WORDS: u32 = 8;
}

bitflags! {
    /// Engine status register
    pub struct AesStatus: u32 {
        /// Last stream transfer fully consumed
        const DONE = 1 << 0;
        /// Authentication tag matched (decrypt)
        const GCM_TAG_PASS = 1 << 3;
        /// Key schedule loaded
        const KEY_INIT_DONE = 1 << 4;
        /// Black key decryption finished
        const BLK_KEY_DEC_DONE = 1 << 5;
        /// DPA counter-measures active
        const CM_ENABLED = 1 << 12;
    }
}

bitflags! {
    /// Layout shared by the KEY_CLEAR and KEY_ZEROED_STATUS registers
    pub struct KeyClearMask: u32 {
        const USER_0 = 1 << 0;
        const USER_1 = 1 << 1;
        const USER_2 = 1 << 2;
        const USER_3 = 1 << 3;
        const USER_4 = 1 << 4;
        const USER_5 = 1 << 5;
        const USER_6 = 1 << 6;
        const USER_7 = 1 << 7;
        const EFUSE = 1 << 8;
        const EFUSE_RED = 1 << 9;
        const BBRAM_RED = 1 << 10;
        const BH = 1 << 11;
        const BH_RED = 1 << 12;
        const KUP = 1 << 13;
        const PUF = 1 << 14;
        const EXPANDED = 1 << 15;

        /// Device-derived material: PUF, every red key and the expanded schedule
        const PUF_RED_EXPANDED = Self::PUF.bits
            | Self::EFUSE_RED.bits
            | Self::BBRAM_RED.bits
            | Self::BH_RED.bits
            | Self::EXPANDED.bits;

        /// Material derived for a single session
        const SESSION = Self::KUP.bits | Self::EXPANDED.bits;

        const ALL = 0xFFFF;
    }
}

impl KeyClearMask {
    /// Clear bit of user key `n`
    pub fn user(n: u8) -> Self {
        Self::from_bits_truncate(1 << (n & 0x7))
    }
}

/// Value written to KEY_SEL to route a key source into the engine
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KeySelect(pub u32);

impl KeySelect {
    pub const BBRAM: Self = Self(0xBBDE_6600);
    pub const BBRAM_RED: Self = Self(0xBBDE_8200);
    pub const BH: Self = Self(0xBDB0_6600);
    pub const BH_RED: Self = Self(0xBDB0_8200);
    pub const EFUSE: Self = Self(0xEFDE_6600);
    pub const EFUSE_RED: Self = Self(0xEFDE_8200);
    pub const KUP: Self = Self(0xBDC9_8200);
    pub const PUF: Self = Self(0xDBDE_8200);
    pub const USER_0: Self = Self(0xBD95_8200);

    /// Select value of user key `n`
    pub const fn user(n: u8) -> Self {
        Self(Self::USER_0.0 + (n & 0x7) as u32)
    }
}

/// Value written to KEY_DEC_SEL to pick where an unwrapped key lands
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyDecSelect {
    BbramRed = 0,
    BhRed = 1,
    EfuseRed = 2,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AesKeySize {
    Aes128 = 0,
    Aes256 = 2,
}

impl AesKeySize {
    /// Key length in 32-bit words
    pub const fn words(self) -> usize {
        match self {
            Self::Aes128 => 4,
            Self::Aes256 => 8,
        }
    }

    /// Key length in bytes
    pub const fn bytes(self) -> usize {
        self.words() * 4
    }
}

/// Direction written to MODE
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AesDirection {
    Decrypt = 0,
    Encrypt = 1,
}

bitfield! {
    /// Key-update write control
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct KupWrCtrl(u32);

    /// Capture the next-block key from the plaintext tail into the KUP slot
    pub key_write, set_key_write: 0;

    /// Capture the next-block IV and length into the IV registers
    pub iv_write, set_iv_write: 1;
}

/// Typed view of the AES engine registers.
pub struct AesRegisters<M: Mmio> {
    mmio: M,
}

impl<M: Mmio> AesRegisters<M> {
    pub fn new(mmio: M) -> Self {
        Self { mmio }
    }

    pub fn mmio(&self) -> &M {
        &self.mmio
    }

    pub fn mmio_mut(&mut self) -> &mut M {
        &mut self.mmio
    }

    pub fn status(&self) -> AesStatus {
        AesStatus::from_bits_truncate(self.mmio.read32(offsets::STATUS))
    }

    /// Wait for every bit in `bits` to be set in the status register
    pub fn wait_status(&self, bits: AesStatus, budget: u32) -> Result<(), PollTimeout> {
        self.mmio
            .poll_until(offsets::STATUS, bits.bits(), bits.bits(), budget)
    }

    pub fn set_soft_reset(&mut self, asserted: bool) {
        self.mmio.write32(offsets::SOFT_RST, asserted as u32);
    }

    pub fn soft_reset_asserted(&self) -> bool {
        self.mmio.read32(offsets::SOFT_RST) & 1 != 0
    }

    pub fn select_key(&mut self, sel: KeySelect) {
        self.mmio.write32(offsets::KEY_SEL, sel.0);
    }

    pub fn set_key_size(&mut self, size: AesKeySize) {
        self.mmio.write32(offsets::KEY_SIZE, size as u32);
    }

    pub fn trigger_key_load(&mut self) {
        self.mmio.write32(offsets::KEY_LOAD, 1);
    }

    pub fn start_message(&mut self) {
        self.mmio.write32(offsets::START_MSG, 1);
    }

    pub fn set_direction(&mut self, dir: AesDirection) {
        self.mmio.write32(offsets::MODE, dir as u32);
    }

    pub fn set_aad_enable(&mut self, enable: bool) {
        self.mmio.write32(offsets::AAD, enable as u32);
    }

    /// Write word `idx` of the key register block starting at `key_offset`
    pub fn write_key_word(&mut self, key_offset: u32, idx: usize, val: u32) {
        self.mmio.write32(key_offset + (idx as u32) * 4, val);
    }

    pub fn set_key_clear(&mut self, mask: KeyClearMask) {
        self.mmio.write32(offsets::KEY_CLEAR, mask.bits());
    }

    pub fn key_zeroed_status(&self) -> KeyClearMask {
        KeyClearMask::from_bits_truncate(self.mmio.read32(offsets::KEY_ZEROED_STATUS))
    }

    /// Wait until every key in `mask` reports zeroed
    pub fn wait_key_zeroed(&self, mask: KeyClearMask, budget: u32) -> Result<(), PollTimeout> {
        self.mmio.poll_until(
            offsets::KEY_ZEROED_STATUS,
            mask.bits(),
            mask.bits(),
            budget,
        )
    }

    pub fn set_key_decrypt(&mut self, enable: bool) {
        self.mmio.write32(offsets::KEY_DEC, enable as u32);
    }

    pub fn set_key_decrypt_dest(&mut self, sel: KeyDecSelect) {
        self.mmio.write32(offsets::KEY_DEC_SEL, sel as u32);
    }

    pub fn trigger_key_decrypt(&mut self) {
        self.mmio.write32(offsets::KEY_DEC_TRIG, 1);
    }

    pub fn iv_word(&self, idx: usize) -> u32 {
        self.mmio.read32(offsets::IV_0 + (idx as u32 & 0x3) * 4)
    }

    pub fn set_cm_enable(&mut self, enable: bool) {
        self.mmio.write32(offsets::CM_EN, enable as u32);
    }

    pub fn set_kup_write(&mut self, ctrl: KupWrCtrl) {
        self.mmio.write32(offsets::KUP_WR, ctrl.0);
    }

    pub fn kup_write(&self) -> KupWrCtrl {
        KupWrCtrl(self.mmio.read32(offsets::KUP_WR))
    }
}
