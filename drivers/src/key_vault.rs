/*++

Licensed under the Apache-2.0 license.

File Name:

    key_vault.rs

Abstract:

    File contains the AES key source table and the operations that write,
    load, unwrap and zeroize keys in the engine key store.

--*/

use crate::cprintln;
use crate::dma::{AxiAddr, DmaAdapter, DmaFlags, DmaTransfer};
use pmc_error::{PmcError, PmcResult};
use pmc_registers::{
    offsets, AesDirection, AesKeySize, AesRegisters, AesStatus, KeyClearMask, KeyDecSelect,
    KeySelect, Mmio,
};
use zeroize::Zeroizing;

/// Words transferred for an IV (12 byte nonce plus one pad word)
pub(crate) const IV_WORDS: u32 = 4;

/// Hardware key slots
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeySource {
    /// Battery-backed key, stored wrapped
    Bbram,
    BbramRed,
    /// Boot-header key, stored wrapped
    Bh,
    BhRed,
    /// Fuse-programmed key, stored wrapped
    Efuse,
    EfuseRed,
    /// Session key produced by key rolling
    Kup,
    /// Device-unique key
    Puf,
    User0,
    User1,
    User2,
    User3,
    User4,
    User5,
    User6,
    User7,
}

impl KeySource {
    /// User key `n`, if `n` names one
    pub fn user(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::User0),
            1 => Some(Self::User1),
            2 => Some(Self::User2),
            3 => Some(Self::User3),
            4 => Some(Self::User4),
            5 => Some(Self::User5),
            6 => Some(Self::User6),
            7 => Some(Self::User7),
            _ => None,
        }
    }
}

/// Capabilities and register routing of one key source
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KeySourceEntry {
    pub source: KeySource,
    pub key_sel: KeySelect,

    /// Key register block, for sources software may write
    pub reg_offset: Option<u32>,
    pub user_writable: bool,
    pub user_readable: bool,
    pub decrypt_allowed: bool,
    pub encrypt_allowed: bool,

    /// Wrapped device key, usable only after unwrapping into a red slot
    pub device_key: bool,

    /// May hold a wrapped key for [`KeyVault::kek_unwrap`]
    pub kek_source: bool,

    /// Destination select when this slot receives an unwrapped key
    pub kek_dest: Option<KeyDecSelect>,

    /// `None` when the slot cannot be cleared individually
    pub clear_mask: Option<KeyClearMask>,
}

const fn wrapped(
    source: KeySource,
    key_sel: KeySelect,
    kek_source: bool,
    clear_mask: Option<KeyClearMask>,
) -> KeySourceEntry {
    KeySourceEntry {
        source,
        key_sel,
        reg_offset: None,
        user_writable: false,
        user_readable: false,
        decrypt_allowed: false,
        encrypt_allowed: false,
        device_key: true,
        kek_source,
        kek_dest: None,
        clear_mask,
    }
}

const fn red(
    source: KeySource,
    key_sel: KeySelect,
    kek_dest: Option<KeyDecSelect>,
    clear_mask: KeyClearMask,
) -> KeySourceEntry {
    KeySourceEntry {
        source,
        key_sel,
        reg_offset: None,
        user_writable: false,
        user_readable: false,
        decrypt_allowed: true,
        encrypt_allowed: true,
        device_key: false,
        kek_source: false,
        kek_dest,
        clear_mask: Some(clear_mask),
    }
}

const fn user(source: KeySource, n: u8, clear_mask: KeyClearMask) -> KeySourceEntry {
    KeySourceEntry {
        source,
        key_sel: KeySelect::user(n),
        reg_offset: Some(offsets::USER_KEY_0_0 + n as u32 * offsets::USER_KEY_STRIDE),
        user_writable: true,
        user_readable: false,
        decrypt_allowed: true,
        encrypt_allowed: true,
        device_key: false,
        kek_source: false,
        kek_dest: None,
        clear_mask: Some(clear_mask),
    }
}

pub const KEY_SOURCE_TABLE: [KeySourceEntry; 16] = [
    wrapped(KeySource::Bbram, KeySelect::BBRAM, true, None),
    red(
        KeySource::BbramRed,
        KeySelect::BBRAM_RED,
        Some(KeyDecSelect::BbramRed),
        KeyClearMask::BBRAM_RED,
    ),
    wrapped(KeySource::Bh, KeySelect::BH, false, Some(KeyClearMask::BH)),
    red(
        KeySource::BhRed,
        KeySelect::BH_RED,
        Some(KeyDecSelect::BhRed),
        KeyClearMask::BH_RED,
    ),
    wrapped(
        KeySource::Efuse,
        KeySelect::EFUSE,
        true,
        Some(KeyClearMask::EFUSE),
    ),
    red(
        KeySource::EfuseRed,
        KeySelect::EFUSE_RED,
        Some(KeyDecSelect::EfuseRed),
        KeyClearMask::EFUSE_RED,
    ),
    red(KeySource::Kup, KeySelect::KUP, None, KeyClearMask::KUP),
    red(KeySource::Puf, KeySelect::PUF, None, KeyClearMask::PUF),
    user(KeySource::User0, 0, KeyClearMask::USER_0),
    user(KeySource::User1, 1, KeyClearMask::USER_1),
    user(KeySource::User2, 2, KeyClearMask::USER_2),
    user(KeySource::User3, 3, KeyClearMask::USER_3),
    user(KeySource::User4, 4, KeyClearMask::USER_4),
    user(KeySource::User5, 5, KeyClearMask::USER_5),
    user(KeySource::User6, 6, KeyClearMask::USER_6),
    user(KeySource::User7, 7, KeyClearMask::USER_7),
];

/// What [`KeyVault::zeroize`] clears
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyClearTarget {
    Source(KeySource),
    Expanded,
    /// KUP and the expanded key
    Session,
    PufRedExpanded,
    All,
}

/// Key store operations over a lookup table.
#[derive(Debug, Copy, Clone)]
pub struct KeyVault {
    table: &'static [KeySourceEntry],
    poll_budget: u32,
}

impl KeyVault {
    pub fn new(table: &'static [KeySourceEntry], poll_budget: u32) -> Self {
        Self { table, poll_budget }
    }

    /// Look up the table entry of `source`
    pub fn entry(&self, source: KeySource) -> PmcResult<&'static KeySourceEntry> {
        let table = self.table;
        table
            .iter()
            .find(|e| e.source == source)
            .ok_or(PmcError::DRIVER_AES_INVALID_PARAM)
    }

    /// Write a user key into its hardware key register
    ///
    /// # Arguments
    ///
    /// * `regs` - AES registers
    /// * `source` - Destination slot, must be user writable
    /// * `size` - Key size
    /// * `key` - Key bytes, `size.bytes()` long
    pub fn write_key<M: Mmio>(
        &self,
        regs: &mut AesRegisters<M>,
        source: KeySource,
        size: AesKeySize,
        key: &[u8],
    ) -> PmcResult<()> {
        let mut words = Zeroizing::new([0u32; 8]);

        let entry = self.entry(source)?;
        let offset = match entry.reg_offset {
            Some(offset) if entry.user_writable => offset,
            _ => Err(PmcError::DRIVER_AES_INVALID_PARAM)?,
        };
        if key.len() != size.bytes() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }

        let n = size.words();
        for (word, bytes) in words.iter_mut().zip(key.chunks_exact(4)) {
            *word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        // The highest register offset holds the first key word.
        for idx in 0..n {
            regs.write_key_word(offset, idx, words[n - 1 - idx]);
        }
        Ok(())
    }

    /// Select `source` and run the key schedule
    pub fn load<M: Mmio>(
        &self,
        regs: &mut AesRegisters<M>,
        source: KeySource,
        size: AesKeySize,
    ) -> PmcResult<()> {
        let entry = self.entry(source)?;
        regs.set_key_size(size);
        regs.select_key(entry.key_sel);
        regs.trigger_key_load();
        regs.wait_status(AesStatus::KEY_INIT_DONE, self.poll_budget)
            .map_err(|_| PmcError::DRIVER_AES_TIMEOUT)
    }

    /// Whether hardware reports every key in `source`'s clear mask as zeroed
    pub fn is_zeroed<M: Mmio>(&self, regs: &AesRegisters<M>, source: KeySource) -> bool {
        match self.entry(source) {
            Ok(KeySourceEntry {
                clear_mask: Some(mask),
                ..
            }) => regs.key_zeroed_status().contains(*mask),
            _ => false,
        }
    }

    /// Decrypt the wrapped key in `wrapped` with the PUF key and store it in `dest`
    ///
    /// The core is left in soft reset on every exit.
    ///
    /// # Arguments
    ///
    /// * `regs` - AES registers
    /// * `dma` - DMA adapter used for the IV
    /// * `wrapped` - Slot holding the wrapped key
    /// * `dest` - Red slot receiving the plaintext key
    /// * `size` - Key size
    /// * `iv` - Address of the 16-byte IV buffer
    pub fn kek_unwrap<M: Mmio, D: DmaAdapter>(
        &self,
        regs: &mut AesRegisters<M>,
        dma: &mut D,
        wrapped: KeySource,
        dest: KeySource,
        size: AesKeySize,
        iv: AxiAddr,
    ) -> PmcResult<()> {
        let result = self.kek_unwrap_inner(regs, dma, wrapped, dest, size, iv);

        regs.set_key_decrypt(false);
        regs.set_soft_reset(true);

        if result.is_ok() {
            cprintln!("[kv] black key unwrapped");
        }
        result
    }

    fn kek_unwrap_inner<M: Mmio, D: DmaAdapter>(
        &self,
        regs: &mut AesRegisters<M>,
        dma: &mut D,
        wrapped: KeySource,
        dest: KeySource,
        size: AesKeySize,
        iv: AxiAddr,
    ) -> PmcResult<()> {
        let src_entry = self.entry(wrapped)?;
        if !src_entry.kek_source || iv.is_null() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }
        let Some(dest_sel) = self.entry(dest)?.kek_dest else {
            return Err(PmcError::DRIVER_AES_INVALID_PARAM);
        };
        if self.is_zeroed(regs, KeySource::Puf) {
            Err(PmcError::DRIVER_AES_ZERO_PUF_KEY_NOT_ALLOWED)?;
        }

        regs.set_soft_reset(false);
        regs.set_direction(AesDirection::Decrypt);
        self.load(regs, KeySource::Puf, size)?;

        regs.start_message();
        dma.transfer(&DmaTransfer::to_engine(
            iv,
            IV_WORDS,
            DmaFlags::BYTE_SWAP | DmaFlags::LAST_CHUNK,
        ))?;

        regs.set_key_decrypt(true);
        regs.set_key_decrypt_dest(dest_sel);
        regs.select_key(src_entry.key_sel);
        regs.trigger_key_decrypt();

        regs.wait_status(AesStatus::BLK_KEY_DEC_DONE, self.poll_budget)
            .map_err(|_| PmcError::DRIVER_AES_KEK_DECRYPT_TIMEOUT)
    }

    /// Clear keys in hardware and wait for the zeroed status
    ///
    /// # Arguments
    ///
    /// * `regs` - AES registers
    /// * `target` - Slot or group to clear
    pub fn zeroize<M: Mmio>(
        &self,
        regs: &mut AesRegisters<M>,
        target: KeyClearTarget,
    ) -> PmcResult<()> {
        let mask = match target {
            KeyClearTarget::Source(source) => match self.entry(source)?.clear_mask {
                Some(mask) => mask,
                None => Err(PmcError::DRIVER_AES_INVALID_PARAM)?,
            },
            KeyClearTarget::Expanded => KeyClearMask::EXPANDED,
            KeyClearTarget::Session => KeyClearMask::SESSION,
            KeyClearTarget::PufRedExpanded => KeyClearMask::PUF_RED_EXPANDED,
            KeyClearTarget::All => KeyClearMask::ALL,
        };

        // The clear logic does not run while the core is held in reset.
        let in_reset = regs.soft_reset_asserted();
        if in_reset {
            regs.set_soft_reset(false);
        }

        regs.set_key_clear(mask);
        let result = regs.wait_key_zeroed(mask, self.poll_budget);
        regs.set_key_clear(KeyClearMask::empty());

        if in_reset {
            regs.set_soft_reset(true);
        }

        result.map_err(|_| PmcError::DRIVER_AES_KEY_CLEAR_ERROR)
    }
}
