/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    Driver for the PMC AES-GCM engine.

    Notes about how this hardware behaves:

    * The stream port is big-endian per word, so every transfer through the
      engine enables the DMA byte swap.
    * The tag of an encrypt operation must be drained right after the last
      chunk; the channel may be reused by unrelated transfers before final.
    * Session key material (KUP and the expanded key) is cleared and the core
      held in soft reset whenever an operation ends or fails.

--*/

use crate::cprintln;
use crate::dma::{AxiAddr, DmaAdapter, DmaFlags, DmaTransfer};
use crate::key_vault::{KeyClearTarget, KeySource, KeySourceEntry, KeyVault, IV_WORDS};
use crate::keyhole::KeyholeParams;
use crate::KEY_SOURCE_TABLE;
use pmc_error::{PmcError, PmcResult};
use pmc_registers::{AesDirection, AesKeySize, AesRegisters, AesStatus, KupWrCtrl, Mmio};
use zeroize::Zeroize;

const AES_BLOCK_SIZE_BYTES: u32 = 16;
const AES_TAG_SIZE_WORDS: usize = 4;
const DEFAULT_POLL_BUDGET: u32 = 0x1FFFF;

/// AAD length rule of a hardware revision
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AadGranularity {
    /// Every AAD chunk is a whole number of 16-byte blocks
    Block16,
    /// Any byte length
    Byte,
}

/// Static engine configuration.
#[derive(Debug, Copy, Clone)]
pub struct AesConfig {
    pub key_table: &'static [KeySourceEntry],
    pub aad_granularity: AadGranularity,
    pub dpa_cm_supported: bool,

    /// Maximum number of status reads for any hardware wait
    pub poll_budget: u32,
}

impl AesConfig {
    pub const DEFAULT: Self = Self {
        key_table: &KEY_SOURCE_TABLE,
        aad_granularity: AadGranularity::Block16,
        dpa_cm_supported: true,
        poll_budget: DEFAULT_POLL_BUDGET,
    };

    pub const BYTE_GRANULAR_AAD: Self = Self {
        aad_granularity: AadGranularity::Byte,
        ..Self::DEFAULT
    };
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AesState {
    Uninitialized,
    Initialized,
    OperationInitialized,
    UpdateInProgress,
    UpdateDone,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AesOperation {
    Encrypt,
    Decrypt,
}

impl From<AesOperation> for AesDirection {
    fn from(op: AesOperation) -> Self {
        match op {
            AesOperation::Encrypt => AesDirection::Encrypt,
            AesOperation::Decrypt => AesDirection::Decrypt,
        }
    }
}

/// Where the output of [`Aes::update`] goes
#[derive(Debug)]
pub enum UpdateTarget<'a> {
    Memory(AxiAddr),
    /// Relay the output through a keyhole window, advancing its cursor
    Keyhole(&'a mut KeyholeParams),
}

#[derive(Debug, Copy, Clone)]
struct ActiveOperation {
    op: AesOperation,
    key_source: KeySource,
    key_size: AesKeySize,
}

/// AES-GCM engine driver.
pub struct Aes<M: Mmio, D: DmaAdapter> {
    cfg: &'static AesConfig,
    regs: AesRegisters<M>,
    dma: D,
    vault: KeyVault,
    state: AesState,
    active: Option<ActiveOperation>,
    tag: [u32; AES_TAG_SIZE_WORDS],
}

impl<M: Mmio, D: DmaAdapter> Aes<M, D> {
    pub fn new(cfg: &'static AesConfig, mmio: M, dma: D) -> Self {
        Self {
            cfg,
            regs: AesRegisters::new(mmio),
            dma,
            vault: KeyVault::new(cfg.key_table, cfg.poll_budget),
            state: AesState::Uninitialized,
            active: None,
            tag: [0; AES_TAG_SIZE_WORDS],
        }
    }

    pub fn state(&self) -> AesState {
        self.state
    }

    pub fn config(&self) -> &'static AesConfig {
        self.cfg
    }

    pub fn regs(&self) -> &AesRegisters<M> {
        &self.regs
    }

    pub fn dma(&mut self) -> &mut D {
        &mut self.dma
    }

    /// Bring the engine to `Initialized`, holding the core in soft reset
    pub fn initialize(&mut self) -> PmcResult<()> {
        if !matches!(self.state, AesState::Uninitialized | AesState::Initialized) {
            Err(PmcError::DRIVER_AES_STATE_MISMATCH)?;
        }
        self.regs.set_key_decrypt(false);
        self.regs.set_soft_reset(true);
        self.state = AesState::Initialized;
        Ok(())
    }

    fn expect_idle(&self) -> PmcResult<()> {
        if self.state != AesState::Initialized {
            Err(PmcError::DRIVER_AES_STATE_MISMATCH)?;
        }
        Ok(())
    }

    /// Write a user key
    ///
    /// # Arguments
    ///
    /// * `source` - User key slot
    /// * `size` - Key size
    /// * `key` - Key bytes
    pub fn write_key(&mut self, source: KeySource, size: AesKeySize, key: &[u8]) -> PmcResult<()> {
        self.expect_idle()
            .map_err(|_| PmcError::DRIVER_AES_INVALID_PARAM)?;
        self.vault.write_key(&mut self.regs, source, size, key)
    }

    /// Unwrap the black key in `wrapped` into the red slot `dest`
    ///
    /// # Arguments
    ///
    /// * `wrapped` - Slot holding the wrapped key
    /// * `dest` - Red slot receiving the key
    /// * `size` - Key size
    /// * `iv` - Address of the 16-byte IV buffer used to wrap the key
    pub fn kek_unwrap(
        &mut self,
        wrapped: KeySource,
        dest: KeySource,
        size: AesKeySize,
        iv: AxiAddr,
    ) -> PmcResult<()> {
        if let Err(e) = self.expect_idle() {
            // Unwrapping always ends with the core in reset, even when refused.
            self.regs.set_soft_reset(true);
            return Err(self.abort(e));
        }
        self.vault
            .kek_unwrap(&mut self.regs, &mut self.dma, wrapped, dest, size, iv)
    }

    /// Clear a key slot or group
    pub fn zeroize(&mut self, target: KeyClearTarget) -> PmcResult<()> {
        if self.state == AesState::Uninitialized {
            Err(PmcError::DRIVER_AES_STATE_MISMATCH)?;
        }
        self.vault.zeroize(&mut self.regs, target)
    }

    pub fn is_key_zeroed(&self, source: KeySource) -> bool {
        self.vault.is_zeroed(&self.regs, source)
    }

    /// Enable or disable DPA counter-measures
    pub fn set_dpa_cm(&mut self, enable: bool) -> PmcResult<()> {
        self.expect_idle()?;
        if enable && !self.cfg.dpa_cm_supported {
            Err(PmcError::DRIVER_AES_DPA_CM_NOT_SUPPORTED)?;
        }

        self.regs.set_cm_enable(enable);
        if self.regs.status().contains(AesStatus::CM_ENABLED) != enable {
            Err(PmcError::DRIVER_AES_DPA_CM_NOT_SUPPORTED)?;
        }
        Ok(())
    }

    pub fn is_dpa_cm_enabled(&self) -> bool {
        self.regs.status().contains(AesStatus::CM_ENABLED)
    }

    /// Let decryptions roll the next block key and IV into KUP and the IV registers
    pub fn set_key_rolling(&mut self, enable: bool) -> PmcResult<()> {
        self.expect_idle()?;
        let mut ctrl = KupWrCtrl::default();
        ctrl.set_key_write(enable);
        ctrl.set_iv_write(enable);
        self.regs.set_kup_write(ctrl);
        Ok(())
    }

    /// Length in bytes of the next rolled block, 0 when the chain is done
    pub fn next_blk_len(&self) -> u32 {
        self.regs.iv_word(3).swap_bytes().saturating_mul(4)
    }

    /// Start an encrypt or decrypt operation
    ///
    /// # Arguments
    ///
    /// * `op` - Encrypt or decrypt
    /// * `key_source` - Key slot to use
    /// * `key_size` - Key size
    /// * `iv` - Address of a 16-byte buffer holding the 12-byte IV
    pub fn init(
        &mut self,
        op: AesOperation,
        key_source: KeySource,
        key_size: AesKeySize,
        iv: AxiAddr,
    ) -> PmcResult<()> {
        self.expect_idle().map_err(|e| self.abort(e))?;

        match self.init_inner(op, key_source, key_size, iv) {
            Ok(()) => {
                self.active = Some(ActiveOperation {
                    op,
                    key_source,
                    key_size,
                });
                self.state = AesState::OperationInitialized;
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn init_inner(
        &mut self,
        op: AesOperation,
        key_source: KeySource,
        key_size: AesKeySize,
        iv: AxiAddr,
    ) -> PmcResult<()> {
        let entry = self.vault.entry(key_source)?;
        if entry.device_key {
            Err(PmcError::DRIVER_AES_DEVICE_KEY_NOT_ALLOWED)?;
        }
        let allowed = match op {
            AesOperation::Encrypt => entry.encrypt_allowed,
            AesOperation::Decrypt => entry.decrypt_allowed,
        };
        if !allowed || iv.is_null() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }
        if key_source == KeySource::Puf && self.is_key_zeroed(KeySource::Puf) {
            Err(PmcError::DRIVER_AES_ZERO_PUF_KEY_NOT_ALLOWED)?;
        }

        self.regs.set_soft_reset(false);
        self.regs.set_direction(op.into());
        self.vault.load(&mut self.regs, key_source, key_size)?;

        self.regs.start_message();
        self.dma
            .transfer(&DmaTransfer::to_engine(iv, IV_WORDS, DmaFlags::BYTE_SWAP))
    }

    /// Authenticate a chunk of AAD
    ///
    /// # Arguments
    ///
    /// * `aad` - Address of the AAD
    /// * `len` - AAD length in bytes
    /// * `gmac` - This is the last AAD chunk of a tag-only operation; no data follows
    pub fn update_aad(&mut self, aad: AxiAddr, len: u32, gmac: bool) -> PmcResult<()> {
        if self.state != AesState::OperationInitialized {
            return Err(self.abort(PmcError::DRIVER_AES_STATE_MISMATCH));
        }

        self.regs.set_aad_enable(true);
        let result = self.update_aad_inner(aad, len, gmac);
        self.regs.set_aad_enable(false);

        match result {
            Ok(()) => {
                if gmac {
                    self.state = AesState::UpdateDone;
                }
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn update_aad_inner(&mut self, aad: AxiAddr, len: u32, gmac: bool) -> PmcResult<()> {
        if len == 0 || aad.is_null() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }
        if self.cfg.aad_granularity == AadGranularity::Block16 && len % AES_BLOCK_SIZE_BYTES != 0
        {
            Err(PmcError::DRIVER_AES_UNALIGNED_SIZE)?;
        }

        let mut flags = DmaFlags::BYTE_SWAP;
        if gmac {
            flags |= DmaFlags::LAST_CHUNK;
        }
        self.dma
            .transfer(&DmaTransfer::bytes_to_engine(aad, len, flags))?;

        if gmac {
            self.wait_done()?;
            if self.active_op()? == AesOperation::Encrypt {
                self.capture_tag()?;
            }
        }
        Ok(())
    }

    /// Encrypt or decrypt a chunk of data
    ///
    /// # Arguments
    ///
    /// * `input` - Address of the input
    /// * `output` - Memory address or keyhole receiving the output
    /// * `len` - Length in bytes; a multiple of 16, or of 4 for the last chunk
    /// * `is_last` - Last chunk of the message
    pub fn update(
        &mut self,
        input: AxiAddr,
        output: UpdateTarget,
        len: u32,
        is_last: bool,
    ) -> PmcResult<()> {
        if !matches!(
            self.state,
            AesState::OperationInitialized | AesState::UpdateInProgress
        ) {
            return Err(self.abort(PmcError::DRIVER_AES_STATE_MISMATCH));
        }

        match self.update_inner(input, output, len, is_last) {
            Ok(()) => {
                self.state = if is_last {
                    AesState::UpdateDone
                } else {
                    AesState::UpdateInProgress
                };
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    fn update_inner(
        &mut self,
        input: AxiAddr,
        output: UpdateTarget,
        len: u32,
        is_last: bool,
    ) -> PmcResult<()> {
        if len == 0 || input.is_null() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }
        let granule = if is_last { 4 } else { AES_BLOCK_SIZE_BYTES };
        if len % granule != 0 {
            Err(PmcError::DRIVER_AES_UNALIGNED_SIZE)?;
        }

        let last = if is_last {
            DmaFlags::LAST_CHUNK
        } else {
            DmaFlags::empty()
        };

        match output {
            UpdateTarget::Memory(dst) => {
                if dst.is_null() {
                    Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
                }
                self.dma.transfer(&DmaTransfer::through_engine(
                    input,
                    dst,
                    len / 4,
                    DmaFlags::BYTE_SWAP | last,
                ))?;
            }
            UpdateTarget::Keyhole(keyhole) => {
                let mut chunks = keyhole.chunks(input, len);
                while let Some(chunk) = chunks.next() {
                    let mut flags = DmaFlags::BYTE_SWAP;
                    if chunks.remaining() == 0 {
                        flags |= last;
                    }
                    self.dma.transfer(&DmaTransfer::through_engine(
                        chunk.src,
                        chunk.dst,
                        chunk.len / 4,
                        flags,
                    ))?;
                }
                keyhole.commit(&chunks);
            }
        }

        if is_last {
            self.wait_done()?;
            if self.active_op()? == AesOperation::Encrypt {
                self.capture_tag()?;
            }
        }
        Ok(())
    }

    /// Finish the operation: write the tag (encrypt) or verify it (decrypt)
    ///
    /// # Arguments
    ///
    /// * `tag` - Address of the 16-byte tag
    pub fn finalize(&mut self, tag: AxiAddr) -> PmcResult<()> {
        if self.state != AesState::UpdateDone {
            return Err(self.abort(PmcError::DRIVER_AES_STATE_MISMATCH));
        }

        let op = self.active_op();
        let result = match op {
            Ok(AesOperation::Encrypt) => self.encrypt_final(tag),
            Ok(AesOperation::Decrypt) => self.decrypt_final(tag),
            Err(e) => Err(e),
        };

        // A rolled key for the next block survives a successful decrypt.
        let chained = result.is_ok() && op == Ok(AesOperation::Decrypt) && self.next_blk_len() != 0;
        let cleanup = if chained {
            Ok(())
        } else {
            self.release_session()
        };

        self.tag.zeroize();
        self.active = None;
        self.state = AesState::Initialized;

        if let Err(e) = result {
            cprintln!("[aes] final failed 0x{:x}", u32::from(e));
            return Err(e);
        }
        cleanup
    }

    fn encrypt_final(&mut self, tag: AxiAddr) -> PmcResult<()> {
        if tag.is_null() || !tag.is_word_aligned() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }
        for (i, word) in self.tag.iter().enumerate() {
            self.dma.write_word(tag + (i as u32) * 4, *word);
        }
        Ok(())
    }

    fn decrypt_final(&mut self, tag: AxiAddr) -> PmcResult<()> {
        if tag.is_null() {
            Err(PmcError::DRIVER_AES_INVALID_PARAM)?;
        }
        self.dma.transfer(&DmaTransfer::to_engine(
            tag,
            AES_TAG_SIZE_WORDS as u32,
            DmaFlags::BYTE_SWAP | DmaFlags::LAST_CHUNK,
        ))?;
        self.wait_done()?;

        let first = self.regs.status().contains(AesStatus::GCM_TAG_PASS);
        let second = self.regs.status().contains(AesStatus::GCM_TAG_PASS);
        if !(first && second) {
            Err(PmcError::DRIVER_AES_GCM_TAG_MISMATCH)?;
        }
        Ok(())
    }

    /// Encrypt a whole message with no AAD
    #[allow(clippy::too_many_arguments)]
    pub fn encrypt_data(
        &mut self,
        key_source: KeySource,
        key_size: AesKeySize,
        iv: AxiAddr,
        input: AxiAddr,
        output: AxiAddr,
        len: u32,
        tag: AxiAddr,
    ) -> PmcResult<()> {
        self.init(AesOperation::Encrypt, key_source, key_size, iv)?;
        self.update(input, UpdateTarget::Memory(output), len, true)?;
        self.finalize(tag)
    }

    /// Decrypt and authenticate a whole message with no AAD
    #[allow(clippy::too_many_arguments)]
    pub fn decrypt_data(
        &mut self,
        key_source: KeySource,
        key_size: AesKeySize,
        iv: AxiAddr,
        input: AxiAddr,
        output: AxiAddr,
        len: u32,
        tag: AxiAddr,
    ) -> PmcResult<()> {
        self.init(AesOperation::Decrypt, key_source, key_size, iv)?;
        self.update(input, UpdateTarget::Memory(output), len, true)?;
        self.finalize(tag)
    }

    fn active_op(&self) -> PmcResult<AesOperation> {
        self.active
            .map(|a| a.op)
            .ok_or(PmcError::DRIVER_AES_STATE_MISMATCH)
    }

    fn wait_done(&self) -> PmcResult<()> {
        self.regs
            .wait_status(AesStatus::DONE, self.cfg.poll_budget)
            .map_err(|_| PmcError::DRIVER_AES_TIMEOUT)
    }

    /// Drain the freshly produced tag into the private buffer
    fn capture_tag(&mut self) -> PmcResult<()> {
        self.dma.drain_engine(&mut self.tag, DmaFlags::BYTE_SWAP)?;
        self.wait_done()
    }

    /// Clear KUP and the expanded key, then hold the core in reset
    fn release_session(&mut self) -> PmcResult<()> {
        let result = self.vault.zeroize(&mut self.regs, KeyClearTarget::Session);
        self.regs.set_soft_reset(true);
        if let Err(e) = result {
            cprintln!("[aes] session zeroize failed 0x{:x}", u32::from(e));
        }
        result
    }

    /// Tear down the open operation after `err` and return `err`
    fn abort(&mut self, err: PmcError) -> PmcError {
        if self.state == AesState::Uninitialized {
            return err;
        }

        if let Some(active) = self.active {
            cprintln!(
                "[aes] abort op {} key {} size {} err 0x{:x}",
                active.op as u32,
                active.key_source as u32,
                active.key_size as u32,
                u32::from(err)
            );
        } else {
            cprintln!("[aes] abort err 0x{:x}", u32::from(err));
        }

        self.regs.set_aad_enable(false);
        let _ = self.release_session();
        self.tag.zeroize();
        self.active = None;
        self.state = AesState::Initialized;
        err
    }
}
