/*++

Licensed under the Apache-2.0 license.

File Name:

    aes.rs

Abstract:

    File contains the behavioural model of the PMC AES-GCM engine: register
    file, key store, streaming GCM core and output FIFO.

--*/

use pmc_emu_crypto::{GcmStream, AES_GCM_IV_SIZE, AES_GCM_TAG_SIZE};
use pmc_registers::{offsets, AesDirection, AesKeySize, KeyClearMask, KeySelect, KupWrCtrl};
use std::cell::Cell;
use std::collections::VecDeque;
use tock_registers::{register_bitfields, LocalRegisterCopy};
use zeroize::{Zeroize, Zeroizing};

register_bitfields! [
    u32,

    /// Status Register Fields
    Status [
        DONE OFFSET(0) NUMBITS(1) [],
        GCM_TAG_PASS OFFSET(3) NUMBITS(1) [],
        KEY_INIT_DONE OFFSET(4) NUMBITS(1) [],
        BLK_KEY_DEC_DONE OFFSET(5) NUMBITS(1) [],
        CM_ENABLED OFFSET(12) NUMBITS(1) [],
    ],
];

/// Bytes the engine consumes before the stream: 12-byte IV plus a pad word
const IV_BLOCK_SIZE: usize = 16;

/// Trailing plaintext captured by key rolling: key, IV, next length
const ROLLED_TAIL_SIZE: usize = 48;
const ROLLED_KEY_SIZE: usize = 32;

const USER_KEY_COUNT: usize = 8;
const USER_KEY_END: u32 = offsets::USER_KEY_0_0 + USER_KEY_COUNT as u32 * offsets::USER_KEY_STRIDE;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum StoredKey {
    Bbram = 0,
    BbramRed,
    Bh,
    BhRed,
    Efuse,
    EfuseRed,
    Kup,
    Puf,
}

const STORED_KEY_COUNT: usize = 8;

const STORED_KEYS: [StoredKey; STORED_KEY_COUNT] = [
    StoredKey::Bbram,
    StoredKey::BbramRed,
    StoredKey::Bh,
    StoredKey::BhRed,
    StoredKey::Efuse,
    StoredKey::EfuseRed,
    StoredKey::Kup,
    StoredKey::Puf,
];

impl StoredKey {
    /// Bbram has no individual clear bit
    fn clear_mask(self) -> KeyClearMask {
        match self {
            Self::Bbram => KeyClearMask::empty(),
            Self::BbramRed => KeyClearMask::BBRAM_RED,
            Self::Bh => KeyClearMask::BH,
            Self::BhRed => KeyClearMask::BH_RED,
            Self::Efuse => KeyClearMask::EFUSE,
            Self::EfuseRed => KeyClearMask::EFUSE_RED,
            Self::Kup => KeyClearMask::KUP,
            Self::Puf => KeyClearMask::PUF,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Slot {
    User(usize),
    Stored(StoredKey),
}

impl Slot {
    fn from_select(sel: KeySelect) -> Option<Self> {
        let user_0 = KeySelect::USER_0.0;
        if (user_0..user_0 + USER_KEY_COUNT as u32).contains(&sel.0) {
            return Some(Self::User((sel.0 - user_0) as usize));
        }
        let stored = match sel {
            KeySelect::BBRAM => StoredKey::Bbram,
            KeySelect::BBRAM_RED => StoredKey::BbramRed,
            KeySelect::BH => StoredKey::Bh,
            KeySelect::BH_RED => StoredKey::BhRed,
            KeySelect::EFUSE => StoredKey::Efuse,
            KeySelect::EFUSE_RED => StoredKey::EfuseRed,
            KeySelect::KUP => StoredKey::Kup,
            KeySelect::PUF => StoredKey::Puf,
            _ => return None,
        };
        Some(Self::Stored(stored))
    }

    fn clear_mask(self) -> KeyClearMask {
        match self {
            Self::User(n) => KeyClearMask::user(n as u8),
            Self::Stored(key) => key.clear_mask(),
        }
    }
}

/// Faults the tests can inject into the engine
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineFaults {
    /// KEY_CLEAR writes are ignored
    pub stuck_key_clear: bool,

    /// KEY_LOAD never reports KEY_INIT_DONE
    pub stuck_key_init: bool,

    /// KEY_DEC_TRIG never reports BLK_KEY_DEC_DONE
    pub stuck_key_decrypt: bool,

    /// DPA counter-measures are fused off
    pub cm_fused_off: bool,

    /// With counter-measures on, data output keeps its mask applied
    pub cm_output_masked: bool,

    /// GCM_TAG_PASS stays visible for only this many status reads after a tag check
    pub tag_pass_reads: Option<u32>,
}

enum Phase {
    Iv(Vec<u8>),
    Stream { stream: GcmStream, fed: bool },
    Tag { stream: GcmStream, tag: Vec<u8> },
    Done,
}

/// AES-GCM engine model
pub struct AesEngine {
    status: LocalRegisterCopy<u32, Status::Register>,
    soft_reset: bool,
    key_sel: u32,
    key_size: u32,
    mode: u32,
    aad_en: bool,
    kup_wr: u32,
    key_dec: bool,
    key_dec_sel: u32,
    key_clear: u32,
    cm_en: bool,
    iv_regs: [u32; 4],
    user_keys: [[u32; offsets::KEY_REG_WORDS as usize]; USER_KEY_COUNT],
    stored: [Option<Zeroizing<Vec<u8>>>; STORED_KEY_COUNT],
    zeroed: u32,
    expanded: Option<Zeroizing<Vec<u8>>>,
    phase: Option<Phase>,
    msg_iv: Option<[u8; AES_GCM_IV_SIZE]>,
    msg_encrypt: bool,
    output: VecDeque<u8>,
    faults: EngineFaults,
    tag_pass_reads: Cell<Option<u32>>,
    protocol_errors: u32,
}

impl Default for AesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AesEngine {
    /// Create an engine out of reset with an empty key store
    pub fn new() -> Self {
        Self {
            status: LocalRegisterCopy::new(0),
            soft_reset: false,
            key_sel: 0,
            key_size: 0,
            mode: 0,
            aad_en: false,
            kup_wr: 0,
            key_dec: false,
            key_dec_sel: 0,
            key_clear: 0,
            cm_en: false,
            iv_regs: [0; 4],
            user_keys: [[0; offsets::KEY_REG_WORDS as usize]; USER_KEY_COUNT],
            stored: Default::default(),
            zeroed: 0,
            expanded: None,
            phase: None,
            msg_iv: None,
            msg_encrypt: false,
            output: VecDeque::new(),
            faults: EngineFaults::default(),
            tag_pass_reads: Cell::new(None),
            protocol_errors: 0,
        }
    }

    pub fn faults(&self) -> &EngineFaults {
        &self.faults
    }

    pub fn faults_mut(&mut self) -> &mut EngineFaults {
        &mut self.faults
    }

    /// Number of inputs the engine rejected (no message open, core in reset, bad key select)
    pub fn protocol_errors(&self) -> u32 {
        self.protocol_errors
    }

    pub fn in_soft_reset(&self) -> bool {
        self.soft_reset
    }

    /// Whether an expanded key is currently held
    pub fn key_loaded(&self) -> bool {
        self.expanded.is_some()
    }

    /// Bytes waiting in the output FIFO
    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// Place `key` into the slot routed by `sel`, as fuses or boot code would
    pub fn provision(&mut self, sel: KeySelect, key: &[u8]) {
        let Some(slot) = Slot::from_select(sel) else {
            self.protocol_errors += 1;
            return;
        };
        match slot {
            Slot::User(n) => {
                let words = key.len() / 4;
                for (i, bytes) in key.chunks_exact(4).enumerate() {
                    self.user_keys[n][words - 1 - i] =
                        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
            }
            Slot::Stored(stored) => {
                self.stored[stored as usize] = Some(Zeroizing::new(key.to_vec()));
            }
        }
        self.zeroed &= !slot.clear_mask().bits();
    }

    /// Key bytes held in the slot routed by `sel`, at the current key size
    pub fn slot_key(&self, sel: KeySelect) -> Option<Vec<u8>> {
        Slot::from_select(sel).map(|slot| self.key_bytes(slot).to_vec())
    }

    /// Wipe the PUF key the way a failed PUF regeneration would
    pub fn zero_puf(&mut self) {
        self.stored[StoredKey::Puf as usize] = None;
        self.zeroed |= KeyClearMask::PUF.bits();
    }

    pub fn read(&self, offset: u32) -> u32 {
        match offset {
            offsets::STATUS => self.read_status(),
            offsets::KEY_SEL => self.key_sel,
            offsets::SOFT_RST => self.soft_reset as u32,
            offsets::KEY_CLEAR => self.key_clear,
            offsets::MODE => self.mode,
            offsets::KUP_WR => self.kup_wr,
            offsets::IV_0 | offsets::IV_1 | offsets::IV_2 | offsets::IV_3 => {
                self.iv_regs[((offset - offsets::IV_0) / 4) as usize]
            }
            offsets::KEY_ZEROED_STATUS => self.zeroed_status().bits(),
            offsets::KEY_SIZE => self.key_size,
            offsets::KEY_DEC => self.key_dec as u32,
            offsets::KEY_DEC_SEL => self.key_dec_sel,
            offsets::AAD => self.aad_en as u32,
            offsets::CM_EN => self.cm_en as u32,
            // Key registers are write only.
            _ => 0,
        }
    }

    pub fn write(&mut self, offset: u32, val: u32) {
        match offset {
            offsets::KEY_SEL => self.key_sel = val,
            offsets::KEY_LOAD if val & 1 != 0 => self.load_key(),
            offsets::START_MSG if val & 1 != 0 => self.start_message(),
            offsets::SOFT_RST => self.set_soft_reset(val & 1 != 0),
            offsets::KEY_CLEAR => self.clear_keys(val),
            offsets::MODE => self.mode = val,
            offsets::KUP_WR => self.kup_wr = val,
            offsets::KEY_SIZE => self.key_size = val,
            offsets::KEY_DEC => self.key_dec = val & 1 != 0,
            offsets::KEY_DEC_SEL => self.key_dec_sel = val,
            offsets::KEY_DEC_TRIG if val & 1 != 0 => self.decrypt_black_key(),
            offsets::AAD => self.aad_en = val & 1 != 0,
            offsets::CM_EN => self.set_cm(val & 1 != 0),
            _ if (offsets::USER_KEY_0_0..USER_KEY_END).contains(&offset) => {
                let rel = offset - offsets::USER_KEY_0_0;
                let n = (rel / offsets::USER_KEY_STRIDE) as usize;
                let idx = ((rel % offsets::USER_KEY_STRIDE) / 4) as usize;
                self.user_keys[n][idx] = val;
                self.zeroed &= !KeyClearMask::user(n as u8).bits();
            }
            _ => {}
        }
    }

    fn read_status(&self) -> u32 {
        let mut status = self.status;
        if status.is_set(Status::GCM_TAG_PASS) {
            if let Some(left) = self.tag_pass_reads.get() {
                if left == 0 {
                    status.modify(Status::GCM_TAG_PASS::CLEAR);
                } else {
                    self.tag_pass_reads.set(Some(left - 1));
                }
            }
        }
        status.get()
    }

    fn zeroed_status(&self) -> KeyClearMask {
        let mut zeroed = KeyClearMask::from_bits_truncate(self.zeroed);
        zeroed.set(KeyClearMask::EXPANDED, self.expanded.is_none());
        zeroed
    }

    fn key_len(&self) -> usize {
        if self.key_size == AesKeySize::Aes256 as u32 {
            AesKeySize::Aes256.bytes()
        } else {
            AesKeySize::Aes128.bytes()
        }
    }

    fn key_bytes(&self, slot: Slot) -> Zeroizing<Vec<u8>> {
        let len = self.key_len();
        let mut key = Zeroizing::new(vec![0u8; len]);
        match slot {
            Slot::User(n) => {
                // The highest register holds the first key word.
                let words = len / 4;
                for idx in 0..words {
                    let pos = (words - 1 - idx) * 4;
                    key[pos..pos + 4].copy_from_slice(&self.user_keys[n][idx].to_be_bytes());
                }
            }
            Slot::Stored(stored) => {
                if let Some(bytes) = &self.stored[stored as usize] {
                    let n = bytes.len().min(len);
                    key[..n].copy_from_slice(&bytes[..n]);
                }
            }
        }
        key
    }

    fn set_soft_reset(&mut self, asserted: bool) {
        self.soft_reset = asserted;
        if !asserted {
            return;
        }

        let cm_enabled = self.status.is_set(Status::CM_ENABLED);
        self.status.set(0);
        if cm_enabled {
            self.status.modify(Status::CM_ENABLED::SET);
        }
        self.phase = None;
        self.msg_iv = None;
        self.output.clear();
        self.expanded = None;
        self.iv_regs.zeroize();
        self.tag_pass_reads.set(None);
    }

    fn load_key(&mut self) {
        self.status.modify(Status::KEY_INIT_DONE::CLEAR);
        if self.soft_reset || self.faults.stuck_key_init {
            return;
        }
        let Some(slot) = Slot::from_select(KeySelect(self.key_sel)) else {
            self.protocol_errors += 1;
            return;
        };
        self.expanded = Some(self.key_bytes(slot));
        self.status.modify(Status::KEY_INIT_DONE::SET);
    }

    fn start_message(&mut self) {
        if self.soft_reset {
            self.protocol_errors += 1;
            return;
        }
        self.status
            .modify(Status::DONE::CLEAR + Status::GCM_TAG_PASS::CLEAR);
        self.tag_pass_reads.set(None);
        self.output.clear();
        self.msg_iv = None;
        self.msg_encrypt = self.mode == AesDirection::Encrypt as u32;
        self.phase = Some(Phase::Iv(Vec::with_capacity(IV_BLOCK_SIZE)));
    }

    fn clear_keys(&mut self, val: u32) {
        self.key_clear = val;
        if self.soft_reset || self.faults.stuck_key_clear {
            return;
        }

        let mask = KeyClearMask::from_bits_truncate(val);
        for (n, key) in self.user_keys.iter_mut().enumerate() {
            if mask.contains(KeyClearMask::user(n as u8)) {
                key.zeroize();
            }
        }
        for stored in STORED_KEYS {
            let bit = stored.clear_mask();
            if !bit.is_empty() && mask.contains(bit) {
                self.stored[stored as usize] = None;
            }
        }
        if mask.contains(KeyClearMask::EXPANDED) {
            self.expanded = None;
        }
        self.zeroed |= (mask - KeyClearMask::EXPANDED).bits();
    }

    fn set_cm(&mut self, enable: bool) {
        self.cm_en = enable;
        if enable && !self.faults.cm_fused_off {
            self.status.modify(Status::CM_ENABLED::SET);
        } else {
            self.status.modify(Status::CM_ENABLED::CLEAR);
        }
    }

    fn decrypt_black_key(&mut self) {
        self.status.modify(Status::BLK_KEY_DEC_DONE::CLEAR);
        if !self.key_dec || self.soft_reset || self.faults.stuck_key_decrypt {
            return;
        }

        let dest = match self.key_dec_sel {
            0 => StoredKey::BbramRed,
            1 => StoredKey::BhRed,
            2 => StoredKey::EfuseRed,
            _ => {
                self.protocol_errors += 1;
                return;
            }
        };
        let (Some(kek), Some(iv), Some(Slot::Stored(src))) = (
            &self.expanded,
            self.msg_iv,
            Slot::from_select(KeySelect(self.key_sel)),
        ) else {
            self.protocol_errors += 1;
            return;
        };
        let Some(mut stream) = GcmStream::new(&kek[..], &iv, false) else {
            self.protocol_errors += 1;
            return;
        };

        let black = self.key_bytes(Slot::Stored(src));
        let red = Zeroizing::new(stream.update(&black));
        self.stored[dest as usize] = Some(red);
        self.zeroed &= !dest.clear_mask().bits();
        self.status.modify(Status::BLK_KEY_DEC_DONE::SET);
    }

    /// Feed `data` into the stream port; `last` closes the current phase
    pub(crate) fn push_input(&mut self, mut data: &[u8], last: bool) {
        if self.soft_reset {
            self.protocol_errors += 1;
            return;
        }
        let Some(mut phase) = self.phase.take() else {
            self.protocol_errors += 1;
            return;
        };
        self.status.modify(Status::DONE::CLEAR);

        if let Phase::Iv(buf) = &mut phase {
            let take = (IV_BLOCK_SIZE - buf.len()).min(data.len());
            buf.extend_from_slice(&data[..take]);
            data = &data[take..];

            if buf.len() == IV_BLOCK_SIZE {
                let mut iv = [0u8; AES_GCM_IV_SIZE];
                iv.copy_from_slice(&buf[..AES_GCM_IV_SIZE]);
                match self.begin_stream(iv) {
                    Some(stream) => phase = Phase::Stream { stream, fed: false },
                    None => {
                        self.protocol_errors += 1;
                        return;
                    }
                }
            }
        }

        let next = match phase {
            Phase::Iv(buf) => {
                if last {
                    self.protocol_errors += 1;
                }
                Phase::Iv(buf)
            }
            Phase::Stream { mut stream, mut fed } => {
                if !data.is_empty() {
                    if self.aad_en {
                        stream.update_aad(data);
                    } else {
                        let mut out = stream.update(data);
                        if self.faults.cm_output_masked && self.status.is_set(Status::CM_ENABLED) {
                            out.iter_mut().for_each(|b| *b ^= 0x5a);
                        }
                        self.output.extend(out);
                    }
                    fed = true;
                }
                if !last {
                    Phase::Stream { stream, fed }
                } else if !fed {
                    // IV only; the key decryption path uses it.
                    self.status.modify(Status::DONE::SET);
                    Phase::Done
                } else if self.msg_encrypt {
                    self.output.extend(stream.tag());
                    self.status.modify(Status::DONE::SET);
                    Phase::Done
                } else {
                    self.status.modify(Status::DONE::SET);
                    Phase::Tag {
                        stream,
                        tag: Vec::with_capacity(AES_GCM_TAG_SIZE),
                    }
                }
            }
            Phase::Tag { stream, mut tag } => {
                tag.extend_from_slice(data);
                if last {
                    self.check_tag(&stream, &tag);
                    self.status.modify(Status::DONE::SET);
                    Phase::Done
                } else {
                    Phase::Tag { stream, tag }
                }
            }
            Phase::Done => {
                self.protocol_errors += 1;
                Phase::Done
            }
        };
        self.phase = Some(next);
    }

    fn begin_stream(&mut self, iv: [u8; AES_GCM_IV_SIZE]) -> Option<GcmStream> {
        let key = self.expanded.as_ref()?;
        let stream = GcmStream::new(&key[..], &iv, self.msg_encrypt)?;

        for (reg, bytes) in self.iv_regs.iter_mut().zip(iv.chunks_exact(4)) {
            *reg = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        self.iv_regs[3] = 0;
        self.msg_iv = Some(iv);
        Some(stream)
    }

    fn check_tag(&mut self, stream: &GcmStream, received: &[u8]) {
        if received[..] != stream.tag()[..] {
            return;
        }
        self.status.modify(Status::GCM_TAG_PASS::SET);
        self.tag_pass_reads.set(self.faults.tag_pass_reads);
        self.roll_keys(stream.plaintext());
    }

    fn roll_keys(&mut self, plaintext: &[u8]) {
        let ctrl = KupWrCtrl(self.kup_wr);
        if plaintext.len() < ROLLED_TAIL_SIZE {
            return;
        }
        let tail = &plaintext[plaintext.len() - ROLLED_TAIL_SIZE..];

        if ctrl.key_write() {
            let key = Zeroizing::new(tail[..ROLLED_KEY_SIZE].to_vec());
            self.stored[StoredKey::Kup as usize] = Some(key);
            self.zeroed &= !KeyClearMask::KUP.bits();
        }
        if ctrl.iv_write() {
            for (reg, bytes) in self
                .iv_regs
                .iter_mut()
                .zip(tail[ROLLED_KEY_SIZE..].chunks_exact(4))
            {
                *reg = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        }
    }

    /// Take `len` bytes from the output FIFO, if that many are available
    pub(crate) fn pop_output(&mut self, len: usize) -> Option<Vec<u8>> {
        if self.output.len() < len {
            return None;
        }
        Some(self.output.drain(..len).collect())
    }

    /// Drop whatever is left in the output FIFO
    pub(crate) fn discard_output(&mut self) {
        self.output.clear();
    }
}
