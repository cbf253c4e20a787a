/*++

Licensed under the Apache-2.0 license.

File Name:

    aes256gcm_kat.rs

Abstract:

    File contains the Known Answer Tests (KAT) for AES-256-GCM cryptography operations.

--*/

use pmc_drivers::cprintln;
use pmc_drivers::printer::HexBytes;
use pmc_drivers::{
    Aes, AesKeySize, AesOperation, AxiAddr, DmaAdapter, KeyClearTarget, KeySource, Mmio,
    PmcError, PmcResult, UpdateTarget,
};

// Taken from NIST test vectors: https://csrc.nist.gov/Projects/cryptographic-algorithm-validation-program/cavp-testing-block-cipher-modes#GCMVS

// KEY = f0eaf7b41b42f4500635bc05d9cede11a5363d59a6288870f527bcffeb4d6e04
// IV = 18f316781077a595c72d4c07
// CT = 7a1b61009dce6b7cd4d1ea0203b179f1219dd5ce7407e12ea0a4c56c71bb791b
// AAD = 42cade3a19204b7d4843628c425c2375
// Tag = 4419180b0b963b7289a4fa3f45c535a3
// PT = 400fb5ef32083b3abea957c4f068abad50c8d86bbf9351fa72e7da5171df38f9

pub(crate) const KEY: [u8; 32] = [
    0xf0, 0xea, 0xf7, 0xb4, 0x1b, 0x42, 0xf4, 0x50, 0x06, 0x35, 0xbc, 0x05, 0xd9, 0xce, 0xde, 0x11,
    0xa5, 0x36, 0x3d, 0x59, 0xa6, 0x28, 0x88, 0x70, 0xf5, 0x27, 0xbc, 0xff, 0xeb, 0x4d, 0x6e, 0x04,
];
pub(crate) const IV: [u8; 12] = [
    0x18, 0xf3, 0x16, 0x78, 0x10, 0x77, 0xa5, 0x95, 0xc7, 0x2d, 0x4c, 0x07,
];
pub(crate) const CT: [u8; 32] = [
    0x7a, 0x1b, 0x61, 0x0, 0x9d, 0xce, 0x6b, 0x7c, 0xd4, 0xd1, 0xea, 0x2, 0x3, 0xb1, 0x79, 0xf1,
    0x21, 0x9d, 0xd5, 0xce, 0x74, 0x7, 0xe1, 0x2e, 0xa0, 0xa4, 0xc5, 0x6c, 0x71, 0xbb, 0x79, 0x1b,
];
pub(crate) const AAD: [u8; 16] = [
    0x42, 0xca, 0xde, 0x3a, 0x19, 0x20, 0x4b, 0x7d, 0x48, 0x43, 0x62, 0x8c, 0x42, 0x5c, 0x23, 0x75,
];
pub(crate) const TAG: [u8; 16] = [
    0x44, 0x19, 0x18, 0xb, 0xb, 0x96, 0x3b, 0x72, 0x89, 0xa4, 0xfa, 0x3f, 0x45, 0xc5, 0x35, 0xa3,
];
pub(crate) const PT: [u8; 32] = [
    0x40, 0xf, 0xb5, 0xef, 0x32, 0x8, 0x3b, 0x3a, 0xbe, 0xa9, 0x57, 0xc4, 0xf0, 0x68, 0xab, 0xad,
    0x50, 0xc8, 0xd8, 0x6b, 0xbf, 0x93, 0x51, 0xfa, 0x72, 0xe7, 0xda, 0x51, 0x71, 0xdf, 0x38, 0xf9,
];

pub(crate) const KAT_KEY: KeySource = KeySource::User7;

// Scratch layout
pub(crate) const IV_OFFSET: u32 = 0x00;
pub(crate) const TAG_OFFSET: u32 = 0x10;
pub(crate) const AAD_OFFSET: u32 = 0x20;
pub(crate) const INPUT_OFFSET: u32 = 0x40;
pub(crate) const OUTPUT_OFFSET: u32 = 0x60;

/// Bytes of DMA-visible scratch memory the KAT needs
pub const KAT_SCRATCH_SIZE: u32 = 0x80;

pub(crate) fn write_bytes<D: DmaAdapter>(dma: &mut D, addr: AxiAddr, bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(4).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        dma.write_word(addr + (i as u32) * 4, u32::from_le_bytes(word));
    }
}

pub(crate) fn read_bytes<D: DmaAdapter>(dma: &mut D, addr: AxiAddr, out: &mut [u8]) {
    for (i, chunk) in out.chunks_mut(4).enumerate() {
        let word = dma.read_word(addr + (i as u32) * 4).to_le_bytes();
        chunk.copy_from_slice(&word[..chunk.len()]);
    }
}

#[derive(Default, Debug)]
pub struct Aes256GcmKat {}

impl Aes256GcmKat {
    /// This function executes the Known Answer Tests (aka KAT) for AES-256-GCM.
    ///
    /// Test vector source:
    /// NIST test vectors
    ///
    /// # Arguments
    ///
    /// * `aes` - AES driver
    /// * `scratch` - Word aligned scratch buffer of [`KAT_SCRATCH_SIZE`] bytes
    ///
    /// # Returns
    ///
    /// * `PmcResult` - Result denoting the KAT outcome.
    pub fn execute<M: Mmio, D: DmaAdapter>(
        &self,
        aes: &mut Aes<M, D>,
        scratch: AxiAddr,
    ) -> PmcResult<()> {
        let result = self.encrypt_decrypt(aes, scratch);
        let cleared = aes.zeroize(KeyClearTarget::Source(KAT_KEY));
        result.and(cleared)
    }

    fn encrypt_decrypt<M: Mmio, D: DmaAdapter>(
        &self,
        aes: &mut Aes<M, D>,
        scratch: AxiAddr,
    ) -> PmcResult<()> {
        let iv = scratch + IV_OFFSET;
        let tag = scratch + TAG_OFFSET;
        let aad = scratch + AAD_OFFSET;
        let input = scratch + INPUT_OFFSET;
        let output = scratch + OUTPUT_OFFSET;

        write_bytes(aes.dma(), iv, &IV);
        write_bytes(aes.dma(), iv + 12u32, &[0; 4]);
        write_bytes(aes.dma(), aad, &AAD);
        write_bytes(aes.dma(), input, &PT);
        aes.write_key(KAT_KEY, AesKeySize::Aes256, &KEY)?;

        aes.init(AesOperation::Encrypt, KAT_KEY, AesKeySize::Aes256, iv)?;
        aes.update_aad(aad, AAD.len() as u32, false)?;
        aes.update(input, UpdateTarget::Memory(output), PT.len() as u32, true)?;
        aes.finalize(tag)?;

        let mut ciphertext = [0u8; 32];
        read_bytes(aes.dma(), output, &mut ciphertext);
        if ciphertext != CT {
            Err(PmcError::KAT_AES_CIPHERTEXT_MISMATCH)?;
        }
        let mut computed_tag = [0u8; 16];
        read_bytes(aes.dma(), tag, &mut computed_tag);
        if computed_tag != TAG {
            cprintln!("[kat] AES-GCM tag {}", HexBytes(&computed_tag));
            Err(PmcError::KAT_AES_TAG_MISMATCH)?;
        }

        write_bytes(aes.dma(), input, &CT);
        write_bytes(aes.dma(), tag, &TAG);
        aes.init(AesOperation::Decrypt, KAT_KEY, AesKeySize::Aes256, iv)?;
        aes.update_aad(aad, AAD.len() as u32, false)?;
        aes.update(input, UpdateTarget::Memory(output), CT.len() as u32, true)?;
        aes.finalize(tag)?;

        let mut plaintext = [0u8; 32];
        read_bytes(aes.dma(), output, &mut plaintext);
        if plaintext != PT {
            Err(PmcError::KAT_AES_PLAINTEXT_MISMATCH)?;
        }

        Ok(())
    }
}
