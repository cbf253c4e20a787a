/*++

Licensed under the Apache-2.0 license.

File Name:

    aes_dpa_cm_kat.rs

Abstract:

    File contains the Known Answer Test (KAT) for AES-GCM decryption with DPA
    counter-measures enabled.

--*/

use crate::aes256gcm_kat::{
    read_bytes, write_bytes, AAD, AAD_OFFSET, CT, INPUT_OFFSET, IV, IV_OFFSET, KAT_KEY, KEY,
    OUTPUT_OFFSET, PT, TAG, TAG_OFFSET,
};
use pmc_drivers::cprintln;
use pmc_drivers::{
    Aes, AesKeySize, AesOperation, AxiAddr, DmaAdapter, KeyClearTarget, Mmio, PmcError,
    PmcResult, UpdateTarget,
};

#[derive(Default, Debug)]
pub struct AesDpaCmKat {}

impl AesDpaCmKat {
    /// This function executes the AES-GCM decryption KAT with DPA
    /// counter-measures turned on, then restores the previous counter-measure
    /// setting and clears the KAT key.
    ///
    /// # Arguments
    ///
    /// * `aes` - AES driver
    /// * `scratch` - Word aligned scratch buffer of [`crate::KAT_SCRATCH_SIZE`] bytes
    ///
    /// # Returns
    ///
    /// * `PmcResult` - Result denoting the KAT outcome.
    pub fn execute<M: Mmio, D: DmaAdapter>(
        &self,
        aes: &mut Aes<M, D>,
        scratch: AxiAddr,
    ) -> PmcResult<()> {
        let was_enabled = aes.is_dpa_cm_enabled();
        let result = aes
            .set_dpa_cm(true)
            .and_then(|_| self.decrypt(aes, scratch));
        let restored = aes.set_dpa_cm(was_enabled);
        let cleared = aes.zeroize(KeyClearTarget::Source(KAT_KEY));
        result.and(restored).and(cleared)
    }

    fn decrypt<M: Mmio, D: DmaAdapter>(
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
        write_bytes(aes.dma(), input, &CT);
        write_bytes(aes.dma(), tag, &TAG);
        aes.write_key(KAT_KEY, AesKeySize::Aes256, &KEY)?;

        aes.init(AesOperation::Decrypt, KAT_KEY, AesKeySize::Aes256, iv)?;
        aes.update_aad(aad, AAD.len() as u32, false)?;
        aes.update(input, UpdateTarget::Memory(output), CT.len() as u32, true)?;
        aes.finalize(tag)?;

        let mut plaintext = [0u8; 32];
        read_bytes(aes.dma(), output, &mut plaintext);
        if plaintext != PT {
            cprintln!("[kat] AES-GCM plaintext differs with DPA CM on");
            Err(PmcError::KAT_AES_DPA_CM_MISMATCH)?;
        }
        Ok(())
    }
}
