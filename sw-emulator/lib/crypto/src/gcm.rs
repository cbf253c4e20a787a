/*++

Licensed under the Apache-2.0 license.

File Name:

    gcm.rs

Abstract:

    File contains one-shot AES-GCM for 128 and 256-bit keys.

--*/

use crate::{AES_GCM_IV_SIZE, AES_GCM_TAG_SIZE};
use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes128Gcm, Aes256Gcm,
};

pub enum AesGcm {}

impl AesGcm {
    /// One-shot AES-GCM encryption. Returns the ciphertext and tag.
    pub fn encrypt(
        key: &[u8],
        iv: &[u8; AES_GCM_IV_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Option<(Vec<u8>, [u8; AES_GCM_TAG_SIZE])> {
        let nonce = GenericArray::from_slice(&iv[..]);
        let mut buffer = plaintext.to_vec();
        let tag = match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .ok()?
                .encrypt_in_place_detached(nonce, aad, &mut buffer)
                .ok()?,
            32 => Aes256Gcm::new_from_slice(key)
                .ok()?
                .encrypt_in_place_detached(nonce, aad, &mut buffer)
                .ok()?,
            _ => return None,
        };
        Some((buffer, tag.into()))
    }

    /// One-shot AES-GCM decryption. Returns `None` if the tag does not verify.
    pub fn decrypt(
        key: &[u8],
        iv: &[u8; AES_GCM_IV_SIZE],
        aad: &[u8],
        tag: &[u8; AES_GCM_TAG_SIZE],
        ciphertext: &[u8],
    ) -> Option<Vec<u8>> {
        let nonce = GenericArray::from_slice(&iv[..]);
        let tag = GenericArray::from_slice(&tag[..]);
        let mut buffer = ciphertext.to_vec();
        let result = match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .ok()?
                .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
            32 => Aes256Gcm::new_from_slice(key)
                .ok()?
                .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
            _ => return None,
        };
        result.ok().map(|_| buffer)
    }
}
