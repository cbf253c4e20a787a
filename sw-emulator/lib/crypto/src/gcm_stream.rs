/*++

Licensed under the Apache-2.0 license.

File Name:

    gcm_stream.rs

Abstract:

    File contains a streaming AES-GCM model: counter-mode output is produced
    as data arrives and the tag is computed once the message is complete.

--*/

use crate::{AesGcm, AES_BLOCK_SIZE, AES_GCM_IV_SIZE, AES_GCM_TAG_SIZE};
use aes::{Aes128, Aes256};
use cipher::{KeyIvInit, StreamCipher};

type Ctr128 = ctr::Ctr32BE<Aes128>;
type Ctr256 = ctr::Ctr32BE<Aes256>;

enum Keystream {
    Aes128(Ctr128),
    Aes256(Ctr256),
}

pub struct GcmStream {
    key: Vec<u8>,
    iv: [u8; AES_GCM_IV_SIZE],
    encrypt: bool,
    keystream: Keystream,
    aad: Vec<u8>,
    plaintext: Vec<u8>,
}

impl GcmStream {
    /// Start a message. `key` must be 16 or 32 bytes.
    pub fn new(key: &[u8], iv: &[u8; AES_GCM_IV_SIZE], encrypt: bool) -> Option<Self> {
        // The first counter block after J0 = IV || 1.
        let mut counter = [0u8; AES_BLOCK_SIZE];
        counter[..AES_GCM_IV_SIZE].copy_from_slice(iv);
        counter[AES_BLOCK_SIZE - 1] = 2;

        let keystream = match key.len() {
            16 => Keystream::Aes128(Ctr128::new_from_slices(key, &counter).ok()?),
            32 => Keystream::Aes256(Ctr256::new_from_slices(key, &counter).ok()?),
            _ => return None,
        };
        Some(Self {
            key: key.to_vec(),
            iv: *iv,
            encrypt,
            keystream,
            aad: Vec::new(),
            plaintext: Vec::new(),
        })
    }

    pub fn update_aad(&mut self, aad: &[u8]) {
        self.aad.extend_from_slice(aad);
    }

    /// Encrypt or decrypt the next piece of the message
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        let mut output = input.to_vec();
        match &mut self.keystream {
            Keystream::Aes128(c) => c.apply_keystream(&mut output),
            Keystream::Aes256(c) => c.apply_keystream(&mut output),
        }
        if self.encrypt {
            self.plaintext.extend_from_slice(input);
        } else {
            self.plaintext.extend_from_slice(&output);
        }
        output
    }

    /// Plaintext seen so far
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Tag over the AAD and ciphertext seen so far
    pub fn tag(&self) -> [u8; AES_GCM_TAG_SIZE] {
        AesGcm::encrypt(&self.key, &self.iv, &self.aad, &self.plaintext)
            .map(|(_, tag)| tag)
            .unwrap_or_default()
    }
}
