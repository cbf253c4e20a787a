/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the PMC Emulator Crypto library.

--*/

mod gcm;
mod gcm_stream;

pub use gcm::AesGcm;
pub use gcm_stream::GcmStream;

pub const AES_BLOCK_SIZE: usize = 16;
pub const AES_GCM_IV_SIZE: usize = 12;
pub const AES_GCM_TAG_SIZE: usize = 16;
