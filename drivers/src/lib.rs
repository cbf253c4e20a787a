/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the PMC AES-GCM driver library.

--*/

#![no_std]

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        extern crate std;
    }
}

mod aes;
mod dma;
mod key_vault;
mod keyhole;
pub mod printer;

pub use aes::{AadGranularity, Aes, AesConfig, AesOperation, AesState, UpdateTarget};
pub use dma::{
    split_unaligned, transfer_unaligned, unaligned_xfer, AxiAddr, DmaAdapter, DmaFlags, DmaRoute,
    DmaTransfer, SplitTransfer, UnalignedMode, DMA_BURST_WORDS,
};
pub use key_vault::{KeyClearTarget, KeySource, KeySourceEntry, KeyVault, KEY_SOURCE_TABLE};
pub use keyhole::{keyhole_transfer, KeyholeChunk, KeyholeChunks, KeyholeParams};
pub use pmc_error::{PmcError, PmcResult};
pub use pmc_registers::{AesKeySize, AesRegisters, KeyClearMask, KeyDecSelect, KeySelect, Mmio};
pub use ufmt;
