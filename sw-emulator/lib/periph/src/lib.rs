/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the PMC Emulator Peripheral library.

--*/

mod aes;
mod dma;
mod memory;
mod platform;

pub use aes::{AesEngine, EngineFaults};
pub use dma::EmuDma;
pub use memory::Memory;
pub use platform::{EmuAesRegs, EmuPlatform};
