/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the PMC Known Answer Tests.

--*/

#![no_std]

mod aes256gcm_kat;
mod aes_dpa_cm_kat;

pub use aes256gcm_kat::{Aes256GcmKat, KAT_SCRATCH_SIZE};
pub use aes_dpa_cm_kat::AesDpaCmKat;
pub use pmc_drivers::{PmcError, PmcResult};
