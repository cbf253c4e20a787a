/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains API and macros used by the PMC libraries for error handling

--*/
#![cfg_attr(not(any(test, feature = "std")), no_std)]
use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// PMC Error Type
/// Derives debug, copy, clone, eq, and partial eq
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PmcError(pub NonZeroU32);

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: PmcError = PmcError::new_const($value);
        )*

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl PmcError {
    /// Create a PMC error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get a PmcError from a u32 is to
    /// use `PmcError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("PmcError cannot be 0"),
        }
    }

    define_error_constants![
        (
            DRIVER_AES_INVALID_PARAM,
            0x0001_0001,
            "AES invalid parameter (bad key source, size or address)"
        ),
        (
            DRIVER_AES_STATE_MISMATCH,
            0x0001_0002,
            "AES call made from the wrong engine state"
        ),
        (
            DRIVER_AES_UNALIGNED_SIZE,
            0x0001_0003,
            "AES update length violates block or word alignment"
        ),
        (
            DRIVER_AES_ZERO_PUF_KEY_NOT_ALLOWED,
            0x0001_0004,
            "AES PUF key selected while hardware reports it zeroed"
        ),
        (
            DRIVER_AES_DEVICE_KEY_NOT_ALLOWED,
            0x0001_0005,
            "AES raw device key used where only its red form is permitted"
        ),
        (
            DRIVER_AES_GCM_TAG_MISMATCH,
            0x0001_0006,
            "AES GCM authentication tag mismatch"
        ),
        (
            DRIVER_AES_KEY_CLEAR_ERROR,
            0x0001_0007,
            "AES key zeroization did not complete in time"
        ),
        (
            DRIVER_AES_TIMEOUT,
            0x0001_0008,
            "AES hardware done or ready poll expired"
        ),
        (
            DRIVER_AES_DPA_CM_NOT_SUPPORTED,
            0x0001_0009,
            "AES DPA counter-measure setting was not accepted by hardware"
        ),
        (
            DRIVER_AES_KEK_DECRYPT_TIMEOUT,
            0x0001_000A,
            "AES black key decryption did not complete in time"
        ),
        (
            DRIVER_DMA_TRANSFER_FAILURE,
            0x0002_0001,
            "DMA transfer reported an error"
        ),
        (DRIVER_DMA_TIMEOUT, 0x0002_0002, "DMA transfer timed out"),
        (
            DRIVER_DMA_INVALID_PARAM,
            0x0002_0003,
            "DMA invalid address or length"
        ),
        (
            DRIVER_KEYHOLE_INVALID_PARAM,
            0x0003_0001,
            "Keyhole window is zero, not a power of two or misaligned"
        ),
        (
            KAT_AES_CIPHERTEXT_MISMATCH,
            0x0009_0001,
            "AES-GCM KAT ciphertext mismatch"
        ),
        (KAT_AES_TAG_MISMATCH, 0x0009_0002, "AES-GCM KAT tag mismatch"),
        (
            KAT_AES_PLAINTEXT_MISMATCH,
            0x0009_0003,
            "AES-GCM KAT plaintext mismatch"
        ),
        (
            KAT_AES_DPA_CM_MISMATCH,
            0x0009_0004,
            "AES-GCM KAT output changed with DPA counter-measures enabled"
        ),
    ];
}

impl From<core::num::NonZeroU32> for crate::PmcError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::PmcError(val)
    }
}

impl From<PmcError> for core::num::NonZeroU32 {
    fn from(val: PmcError) -> Self {
        val.0
    }
}

impl From<PmcError> for u32 {
    fn from(val: PmcError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for PmcError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(PmcError(val)),
            Err(err) => Err(err),
        }
    }
}

impl core::fmt::Display for PmcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PmcError({:#010x})", self.0.get())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PmcError {}

pub type PmcResult<T> = Result<T, PmcError>;
