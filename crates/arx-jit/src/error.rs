//! Translation failures surfaced to the embedder.
//!
//! Unknown encodings and guest division by zero are handled in-band (NOP
//! emission / zero write) and never reach this type.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// Emission ran past the scratch buffer capacity; the block was
    /// abandoned and nothing was installed.
    #[error("code buffer overflow while translating block at {guest_pc:#x}")]
    CodeBufferOverflow { guest_pc: u64 },

    /// The code cache could not satisfy an allocation even after a full
    /// flush-and-retry.
    #[error("code cache exhausted ({requested} bytes requested)")]
    CodeCacheExhausted { requested: usize },

    /// The driver was invoked with a null or unreadable guest PC.
    #[error("null or unreadable guest pc {guest_pc:#x}")]
    NullGuestPointer { guest_pc: u64 },
}
