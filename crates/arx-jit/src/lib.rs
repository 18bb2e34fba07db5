//! ARM64 → x86_64 dynamic binary translation.
//!
//! The pipeline decodes 32-bit A64 words, routes each through a
//! fixed-priority chain of class translators, and emits equivalent host
//! byte sequences into a scratch buffer that is installed into an
//! executable code arena and indexed by a direct-mapped translation
//! cache. Translators perform the dual update: the shadow [`arx_cpu_core::CpuState`]
//! is the authoritative architectural state and the emitted host code is
//! its native mirror for cached re-execution.

pub mod cache;
pub mod code_cache;
pub mod decode;
pub mod error;
pub mod peephole;
pub mod regmap;
pub mod runtime;
pub mod stats;
pub mod translate;

pub use cache::{EntryFlags, TransCache, TransCacheEntry};
pub use code_cache::CodeCache;
pub use error::TranslateError;
pub use runtime::{BlockHandle, JitRuntime, RunExit};
pub use stats::JitStats;
pub use translate::{BlockExit, ClassMiss, Outcome};
