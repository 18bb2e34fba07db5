//! Runtime tunables.

/// Options threaded into the jit runtime. Defaults match the documented
/// configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitConfig {
    /// log2 of the translation-cache entry count.
    pub translation_cache_bits: u32,
    /// Size of the executable code arena in bytes.
    pub code_cache_size: usize,
    /// Maximum guest words per translated block.
    pub max_words_per_block: usize,
    pub enable_peephole: bool,
    pub enable_block_chaining: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            translation_cache_bits: 12,
            code_cache_size: 16 << 20,
            max_words_per_block: 64,
            enable_peephole: false,
            enable_block_chaining: false,
        }
    }
}
