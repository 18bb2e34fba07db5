//! Block driver and runtime: per-PC block assembly, dispatch across the
//! translator classes, termination, installation into the code cache and
//! the lookup → translate → execute loop.

use arx_cpu_core::{CpuState, GuestBus, JitConfig, SyscallBridge};
use arx_emit::x86;
use arx_emit::CodeBuffer;
use tracing::{debug, trace};

use crate::cache::TransCache;
use crate::code_cache::CodeCache;
use crate::decode::Insn;
use crate::error::TranslateError;
use crate::peephole;
use crate::stats::JitStats;
use crate::translate::exits::{emit_exit, emit_prologue, ExitTarget, EXIT_HALT, EXIT_JUMP, EXIT_SYSCALL};
use crate::translate::{dispatch, BlockExit, ChainSite, ConstPool, DisasContext, Outcome};

/// Scratch buffer for one block translation.
const SCRATCH_BUF_SIZE: usize = 64 * 1024;

/// A translated (or cached) block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub host_addr: u64,
    pub size: u32,
    /// Exit reason observed during translation; `None` for a cache hit
    /// (the exit is only known after executing the host code).
    pub exit: Option<BlockExit>,
}

/// Why `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The guest executed BRK.
    Halted { imm: u16 },
    /// The block budget was exhausted.
    BlockLimit,
}

/// A chain patch site waiting for its target block to be translated.
#[derive(Debug, Clone, Copy)]
struct PendingChain {
    patch_addr: u64,
    target: u64,
}

pub struct JitRuntime {
    cfg: JitConfig,
    tcache: TransCache,
    ccache: CodeCache,
    stats: JitStats,
    pending_chains: Vec<PendingChain>,
}

impl JitRuntime {
    #[must_use]
    pub fn new(cfg: JitConfig) -> Self {
        Self {
            tcache: TransCache::new(cfg.translation_cache_bits),
            ccache: CodeCache::new(cfg.code_cache_size),
            stats: JitStats::default(),
            pending_chains: Vec::new(),
            cfg,
        }
    }

    #[must_use]
    pub fn config(&self) -> &JitConfig {
        &self.cfg
    }

    #[must_use]
    pub fn stats(&self) -> &JitStats {
        &self.stats
    }

    /// Host entry for a cached guest PC.
    #[must_use]
    pub fn lookup(&self, pc: u64) -> Option<u64> {
        self.tcache.lookup(pc).map(|e| e.host_addr)
    }

    pub fn invalidate(&mut self, pc: u64) {
        self.tcache.invalidate(pc);
    }

    /// Drop every translation: zero the translation cache and reset the
    /// code arena as one step (the cached host pointers dangle otherwise).
    pub fn flush_all(&mut self) {
        self.tcache.flush();
        self.ccache.reset();
        self.pending_chains.clear();
        self.stats.flushes += 1;
        debug!(target: "arx_jit", "flushed translation and code caches");
    }

    /// Translate (or fetch) the block starting at `pc`.
    pub fn translate_block<B: GuestBus>(
        &mut self,
        state: &mut CpuState,
        bus: &mut B,
        pc: u64,
    ) -> Result<BlockHandle, TranslateError> {
        if pc == 0 {
            return Err(TranslateError::NullGuestPointer { guest_pc: pc });
        }
        self.stats.lookups += 1;
        if let Some(entry) = self.tcache.lookup(pc) {
            self.stats.hits += 1;
            return Ok(BlockHandle {
                host_addr: entry.host_addr,
                size: entry.size,
                exit: None,
            });
        }
        self.translate_uncached(state, bus, pc)
    }

    fn translate_uncached<B: GuestBus>(
        &mut self,
        state: &mut CpuState,
        bus: &mut B,
        pc: u64,
    ) -> Result<BlockHandle, TranslateError> {
        if bus.read_u32(pc).is_err() {
            return Err(TranslateError::NullGuestPointer { guest_pc: pc });
        }

        let ctx_addr = state as *mut CpuState as u64;
        let mut buf = CodeBuffer::new(SCRATCH_BUF_SIZE);
        let mut pool = ConstPool::new();
        let mut chain_sites: Vec<ChainSite> = Vec::new();
        emit_prologue(&mut buf);

        let mut exit: Option<BlockExit> = None;
        let mut cur = pc;
        for _ in 0..self.cfg.max_words_per_block {
            let Ok(word) = bus.read_u32(cur) else {
                break;
            };
            let mut dctx = DisasContext {
                insn: Insn(word),
                pc: cur,
                ctx_addr,
                state: &mut *state,
                bus: &mut *bus,
                buf: &mut buf,
                pool: &mut pool,
                chain_sites: &mut chain_sites,
                chaining: self.cfg.enable_block_chaining,
                exit: None,
            };
            match dispatch(&mut dctx) {
                Some(Outcome::Terminated) => {
                    exit = dctx.exit;
                    self.stats.retired_insns += 1;
                    break;
                }
                Some(Outcome::Continue) => {
                    self.stats.retired_insns += 1;
                    cur = cur.wrapping_add(4);
                    state.pc = cur;
                }
                None => {
                    trace!(target: "arx_jit", pc = cur, word, "unknown encoding, emitting NOP");
                    x86::emit_nop(&mut buf);
                    self.stats.nop_fallbacks += 1;
                    cur = cur.wrapping_add(4);
                    state.pc = cur;
                }
            }
        }

        // Fall-through: the block ran out of words without a terminator.
        if exit.is_none() {
            state.pc = cur;
            emit_exit(
                &mut buf,
                ctx_addr,
                ExitTarget::Imm(cur),
                EXIT_JUMP,
                self.cfg.enable_block_chaining,
                &mut chain_sites,
                Some(cur),
            );
            exit = Some(BlockExit::Jump);
        }

        let code_len = buf.offset();
        pool.flush(&mut buf);
        if buf.overflowed() {
            self.stats.overflow_aborts += 1;
            return Err(TranslateError::CodeBufferOverflow { guest_pc: pc });
        }

        if self.cfg.enable_peephole {
            let n = peephole::run(&mut buf.bytes_mut()[..code_len]);
            if n > 0 {
                trace!(target: "arx_jit", pc, rewritten = n, "peephole simplifications");
            }
        }

        let size = buf.offset();
        let host = match self.ccache.install(buf.bytes()) {
            Some(p) => p,
            None => {
                // One flush-and-retry, then give up.
                self.flush_all();
                match self.ccache.install(buf.bytes()) {
                    Some(p) => p,
                    None => return Err(TranslateError::CodeCacheExhausted { requested: size }),
                }
            }
        };
        let host_addr = host as u64;
        self.tcache.insert(pc, host_addr, size as u32);
        self.stats.translated += 1;
        debug!(target: "arx_jit", pc, host = host_addr, size, "installed block");

        if self.cfg.enable_block_chaining {
            for site in chain_sites {
                let patch_addr = host_addr + site.patch_offset as u64;
                if let Some(entry) = self.tcache.lookup(site.target) {
                    let target_host = entry.host_addr;
                    patch_chain_jump(patch_addr, target_host);
                    self.tcache.mark_linked(site.target);
                    self.stats.chained += 1;
                } else {
                    self.pending_chains.push(PendingChain {
                        patch_addr,
                        target: site.target,
                    });
                }
            }
            self.try_chain_block(pc);
        }

        Ok(BlockHandle {
            host_addr,
            size: size as u32,
            exit,
        })
    }

    /// Patch every pending chain site that waits on `target_pc`. Called
    /// after each installation; also usable directly by the embedder.
    pub fn try_chain_block(&mut self, target_pc: u64) {
        let Some(entry) = self.tcache.lookup(target_pc) else {
            return;
        };
        let target_host = entry.host_addr;
        let mut patched = 0u64;
        self.pending_chains.retain(|chain| {
            if chain.target == target_pc {
                patch_chain_jump(chain.patch_addr, target_host);
                patched += 1;
                false
            } else {
                true
            }
        });
        if patched > 0 {
            self.tcache.mark_linked(target_pc);
            self.stats.chained += patched;
        }
    }

    /// The lookup → translate → execute loop. Translation itself carries
    /// the architectural state forward; cached blocks re-execute natively.
    pub fn run<B: GuestBus, S: SyscallBridge>(
        &mut self,
        state: &mut CpuState,
        bus: &mut B,
        bridge: &mut S,
        entry_pc: u64,
        max_blocks: u64,
    ) -> Result<RunExit, TranslateError> {
        state.pc = entry_pc;
        for _ in 0..max_blocks {
            let pc = state.pc;
            let handle = self.translate_block(state, bus, pc)?;
            let exit = match handle.exit {
                Some(exit) => exit,
                None => {
                    // Cache hit: run the installed host code.
                    let reason = unsafe {
                        let entry: extern "C" fn(*mut CpuState) -> u64 =
                            std::mem::transmute(handle.host_addr as *const u8);
                        entry(state as *mut CpuState)
                    };
                    match reason {
                        EXIT_SYSCALL => BlockExit::Syscall {
                            nr: state.last_syscall,
                        },
                        EXIT_HALT => BlockExit::Halt { imm: 0 },
                        _ => BlockExit::Jump,
                    }
                }
            };
            match exit {
                BlockExit::Jump => {}
                BlockExit::Syscall { nr } => {
                    let ret = bridge.handle_syscall(state, nr);
                    state.syscall_ret = ret;
                    state.x[0] = ret as u64;
                }
                BlockExit::Halt { imm } => return Ok(RunExit::Halted { imm }),
            }
        }
        Ok(RunExit::BlockLimit)
    }
}

/// Overwrite a 5-byte patch site (RET + NOPs) with JMP rel32.
fn patch_chain_jump(patch_addr: u64, target_host: u64) {
    let disp = target_host.wrapping_sub(patch_addr + 5) as u32;
    let site = patch_addr as *mut u8;
    unsafe {
        site.write(0xE9);
        site.add(1).write(disp as u8);
        site.add(2).write((disp >> 8) as u8);
        site.add(3).write((disp >> 16) as u8);
        site.add(4).write((disp >> 24) as u8);
    }
}
