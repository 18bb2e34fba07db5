//! Block entry/exit sequences.
//!
//! Translated blocks follow a single ABI: `extern "C" fn(*mut CpuState) ->
//! u64`. The prologue saves the host stack pointer into the context, loads
//! the mapped GPR and XMM banks from the shadow state, and consumes the
//! context pointer (rdi) last. Every exit stores the banks back, restores
//! the host stack, leaves the context pointer in rdi again and returns an
//! exit reason in rax — or, when block chaining is enabled, falls through a
//! 5-byte patchable tail that can become a direct JMP to the next block.
//!
//! Host rsp (guest x4's mapped register) keeps serving as the host stack
//! and is excluded from the banks; r11 is the emitter scratch and is
//! reloaded on entry but not stored back.

use arx_cpu_core::state::abi;
use arx_emit::x86;
use arx_emit::{CodeBuffer, Reg, Xmm};

use super::ChainSite;
use crate::regmap::SCRATCH;

pub const EXIT_JUMP: u64 = 0;
pub const EXIT_SYSCALL: u64 = 1;
pub const EXIT_HALT: u64 = 2;

/// Host GPR numbers stored back at block exits (everything except rsp and
/// the scratch).
pub const SPILLED_GPRS: [u8; 14] = [0, 1, 2, 3, 5, 6, 7, 8, 9, 10, 12, 13, 14, 15];

/// Where an exit sends the guest PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTarget {
    /// Statically known next PC.
    Imm(u64),
    /// PC comes from the register mapped for this guest register.
    GuestReg(u8),
    /// The terminator already stored the next PC into the context (used by
    /// indirect branches whose target register may be overwritten by the
    /// link write).
    PcStored,
}

/// Block prologue; the caller's rdi holds the context pointer.
pub fn emit_prologue(buf: &mut CodeBuffer) {
    x86::emit_store(buf, true, Reg::Rsp, Reg::Rdi, abi::CPU_HOST_SP_OFF);
    for i in 0..16u8 {
        x86::emit_sse_mem(buf, x86::OPC_MOVDQU_load, Xmm(i), Reg::Rdi, abi::v_off(i));
    }
    for &g in &SPILLED_GPRS {
        if g == 7 {
            continue;
        }
        x86::emit_load(buf, true, Reg::from_num(g), Reg::Rdi, abi::x_off(g));
    }
    x86::emit_load(buf, true, SCRATCH, Reg::Rdi, abi::x_off(11));
    // rdi last: it is the context pointer until here.
    x86::emit_load(buf, true, Reg::Rdi, Reg::Rdi, abi::x_off(7));
}

/// Full exit sequence. Returns nothing; when `chain_target` is set and
/// chaining is enabled a patch site is recorded in `chain_sites`.
#[allow(clippy::too_many_arguments)]
pub fn emit_exit(
    buf: &mut CodeBuffer,
    ctx_addr: u64,
    target: ExitTarget,
    reason: u64,
    chaining: bool,
    chain_sites: &mut Vec<ChainSite>,
    chain_target: Option<u64>,
) {
    x86::emit_mov_ri(buf, true, SCRATCH, ctx_addr);
    for &g in &SPILLED_GPRS {
        x86::emit_store(buf, true, Reg::from_num(g), SCRATCH, abi::x_off(g));
    }
    for i in 0..16u8 {
        x86::emit_sse_mem(buf, x86::OPC_MOVDQU_store, Xmm(i), SCRATCH, abi::v_off(i));
    }

    // Next guest PC. rax's guest value is already stored, so it is free.
    match target {
        ExitTarget::Imm(pc) => {
            x86::emit_mov_ri(buf, true, Reg::Rax, pc);
            x86::emit_store(buf, true, Reg::Rax, SCRATCH, abi::CPU_PC_OFF);
        }
        ExitTarget::GuestReg(g) => {
            if g == 31 {
                x86::emit_mov_ri(buf, true, Reg::Rax, 0);
            } else {
                x86::emit_load(buf, true, Reg::Rax, SCRATCH, abi::x_off(g & 0x0F));
            }
            x86::emit_store(buf, true, Reg::Rax, SCRATCH, abi::CPU_PC_OFF);
        }
        ExitTarget::PcStored => {}
    }

    if reason == EXIT_SYSCALL {
        x86::emit_load(buf, true, Reg::Rax, SCRATCH, abi::x_off(8));
        x86::emit_store(buf, true, Reg::Rax, SCRATCH, abi::CPU_LAST_SYSCALL_OFF);
    }

    x86::emit_load(buf, true, Reg::Rsp, SCRATCH, abi::CPU_HOST_SP_OFF);
    x86::emit_mov_ri(buf, true, Reg::Rax, reason);
    x86::emit_mov_rr(buf, true, Reg::Rdi, SCRATCH);

    match chain_target {
        Some(target_pc) if chaining && reason == EXIT_JUMP => {
            chain_sites.push(ChainSite {
                patch_offset: buf.offset(),
                target: target_pc,
            });
            x86::emit_ret(buf);
            x86::emit_nops(buf, 4);
        }
        _ => x86::emit_ret(buf),
    }
}
