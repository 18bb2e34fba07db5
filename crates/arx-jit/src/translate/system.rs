//! System class: SVC (routed to the syscall bridge), BRK, the NOP/HINT
//! space, memory barriers (no-ops on the strongly-ordered host) and
//! MRS/MSR for the user-visible system registers.

use arx_cpu_core::flags::NZCV_MASK;
use arx_cpu_core::state::abi;
use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp};
use arx_emit::Reg;

use super::exits::{emit_exit, ExitTarget, EXIT_HALT, EXIT_SYSCALL};
use super::{BlockExit, ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, SCRATCH};

/// System-register identifiers: o0:op1:CRn:CRm:op2 as extracted from bits
/// 19..5 of MRS/MSR (MRS X0, NZCV is 0xD53B4200, whose field is 0x5A10).
const SYSREG_NZCV: u32 = 0x5A10;
const SYSREG_FPCR: u32 = 0x5A20;
const SYSREG_FPSR: u32 = 0x5A21;
const SYSREG_TPIDR_EL0: u32 = 0x5E82;

fn sysreg_field(insn: crate::decode::Insn) -> u32 {
    insn.bits(5, 19)
}

fn mrs<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let rt = insn.rd();
    let (value, offset, width64) = match sysreg_field(insn) {
        SYSREG_NZCV => (ctx.state.pstate & NZCV_MASK, abi::CPU_PSTATE_OFF, true),
        SYSREG_FPCR => (u64::from(ctx.state.fpcr), abi::CPU_FPCR_OFF, false),
        SYSREG_FPSR => (u64::from(ctx.state.fpsr), abi::CPU_FPSR_OFF, false),
        SYSREG_TPIDR_EL0 => (ctx.state.tpidr, abi::CPU_TPIDR_OFF, true),
        other => {
            tracing::trace!(target: "arx_jit", "unhandled MRS sysreg {other:#x}");
            return Err(ClassMiss);
        }
    };
    ctx.state.set_xr(rt, value);
    if rt != 31 {
        ctx.emit_ctx_to_scratch();
        x86::emit_load(ctx.buf, width64, host_gpr(rt), SCRATCH, offset);
    }
    Ok(Outcome::Continue)
}

fn msr<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let rt = insn.rd();
    let value = ctx.state.xr(rt);
    let field = sysreg_field(insn);
    match field {
        SYSREG_NZCV => ctx.state.pstate = value & NZCV_MASK,
        SYSREG_FPCR => ctx.state.fpcr = value as u32,
        SYSREG_FPSR => ctx.state.fpsr = value as u32,
        SYSREG_TPIDR_EL0 => ctx.state.tpidr = value,
        other => {
            tracing::trace!(target: "arx_jit", "unhandled MSR sysreg {other:#x}");
            return Err(ClassMiss);
        }
    }

    ctx.emit_ctx_to_scratch();
    x86::emit_push(ctx.buf, Reg::Rax);
    if rt == 31 {
        x86::emit_mov_ri(ctx.buf, true, Reg::Rax, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, true, Reg::Rax, host_gpr(rt));
    }
    match field {
        SYSREG_NZCV => {
            x86::emit_arith_ri(ctx.buf, ArithOp::And, false, Reg::Rax, NZCV_MASK as i32);
            x86::emit_store(ctx.buf, true, Reg::Rax, SCRATCH, abi::CPU_PSTATE_OFF);
        }
        SYSREG_FPCR => x86::emit_store(ctx.buf, false, Reg::Rax, SCRATCH, abi::CPU_FPCR_OFF),
        SYSREG_FPSR => x86::emit_store(ctx.buf, false, Reg::Rax, SCRATCH, abi::CPU_FPSR_OFF),
        _ => x86::emit_store(ctx.buf, true, Reg::Rax, SCRATCH, abi::CPU_TPIDR_OFF),
    }
    x86::emit_pop(ctx.buf, Reg::Rax);
    Ok(Outcome::Continue)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    // SVC: hand off to the syscall bridge; resumption is at pc + 4.
    if insn.matches(0xFFE0_001F, 0xD400_0001) {
        let nr = ctx.state.xr(8);
        ctx.state.last_syscall = nr;
        ctx.state.pc = ctx.pc.wrapping_add(4);
        ctx.exit = Some(BlockExit::Syscall { nr });
        emit_exit(
            ctx.buf,
            ctx.ctx_addr,
            ExitTarget::Imm(ctx.pc.wrapping_add(4)),
            EXIT_SYSCALL,
            false,
            ctx.chain_sites,
            None,
        );
        return Ok(Outcome::Terminated);
    }

    // BRK: halt with the immediate; pc stays on the break instruction.
    if insn.matches(0xFFE0_001F, 0xD420_0000) {
        let imm = insn.bits(5, 20) as u16;
        ctx.state.pc = ctx.pc;
        ctx.exit = Some(BlockExit::Halt { imm });
        emit_exit(
            ctx.buf,
            ctx.ctx_addr,
            ExitTarget::Imm(ctx.pc),
            EXIT_HALT,
            false,
            ctx.chain_sites,
            None,
        );
        return Ok(Outcome::Terminated);
    }

    // NOP and the rest of the hint space.
    if insn.matches(0xFFFF_F01F, 0xD503_201F) {
        x86::emit_nop(ctx.buf);
        return Ok(Outcome::Continue);
    }

    // DMB/DSB/ISB: the host memory model already satisfies them.
    if insn.matches(0xFFFF_F000, 0xD503_3000) {
        x86::emit_nop(ctx.buf);
        return Ok(Outcome::Continue);
    }

    if insn.matches(0xFFF0_0000, 0xD530_0000) {
        return mrs(ctx);
    }
    if insn.matches(0xFFF0_0000, 0xD510_0000) {
        return msr(ctx);
    }

    Err(ClassMiss)
}
