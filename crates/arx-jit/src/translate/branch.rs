//! Branch class: B/BL, B.cond, CBZ/CBNZ, TBZ/TBNZ, BR/BLR/RET. Every
//! handler here terminates the block.
//!
//! Conditional forms emit a two-exit sequence: guest NZCV is loaded into
//! the host flags, the table Jcc skips over the fall-through exit, and
//! both exits store their next PC. Indirect forms store the target into
//! the context before the bank spill so a link-register write cannot
//! clobber it.

use arx_cpu_core::flags::cond_holds;
use arx_cpu_core::state::abi;
use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp, ShiftOp, X86Cond};
use arx_emit::Reg;

use super::exits::{emit_exit, ExitTarget, EXIT_JUMP};
use super::{BlockExit, ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, SCRATCH};

impl<B: GuestBus> DisasContext<'_, B> {
    /// Emit a full jump exit to a static target.
    fn emit_jump_exit(&mut self, target: u64) {
        emit_exit(
            self.buf,
            self.ctx_addr,
            ExitTarget::Imm(target),
            EXIT_JUMP,
            self.chaining,
            self.chain_sites,
            Some(target),
        );
    }
}

/// Two-exit conditional: host Jcc (already loadable flags are the caller's
/// responsibility) over the fall-through exit.
fn emit_cond_exits<B: GuestBus>(ctx: &mut DisasContext<'_, B>, cc: X86Cond, target: u64) {
    let jcc_at = x86::emit_jcc_placeholder(ctx.buf, cc);
    ctx.emit_jump_exit(ctx.pc.wrapping_add(4));
    let taken = ctx.buf.offset();
    x86::patch_rel32(ctx.buf, jcc_at, taken);
    ctx.emit_jump_exit(target);
}

fn b_and_bl<B: GuestBus>(ctx: &mut DisasContext<'_, B>, link: bool) -> TransResult {
    let target = ctx.pc.wrapping_add((ctx.insn.simm26() << 2) as u64);
    if link {
        let ret = ctx.pc.wrapping_add(4);
        ctx.state.set_lr(ret);
        x86::emit_mov_ri(ctx.buf, true, host_gpr(30), ret);
    }
    ctx.state.pc = target;
    ctx.exit = Some(BlockExit::Jump);
    ctx.emit_jump_exit(target);
    Ok(Outcome::Terminated)
}

fn b_cond<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let cond = insn.cond_br();
    let target = ctx.pc.wrapping_add((insn.simm19() << 2) as u64);

    let taken = cond_holds(ctx.state.pstate, cond);
    ctx.state.pc = if taken {
        target
    } else {
        ctx.pc.wrapping_add(4)
    };
    ctx.exit = Some(BlockExit::Jump);

    match X86Cond::from_guest(cond) {
        Some(cc) => {
            ctx.emit_host_flags_from_pstate();
            emit_cond_exits(ctx, cc, target);
        }
        None => {
            // AL/NV: architecturally always taken.
            ctx.emit_jump_exit(target);
        }
    }
    Ok(Outcome::Terminated)
}

fn cbz_cbnz<B: GuestBus>(ctx: &mut DisasContext<'_, B>, branch_if_zero: bool) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let rt = insn.rd();
    let target = ctx.pc.wrapping_add((insn.simm19() << 2) as u64);

    let is_zero = ctx.state.xr(rt) & width.mask() == 0;
    let taken = is_zero == branch_if_zero;
    ctx.state.pc = if taken {
        target
    } else {
        ctx.pc.wrapping_add(4)
    };
    ctx.exit = Some(BlockExit::Jump);

    if rt == 31 {
        // The zero register compares equal to zero forever.
        let dest = if branch_if_zero {
            target
        } else {
            ctx.pc.wrapping_add(4)
        };
        ctx.emit_jump_exit(dest);
        return Ok(Outcome::Terminated);
    }

    let rexw = width.is_64();
    let host = host_gpr(rt);
    x86::emit_test_rr(ctx.buf, rexw, host, host);
    let cc = if branch_if_zero { X86Cond::E } else { X86Cond::Ne };
    emit_cond_exits(ctx, cc, target);
    Ok(Outcome::Terminated)
}

fn tbz_tbnz<B: GuestBus>(ctx: &mut DisasContext<'_, B>, branch_if_zero: bool) -> TransResult {
    let insn = ctx.insn;
    let rt = insn.rd();
    let bit = (insn.bits(31, 31) << 5) | insn.bits(19, 23);
    let target = ctx.pc.wrapping_add((insn.simm14() << 2) as u64);

    let bit_set = ctx.state.xr(rt) >> bit & 1 != 0;
    let taken = bit_set != branch_if_zero;
    ctx.state.pc = if taken {
        target
    } else {
        ctx.pc.wrapping_add(4)
    };
    ctx.exit = Some(BlockExit::Jump);

    if rt == 31 {
        let dest = if branch_if_zero {
            target
        } else {
            ctx.pc.wrapping_add(4)
        };
        ctx.emit_jump_exit(dest);
        return Ok(Outcome::Terminated);
    }

    // Isolate the bit: shift it down, mask, then branch on Z.
    x86::emit_push(ctx.buf, Reg::Rax);
    x86::emit_mov_rr(ctx.buf, true, Reg::Rax, host_gpr(rt));
    if bit != 0 {
        x86::emit_shift_ri(ctx.buf, ShiftOp::Shr, true, Reg::Rax, bit as u8);
    }
    x86::emit_arith_ri(ctx.buf, ArithOp::And, false, Reg::Rax, 1);
    x86::emit_pop(ctx.buf, Reg::Rax);
    let cc = if branch_if_zero { X86Cond::E } else { X86Cond::Ne };
    emit_cond_exits(ctx, cc, target);
    Ok(Outcome::Terminated)
}

fn indirect<B: GuestBus>(ctx: &mut DisasContext<'_, B>, link: bool) -> TransResult {
    let insn = ctx.insn;
    let rn = insn.rn();
    let target = ctx.state.xr(rn);

    // Store the target PC before any link write can alias it.
    x86::emit_push(ctx.buf, Reg::Rax);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, true, Reg::Rax, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, true, Reg::Rax, host_gpr(rn));
    }
    ctx.emit_ctx_to_scratch();
    x86::emit_store(ctx.buf, true, Reg::Rax, SCRATCH, abi::CPU_PC_OFF);
    x86::emit_pop(ctx.buf, Reg::Rax);

    if link {
        let ret = ctx.pc.wrapping_add(4);
        ctx.state.set_lr(ret);
        x86::emit_mov_ri(ctx.buf, true, host_gpr(30), ret);
    }
    ctx.state.pc = target;
    ctx.exit = Some(BlockExit::Jump);

    emit_exit(
        ctx.buf,
        ctx.ctx_addr,
        ExitTarget::PcStored,
        EXIT_JUMP,
        false,
        ctx.chain_sites,
        None,
    );
    Ok(Outcome::Terminated)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    if insn.matches(0xFC00_0000, 0x1400_0000) {
        return b_and_bl(ctx, false);
    }
    if insn.matches(0xFC00_0000, 0x9400_0000) {
        return b_and_bl(ctx, true);
    }
    if insn.matches(0xFF00_0010, 0x5400_0000) {
        return b_cond(ctx);
    }
    if insn.matches(0x7F00_0000, 0x3400_0000) {
        return cbz_cbnz(ctx, true);
    }
    if insn.matches(0x7F00_0000, 0x3500_0000) {
        return cbz_cbnz(ctx, false);
    }
    if insn.matches(0x7F00_0000, 0x3600_0000) {
        return tbz_tbnz(ctx, true);
    }
    if insn.matches(0x7F00_0000, 0x3700_0000) {
        return tbz_tbnz(ctx, false);
    }
    if insn.matches(0xFFFF_FC1F, 0xD61F_0000) {
        return indirect(ctx, false);
    }
    if insn.matches(0xFFFF_FC1F, 0xD63F_0000) {
        return indirect(ctx, true);
    }
    if insn.matches(0xFFFF_FC1F, 0xD65F_0000) {
        return indirect(ctx, false); // RET
    }

    Err(ClassMiss)
}
