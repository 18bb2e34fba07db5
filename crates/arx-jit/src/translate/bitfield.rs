//! Bitfield class: UBFM/SBFM (the immediate shifts and the sign/zero
//! extends are aliases of these), BFM and EXTR.

use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp, ShiftOp};
use arx_emit::Reg;
use arx_types::{ShiftKind, Width};

use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::decode::decode_bit_masks_pair;
use crate::regmap::{host_gpr, SCRATCH};

fn ror(value: u64, amount: u32, width: Width) -> u64 {
    ShiftKind::Ror.apply(value, amount, width)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BfKind {
    Unsigned,
    Signed,
    Insert,
}

fn bitfield_move<B: GuestBus>(ctx: &mut DisasContext<'_, B>, kind: BfKind) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    let (immr, imms) = (insn.immr(), insn.imms());
    let Some((wmask, tmask)) = decode_bit_masks_pair(insn.bit(22), immr, imms, width) else {
        return Err(ClassMiss);
    };

    let src = ctx.state.xr(rn);
    let bot_src = ror(src, immr, width) & wmask;
    let result = match kind {
        BfKind::Unsigned => bot_src & tmask,
        BfKind::Signed => {
            let top = if src >> imms & 1 != 0 { width.mask() } else { 0 };
            (top & !tmask) | (bot_src & tmask)
        }
        BfKind::Insert => {
            let dst = ctx.state.xr(rd);
            let bot = (dst & !wmask) | bot_src;
            (dst & !tmask) | (bot & tmask)
        }
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    let bits = width.bits();
    let dst = host_gpr(rd);
    match kind {
        BfKind::Unsigned => {
            if rn == 31 {
                x86::emit_mov_ri(ctx.buf, rexw, dst, 0);
                return Ok(Outcome::Continue);
            }
            x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rn));
            if immr != 0 {
                x86::emit_shift_ri(ctx.buf, ShiftOp::Ror, rexw, SCRATCH, immr as u8);
            }
            x86::emit_push(ctx.buf, Reg::Rax);
            x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, wmask & tmask);
            x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, SCRATCH, Reg::Rax);
            x86::emit_pop(ctx.buf, Reg::Rax);
            x86::emit_mov_rr(ctx.buf, rexw, dst, SCRATCH);
        }
        BfKind::Signed => {
            x86::emit_push(ctx.buf, Reg::Rax);
            if rn == 31 {
                x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
                x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
            } else {
                // bot in scratch, sign-replicated top in rax.
                x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rn));
                if immr != 0 {
                    x86::emit_shift_ri(ctx.buf, ShiftOp::Ror, rexw, SCRATCH, immr as u8);
                }
                x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
                x86::emit_shift_ri(ctx.buf, ShiftOp::Shl, rexw, Reg::Rax, (bits - 1 - imms) as u8);
                x86::emit_shift_ri(ctx.buf, ShiftOp::Sar, rexw, Reg::Rax, (bits - 1) as u8);
            }
            x86::emit_push(ctx.buf, Reg::Rdx);
            x86::emit_mov_ri(ctx.buf, rexw, Reg::Rdx, wmask & tmask);
            x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, SCRATCH, Reg::Rdx);
            x86::emit_mov_ri(ctx.buf, rexw, Reg::Rdx, !tmask & width.mask());
            x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, Reg::Rax, Reg::Rdx);
            x86::emit_arith_rr(ctx.buf, ArithOp::Or, rexw, SCRATCH, Reg::Rax);
            x86::emit_pop(ctx.buf, Reg::Rdx);
            x86::emit_pop(ctx.buf, Reg::Rax);
            x86::emit_mov_rr(ctx.buf, rexw, dst, SCRATCH);
        }
        BfKind::Insert => {
            // rd = (rd & keep) | (ror(rn, immr) & wmask & tmask)
            // with keep = ~tmask | (~wmask & tmask).
            let keep = (!tmask | (!wmask & tmask)) & width.mask();
            x86::emit_push(ctx.buf, Reg::Rax);
            if rn == 31 {
                x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
            } else {
                x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
                if immr != 0 {
                    x86::emit_shift_ri(ctx.buf, ShiftOp::Ror, rexw, Reg::Rax, immr as u8);
                }
                x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, wmask & tmask);
                x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, Reg::Rax, SCRATCH);
            }
            x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, keep);
            x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, SCRATCH, dst);
            x86::emit_arith_rr(ctx.buf, ArithOp::Or, rexw, SCRATCH, Reg::Rax);
            x86::emit_pop(ctx.buf, Reg::Rax);
            x86::emit_mov_rr(ctx.buf, rexw, dst, SCRATCH);
        }
    }
    Ok(Outcome::Continue)
}

/// EXTR: extract a register pair at a bit offset (ROR immediate when
/// rn == rm).
fn extr<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());
    let lsb = insn.imms();
    if lsb >= width.bits() {
        return Err(ClassMiss);
    }

    let lo = ctx.state.xr(rm) & width.mask();
    let hi = ctx.state.xr(rn) & width.mask();
    let result = if lsb == 0 {
        lo
    } else {
        (lo >> lsb | hi << (width.bits() - lsb)) & width.mask()
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    let dst = host_gpr(rd);
    if lsb == 0 {
        if rm == 31 {
            x86::emit_mov_ri(ctx.buf, rexw, dst, 0);
        } else if host_gpr(rm) != dst {
            x86::emit_mov_rr(ctx.buf, rexw, dst, host_gpr(rm));
        }
        return Ok(Outcome::Continue);
    }
    if rm == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rm));
        x86::emit_shift_ri(ctx.buf, ShiftOp::Shr, rexw, SCRATCH, lsb as u8);
    }
    if rn != 31 {
        x86::emit_push(ctx.buf, Reg::Rax);
        x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
        x86::emit_shift_ri(
            ctx.buf,
            ShiftOp::Shl,
            rexw,
            Reg::Rax,
            (width.bits() - lsb) as u8,
        );
        x86::emit_arith_rr(ctx.buf, ArithOp::Or, rexw, SCRATCH, Reg::Rax);
        x86::emit_pop(ctx.buf, Reg::Rax);
    }
    x86::emit_mov_rr(ctx.buf, rexw, dst, SCRATCH);
    Ok(Outcome::Continue)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    if insn.matches(0x7F80_0000, 0x5300_0000) {
        return bitfield_move(ctx, BfKind::Unsigned);
    }
    if insn.matches(0x7F80_0000, 0x1300_0000) {
        return bitfield_move(ctx, BfKind::Signed);
    }
    if insn.matches(0x7F80_0000, 0x3300_0000) {
        return bitfield_move(ctx, BfKind::Insert);
    }
    if insn.matches(0x7FA0_0000, 0x1380_0000) {
        return extr(ctx);
    }

    Err(ClassMiss)
}
