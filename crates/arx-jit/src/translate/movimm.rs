//! MOV-wide immediate family (MOVZ/MOVN/MOVK) and the PC-relative
//! address forms (ADR/ADRP).

use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp};

use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, SCRATCH};

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let rexw = width.is_64();
    let rd = insn.rd();

    // MOVZ: imm16 placed at hw*16, everything else zeroed.
    if insn.matches(0x7F80_0000, 0x5280_0000) {
        let value = (u64::from(insn.imm16()) << (16 * insn.hw())) & width.mask();
        ctx.state.set_xr_w(width, rd, value);
        x86::emit_mov_ri(ctx.buf, rexw, host_gpr(rd), value);
        return Ok(Outcome::Continue);
    }

    // MOVN: complement of the placed immediate.
    if insn.matches(0x7F80_0000, 0x1280_0000) {
        let value = !(u64::from(insn.imm16()) << (16 * insn.hw())) & width.mask();
        ctx.state.set_xr_w(width, rd, value);
        x86::emit_mov_ri(ctx.buf, rexw, host_gpr(rd), value);
        return Ok(Outcome::Continue);
    }

    // MOVK: replace one 16-bit field, preserve the rest.
    if insn.matches(0x7F80_0000, 0x7280_0000) {
        let shift = 16 * insn.hw();
        let field_mask = 0xFFFFu64 << shift;
        let placed = u64::from(insn.imm16()) << shift;
        let old = ctx.state.xr(rd);
        let value = ((old & !field_mask) | placed) & width.mask();
        ctx.state.set_xr_w(width, rd, value);

        let dst = host_gpr(rd);
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, !field_mask & width.mask());
        x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, dst, SCRATCH);
        if placed != 0 {
            x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, placed);
            x86::emit_arith_rr(ctx.buf, ArithOp::Or, rexw, dst, SCRATCH);
        }
        return Ok(Outcome::Continue);
    }

    // ADR / ADRP: the target is a translate-time constant of the block.
    if insn.matches(0x9F00_0000, 0x1000_0000) || insn.matches(0x9F00_0000, 0x9000_0000) {
        let imm21 = ((insn.simm19() << 2) | i64::from(insn.bits(29, 30))) as i64;
        let value = if insn.bit(31) {
            // ADRP: page of pc + imm21 pages.
            (ctx.pc & !0xFFF).wrapping_add((imm21 << 12) as u64)
        } else {
            ctx.pc.wrapping_add(imm21 as u64)
        };
        ctx.state.set_xr(rd, value);
        x86::emit_mov_ri(ctx.buf, true, host_gpr(rd), value);
        return Ok(Outcome::Continue);
    }

    Err(ClassMiss)
}
