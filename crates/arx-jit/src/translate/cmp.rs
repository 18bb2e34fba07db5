//! Compare class: CMP/CMN/TST — the destination-suppressed flag-setting
//! aliases (rd == 31). Only the NZCV update is emitted; no destination
//! register is written.

use arx_cpu_core::flags::{nzcv_add, nzcv_logical, nzcv_sub};
use arx_cpu_core::state::abi;
use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp};
use arx_emit::Reg;

use super::alu::{
    emit_op2_extended, emit_op2_shifted, op2_extended_shadow, op2_shifted_shadow,
};
use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, SCRATCH};

#[derive(Clone, Copy, PartialEq, Eq)]
enum CmpKind {
    Cmp,
    Cmn,
    Tst,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op2 {
    Shifted,
    Extended,
    Imm,
}

fn compare<B: GuestBus>(ctx: &mut DisasContext<'_, B>, kind: CmpKind, op2: Op2) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let rn = insn.rn();

    // Immediate compares address SP when rn == 31; register forms read ZR.
    let op1 = if op2 == Op2::Imm {
        ctx.state.xr_sp(rn)
    } else {
        ctx.state.xr(rn)
    };
    let op2_val = match op2 {
        Op2::Shifted => op2_shifted_shadow(ctx, width),
        Op2::Extended => op2_extended_shadow(ctx, width),
        Op2::Imm => u64::from(insn.imm12()) << if insn.bit(22) { 12 } else { 0 },
    };
    let nzcv = match kind {
        CmpKind::Cmp => nzcv_sub(op1, op2_val, width),
        CmpKind::Cmn => nzcv_add(op1, op2_val, false, width),
        CmpKind::Tst => nzcv_logical(op1 & op2_val, width),
    };
    ctx.set_shadow_nzcv(nzcv);

    let rexw = width.is_64();
    match op2 {
        Op2::Shifted => emit_op2_shifted(ctx, width),
        Op2::Extended => emit_op2_extended(ctx, width),
        Op2::Imm => x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, op2_val),
    }
    // Operand 1 in rax: covers both the zero register and SP sources.
    x86::emit_push(ctx.buf, Reg::Rax);
    if rn == 31 {
        if op2 == Op2::Imm {
            x86::emit_push(ctx.buf, SCRATCH);
            ctx.emit_ctx_to_scratch();
            x86::emit_load(ctx.buf, true, Reg::Rax, SCRATCH, abi::CPU_SP_OFF);
            x86::emit_pop(ctx.buf, SCRATCH);
        } else {
            x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
        }
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
    }
    match kind {
        CmpKind::Cmp => x86::emit_arith_rr(ctx.buf, ArithOp::Cmp, rexw, Reg::Rax, SCRATCH),
        CmpKind::Cmn => x86::emit_arith_rr(ctx.buf, ArithOp::Add, rexw, Reg::Rax, SCRATCH),
        CmpKind::Tst => x86::emit_test_rr(ctx.buf, rexw, Reg::Rax, SCRATCH),
    }
    x86::emit_pop(ctx.buf, Reg::Rax);
    ctx.emit_pstate_from_host_flags(kind == CmpKind::Cmp);
    Ok(Outcome::Continue)
}

/// CCMP/CCMN: perform the compare when the condition holds, otherwise
/// load the immediate NZCV value.
fn cond_compare<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    negative: bool,
    imm_op2: bool,
) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let rn = insn.rn();
    let cond = insn.cond_sel();
    let fallback = u64::from(insn.0 & 0xF) << 28;

    let op2 = if imm_op2 {
        u64::from(insn.rm())
    } else {
        ctx.state.xr(insn.rm())
    };
    let nzcv = if arx_cpu_core::flags::cond_holds(ctx.state.pstate, cond) {
        let op1 = ctx.state.xr(rn);
        if negative {
            nzcv_add(op1, op2, false, width)
        } else {
            nzcv_sub(op1, op2, width)
        }
    } else {
        fallback
    };
    ctx.set_shadow_nzcv(nzcv);

    let rexw = width.is_64();
    let host_cc = arx_emit::x86::X86Cond::from_guest(cond.invert());
    ctx.emit_host_flags_from_pstate(); // clobbers scratch
    let to_else = host_cc.map(|cc| x86::emit_jcc_placeholder(ctx.buf, cc));

    // Compare path.
    if imm_op2 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, op2);
    } else if insn.rm() == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(insn.rm()));
    }
    x86::emit_push(ctx.buf, Reg::Rax);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
    }
    let arith = if negative { ArithOp::Add } else { ArithOp::Cmp };
    x86::emit_arith_rr(ctx.buf, arith, rexw, Reg::Rax, SCRATCH);
    x86::emit_pop(ctx.buf, Reg::Rax);
    ctx.emit_pstate_from_host_flags(!negative);

    if let Some(jcc_at) = to_else {
        let done = x86::emit_jmp_placeholder(ctx.buf);
        // Fallback path: store the immediate NZCV.
        let else_at = ctx.buf.offset();
        x86::emit_mov_ri(ctx.buf, false, SCRATCH, fallback);
        x86::emit_push(ctx.buf, Reg::Rax);
        x86::emit_mov_ri(ctx.buf, true, Reg::Rax, ctx.ctx_addr);
        x86::emit_store(
            ctx.buf,
            true,
            SCRATCH,
            Reg::Rax,
            arx_cpu_core::state::abi::CPU_PSTATE_OFF,
        );
        x86::emit_pop(ctx.buf, Reg::Rax);
        let end = ctx.buf.offset();
        x86::patch_rel32(ctx.buf, jcc_at, else_at);
        x86::patch_rel32(ctx.buf, done, end);
    }
    Ok(Outcome::Continue)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    if insn.matches(0x7FE0_0C10, 0x7A40_0000) {
        return cond_compare(ctx, false, false);
    }
    if insn.matches(0x7FE0_0C10, 0x7A40_0800) {
        return cond_compare(ctx, false, true);
    }
    if insn.matches(0x7FE0_0C10, 0x3A40_0000) {
        return cond_compare(ctx, true, false);
    }
    if insn.matches(0x7FE0_0C10, 0x3A40_0800) {
        return cond_compare(ctx, true, true);
    }

    if insn.matches(0x7F20_001F, 0x6B00_001F) {
        return compare(ctx, CmpKind::Cmp, Op2::Shifted);
    }
    if insn.matches(0x7FE0_001F, 0x6B20_001F) {
        return compare(ctx, CmpKind::Cmp, Op2::Extended);
    }
    if insn.matches(0x7F00_001F, 0x7100_001F) {
        return compare(ctx, CmpKind::Cmp, Op2::Imm);
    }
    if insn.matches(0x7F20_001F, 0x2B00_001F) {
        return compare(ctx, CmpKind::Cmn, Op2::Shifted);
    }
    if insn.matches(0x7FE0_001F, 0x2B20_001F) {
        return compare(ctx, CmpKind::Cmn, Op2::Extended);
    }
    if insn.matches(0x7F00_001F, 0x3100_001F) {
        return compare(ctx, CmpKind::Cmn, Op2::Imm);
    }
    if insn.matches(0x7F20_001F, 0x6A00_001F) {
        return compare(ctx, CmpKind::Tst, Op2::Shifted);
    }
    if insn.matches(0x7F80_001F, 0x7200_001F) {
        // TST immediate is ANDS with rd == 31; reuse the decoded mask via
        // the shadow path only (the emitted compare uses the materialized
        // constant).
        let width = insn.width();
        let Some(mask) =
            crate::decode::decode_bit_masks(insn.bit(22), insn.immr(), insn.imms(), width)
        else {
            return Err(ClassMiss);
        };
        let op1 = ctx.state.xr(insn.rn());
        let nzcv = nzcv_logical(op1 & mask, width);
        ctx.set_shadow_nzcv(nzcv);

        let rexw = width.is_64();
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, mask);
        x86::emit_push(ctx.buf, Reg::Rax);
        if insn.rn() == 31 {
            x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
        } else {
            x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(insn.rn()));
        }
        x86::emit_test_rr(ctx.buf, rexw, Reg::Rax, SCRATCH);
        x86::emit_pop(ctx.buf, Reg::Rax);
        ctx.emit_pstate_from_host_flags(false);
        return Ok(Outcome::Continue);
    }

    Err(ClassMiss)
}
