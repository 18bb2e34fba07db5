//! ALU class: register/immediate arithmetic, logicals, multiply, divide,
//! variable shifts and conditional selects.
//!
//! Flag-setting forms are matched before their plain counterparts; the
//! compare aliases (rd == 31 on ADDS/SUBS/ANDS) are deliberately left to
//! the compare class. Operand 2 is always routed through the scratch
//! register so shifted, extended and inverted forms share one shape.

use arx_cpu_core::flags::{nzcv_add, nzcv_logical, nzcv_sbc, nzcv_sub, PSTATE_C};
use arx_cpu_core::state::abi;
use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp, ShiftOp, X86Cond};
use arx_emit::Reg;
use arx_types::{Cond, ShiftKind, Width};

use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::decode::decode_bit_masks;
use crate::regmap::{host_gpr, SCRATCH, SCRATCH2};

/// MOV reg, 0 via C7 /0: does not disturb host flags, unlike XOR.
pub(crate) fn emit_zero_noflags(buf: &mut arx_emit::CodeBuffer, rexw: bool, reg: Reg) {
    let opc = if rexw {
        x86::OPC_MOVL_EvIz | x86::P_REXW
    } else {
        x86::OPC_MOVL_EvIz
    };
    x86::emit_modrm_ext(buf, opc, 0, reg);
    buf.emit_u32(0);
}

/// Shadow value of the shifted-register operand 2.
pub(crate) fn op2_shifted_shadow<B: GuestBus>(ctx: &DisasContext<'_, B>, width: Width) -> u64 {
    let insn = ctx.insn;
    let kind = ShiftKind::from_bits(insn.bits(22, 23));
    kind.apply(ctx.state.xr(insn.rm()), insn.imm6(), width)
}

/// Emit the shifted-register operand 2 into the scratch register.
pub(crate) fn emit_op2_shifted<B: GuestBus>(ctx: &mut DisasContext<'_, B>, width: Width) {
    let insn = ctx.insn;
    let rexw = width.is_64();
    let rm = insn.rm();
    if rm == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rm));
    }
    let amount = (insn.imm6() % width.bits()) as u8;
    if amount != 0 {
        let op = match ShiftKind::from_bits(insn.bits(22, 23)) {
            ShiftKind::Lsl => ShiftOp::Shl,
            ShiftKind::Lsr => ShiftOp::Shr,
            ShiftKind::Asr => ShiftOp::Sar,
            ShiftKind::Ror => ShiftOp::Ror,
        };
        x86::emit_shift_ri(ctx.buf, op, rexw, SCRATCH, amount);
    }
}

/// Shadow value of the extended-register operand 2 (UXTB..SXTX + LSL).
pub(crate) fn op2_extended_shadow<B: GuestBus>(ctx: &DisasContext<'_, B>, width: Width) -> u64 {
    let insn = ctx.insn;
    let raw = ctx.state.xr(insn.rm());
    let option = insn.bits(13, 15);
    let shift = insn.bits(10, 12);
    let extended = match option {
        0 => u64::from(raw as u8),
        1 => u64::from(raw as u16),
        2 => u64::from(raw as u32),
        3 => raw,
        4 => (raw as u8 as i8) as i64 as u64,
        5 => (raw as u16 as i16) as i64 as u64,
        6 => (raw as u32 as i32) as i64 as u64,
        _ => raw,
    };
    (extended << shift) & width.mask()
}

/// Emit the extended-register operand 2 into the scratch register.
pub(crate) fn emit_op2_extended<B: GuestBus>(ctx: &mut DisasContext<'_, B>, width: Width) {
    let insn = ctx.insn;
    let rexw = width.is_64();
    let rm = insn.rm();
    let option = insn.bits(13, 15);
    let shift = insn.bits(10, 12) as u8;

    if rm == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        let src = host_gpr(rm);
        match option {
            0 => x86::emit_movzx8(ctx.buf, SCRATCH, src),
            1 => x86::emit_movzx16(ctx.buf, SCRATCH, src),
            2 => x86::emit_mov_rr(ctx.buf, false, SCRATCH, src),
            4 => x86::emit_movsx8(ctx.buf, rexw, SCRATCH, src),
            5 => x86::emit_movsx16(ctx.buf, rexw, SCRATCH, src),
            6 => x86::emit_movsxd(ctx.buf, SCRATCH, src),
            _ => x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, src),
        }
    }
    if shift != 0 {
        x86::emit_shift_ri(ctx.buf, ShiftOp::Shl, rexw, SCRATCH, shift);
    }
}

/// Move the rn operand into the destination host register (rn == 31 reads
/// as zero in register-operand forms).
fn emit_rn_to_dst<B: GuestBus>(ctx: &mut DisasContext<'_, B>, rexw: bool, rd: u8, rn: u8) {
    let dst = host_gpr(rd);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, dst, 0);
    } else if host_gpr(rn) != dst {
        x86::emit_mov_rr(ctx.buf, rexw, dst, host_gpr(rn));
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op2 {
    Shifted,
    Extended,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AddKind {
    Add,
    Sub,
}

/// Shared body of ADD/SUB/ADDS/SUBS register forms.
fn addsub_reg<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    kind: AddKind,
    op2: Op2,
    set_flags: bool,
) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    if set_flags && rd == 31 {
        // CMP/CMN alias; the compare class owns it.
        return Err(ClassMiss);
    }

    let op1 = ctx.state.xr(rn);
    let op2_val = match op2 {
        Op2::Shifted => op2_shifted_shadow(ctx, width),
        Op2::Extended => op2_extended_shadow(ctx, width),
    };
    let result = match kind {
        AddKind::Add => op1.wrapping_add(op2_val),
        AddKind::Sub => op1.wrapping_sub(op2_val),
    };
    ctx.state.set_xr_w(width, rd, result);
    if set_flags {
        let nzcv = match kind {
            AddKind::Add => nzcv_add(op1, op2_val, false, width),
            AddKind::Sub => nzcv_sub(op1, op2_val, width),
        };
        ctx.set_shadow_nzcv(nzcv);
    }

    let rexw = width.is_64();
    match op2 {
        Op2::Shifted => emit_op2_shifted(ctx, width),
        Op2::Extended => emit_op2_extended(ctx, width),
    }
    emit_rn_to_dst(ctx, rexw, rd, rn);
    let arith = match kind {
        AddKind::Add => ArithOp::Add,
        AddKind::Sub => ArithOp::Sub,
    };
    x86::emit_arith_rr(ctx.buf, arith, rexw, host_gpr(rd), SCRATCH);
    if set_flags {
        ctx.emit_pstate_from_host_flags(kind == AddKind::Sub);
    }
    Ok(Outcome::Continue)
}

/// ADD/SUB/ADDS/SUBS immediate, including the SP-relative forms.
fn addsub_imm<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    kind: AddKind,
    set_flags: bool,
) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    if set_flags && rd == 31 {
        return Err(ClassMiss);
    }
    let imm = u64::from(insn.imm12()) << if insn.bit(22) { 12 } else { 0 };

    let op1 = ctx.state.xr_sp(rn);
    let result = match kind {
        AddKind::Add => op1.wrapping_add(imm),
        AddKind::Sub => op1.wrapping_sub(imm),
    };
    if set_flags {
        ctx.state.set_xr_w(width, rd, result);
        let nzcv = match kind {
            AddKind::Add => nzcv_add(op1, imm, false, width),
            AddKind::Sub => nzcv_sub(op1, imm, width),
        };
        ctx.set_shadow_nzcv(nzcv);
    } else {
        // Non-flag-setting immediate forms treat rd == 31 as SP.
        ctx.state.set_xr_sp(rd, result & width.mask());
    }

    let rexw = width.is_64();
    let arith = match kind {
        AddKind::Add => ArithOp::Add,
        AddKind::Sub => ArithOp::Sub,
    };
    if rd == 31 && !set_flags {
        // SP destination: compute in scratch, store to the SP slot.
        ctx.emit_ctx_to_scratch();
        x86::emit_push(ctx.buf, SCRATCH2);
        if rn == 31 {
            x86::emit_load(ctx.buf, true, SCRATCH2, SCRATCH, abi::CPU_SP_OFF);
        } else {
            x86::emit_mov_rr(ctx.buf, true, SCRATCH2, host_gpr(rn));
        }
        x86::emit_arith_ri(ctx.buf, arith, rexw, SCRATCH2, imm as i32);
        x86::emit_store(ctx.buf, true, SCRATCH2, SCRATCH, abi::CPU_SP_OFF);
        x86::emit_pop(ctx.buf, SCRATCH2);
    } else {
        let dst = host_gpr(rd);
        if rn == 31 {
            ctx.emit_ctx_to_scratch();
            x86::emit_load(ctx.buf, true, dst, SCRATCH, abi::CPU_SP_OFF);
        } else if host_gpr(rn) != dst {
            x86::emit_mov_rr(ctx.buf, rexw, dst, host_gpr(rn));
        }
        x86::emit_arith_ri(ctx.buf, arith, rexw, dst, imm as i32);
        if set_flags {
            ctx.emit_pstate_from_host_flags(kind == AddKind::Sub);
        }
    }
    Ok(Outcome::Continue)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LogicOp {
    And,
    Orr,
    Eor,
}

/// Logical shifted-register family (plus the inverted-operand forms).
fn logical_reg<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    op: LogicOp,
    invert: bool,
    set_flags: bool,
) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    if set_flags && rd == 31 {
        // TST alias; the compare class owns it.
        return Err(ClassMiss);
    }

    let op1 = ctx.state.xr(rn);
    let mut op2 = op2_shifted_shadow(ctx, width);
    if invert {
        op2 = !op2 & width.mask();
    }
    let result = match op {
        LogicOp::And => op1 & op2,
        LogicOp::Orr => op1 | op2,
        LogicOp::Eor => op1 ^ op2,
    } & width.mask();
    ctx.state.set_xr_w(width, rd, result);
    if set_flags {
        ctx.set_shadow_nzcv(nzcv_logical(result, width));
    }

    let rexw = width.is_64();
    emit_op2_shifted(ctx, width);
    if invert {
        x86::emit_not(ctx.buf, rexw, SCRATCH);
    }
    emit_rn_to_dst(ctx, rexw, rd, rn);
    let arith = match op {
        LogicOp::And => ArithOp::And,
        LogicOp::Orr => ArithOp::Or,
        LogicOp::Eor => ArithOp::Xor,
    };
    x86::emit_arith_rr(ctx.buf, arith, rexw, host_gpr(rd), SCRATCH);
    if set_flags {
        ctx.emit_pstate_from_host_flags(false);
    }
    Ok(Outcome::Continue)
}

/// Logical immediate family. Reserved bitmask encodings miss the class.
fn logical_imm<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    op: LogicOp,
    set_flags: bool,
) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    if set_flags && rd == 31 {
        return Err(ClassMiss);
    }
    let Some(mask) = decode_bit_masks(insn.bit(22), insn.immr(), insn.imms(), width) else {
        return Err(ClassMiss);
    };

    let op1 = ctx.state.xr(rn);
    let result = match op {
        LogicOp::And => op1 & mask,
        LogicOp::Orr => op1 | mask,
        LogicOp::Eor => op1 ^ mask,
    } & width.mask();
    if set_flags {
        ctx.state.set_xr_w(width, rd, result);
        ctx.set_shadow_nzcv(nzcv_logical(result, width));
    } else {
        // rd == 31 selects SP for the plain logical immediates.
        ctx.state.set_xr_sp(rd, result);
    }

    let rexw = width.is_64();
    let arith = match op {
        LogicOp::And => ArithOp::And,
        LogicOp::Orr => ArithOp::Or,
        LogicOp::Eor => ArithOp::Xor,
    };
    if rd == 31 && !set_flags {
        // SP destination: compute rn OP mask in rax/rdx, store to SP.
        ctx.emit_ctx_to_scratch();
        x86::emit_push(ctx.buf, Reg::Rax);
        x86::emit_push(ctx.buf, Reg::Rdx);
        if rn == 31 {
            x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
        } else {
            x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
        }
        x86::emit_mov_ri(ctx.buf, rexw, Reg::Rdx, mask);
        x86::emit_arith_rr(ctx.buf, arith, rexw, Reg::Rax, Reg::Rdx);
        x86::emit_store(ctx.buf, true, Reg::Rax, SCRATCH, abi::CPU_SP_OFF);
        x86::emit_pop(ctx.buf, Reg::Rdx);
        x86::emit_pop(ctx.buf, Reg::Rax);
    } else {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, mask);
        emit_rn_to_dst(ctx, rexw, rd, rn);
        x86::emit_arith_rr(ctx.buf, arith, rexw, host_gpr(rd), SCRATCH);
        if set_flags {
            ctx.emit_pstate_from_host_flags(false);
        }
    }
    Ok(Outcome::Continue)
}

/// ADC/ADCS/SBC/SBCS.
fn addsub_carry<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    sub: bool,
    set_flags: bool,
) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());

    let carry = ctx.state.pstate & PSTATE_C != 0;
    let op1 = ctx.state.xr(rn);
    let op2 = ctx.state.xr(rm);
    let effective = if sub { !op2 & width.mask() } else { op2 };
    let result = op1
        .wrapping_add(effective)
        .wrapping_add(u64::from(carry))
        & width.mask();
    ctx.state.set_xr_w(width, rd, result);
    if set_flags {
        let nzcv = if sub {
            nzcv_sbc(op1, op2, carry, width)
        } else {
            nzcv_add(op1, op2, carry, width)
        };
        ctx.set_shadow_nzcv(nzcv);
    }

    // Both directions lower to ADC: SBC is op1 + ~op2 + C, which also makes
    // the host carry-out match the A64 convention without inversion.
    let rexw = width.is_64();
    ctx.emit_carry_in_to_host_cf();
    if rm == 31 {
        // MOV preserves CF where XOR would not.
        emit_zero_noflags(ctx.buf, rexw, SCRATCH);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rm));
    }
    if sub {
        x86::emit_not(ctx.buf, rexw, SCRATCH);
    }
    // rn move must not disturb the loaded CF.
    let dst = host_gpr(rd);
    if rn == 31 {
        emit_zero_noflags(ctx.buf, rexw, dst);
    } else if host_gpr(rn) != dst {
        x86::emit_mov_rr(ctx.buf, rexw, dst, host_gpr(rn));
    }
    x86::emit_arith_rr(ctx.buf, ArithOp::Adc, rexw, host_gpr(rd), SCRATCH);
    if set_flags {
        ctx.emit_pstate_from_host_flags(false);
    }
    Ok(Outcome::Continue)
}

/// MADD/MSUB (MUL and MNEG are the ra == 31 cases).
fn madd_msub<B: GuestBus>(ctx: &mut DisasContext<'_, B>, sub: bool) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn, rm, ra) = (insn.rd(), insn.rn(), insn.rm(), insn.ra());

    let product = ctx.state.xr(rn).wrapping_mul(ctx.state.xr(rm));
    let acc = ctx.state.xr(ra);
    let result = if sub {
        acc.wrapping_sub(product)
    } else {
        acc.wrapping_add(product)
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    if rn == 31 || rm == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rn));
        x86::emit_imul_rr(ctx.buf, rexw, SCRATCH, host_gpr(rm));
    }
    if sub {
        x86::emit_neg(ctx.buf, rexw, SCRATCH);
    }
    if ra != 31 {
        x86::emit_arith_rr(ctx.buf, ArithOp::Add, rexw, SCRATCH, host_gpr(ra));
    }
    x86::emit_mov_rr(ctx.buf, rexw, host_gpr(rd), SCRATCH);
    Ok(Outcome::Continue)
}

/// UDIV/SDIV with the architectural zero-divisor result.
fn divide<B: GuestBus>(ctx: &mut DisasContext<'_, B>, signed: bool) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());

    let dividend = ctx.state.xr(rn) & width.mask();
    let divisor = ctx.state.xr(rm) & width.mask();
    let result = if divisor == 0 {
        0
    } else if signed {
        match width {
            Width::W32 => (dividend as u32 as i32).wrapping_div(divisor as u32 as i32) as u32 as u64,
            Width::W64 => (dividend as i64).wrapping_div(divisor as i64) as u64,
        }
    } else {
        match width {
            Width::W32 => u64::from((dividend as u32) / (divisor as u32)),
            Width::W64 => dividend / divisor,
        }
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    let dst = host_gpr(rd);
    // Divisor into scratch, test for the architectural zero path.
    if rm == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rm));
    }
    x86::emit_test_rr(ctx.buf, rexw, SCRATCH, SCRATCH);
    let jz_zero = x86::emit_jcc_placeholder(ctx.buf, X86Cond::E);

    x86::emit_push(ctx.buf, Reg::Rax);
    x86::emit_push(ctx.buf, Reg::Rdx);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
    }
    if signed {
        if rexw {
            x86::emit_cqo(ctx.buf);
        } else {
            x86::emit_cdq(ctx.buf);
        }
        x86::emit_idiv(ctx.buf, rexw, SCRATCH);
    } else {
        x86::emit_mov_ri(ctx.buf, false, Reg::Rdx, 0);
        x86::emit_div(ctx.buf, rexw, SCRATCH);
    }
    x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, Reg::Rax);
    x86::emit_pop(ctx.buf, Reg::Rdx);
    x86::emit_pop(ctx.buf, Reg::Rax);
    x86::emit_mov_rr(ctx.buf, rexw, dst, SCRATCH);
    let jmp_done = x86::emit_jmp_placeholder(ctx.buf);

    let zero_path = ctx.buf.offset();
    x86::emit_mov_ri(ctx.buf, rexw, dst, 0);
    let done = ctx.buf.offset();
    x86::patch_rel32(ctx.buf, jz_zero, zero_path);
    x86::patch_rel32(ctx.buf, jmp_done, done);
    Ok(Outcome::Continue)
}

/// LSLV/LSRV/ASRV/RORV: shift by the low bits of rm.
fn shift_variable<B: GuestBus>(ctx: &mut DisasContext<'_, B>, op: ShiftKind) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());

    let amount = (ctx.state.xr(rm) % u64::from(width.bits())) as u32;
    let result = op.apply(ctx.state.xr(rn), amount, width);
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    let host_op = match op {
        ShiftKind::Lsl => ShiftOp::Shl,
        ShiftKind::Lsr => ShiftOp::Shr,
        ShiftKind::Asr => ShiftOp::Sar,
        ShiftKind::Ror => ShiftOp::Ror,
    };
    x86::emit_push(ctx.buf, Reg::Rcx);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, SCRATCH, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rn));
    }
    if rm == 31 {
        x86::emit_mov_ri(ctx.buf, false, Reg::Rcx, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, true, Reg::Rcx, host_gpr(rm));
    }
    // The host masks CL to the operand width, matching the A64 modulo.
    x86::emit_shift_cl(ctx.buf, host_op, rexw, SCRATCH);
    x86::emit_pop(ctx.buf, Reg::Rcx);
    x86::emit_mov_rr(ctx.buf, rexw, host_gpr(rd), SCRATCH);
    Ok(Outcome::Continue)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SelOp {
    Sel,
    Inc,
    Inv,
    Neg,
}

/// CSEL/CSINC/CSINV/CSNEG.
fn cond_select<B: GuestBus>(ctx: &mut DisasContext<'_, B>, op: SelOp) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());
    let cond = insn.cond_sel();

    let else_val = {
        let raw = ctx.state.xr(rm);
        match op {
            SelOp::Sel => raw,
            SelOp::Inc => raw.wrapping_add(1),
            SelOp::Inv => !raw,
            SelOp::Neg => raw.wrapping_neg(),
        }
    } & width.mask();
    let result = if arx_cpu_core::flags::cond_holds(ctx.state.pstate, cond) {
        ctx.state.xr(rn) & width.mask()
    } else {
        else_val
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    // Load guest flags first: everything after must leave host flags alone.
    ctx.emit_host_flags_from_pstate(); // clobbers scratch
    x86::emit_push(ctx.buf, SCRATCH2);
    // else-value in rax (flag-neutral transforms only).
    if rm == 31 {
        emit_zero_noflags(ctx.buf, rexw, SCRATCH2);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH2, host_gpr(rm));
    }
    match op {
        SelOp::Sel => {}
        SelOp::Inc => x86::emit_lea(ctx.buf, rexw, SCRATCH2, SCRATCH2, 1),
        SelOp::Inv => x86::emit_not(ctx.buf, rexw, SCRATCH2),
        SelOp::Neg => {
            // Two's complement without touching flags: NOT then LEA +1.
            x86::emit_not(ctx.buf, rexw, SCRATCH2);
            x86::emit_lea(ctx.buf, rexw, SCRATCH2, SCRATCH2, 1);
        }
    }
    // then-value in scratch.
    if rn == 31 {
        emit_zero_noflags(ctx.buf, rexw, SCRATCH);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, host_gpr(rn));
    }
    match X86Cond::from_guest(cond.invert()) {
        Some(cc) if cond != Cond::Al && cond != Cond::Nv => {
            x86::emit_cmovcc(ctx.buf, cc, rexw, SCRATCH, SCRATCH2);
        }
        _ => {}
    }
    x86::emit_pop(ctx.buf, SCRATCH2);
    x86::emit_mov_rr(ctx.buf, rexw, host_gpr(rd), SCRATCH);
    Ok(Outcome::Continue)
}

/// CLZ: count leading zeros, lowered to BSR with an explicit zero path.
fn clz<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    let bits = u64::from(width.bits());

    let value = ctx.state.xr(rn) & width.mask();
    let result = if value == 0 {
        bits
    } else {
        u64::from(value.leading_zeros()) - (64 - bits)
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    x86::emit_push(ctx.buf, Reg::Rax);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
    }
    x86::emit_test_rr(ctx.buf, rexw, Reg::Rax, Reg::Rax);
    let jz = x86::emit_jcc_placeholder(ctx.buf, X86Cond::E);
    x86::emit_bsr(ctx.buf, rexw, SCRATCH, Reg::Rax);
    x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, bits - 1);
    x86::emit_arith_rr(ctx.buf, ArithOp::Sub, rexw, Reg::Rax, SCRATCH);
    let done = x86::emit_jmp_placeholder(ctx.buf);
    let zero_path = ctx.buf.offset();
    x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, bits);
    let end = ctx.buf.offset();
    x86::patch_rel32(ctx.buf, jz, zero_path);
    x86::patch_rel32(ctx.buf, done, end);
    x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, Reg::Rax);
    x86::emit_pop(ctx.buf, Reg::Rax);
    x86::emit_mov_rr(ctx.buf, rexw, host_gpr(rd), SCRATCH);
    Ok(Outcome::Continue)
}

/// One swap round of the RBIT/REV16 lowering:
/// `x = ((x >> s) & m) | ((x & m) << s)` with x in rax, mask via rdx.
fn emit_swap_round<B: GuestBus>(ctx: &mut DisasContext<'_, B>, rexw: bool, shift: u8, mask: u64) {
    x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, Reg::Rax);
    x86::emit_shift_ri(ctx.buf, ShiftOp::Shr, rexw, SCRATCH, shift);
    x86::emit_mov_ri(ctx.buf, rexw, Reg::Rdx, mask);
    x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, SCRATCH, Reg::Rdx);
    x86::emit_arith_rr(ctx.buf, ArithOp::And, rexw, Reg::Rax, Reg::Rdx);
    x86::emit_shift_ri(ctx.buf, ShiftOp::Shl, rexw, Reg::Rax, shift);
    x86::emit_arith_rr(ctx.buf, ArithOp::Or, rexw, Reg::Rax, SCRATCH);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RevKind {
    Rbit,
    Rev16,
    Rev32,
    Rev,
}

/// RBIT and the byte-reverse family.
fn reverse<B: GuestBus>(ctx: &mut DisasContext<'_, B>, kind: RevKind) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let (rd, rn) = (insn.rd(), insn.rn());
    let value = ctx.state.xr(rn) & width.mask();

    let result = match (kind, width) {
        (RevKind::Rbit, Width::W32) => u64::from((value as u32).reverse_bits()),
        (RevKind::Rbit, Width::W64) => value.reverse_bits(),
        (RevKind::Rev16, _) => {
            let m = 0x00FF_00FF_00FF_00FF & width.mask();
            ((value >> 8) & m) | ((value & m) << 8)
        }
        (RevKind::Rev32, _) => {
            let lo = u64::from((value as u32).swap_bytes());
            let hi = u64::from(((value >> 32) as u32).swap_bytes());
            lo | (hi << 32)
        }
        (RevKind::Rev, Width::W32) => u64::from((value as u32).swap_bytes()),
        (RevKind::Rev, Width::W64) => value.swap_bytes(),
    };
    ctx.state.set_xr_w(width, rd, result);

    let rexw = width.is_64();
    x86::emit_push(ctx.buf, Reg::Rax);
    x86::emit_push(ctx.buf, Reg::Rdx);
    if rn == 31 {
        x86::emit_mov_ri(ctx.buf, rexw, Reg::Rax, 0);
    } else {
        x86::emit_mov_rr(ctx.buf, rexw, Reg::Rax, host_gpr(rn));
    }
    match kind {
        RevKind::Rbit => {
            // Bit-reverse each byte, then reverse the bytes.
            emit_swap_round(ctx, rexw, 1, 0x5555_5555_5555_5555 & width.mask());
            emit_swap_round(ctx, rexw, 2, 0x3333_3333_3333_3333 & width.mask());
            emit_swap_round(ctx, rexw, 4, 0x0F0F_0F0F_0F0F_0F0F & width.mask());
            x86::emit_bswap(ctx.buf, rexw, Reg::Rax);
        }
        RevKind::Rev16 => {
            emit_swap_round(ctx, rexw, 8, 0x00FF_00FF_00FF_00FF & width.mask());
        }
        RevKind::Rev32 => {
            x86::emit_bswap(ctx.buf, true, Reg::Rax);
            x86::emit_shift_ri(ctx.buf, ShiftOp::Ror, true, Reg::Rax, 32);
        }
        RevKind::Rev => {
            x86::emit_bswap(ctx.buf, rexw, Reg::Rax);
        }
    }
    x86::emit_mov_rr(ctx.buf, rexw, SCRATCH, Reg::Rax);
    x86::emit_pop(ctx.buf, Reg::Rdx);
    x86::emit_pop(ctx.buf, Reg::Rax);
    x86::emit_mov_rr(ctx.buf, rexw, host_gpr(rd), SCRATCH);
    Ok(Outcome::Continue)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    // Flag-setting forms first: they share low-order bits with the plain
    // forms and must win.
    if insn.matches(0x7F20_0000, 0x2B00_0000) {
        return addsub_reg(ctx, AddKind::Add, Op2::Shifted, true);
    }
    if insn.matches(0x7FE0_0000, 0x2B20_0000) {
        return addsub_reg(ctx, AddKind::Add, Op2::Extended, true);
    }
    if insn.matches(0x7F20_0000, 0x6B00_0000) {
        return addsub_reg(ctx, AddKind::Sub, Op2::Shifted, true);
    }
    if insn.matches(0x7FE0_0000, 0x6B20_0000) {
        return addsub_reg(ctx, AddKind::Sub, Op2::Extended, true);
    }
    if insn.matches(0x7F00_0000, 0x3100_0000) {
        return addsub_imm(ctx, AddKind::Add, true);
    }
    if insn.matches(0x7F00_0000, 0x7100_0000) {
        return addsub_imm(ctx, AddKind::Sub, true);
    }
    if insn.matches(0x7F20_0000, 0x6A00_0000) {
        return logical_reg(ctx, LogicOp::And, false, true);
    }
    if insn.matches(0x7F20_0000, 0x6A20_0000) {
        return logical_reg(ctx, LogicOp::And, true, true); // BICS
    }
    if insn.matches(0x7F80_0000, 0x7200_0000) {
        return logical_imm(ctx, LogicOp::And, true);
    }
    if insn.matches(0x7FE0_FC00, 0x3A00_0000) {
        return addsub_carry(ctx, false, true); // ADCS
    }
    if insn.matches(0x7FE0_FC00, 0x7A00_0000) {
        return addsub_carry(ctx, true, true); // SBCS
    }

    // Plain arithmetic.
    if insn.matches(0x7F20_0000, 0x0B00_0000) {
        return addsub_reg(ctx, AddKind::Add, Op2::Shifted, false);
    }
    if insn.matches(0x7FE0_0000, 0x0B20_0000) {
        return addsub_reg(ctx, AddKind::Add, Op2::Extended, false);
    }
    if insn.matches(0x7F20_0000, 0x4B00_0000) {
        return addsub_reg(ctx, AddKind::Sub, Op2::Shifted, false);
    }
    if insn.matches(0x7FE0_0000, 0x4B20_0000) {
        return addsub_reg(ctx, AddKind::Sub, Op2::Extended, false);
    }
    if insn.matches(0x7F00_0000, 0x1100_0000) {
        return addsub_imm(ctx, AddKind::Add, false);
    }
    if insn.matches(0x7F00_0000, 0x5100_0000) {
        return addsub_imm(ctx, AddKind::Sub, false);
    }
    if insn.matches(0x7FE0_FC00, 0x1A00_0000) {
        return addsub_carry(ctx, false, false); // ADC
    }
    if insn.matches(0x7FE0_FC00, 0x5A00_0000) {
        return addsub_carry(ctx, true, false); // SBC
    }

    // Logicals (MVN is ORN with rn == 31, MOV reg is ORR with rn == 31).
    if insn.matches(0x7F20_0000, 0x0A00_0000) {
        return logical_reg(ctx, LogicOp::And, false, false);
    }
    if insn.matches(0x7F20_0000, 0x0A20_0000) {
        return logical_reg(ctx, LogicOp::And, true, false); // BIC
    }
    if insn.matches(0x7F20_0000, 0x2A00_0000) {
        return logical_reg(ctx, LogicOp::Orr, false, false);
    }
    if insn.matches(0x7F20_0000, 0x2A20_0000) {
        return logical_reg(ctx, LogicOp::Orr, true, false); // ORN/MVN
    }
    if insn.matches(0x7F20_0000, 0x4A00_0000) {
        return logical_reg(ctx, LogicOp::Eor, false, false);
    }
    if insn.matches(0x7F20_0000, 0x4A20_0000) {
        return logical_reg(ctx, LogicOp::Eor, true, false); // EON
    }
    if insn.matches(0x7F80_0000, 0x1200_0000) {
        return logical_imm(ctx, LogicOp::And, false);
    }
    if insn.matches(0x7F80_0000, 0x3200_0000) {
        return logical_imm(ctx, LogicOp::Orr, false);
    }
    if insn.matches(0x7F80_0000, 0x5200_0000) {
        return logical_imm(ctx, LogicOp::Eor, false);
    }

    // Multiply / divide / variable shifts / conditional select.
    if insn.matches(0x7FE0_8000, 0x1B00_0000) {
        return madd_msub(ctx, false);
    }
    if insn.matches(0x7FE0_8000, 0x1B00_8000) {
        return madd_msub(ctx, true);
    }
    if insn.matches(0x7FE0_FC00, 0x1AC0_0800) {
        return divide(ctx, false);
    }
    if insn.matches(0x7FE0_FC00, 0x1AC0_0C00) {
        return divide(ctx, true);
    }
    if insn.matches(0x7FE0_FC00, 0x1AC0_2000) {
        return shift_variable(ctx, ShiftKind::Lsl);
    }
    if insn.matches(0x7FE0_FC00, 0x1AC0_2400) {
        return shift_variable(ctx, ShiftKind::Lsr);
    }
    if insn.matches(0x7FE0_FC00, 0x1AC0_2800) {
        return shift_variable(ctx, ShiftKind::Asr);
    }
    if insn.matches(0x7FE0_FC00, 0x1AC0_2C00) {
        return shift_variable(ctx, ShiftKind::Ror);
    }
    if insn.matches(0x7FE0_0C00, 0x1A80_0000) {
        return cond_select(ctx, SelOp::Sel);
    }
    if insn.matches(0x7FE0_0C00, 0x1A80_0400) {
        return cond_select(ctx, SelOp::Inc);
    }
    if insn.matches(0x7FE0_0C00, 0x5A80_0000) {
        return cond_select(ctx, SelOp::Inv);
    }
    if insn.matches(0x7FE0_0C00, 0x5A80_0400) {
        return cond_select(ctx, SelOp::Neg);
    }

    // Data-processing 1-source.
    if insn.matches(0x7FFF_FC00, 0x5AC0_1000) {
        return clz(ctx);
    }
    if insn.matches(0x7FFF_FC00, 0x5AC0_0000) {
        return reverse(ctx, RevKind::Rbit);
    }
    if insn.matches(0x7FFF_FC00, 0x5AC0_0400) {
        return reverse(ctx, RevKind::Rev16);
    }
    if insn.matches(0xFFFF_FC00, 0x5AC0_0800) {
        return reverse(ctx, RevKind::Rev); // REV Wd
    }
    if insn.matches(0xFFFF_FC00, 0xDAC0_0800) {
        return reverse(ctx, RevKind::Rev32);
    }
    if insn.matches(0xFFFF_FC00, 0xDAC0_0C00) {
        return reverse(ctx, RevKind::Rev); // REV Xd
    }

    Err(ClassMiss)
}
