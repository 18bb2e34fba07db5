//! Scalar FP class: arithmetic, square root, absolute/negate via sign
//! masks, fused multiply-add lowered to MUL+ADD pairs, compares, moves and
//! integer conversions.
//!
//! Single precision uses the F3-prefixed SS opcodes, double precision the
//! F2-prefixed SD opcodes; the element size comes from bit 22. The result
//! register semantics follow the emitted form: `MOVAPS rd, rn` then the
//! lane-0 operation, so the upper lanes of rd take rn's upper lanes.
//! FMAXNM/FMINNM are lowered to plain FMAX/FMIN (NaN behavior deviates).

use arx_cpu_core::flags::{PSTATE_C, PSTATE_N, PSTATE_V, PSTATE_Z};
use arx_cpu_core::state::abi;
use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, X86Cond};
use arx_emit::Reg;
use arx_types::Width;

use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, host_xmm, SCRATCH, SCRATCH_XMM};

const LANE32_MASK: u128 = 0xFFFF_FFFF;
const LANE64_MASK: u128 = 0xFFFF_FFFF_FFFF_FFFF;

/// Sign-bit / magnitude masks confined to lane 0 so the scalar form leaves
/// the upper lanes alone.
const SIGN32: u128 = 0x8000_0000;
const SIGN64: u128 = 0x8000_0000_0000_0000;
const ABS32: u128 = !SIGN32;
const ABS64: u128 = !SIGN64;

fn s0(v: u128) -> f32 {
    f32::from_bits(v as u32)
}

fn d0(v: u128) -> f64 {
    f64::from_bits(v as u64)
}

fn merge32(base: u128, lane: f32) -> u128 {
    (base & !LANE32_MASK) | u128::from(lane.to_bits())
}

fn merge64(base: u128, lane: f64) -> u128 {
    (base & !LANE64_MASK) | u128::from(lane.to_bits())
}

/// Opcode for a scalar/packed FP op at the requested precision.
fn fp_opc(base: u32, double: bool, scalar: bool) -> u32 {
    base | if scalar {
        if double {
            x86::P_SIMDF2
        } else {
            x86::P_SIMDF3
        }
    } else if double {
        x86::P_DATA16
    } else {
        0
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Bin {
    Mul,
    Div,
    Add,
    Sub,
    Max,
    Min,
    Nmul,
}

fn binary<B: GuestBus>(ctx: &mut DisasContext<'_, B>, op: Bin, double: bool) -> TransResult {
    let insn = ctx.insn;
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());

    let vn = ctx.state.v[rn as usize];
    let vm = ctx.state.v[rm as usize];
    let result = if double {
        let (a, b) = (d0(vn), d0(vm));
        let r = match op {
            Bin::Mul => a * b,
            Bin::Div => a / b,
            Bin::Add => a + b,
            Bin::Sub => a - b,
            Bin::Max => a.max(b),
            Bin::Min => a.min(b),
            Bin::Nmul => -(a * b),
        };
        merge64(vn, r)
    } else {
        let (a, b) = (s0(vn), s0(vm));
        let r = match op {
            Bin::Mul => a * b,
            Bin::Div => a / b,
            Bin::Add => a + b,
            Bin::Sub => a - b,
            Bin::Max => a.max(b),
            Bin::Min => a.min(b),
            Bin::Nmul => -(a * b),
        };
        merge32(vn, r)
    };
    ctx.state.v[rd as usize] = result;

    let (xd, xn, xm) = (host_xmm(rd), host_xmm(rn), host_xmm(rm));
    let copy = if double {
        x86::OPC_MOVAPD
    } else {
        x86::OPC_MOVAPS
    };
    if xd != xn {
        x86::emit_sse_rr(ctx.buf, copy, xd, xn);
    }
    let base = match op {
        Bin::Mul | Bin::Nmul => x86::OPC_FP_MUL,
        Bin::Div => x86::OPC_FP_DIV,
        Bin::Add => x86::OPC_FP_ADD,
        Bin::Sub => x86::OPC_FP_SUB,
        Bin::Max => x86::OPC_FP_MAX,
        Bin::Min => x86::OPC_FP_MIN,
    };
    x86::emit_sse_rr(ctx.buf, fp_opc(base, double, true), xd, xm);
    if op == Bin::Nmul {
        let mask = if double { SIGN64 } else { SIGN32 };
        let at = x86::emit_sse_rip(ctx.buf, fp_opc(x86::OPC_XORPS, double, false), xd);
        ctx.pool.reference(mask, at);
    }
    Ok(Outcome::Continue)
}

fn unary<B: GuestBus>(ctx: &mut DisasContext<'_, B>, opcode: u32, double: bool) -> TransResult {
    let insn = ctx.insn;
    let (rd, rn) = (insn.rd(), insn.rn());
    let vn = ctx.state.v[rn as usize];
    let (xd, xn) = (host_xmm(rd), host_xmm(rn));
    let copy = if double {
        x86::OPC_MOVAPD
    } else {
        x86::OPC_MOVAPS
    };

    match opcode {
        // FMOV register.
        0b000000 => {
            ctx.state.v[rd as usize] = vn;
            if xd != xn {
                x86::emit_sse_rr(ctx.buf, copy, xd, xn);
            }
        }
        // FABS.
        0b000001 => {
            let result = if double {
                merge64(vn, d0(vn).abs())
            } else {
                merge32(vn, s0(vn).abs())
            };
            ctx.state.v[rd as usize] = result;
            if xd != xn {
                x86::emit_sse_rr(ctx.buf, copy, xd, xn);
            }
            let mask = if double { ABS64 } else { ABS32 };
            let at = x86::emit_sse_rip(ctx.buf, fp_opc(x86::OPC_ANDPS, double, false), xd);
            ctx.pool.reference(mask, at);
        }
        // FNEG.
        0b000010 => {
            let result = if double {
                merge64(vn, -d0(vn))
            } else {
                merge32(vn, -s0(vn))
            };
            ctx.state.v[rd as usize] = result;
            if xd != xn {
                x86::emit_sse_rr(ctx.buf, copy, xd, xn);
            }
            let mask = if double { SIGN64 } else { SIGN32 };
            let at = x86::emit_sse_rip(ctx.buf, fp_opc(x86::OPC_XORPS, double, false), xd);
            ctx.pool.reference(mask, at);
        }
        // FSQRT.
        0b000011 => {
            let result = if double {
                merge64(vn, d0(vn).sqrt())
            } else {
                merge32(vn, s0(vn).sqrt())
            };
            ctx.state.v[rd as usize] = result;
            if xd != xn {
                x86::emit_sse_rr(ctx.buf, copy, xd, xn);
            }
            x86::emit_sse_rr(ctx.buf, fp_opc(x86::OPC_FP_SQRT, double, true), xd, xn);
        }
        // FCVT to the other precision.
        0b000101 if !double => {
            let result = merge64(ctx.state.v[rd as usize], f64::from(s0(vn)));
            ctx.state.v[rd as usize] = result;
            x86::emit_sse_rr(ctx.buf, x86::OPC_CVTSS2SD, xd, xn);
        }
        0b000100 if double => {
            let result = merge32(ctx.state.v[rd as usize], d0(vn) as f32);
            ctx.state.v[rd as usize] = result;
            x86::emit_sse_rr(ctx.buf, x86::OPC_CVTSD2SS, xd, xn);
        }
        _ => return Err(ClassMiss),
    }
    Ok(Outcome::Continue)
}

fn fused<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let double = match insn.size2() {
        0 => false,
        1 => true,
        _ => return Err(ClassMiss),
    };
    let negate_product = insn.bit(21); // o1
    let subtract = insn.bit(15); // o0
    let (rd, rn, rm, ra) = (insn.rd(), insn.rn(), insn.rm(), insn.ra());

    let vn = ctx.state.v[rn as usize];
    let vm = ctx.state.v[rm as usize];
    let va = ctx.state.v[ra as usize];
    // Lowered to MUL + ADD/SUB (no fused rounding):
    //   FMADD  =  a + n*m        FMSUB  =  a - n*m
    //   FNMADD = -a - n*m        FNMSUB = -a + n*m
    let result = if double {
        let prod = d0(vn) * d0(vm);
        let a = d0(va);
        let r = match (negate_product, subtract) {
            (false, false) => a + prod,
            (false, true) => a - prod,
            (true, false) => -a - prod,
            (true, true) => prod - a,
        };
        merge64(vn, r)
    } else {
        let prod = s0(vn) * s0(vm);
        let a = s0(va);
        let r = match (negate_product, subtract) {
            (false, false) => a + prod,
            (false, true) => a - prod,
            (true, false) => -a - prod,
            (true, true) => prod - a,
        };
        merge32(vn, r)
    };
    ctx.state.v[rd as usize] = result;

    let copy = if double {
        x86::OPC_MOVAPD
    } else {
        x86::OPC_MOVAPS
    };
    let sx = SCRATCH_XMM;
    x86::emit_sse_rr(ctx.buf, copy, sx, host_xmm(rn));
    x86::emit_sse_rr(ctx.buf, fp_opc(x86::OPC_FP_MUL, double, true), sx, host_xmm(rm));
    let sign = if double { SIGN64 } else { SIGN32 };
    match (negate_product, subtract) {
        (false, false) => {
            x86::emit_sse_rr(ctx.buf, fp_opc(x86::OPC_FP_ADD, double, true), sx, host_xmm(ra));
        }
        (false, true) => {
            // a - prod: negate the product, then add a.
            let at = x86::emit_sse_rip(ctx.buf, fp_opc(x86::OPC_XORPS, double, false), sx);
            ctx.pool.reference(sign, at);
            x86::emit_sse_rr(ctx.buf, fp_opc(x86::OPC_FP_ADD, double, true), sx, host_xmm(ra));
        }
        (true, false) => {
            // -(a + prod).
            x86::emit_sse_rr(ctx.buf, fp_opc(x86::OPC_FP_ADD, double, true), sx, host_xmm(ra));
            let at = x86::emit_sse_rip(ctx.buf, fp_opc(x86::OPC_XORPS, double, false), sx);
            ctx.pool.reference(sign, at);
        }
        (true, true) => {
            x86::emit_sse_rr(ctx.buf, fp_opc(x86::OPC_FP_SUB, double, true), sx, host_xmm(ra));
        }
    }
    x86::emit_sse_rr(ctx.buf, copy, host_xmm(rd), sx);
    Ok(Outcome::Continue)
}

fn compare<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let double = match insn.size2() {
        0 => false,
        1 => true,
        _ => return Err(ClassMiss),
    };
    let with_zero = insn.bit(3);
    let (rn, rm) = (insn.rn(), insn.rm());

    let vn = ctx.state.v[rn as usize];
    let (a64, b64) = if double {
        (
            d0(vn),
            if with_zero {
                0.0
            } else {
                d0(ctx.state.v[rm as usize])
            },
        )
    } else {
        (
            f64::from(s0(vn)),
            if with_zero {
                0.0
            } else {
                f64::from(s0(ctx.state.v[rm as usize]))
            },
        )
    };
    let nzcv = if a64.is_nan() || b64.is_nan() {
        PSTATE_C | PSTATE_V
    } else if a64 == b64 {
        PSTATE_Z | PSTATE_C
    } else if a64 < b64 {
        PSTATE_N
    } else {
        PSTATE_C
    };
    ctx.set_shadow_nzcv(nzcv);

    // UCOMIS* then translate ZF/PF/CF into NZCV.
    let opc = if double {
        x86::OPC_UCOMISD
    } else {
        x86::OPC_UCOMISS
    };
    let xn = host_xmm(rn);
    if with_zero {
        let sx = SCRATCH_XMM;
        x86::emit_sse_rr(ctx.buf, x86::OPC_XORPS, sx, sx);
        x86::emit_sse_rr(ctx.buf, opc, xn, sx);
    } else {
        x86::emit_sse_rr(ctx.buf, opc, xn, host_xmm(rm));
    }
    let j_unord = x86::emit_jcc_placeholder(ctx.buf, X86Cond::P);
    let j_lt = x86::emit_jcc_placeholder(ctx.buf, X86Cond::B);
    let j_eq = x86::emit_jcc_placeholder(ctx.buf, X86Cond::E);
    x86::emit_mov_ri(ctx.buf, false, SCRATCH, PSTATE_C); // gt
    let j_done_gt = x86::emit_jmp_placeholder(ctx.buf);
    let at_lt = ctx.buf.offset();
    x86::emit_mov_ri(ctx.buf, false, SCRATCH, PSTATE_N);
    let j_done_lt = x86::emit_jmp_placeholder(ctx.buf);
    let at_eq = ctx.buf.offset();
    x86::emit_mov_ri(ctx.buf, false, SCRATCH, PSTATE_Z | PSTATE_C);
    let j_done_eq = x86::emit_jmp_placeholder(ctx.buf);
    let at_unord = ctx.buf.offset();
    x86::emit_mov_ri(ctx.buf, false, SCRATCH, PSTATE_C | PSTATE_V);
    let done = ctx.buf.offset();
    x86::patch_rel32(ctx.buf, j_unord, at_unord);
    x86::patch_rel32(ctx.buf, j_lt, at_lt);
    x86::patch_rel32(ctx.buf, j_eq, at_eq);
    x86::patch_rel32(ctx.buf, j_done_gt, done);
    x86::patch_rel32(ctx.buf, j_done_lt, done);
    x86::patch_rel32(ctx.buf, j_done_eq, done);

    x86::emit_push(ctx.buf, Reg::Rax);
    x86::emit_mov_ri(ctx.buf, true, Reg::Rax, ctx.ctx_addr);
    x86::emit_store(ctx.buf, true, SCRATCH, Reg::Rax, abi::CPU_PSTATE_OFF);
    x86::emit_pop(ctx.buf, Reg::Rax);
    Ok(Outcome::Continue)
}

/// Integer ↔ FP moves and conversions (the rmode:opcode space of the
/// "conversion between float and integer" group).
fn int_fp<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let width = insn.width();
    let double = match insn.size2() {
        0 => false,
        1 => true,
        _ => return Err(ClassMiss),
    };
    let rmode = insn.bits(19, 20);
    let opcode = insn.bits(16, 18);
    let (rd, rn) = (insn.rd(), insn.rn());
    let rexw = width.is_64();

    match (rmode, opcode) {
        // SCVTF / UCVTF.
        (0b00, 0b010) | (0b00, 0b011) => {
            let unsigned = opcode == 0b011;
            let raw = ctx.state.xr(rn) & width.mask();
            let old = ctx.state.v[rd as usize];
            let result = if double {
                let f = if unsigned {
                    raw as f64
                } else {
                    match width {
                        Width::W32 => f64::from(raw as u32 as i32),
                        Width::W64 => raw as i64 as f64,
                    }
                };
                merge64(old, f)
            } else {
                let f = if unsigned {
                    raw as f32
                } else {
                    match width {
                        Width::W32 => raw as u32 as i32 as f32,
                        Width::W64 => raw as i64 as f32,
                    }
                };
                merge32(old, f)
            };
            ctx.state.v[rd as usize] = result;

            // Host CVTSI2* is signed-only; unsigned 64-bit inputs go
            // through the signed path (documented precision deviation for
            // the top-bit range).
            if rn == 31 {
                x86::emit_push(ctx.buf, Reg::Rax);
                x86::emit_mov_ri(ctx.buf, true, Reg::Rax, 0);
                x86::emit_cvtsi2fp(ctx.buf, double, rexw, host_xmm(rd), Reg::Rax);
                x86::emit_pop(ctx.buf, Reg::Rax);
            } else if unsigned && !rexw {
                // Zero-extend through a temp and convert as 64-bit.
                x86::emit_push(ctx.buf, Reg::Rax);
                x86::emit_mov_rr(ctx.buf, false, Reg::Rax, host_gpr(rn));
                x86::emit_cvtsi2fp(ctx.buf, double, true, host_xmm(rd), Reg::Rax);
                x86::emit_pop(ctx.buf, Reg::Rax);
            } else {
                x86::emit_cvtsi2fp(ctx.buf, double, rexw, host_xmm(rd), host_gpr(rn));
            }
        }
        // FCVTZS / FCVTZU.
        (0b11, 0b000) | (0b11, 0b001) => {
            let unsigned = opcode == 0b001;
            let vn = ctx.state.v[rn as usize];
            let f = if double { d0(vn) } else { f64::from(s0(vn)) };
            let value = if unsigned {
                match width {
                    Width::W32 => u64::from(f as u32),
                    Width::W64 => f as u64,
                }
            } else {
                match width {
                    Width::W32 => (f as i32) as u32 as u64,
                    Width::W64 => (f as i64) as u64,
                }
            };
            ctx.state.set_xr_w(width, rd, value);
            if rd != 31 {
                x86::emit_cvtfp2si(ctx.buf, double, rexw, host_gpr(rd), host_xmm(rn));
            }
        }
        // FMOV general-to-FP / FP-to-general.
        (0b00, 0b111) => {
            let raw = ctx.state.xr(rn) & width.mask();
            ctx.state.v[rd as usize] = u128::from(raw);
            if rn == 31 {
                x86::emit_push(ctx.buf, Reg::Rax);
                x86::emit_mov_ri(ctx.buf, true, Reg::Rax, 0);
                x86::emit_movd_g2x(ctx.buf, rexw, host_xmm(rd), Reg::Rax);
                x86::emit_pop(ctx.buf, Reg::Rax);
            } else {
                x86::emit_movd_g2x(ctx.buf, rexw, host_xmm(rd), host_gpr(rn));
            }
        }
        (0b00, 0b110) => {
            let lane = ctx.state.v[rn as usize] as u64 & width.mask();
            ctx.state.set_xr_w(width, rd, lane);
            if rd != 31 {
                x86::emit_movd_x2g(ctx.buf, rexw, host_gpr(rd), host_xmm(rn));
            }
        }
        _ => return Err(ClassMiss),
    }
    Ok(Outcome::Continue)
}

/// FCSEL: select between two FP registers on a condition.
fn fcsel<B: GuestBus>(ctx: &mut DisasContext<'_, B>, double: bool) -> TransResult {
    let insn = ctx.insn;
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());
    let cond = insn.cond_sel();

    let taken = arx_cpu_core::flags::cond_holds(ctx.state.pstate, cond);
    ctx.state.v[rd as usize] = ctx.state.v[if taken { rn } else { rm } as usize];

    let copy = if double {
        x86::OPC_MOVAPD
    } else {
        x86::OPC_MOVAPS
    };
    let (xd, xn, xm) = (host_xmm(rd), host_xmm(rn), host_xmm(rm));
    match X86Cond::from_guest(cond) {
        Some(cc) => {
            ctx.emit_host_flags_from_pstate();
            let to_then = x86::emit_jcc_placeholder(ctx.buf, cc);
            if xd != xm {
                x86::emit_sse_rr(ctx.buf, copy, xd, xm);
            }
            let done = x86::emit_jmp_placeholder(ctx.buf);
            let then_at = ctx.buf.offset();
            if xd != xn {
                x86::emit_sse_rr(ctx.buf, copy, xd, xn);
            }
            let end = ctx.buf.offset();
            x86::patch_rel32(ctx.buf, to_then, then_at);
            x86::patch_rel32(ctx.buf, done, end);
        }
        None => {
            if xd != xn {
                x86::emit_sse_rr(ctx.buf, copy, xd, xn);
            }
        }
    }
    Ok(Outcome::Continue)
}

/// VFPExpandImm for the FMOV immediate form.
fn expand_imm(imm8: u32, double: bool) -> u64 {
    let sign = u64::from(imm8 >> 7 & 1);
    let b6 = u64::from(imm8 >> 6 & 1);
    let exp_low = u64::from(imm8 >> 4 & 0x3);
    let frac = u64::from(imm8 & 0xF);
    if double {
        // exp = NOT(b6) : Replicate(b6, 8) : imm8<5:4>
        let rep = if b6 != 0 { 0xFFu64 } else { 0 };
        let exp = ((1 - b6) << 10) | (rep << 2) | exp_low;
        (sign << 63) | (exp << 52) | (frac << 48)
    } else {
        let rep = if b6 != 0 { 0x1Fu64 } else { 0 };
        let exp = ((1 - b6) << 7) | (rep << 2) | exp_low;
        (sign << 31) | (exp << 23) | (frac << 19)
    }
}

fn fmov_imm<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let double = match insn.size2() {
        0 => false,
        1 => true,
        _ => return Err(ClassMiss),
    };
    let rd = insn.rd();
    let bits = expand_imm(insn.bits(13, 20), double);
    ctx.state.v[rd as usize] = u128::from(bits);

    x86::emit_push(ctx.buf, Reg::Rax);
    x86::emit_mov_ri(ctx.buf, true, Reg::Rax, bits);
    x86::emit_movd_g2x(ctx.buf, double, host_xmm(rd), Reg::Rax);
    x86::emit_pop(ctx.buf, Reg::Rax);
    Ok(Outcome::Continue)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    // FP 3-source (fused multiply-add family).
    if insn.matches(0xFF00_0000, 0x1F00_0000) {
        return fused(ctx);
    }

    // The remaining scalar groups all live under 0x1E with bit 21 set
    // (sf may be set on the integer-conversion forms).
    if !insn.matches(0x7F20_0000, 0x1E20_0000) {
        return Err(ClassMiss);
    }
    let double = match insn.size2() {
        0 => false,
        1 => true,
        _ => return Err(ClassMiss),
    };

    // FP compare: bits 13..10 = 1000.
    if insn.bits(10, 13) == 0b1000 && insn.bits(14, 15) == 0 && insn.bits(0, 2) == 0 {
        return compare(ctx);
    }
    // FMOV immediate: bits 12..10 = 100, rn field is immediate low bits.
    if insn.bits(10, 12) == 0b100 && insn.bits(5, 9) == 0 && !insn.bit(31) {
        return fmov_imm(ctx);
    }
    // FP 2-source: bits 11..10 = 10.
    if insn.bits(10, 11) == 0b10 && !insn.bit(31) {
        let op = match insn.bits(12, 15) {
            0b0000 => Bin::Mul,
            0b0001 => Bin::Div,
            0b0010 => Bin::Add,
            0b0011 => Bin::Sub,
            0b0100 => Bin::Max,
            0b0101 => Bin::Min,
            // FMAXNM/FMINNM lowered to FMAX/FMIN.
            0b0110 => Bin::Max,
            0b0111 => Bin::Min,
            0b1000 => Bin::Nmul,
            _ => return Err(ClassMiss),
        };
        return binary(ctx, op, double);
    }
    // FCSEL: bits 11..10 = 11.
    if insn.bits(10, 11) == 0b11 && !insn.bit(31) {
        return fcsel(ctx, double);
    }
    // FP 1-source: bits 14..10 = 10000.
    if insn.bits(10, 14) == 0b10000 && !insn.bit(31) {
        return unary(ctx, insn.bits(15, 20), double);
    }
    // Conversions / general moves: bits 15..10 = 000000.
    if insn.bits(10, 15) == 0 {
        return int_fp(ctx);
    }

    Err(ClassMiss)
}
