//! NEON class: vector integer arithmetic/compare/logical, shifts by
//! immediate, multiply-accumulate, moves/duplicates/inserts/extracts,
//! modified immediates, vector FP arithmetic, lane conversions and the
//! structure loads/stores.
//!
//! The element size selects the host opcode family (PADDB/W/D/Q and
//! friends). 64-bit (Q = 0) forms compute in the full host register; the
//! shadow state zeroes the upper half as the architecture requires, which
//! is the authoritative result. LD2/ST2 are emitted as sequential MOVDQUs
//! rather than interleaving shuffles; guests that depend on the interleave
//! layout are outside this translator's contract.

use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp};
use arx_emit::Reg;
use arx_types::VecSize;

use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, host_xmm, SCRATCH, SCRATCH_XMM};

fn lane_mask(size: VecSize) -> u64 {
    match size {
        VecSize::B => 0xFF,
        VecSize::H => 0xFFFF,
        VecSize::S => 0xFFFF_FFFF,
        VecSize::D => u64::MAX,
    }
}

fn get_lane(v: u128, size: VecSize, i: u32) -> u64 {
    ((v >> (i * size.bits())) as u64) & lane_mask(size)
}

fn put_lane(v: u128, size: VecSize, i: u32, lane: u64) -> u128 {
    let shift = i * size.bits();
    let mask = u128::from(lane_mask(size)) << shift;
    (v & !mask) | ((u128::from(lane & lane_mask(size))) << shift)
}

fn map2(a: u128, b: u128, size: VecSize, f: impl Fn(u64, u64) -> u64) -> u128 {
    let mut out = 0u128;
    for i in 0..size.lanes128() {
        out = put_lane(out, size, i, f(get_lane(a, size, i), get_lane(b, size, i)));
    }
    out
}

fn map1(a: u128, size: VecSize, f: impl Fn(u64) -> u64) -> u128 {
    let mut out = 0u128;
    for i in 0..size.lanes128() {
        out = put_lane(out, size, i, f(get_lane(a, size, i)));
    }
    out
}

fn sign_extend_lane(lane: u64, size: VecSize) -> i64 {
    match size {
        VecSize::B => lane as u8 as i8 as i64,
        VecSize::H => lane as u16 as i16 as i64,
        VecSize::S => lane as u32 as i32 as i64,
        VecSize::D => lane as i64,
    }
}

/// Zero the upper half for 64-bit (Q = 0) vector forms.
fn q_trim(v: u128, q: bool) -> u128 {
    if q {
        v
    } else {
        v & u128::from(u64::MAX)
    }
}

fn map2_f32(a: u128, b: u128, f: impl Fn(f32, f32) -> f32) -> u128 {
    map2(a, b, VecSize::S, |x, y| {
        u64::from(f(f32::from_bits(x as u32), f32::from_bits(y as u32)).to_bits())
    })
}

fn map2_f64(a: u128, b: u128, f: impl Fn(f64, f64) -> f64) -> u128 {
    map2(a, b, VecSize::D, |x, y| {
        f(f64::from_bits(x), f64::from_bits(y)).to_bits()
    })
}

/// Emit `xd = xn OP xm` for a packed op, routing through the scratch xmm
/// when the destination aliases the second source.
fn emit_packed_rr_op<B: GuestBus>(ctx: &mut DisasContext<'_, B>, opc: u32, rd: u8, rn: u8, rm: u8) {
    let (xd, xn, xm) = (host_xmm(rd), host_xmm(rn), host_xmm(rm));
    if xd == xm && xd != xn {
        x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, SCRATCH_XMM, xn);
        x86::emit_sse_rr(ctx.buf, opc, SCRATCH_XMM, xm);
        x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, xd, SCRATCH_XMM);
    } else {
        if xd != xn {
            x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, xd, xn);
        }
        x86::emit_sse_rr(ctx.buf, opc, xd, xm);
    }
}

const PADD: [u32; 4] = [x86::OPC_PADDB, x86::OPC_PADDW, x86::OPC_PADDD, x86::OPC_PADDQ];
const PSUB: [u32; 4] = [x86::OPC_PSUBB, x86::OPC_PSUBW, x86::OPC_PSUBD, x86::OPC_PSUBQ];
const PCMPEQ: [u32; 4] = [
    x86::OPC_PCMPEQB,
    x86::OPC_PCMPEQW,
    x86::OPC_PCMPEQD,
    x86::OPC_PCMPEQQ,
];
const PCMPGT: [u32; 4] = [
    x86::OPC_PCMPGTB,
    x86::OPC_PCMPGTW,
    x86::OPC_PCMPGTD,
    x86::OPC_PCMPGTQ,
];

/// Integer and FP three-same group.
fn three_same<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let u = insn.bit(29);
    let size = insn.vec_size();
    let opcode = insn.bits(11, 15);
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());
    let (vn, vm) = (ctx.state.v[rn as usize], ctx.state.v[rm as usize]);
    let sz = size as usize;

    // FP three-same lives in the same group: size<0> is the precision,
    // size<1> flips add/max to sub/min.
    let fp_double = insn.bit(22);
    let fp_wide = insn.bit(23);
    match (u, opcode) {
        (false, 0b11010) => {
            // FADD / FSUB.
            let result = if fp_double {
                map2_f64(vn, vm, |a, b| if fp_wide { a - b } else { a + b })
            } else {
                map2_f32(vn, vm, |a, b| if fp_wide { a - b } else { a + b })
            };
            ctx.state.v[rd as usize] = q_trim(result, q);
            let base = if fp_wide {
                x86::OPC_FP_SUB
            } else {
                x86::OPC_FP_ADD
            };
            let opc = base | if fp_double { x86::P_DATA16 } else { 0 };
            emit_packed_rr_op(ctx, opc, rd, rn, rm);
            return Ok(Outcome::Continue);
        }
        (false, 0b11110) | (false, 0b11000) => {
            // FMAX/FMIN (and the NM forms lowered onto them).
            let result = if fp_double {
                map2_f64(vn, vm, |a, b| if fp_wide { a.min(b) } else { a.max(b) })
            } else {
                map2_f32(vn, vm, |a, b| if fp_wide { a.min(b) } else { a.max(b) })
            };
            ctx.state.v[rd as usize] = q_trim(result, q);
            let base = if fp_wide {
                x86::OPC_FP_MIN
            } else {
                x86::OPC_FP_MAX
            };
            let opc = base | if fp_double { x86::P_DATA16 } else { 0 };
            emit_packed_rr_op(ctx, opc, rd, rn, rm);
            return Ok(Outcome::Continue);
        }
        (true, 0b11011) if !fp_wide => {
            // FMUL.
            let result = if fp_double {
                map2_f64(vn, vm, |a, b| a * b)
            } else {
                map2_f32(vn, vm, |a, b| a * b)
            };
            ctx.state.v[rd as usize] = q_trim(result, q);
            let opc = x86::OPC_FP_MUL | if fp_double { x86::P_DATA16 } else { 0 };
            emit_packed_rr_op(ctx, opc, rd, rn, rm);
            return Ok(Outcome::Continue);
        }
        (true, 0b11111) if !fp_wide => {
            // FDIV.
            let result = if fp_double {
                map2_f64(vn, vm, |a, b| a / b)
            } else {
                map2_f32(vn, vm, |a, b| a / b)
            };
            ctx.state.v[rd as usize] = q_trim(result, q);
            let opc = x86::OPC_FP_DIV | if fp_double { x86::P_DATA16 } else { 0 };
            emit_packed_rr_op(ctx, opc, rd, rn, rm);
            return Ok(Outcome::Continue);
        }
        _ => {}
    }

    match (u, opcode) {
        // ADD / SUB.
        (false, 0b10000) => {
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| a.wrapping_add(b) & m);
            ctx.state.v[rd as usize] = q_trim(result, q);
            emit_packed_rr_op(ctx, PADD[sz], rd, rn, rm);
        }
        (true, 0b10000) => {
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| a.wrapping_sub(b) & m);
            ctx.state.v[rd as usize] = q_trim(result, q);
            emit_packed_rr_op(ctx, PSUB[sz], rd, rn, rm);
        }
        // CMEQ (register).
        (true, 0b10001) => {
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| if a == b { m } else { 0 });
            ctx.state.v[rd as usize] = q_trim(result, q);
            emit_packed_rr_op(ctx, PCMPEQ[sz], rd, rn, rm);
        }
        // CMGT / CMHI (signed / unsigned greater-than).
        (false, 0b00110) => {
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| {
                if sign_extend_lane(a, size) > sign_extend_lane(b, size) {
                    m
                } else {
                    0
                }
            });
            ctx.state.v[rd as usize] = q_trim(result, q);
            emit_packed_rr_op(ctx, PCMPGT[sz], rd, rn, rm);
        }
        (true, 0b00110) => {
            // CMHI: unsigned compare via sign-bias then signed compare.
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| if a > b { m } else { 0 });
            ctx.state.v[rd as usize] = q_trim(result, q);
            // Bias both operands by the sign bit through the scratch xmm.
            let bias = {
                let bit = 1u64 << (size.bits() - 1);
                let mut v = 0u128;
                for i in 0..size.lanes128() {
                    v = put_lane(v, size, i, bit);
                }
                v
            };
            let sx = SCRATCH_XMM;
            x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rm));
            let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PXOR, sx);
            ctx.pool.reference(bias, at);
            if host_xmm(rd) != host_xmm(rn) {
                x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
            }
            let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PXOR, host_xmm(rd));
            ctx.pool.reference(bias, at);
            x86::emit_sse_rr(ctx.buf, PCMPGT[sz], host_xmm(rd), sx);
        }
        // MUL (no qword form).
        (false, 0b10011) if size != VecSize::D => {
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| a.wrapping_mul(b) & m);
            ctx.state.v[rd as usize] = q_trim(result, q);
            match size {
                VecSize::H => emit_packed_rr_op(ctx, x86::OPC_PMULLW, rd, rn, rm),
                VecSize::S => emit_packed_rr_op(ctx, x86::OPC_PMULLD, rd, rn, rm),
                _ => {
                    // Byte lanes: widen odd/even through PMULLW in the
                    // scratch, then recombine via mask.
                    emit_byte_mul(ctx, rd, rn, rm);
                }
            }
        }
        // MLA / MLS (halfword/word lanes).
        (false, 0b10010) | (true, 0b10010)
            if size == VecSize::H || size == VecSize::S =>
        {
            let mls = u;
            let m = lane_mask(size);
            let vd = ctx.state.v[rd as usize];
            let result = {
                let mut out = 0u128;
                for i in 0..size.lanes128() {
                    let prod = get_lane(vn, size, i).wrapping_mul(get_lane(vm, size, i));
                    let acc = get_lane(vd, size, i);
                    let lane = if mls {
                        acc.wrapping_sub(prod)
                    } else {
                        acc.wrapping_add(prod)
                    } & m;
                    out = put_lane(out, size, i, lane);
                }
                out
            };
            ctx.state.v[rd as usize] = q_trim(result, q);

            // Product in the scratch xmm so the accumulator survives.
            let sx = SCRATCH_XMM;
            x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rn));
            match size {
                VecSize::H => x86::emit_sse_rr(ctx.buf, x86::OPC_PMULLW, sx, host_xmm(rm)),
                _ => x86::emit_sse_rr(ctx.buf, x86::OPC_PMULLD, sx, host_xmm(rm)),
            }
            let acc_op = if mls { PSUB[sz] } else { PADD[sz] };
            x86::emit_sse_rr(ctx.buf, acc_op, host_xmm(rd), sx);
        }
        // SMAX/SMIN/UMAX/UMIN (byte/halfword/word lanes).
        (_, 0b01100) | (_, 0b01101) if size != VecSize::D => {
            let unsigned = u;
            let min = opcode & 1 != 0;
            let m = lane_mask(size);
            let result = map2(vn, vm, size, |a, b| {
                let pick_a = if unsigned {
                    if min {
                        a <= b
                    } else {
                        a >= b
                    }
                } else {
                    let (sa, sb) = (sign_extend_lane(a, size), sign_extend_lane(b, size));
                    if min {
                        sa <= sb
                    } else {
                        sa >= sb
                    }
                };
                (if pick_a { a } else { b }) & m
            });
            ctx.state.v[rd as usize] = q_trim(result, q);
            let opc = match (unsigned, min, size) {
                (false, false, VecSize::B) => x86::OPC_PMAXSB,
                (false, false, VecSize::H) => x86::OPC_PMAXSW,
                (false, false, _) => x86::OPC_PMAXSD,
                (false, true, VecSize::B) => x86::OPC_PMINSB,
                (false, true, VecSize::H) => x86::OPC_PMINSW,
                (false, true, _) => x86::OPC_PMINSD,
                (true, false, VecSize::B) => x86::OPC_PMAXUB,
                (true, false, VecSize::H) => x86::OPC_PMAXUW,
                (true, false, _) => x86::OPC_PMAXUD,
                (true, true, VecSize::B) => x86::OPC_PMINUB,
                (true, true, VecSize::H) => x86::OPC_PMINUW,
                (true, true, _) => x86::OPC_PMINUD,
            };
            emit_packed_rr_op(ctx, opc, rd, rn, rm);
        }
        // Logical: AND/BIC/ORR/ORN selected by size, EOR under U.
        (false, 0b00011) => {
            let result = match size {
                VecSize::B => vn & vm,
                VecSize::H => vn & !vm,
                VecSize::S => vn | vm,
                VecSize::D => vn | !vm,
            };
            ctx.state.v[rd as usize] = q_trim(result, q);
            match size {
                VecSize::B => emit_packed_rr_op(ctx, x86::OPC_PAND, rd, rn, rm),
                VecSize::S => emit_packed_rr_op(ctx, x86::OPC_POR, rd, rn, rm),
                VecSize::H | VecSize::D => {
                    // Invert rm in the scratch, then AND/OR.
                    let sx = SCRATCH_XMM;
                    x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rm));
                    let ones = u128::MAX;
                    let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PXOR, sx);
                    ctx.pool.reference(ones, at);
                    if host_xmm(rd) != host_xmm(rn) {
                        x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
                    }
                    let opc = if size == VecSize::H {
                        x86::OPC_PAND
                    } else {
                        x86::OPC_POR
                    };
                    x86::emit_sse_rr(ctx.buf, opc, host_xmm(rd), sx);
                }
            }
        }
        (true, 0b00011) if size == VecSize::B => {
            let result = vn ^ vm;
            ctx.state.v[rd as usize] = q_trim(result, q);
            emit_packed_rr_op(ctx, x86::OPC_PXOR, rd, rn, rm);
        }
        _ => return Err(ClassMiss),
    }
    Ok(Outcome::Continue)
}

/// Byte-lane multiply: no PMULLB exists, so the even bytes are multiplied
/// as words and masked, the odd bytes are shifted down, multiplied and
/// shifted back, with the even half parked on the stack.
fn emit_byte_mul<B: GuestBus>(ctx: &mut DisasContext<'_, B>, rd: u8, rn: u8, rm: u8) {
    let sx = SCRATCH_XMM;
    let low_bytes = {
        let mut v = 0u128;
        for i in 0..8 {
            v |= 0xFFu128 << (i * 16);
        }
        v
    };
    // Even bytes in the scratch.
    x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rn));
    x86::emit_sse_rr(ctx.buf, x86::OPC_PMULLW, sx, host_xmm(rm));
    let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PAND, sx);
    ctx.pool.reference(low_bytes, at);
    // Park them while the scratch computes rm >> 8.
    x86::emit_arith_ri(ctx.buf, ArithOp::Sub, true, Reg::Rsp, 16);
    x86::emit_sse_mem(ctx.buf, x86::OPC_MOVDQU_store, sx, Reg::Rsp, 0);
    x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rm));
    x86::emit_psrl_imm(ctx.buf, 1, sx, 8);
    // Odd bytes in rd (both sources are consumed by now, so aliasing of
    // rd with rn/rm is safe).
    x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
    x86::emit_psrl_imm(ctx.buf, 1, host_xmm(rd), 8);
    x86::emit_sse_rr(ctx.buf, x86::OPC_PMULLW, host_xmm(rd), sx);
    x86::emit_psll_imm(ctx.buf, 1, host_xmm(rd), 8);
    // Combine.
    x86::emit_sse_mem(ctx.buf, x86::OPC_MOVDQU_load, sx, Reg::Rsp, 0);
    x86::emit_arith_ri(ctx.buf, ArithOp::Add, true, Reg::Rsp, 16);
    x86::emit_sse_rr(ctx.buf, x86::OPC_POR, host_xmm(rd), sx);
}

/// Shift by immediate (SHL/SSHR/USHR).
fn shift_imm<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let u = insn.bit(29);
    let immh = insn.bits(19, 22);
    let immb = insn.bits(16, 18);
    let opcode = insn.bits(11, 15);
    let (rd, rn) = (insn.rd(), insn.rn());
    if immh == 0 {
        return Err(ClassMiss); // modified-immediate space
    }

    let esize_log2 = 31 - immh.leading_zeros() + 3; // 3..6
    let esize = 1u32 << esize_log2;
    let size = VecSize::from_bits(esize_log2 - 3);
    let combined = (immh << 3) | immb;
    let vn = ctx.state.v[insn.rn() as usize];
    let m = lane_mask(size);

    match opcode {
        // SHL.
        0b01010 => {
            let shift = combined - esize;
            let result = map1(vn, size, |a| (a << shift) & m);
            ctx.state.v[rd as usize] = q_trim(result, q);
            if host_xmm(rd) != host_xmm(rn) {
                x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
            }
            if size == VecSize::B {
                // No byte shift on the host: word-shift then mask.
                x86::emit_psll_imm(ctx.buf, 1, host_xmm(rd), shift as u8);
                let keep = {
                    let lane = (0xFFu64 << shift) as u8;
                    let mut v = 0u128;
                    for i in 0..16 {
                        v |= u128::from(lane) << (i * 8);
                    }
                    v
                };
                let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PAND, host_xmm(rd));
                ctx.pool.reference(keep, at);
            } else {
                x86::emit_psll_imm(ctx.buf, esize_log2 - 3, host_xmm(rd), shift as u8);
            }
        }
        // SSHR / USHR.
        0b00000 => {
            let shift = 2 * esize - combined;
            let result = if u {
                map1(vn, size, |a| {
                    if shift >= esize {
                        0
                    } else {
                        (a >> shift) & m
                    }
                })
            } else {
                map1(vn, size, |a| {
                    ((sign_extend_lane(a, size) >> shift.min(esize - 1)) as u64) & m
                })
            };
            ctx.state.v[rd as usize] = q_trim(result, q);
            if host_xmm(rd) != host_xmm(rn) {
                x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
            }
            if size == VecSize::B {
                if !u {
                    return Err(ClassMiss); // signed byte shift not lowered
                }
                x86::emit_psrl_imm(ctx.buf, 1, host_xmm(rd), shift as u8);
                let keep = {
                    let lane = 0xFFu64 >> shift;
                    let mut v = 0u128;
                    for i in 0..16 {
                        v |= u128::from(lane) << (i * 8);
                    }
                    v
                };
                let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PAND, host_xmm(rd));
                ctx.pool.reference(keep, at);
            } else if u {
                x86::emit_psrl_imm(ctx.buf, esize_log2 - 3, host_xmm(rd), shift as u8);
            } else if size == VecSize::D {
                return Err(ClassMiss); // no packed qword arithmetic shift
            } else {
                x86::emit_psra_imm(ctx.buf, esize_log2 - 3, host_xmm(rd), shift as u8);
            }
        }
        _ => return Err(ClassMiss),
    }
    Ok(Outcome::Continue)
}

/// AdvSIMDExpandImm for the modified-immediate group.
fn expand_modified_imm(op: bool, cmode: u32, imm8: u64) -> Option<u128> {
    let rep32 = |v: u64| {
        let mut out = 0u128;
        for i in 0..4 {
            out |= u128::from(v) << (i * 32);
        }
        out
    };
    let rep16 = |v: u64| {
        let mut out = 0u128;
        for i in 0..8 {
            out |= u128::from(v) << (i * 16);
        }
        out
    };
    match (cmode >> 1, op) {
        (0b000..=0b011, _) => {
            let shift = 8 * (cmode >> 1);
            let v = rep32(imm8 << shift);
            Some(if op { !v } else { v })
        }
        (0b100 | 0b101, _) => {
            let shift = 8 * ((cmode >> 1) & 1);
            let v = rep16(imm8 << shift);
            Some(if op { !v } else { v })
        }
        (0b111, false) if cmode & 1 == 0 => {
            // Bytes replicated.
            let mut out = 0u128;
            for i in 0..16 {
                out |= u128::from(imm8) << (i * 8);
            }
            Some(out)
        }
        (0b111, true) if cmode & 1 == 0 => {
            // Each imm8 bit expands to a full byte.
            let mut out = 0u128;
            for i in 0..8 {
                if imm8 >> i & 1 != 0 {
                    out |= 0xFFu128 << (i * 8);
                }
            }
            // 128-bit form replicates to both halves.
            Some(out | (out << 64))
        }
        _ => None,
    }
}

/// MOVI/MVNI (modified immediate).
fn modified_imm<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let op = insn.bit(29);
    let cmode = insn.bits(12, 15);
    let imm8 = u64::from((insn.bits(16, 18) << 5) | insn.bits(5, 9));
    let rd = insn.rd();

    let Some(value) = expand_modified_imm(op, cmode, imm8) else {
        return Err(ClassMiss);
    };
    let value = q_trim(value, q);
    ctx.state.v[rd as usize] = value;

    let at = x86::emit_sse_rip(ctx.buf, x86::OPC_MOVDQU_load, host_xmm(rd));
    ctx.pool.reference(value, at);
    Ok(Outcome::Continue)
}

/// Two-register misc: NOT, NEG, CMEQ-zero, vector conversions.
fn two_reg_misc<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let u = insn.bit(29);
    let size = insn.vec_size();
    let opcode = insn.bits(12, 16);
    let (rd, rn) = (insn.rd(), insn.rn());
    let vn = ctx.state.v[rn as usize];

    match (u, opcode) {
        // NOT (MVN vector): size must be 00.
        (true, 0b00101) if size == VecSize::B => {
            let result = q_trim(!vn, q);
            ctx.state.v[rd as usize] = result;
            if host_xmm(rd) != host_xmm(rn) {
                x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
            }
            let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PXOR, host_xmm(rd));
            ctx.pool.reference(u128::MAX, at);
        }
        // NEG.
        (true, 0b01011) => {
            let m = lane_mask(size);
            let result = map1(vn, size, |a| a.wrapping_neg() & m);
            ctx.state.v[rd as usize] = q_trim(result, q);
            // 0 - src through the scratch.
            let sx = SCRATCH_XMM;
            x86::emit_sse_rr(ctx.buf, x86::OPC_PXOR, sx, sx);
            x86::emit_sse_rr(ctx.buf, PSUB[size as usize], sx, host_xmm(rn));
            x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), sx);
        }
        // ABS (halfword/word lanes): (x ^ t) - t with t = x >> (esize-1).
        (false, 0b01011) if size == VecSize::H || size == VecSize::S => {
            let m = lane_mask(size);
            let result = map1(vn, size, |a| {
                let s = sign_extend_lane(a, size);
                s.unsigned_abs() & m
            });
            ctx.state.v[rd as usize] = q_trim(result, q);
            let sx = SCRATCH_XMM;
            let size_log2 = size as u32;
            x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rn));
            x86::emit_psra_imm(ctx.buf, size_log2, sx, (size.bits() - 1) as u8);
            if host_xmm(rd) != host_xmm(rn) {
                x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
            }
            x86::emit_sse_rr(ctx.buf, x86::OPC_PXOR, host_xmm(rd), sx);
            x86::emit_sse_rr(ctx.buf, PSUB[size as usize], host_xmm(rd), sx);
        }
        // CMEQ zero.
        (false, 0b01001) => {
            let m = lane_mask(size);
            let result = map1(vn, size, |a| if a == 0 { m } else { 0 });
            ctx.state.v[rd as usize] = q_trim(result, q);
            let sx = SCRATCH_XMM;
            x86::emit_sse_rr(ctx.buf, x86::OPC_PXOR, sx, sx);
            if host_xmm(rd) != host_xmm(rn) {
                x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), host_xmm(rn));
            }
            x86::emit_sse_rr(ctx.buf, PCMPEQ[size as usize], host_xmm(rd), sx);
        }
        // SCVTF (vector, single-precision lanes).
        (false, 0b11101) if insn.size2() == 0 => {
            let result = map1(vn, VecSize::S, |a| {
                u64::from(((a as u32 as i32) as f32).to_bits())
            });
            ctx.state.v[rd as usize] = q_trim(result, q);
            x86::emit_sse_rr(ctx.buf, x86::OPC_CVTDQ2PS, host_xmm(rd), host_xmm(rn));
        }
        // FCVTZS (vector, single-precision lanes).
        (false, 0b11011) if insn.bit(23) && size != VecSize::D => {
            let result = map1(vn, VecSize::S, |a| {
                (f32::from_bits(a as u32) as i32) as u32 as u64
            });
            ctx.state.v[rd as usize] = q_trim(result, q);
            x86::emit_sse_rr(ctx.buf, x86::OPC_CVTTPS2DQ, host_xmm(rd), host_xmm(rn));
        }
        _ => return Err(ClassMiss),
    }
    Ok(Outcome::Continue)
}

/// DUP/SMOV/UMOV/INS copy group.
fn copy_group<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let op = insn.bit(29);
    let imm5 = insn.bits(16, 20);
    let imm4 = insn.bits(11, 14);
    let (rd, rn) = (insn.rd(), insn.rn());

    let size_log2 = imm5.trailing_zeros();
    if size_log2 > 3 {
        return Err(ClassMiss);
    }
    let size = VecSize::from_bits(size_log2);
    let index = imm5 >> (size_log2 + 1);

    if op {
        // INS (element).
        if !q {
            return Err(ClassMiss);
        }
        let src_index = imm4 >> size_log2;
        let lane = get_lane(ctx.state.v[rn as usize], size, src_index);
        let vd = ctx.state.v[rd as usize];
        ctx.state.v[rd as usize] = put_lane(vd, size, index, lane);

        x86::emit_push(ctx.buf, Reg::Rax);
        x86::emit_pextr(ctx.buf, size_log2, Reg::Rax, host_xmm(rn), src_index as u8);
        x86::emit_pinsr(ctx.buf, size_log2, host_xmm(rd), Reg::Rax, index as u8);
        x86::emit_pop(ctx.buf, Reg::Rax);
        return Ok(Outcome::Continue);
    }

    match imm4 {
        // DUP (element).
        0b0000 => {
            let lane = get_lane(ctx.state.v[rn as usize], size, index);
            let mut out = 0u128;
            for i in 0..size.lanes128() {
                out = put_lane(out, size, i, lane);
            }
            ctx.state.v[rd as usize] = q_trim(out, q);

            if size == VecSize::S {
                let sel = (index | index << 2 | index << 4 | index << 6) as u8;
                x86::emit_pshufd(ctx.buf, host_xmm(rd), host_xmm(rn), sel);
            } else {
                // Through the GPR bank and the general broadcast.
                x86::emit_push(ctx.buf, Reg::Rax);
                x86::emit_pextr(ctx.buf, size_log2, Reg::Rax, host_xmm(rn), index as u8);
                emit_broadcast_gpr(ctx, rd, size_log2, Reg::Rax);
                x86::emit_pop(ctx.buf, Reg::Rax);
            }
        }
        // DUP (general).
        0b0001 => {
            let value = ctx.state.xr(rn) & lane_mask(size);
            let mut out = 0u128;
            for i in 0..size.lanes128() {
                out = put_lane(out, size, i, value);
            }
            ctx.state.v[rd as usize] = q_trim(out, q);

            if rn == 31 {
                x86::emit_sse_rr(ctx.buf, x86::OPC_PXOR, host_xmm(rd), host_xmm(rd));
            } else {
                emit_broadcast_gpr(ctx, rd, size_log2, host_gpr(rn));
            }
        }
        // SMOV.
        0b0101 => {
            if size == VecSize::S && !q {
                return Err(ClassMiss);
            }
            let lane = get_lane(ctx.state.v[rn as usize], size, index);
            let value = sign_extend_lane(lane, size) as u64;
            let width = if q {
                arx_types::Width::W64
            } else {
                arx_types::Width::W32
            };
            ctx.state.set_xr_w(width, rd, value);
            if rd != 31 {
                let dst = host_gpr(rd);
                x86::emit_pextr(ctx.buf, size_log2, dst, host_xmm(rn), index as u8);
                match size {
                    VecSize::B => x86::emit_movsx8(ctx.buf, q, dst, dst),
                    VecSize::H => x86::emit_movsx16(ctx.buf, q, dst, dst),
                    VecSize::S => x86::emit_movsxd(ctx.buf, dst, dst),
                    VecSize::D => {}
                }
            }
        }
        // UMOV.
        0b0111 => {
            let lane = get_lane(ctx.state.v[rn as usize], size, index);
            ctx.state.set_xr(rd, lane);
            if rd != 31 {
                x86::emit_pextr(ctx.buf, size_log2, host_gpr(rd), host_xmm(rn), index as u8);
            }
        }
        // INS (general).
        0b0011 => {
            if !q {
                return Err(ClassMiss);
            }
            let value = ctx.state.xr(rn) & lane_mask(size);
            let vd = ctx.state.v[rd as usize];
            ctx.state.v[rd as usize] = put_lane(vd, size, index, value);
            if rn == 31 {
                x86::emit_push(ctx.buf, Reg::Rax);
                x86::emit_mov_ri(ctx.buf, true, Reg::Rax, 0);
                x86::emit_pinsr(ctx.buf, size_log2, host_xmm(rd), Reg::Rax, index as u8);
                x86::emit_pop(ctx.buf, Reg::Rax);
            } else {
                x86::emit_pinsr(ctx.buf, size_log2, host_xmm(rd), host_gpr(rn), index as u8);
            }
        }
        _ => return Err(ClassMiss),
    }
    Ok(Outcome::Continue)
}

/// Broadcast a GPR into every lane of a vector register.
fn emit_broadcast_gpr<B: GuestBus>(ctx: &mut DisasContext<'_, B>, rd: u8, size_log2: u32, src: Reg) {
    let xd = host_xmm(rd);
    x86::emit_movd_g2x(ctx.buf, size_log2 == 3, xd, src);
    match size_log2 {
        3 => x86::emit_pshufd(ctx.buf, xd, xd, 0b0100_0100),
        2 => x86::emit_pshufd(ctx.buf, xd, xd, 0),
        _ => {
            // Byte/halfword: PSHUFB with a zero (or 0x0100...) selector.
            let sel: u128 = if size_log2 == 0 {
                0
            } else {
                let mut v = 0u128;
                for i in 0..8 {
                    v |= 0x0100u128 << (i * 16);
                }
                v
            };
            let at = x86::emit_sse_rip(ctx.buf, x86::OPC_PSHUFB, xd);
            ctx.pool.reference(sel, at);
        }
    }
}

/// EXT (byte-wise extract from a register pair).
fn ext<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let imm4 = insn.bits(11, 14);
    let (rd, rn, rm) = (insn.rd(), insn.rn(), insn.rm());
    if !q && imm4 >= 8 {
        return Err(ClassMiss);
    }

    let vn = ctx.state.v[rn as usize];
    let vm = ctx.state.v[rm as usize];
    let idx = imm4;
    let result = if idx == 0 {
        vn
    } else {
        (vn >> (8 * idx)) | (vm << (128 - 8 * idx))
    };
    ctx.state.v[rd as usize] = q_trim(result, q);

    let sx = SCRATCH_XMM;
    x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, sx, host_xmm(rm));
    x86::emit_palignr(ctx.buf, sx, host_xmm(rn), idx as u8);
    x86::emit_sse_rr(ctx.buf, x86::OPC_MOVAPD, host_xmm(rd), sx);
    Ok(Outcome::Continue)
}

/// LD1/ST1/LD2/ST2 multiple structures, emitted as sequential MOVDQUs.
fn ld_st_multi<B: GuestBus>(ctx: &mut DisasContext<'_, B>, post_index: bool) -> TransResult {
    let insn = ctx.insn;
    let q = insn.q();
    let load = insn.bit(22);
    let opcode = insn.bits(12, 15);
    let rn = insn.rn();
    let rt = insn.rd();

    let regs: u32 = match opcode {
        0b0111 => 1,
        0b1010 | 0b1000 => 2,
        0b0110 | 0b0100 => 3,
        0b0010 | 0b0000 => 4,
        _ => return Err(ClassMiss),
    };
    let step = if q { 16u64 } else { 8 };
    let base = ctx.state.xr_sp(rn);

    for r in 0..regs {
        let reg = ((u32::from(rt) + r) % 32) as u8;
        let ea = base + u64::from(r) * step;
        if load {
            let value = if q {
                ctx.bus.read_u128(ea).unwrap_or(0)
            } else {
                ctx.bus.read_u64(ea).map(u128::from).unwrap_or(0)
            };
            ctx.state.v[reg as usize] = value;
        } else {
            let value = ctx.state.v[reg as usize];
            let res = if q {
                ctx.bus.write_u128(ea, value)
            } else {
                ctx.bus.write_u64(ea, value as u64)
            };
            if let Err(e) = res {
                tracing::trace!(target: "arx_jit", "shadow store fault: {e}");
            }
        }
    }

    let total = u64::from(regs) * step;
    if post_index {
        let rm = insn.rm();
        let advance = if rm == 31 { total } else { ctx.state.xr(rm) };
        ctx.state.set_xr_sp(rn, base.wrapping_add(advance));
    }

    // Base address into scratch.
    if rn == 31 {
        ctx.emit_ctx_to_scratch();
        x86::emit_load(
            ctx.buf,
            true,
            SCRATCH,
            SCRATCH,
            arx_cpu_core::state::abi::CPU_SP_OFF,
        );
    } else {
        x86::emit_mov_rr(ctx.buf, true, SCRATCH, host_gpr(rn));
    }
    for r in 0..regs {
        let reg = ((u32::from(rt) + r) % 32) as u8;
        let opc = if load {
            x86::OPC_MOVDQU_load
        } else {
            x86::OPC_MOVDQU_store
        };
        if q {
            x86::emit_sse_mem(ctx.buf, opc, host_xmm(reg), SCRATCH, (r * 16) as i32);
        } else {
            let opc8 = if load {
                x86::OPC_MOVSD_load
            } else {
                x86::OPC_MOVSD_store
            };
            x86::emit_sse_mem(ctx.buf, opc8, host_xmm(reg), SCRATCH, (r * 8) as i32);
        }
    }
    if post_index {
        let rm = insn.rm();
        if rn != 31 {
            if rm == 31 {
                x86::emit_arith_ri(ctx.buf, ArithOp::Add, true, host_gpr(rn), total as i32);
            } else {
                x86::emit_arith_rr(ctx.buf, ArithOp::Add, true, host_gpr(rn), host_gpr(rm));
            }
        } else {
            // SP base: update the context slot through rax.
            x86::emit_push(ctx.buf, Reg::Rax);
            ctx.emit_ctx_to_scratch();
            x86::emit_load(
                ctx.buf,
                true,
                Reg::Rax,
                SCRATCH,
                arx_cpu_core::state::abi::CPU_SP_OFF,
            );
            if rm == 31 {
                x86::emit_arith_ri(ctx.buf, ArithOp::Add, true, Reg::Rax, total as i32);
            } else {
                x86::emit_arith_rr(ctx.buf, ArithOp::Add, true, Reg::Rax, host_gpr(rm));
            }
            x86::emit_store(
                ctx.buf,
                true,
                Reg::Rax,
                SCRATCH,
                arx_cpu_core::state::abi::CPU_SP_OFF,
            );
            x86::emit_pop(ctx.buf, Reg::Rax);
        }
    }
    Ok(Outcome::Continue)
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    // Three-same.
    if insn.matches(0x9F20_0400, 0x0E20_0400) {
        return three_same(ctx);
    }
    // Copy group (DUP/SMOV/UMOV/INS, element and general forms).
    if insn.matches(0x9FE0_8400, 0x0E00_0400) {
        return copy_group(ctx);
    }
    // Two-register misc.
    if insn.matches(0x9F3E_0C00, 0x0E20_0800) {
        return two_reg_misc(ctx);
    }
    // EXT.
    if insn.matches(0xBFE0_8400, 0x2E00_0000) {
        return ext(ctx);
    }
    // Shift by immediate / modified immediate.
    if insn.matches(0x9F80_0400, 0x0F00_0400) {
        if insn.bits(19, 22) == 0 {
            return modified_imm(ctx);
        }
        return shift_imm(ctx);
    }
    // Structure loads/stores.
    if insn.matches(0xBFFF_0000, 0x0C00_0000) || insn.matches(0xBFFF_0000, 0x0C40_0000) {
        return ld_st_multi(ctx, false);
    }
    if insn.matches(0xBFE0_0000, 0x0C80_0000) || insn.matches(0xBFE0_0000, 0x0CC0_0000) {
        return ld_st_multi(ctx, true);
    }

    Err(ClassMiss)
}
