//! Memory class: single-register loads/stores (unsigned scaled immediate,
//! unscaled imm9, pre/post-indexed, register offset), the sign-extending
//! load variants, pair loads/stores and PC-relative literals — for both
//! the general and the SIMD&FP register files.
//!
//! The guest address space is identity-mapped by the loader, so emitted
//! code accesses guest memory directly through the computed effective
//! address. The shadow interpretation goes through the bus; an unmapped
//! shadow access is dropped (the emitted code would fault at runtime, the
//! translator itself must not).

use arx_cpu_core::state::abi;
use arx_cpu_core::GuestBus;
use arx_emit::x86::{self, ArithOp, ShiftOp};
use arx_emit::Reg;

use super::{ClassMiss, DisasContext, Outcome, TransResult};
use crate::regmap::{host_gpr, host_xmm, SCRATCH};

/// Addressing forms reduced to a single shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Addressing {
    /// base + constant displacement, no writeback.
    Offset(i64),
    /// Writeback of base + disp before the access.
    PreIndex(i64),
    /// Access at base, then writeback of base + disp.
    PostIndex(i64),
    /// base + extended register offset.
    RegOffset { option: u32, shift: u32 },
}

impl Addressing {
    fn displacement(self) -> i64 {
        match self {
            Addressing::Offset(d) | Addressing::PreIndex(d) | Addressing::PostIndex(d) => d,
            Addressing::RegOffset { .. } => 0,
        }
    }
}

/// Shadow-side effective address and optional writeback value.
fn shadow_ea<B: GuestBus>(ctx: &DisasContext<'_, B>, mode: Addressing) -> (u64, Option<u64>) {
    let insn = ctx.insn;
    let base = ctx.state.xr_sp(insn.rn());
    match mode {
        Addressing::Offset(d) => (base.wrapping_add(d as u64), None),
        Addressing::PreIndex(d) => {
            let ea = base.wrapping_add(d as u64);
            (ea, Some(ea))
        }
        Addressing::PostIndex(d) => (base, Some(base.wrapping_add(d as u64))),
        Addressing::RegOffset { option, shift } => {
            let raw = ctx.state.xr(insn.rm());
            let extended = match option {
                0b010 => u64::from(raw as u32),
                0b110 => (raw as u32 as i32) as i64 as u64,
                0b111 => raw,
                _ => raw, // LSL/UXTX
            };
            (base.wrapping_add(extended << shift), None)
        }
    }
}

/// Emit the effective address into the scratch register and perform any
/// base writeback on the host side.
fn emit_ea<B: GuestBus>(ctx: &mut DisasContext<'_, B>, mode: Addressing) {
    let insn = ctx.insn;
    let rn = insn.rn();

    // Base into scratch (SP base comes from the context slot).
    if rn == 31 {
        ctx.emit_ctx_to_scratch();
        x86::emit_load(ctx.buf, true, SCRATCH, SCRATCH, abi::CPU_SP_OFF);
    } else {
        x86::emit_mov_rr(ctx.buf, true, SCRATCH, host_gpr(rn));
    }

    match mode {
        Addressing::Offset(d) | Addressing::PreIndex(d) => {
            if d != 0 {
                x86::emit_arith_ri(ctx.buf, ArithOp::Add, true, SCRATCH, d as i32);
            }
        }
        Addressing::PostIndex(_) => {}
        Addressing::RegOffset { option, shift } => {
            x86::emit_push(ctx.buf, Reg::Rax);
            let rm = insn.rm();
            if rm == 31 {
                x86::emit_mov_ri(ctx.buf, true, Reg::Rax, 0);
            } else {
                let src = host_gpr(rm);
                match option {
                    0b010 => x86::emit_mov_rr(ctx.buf, false, Reg::Rax, src),
                    0b110 => x86::emit_movsxd(ctx.buf, Reg::Rax, src),
                    _ => x86::emit_mov_rr(ctx.buf, true, Reg::Rax, src),
                }
            }
            if shift != 0 {
                x86::emit_shift_ri(ctx.buf, ShiftOp::Shl, true, Reg::Rax, shift as u8);
            }
            x86::emit_arith_rr(ctx.buf, ArithOp::Add, true, SCRATCH, Reg::Rax);
            x86::emit_pop(ctx.buf, Reg::Rax);
        }
    }

    // Host-side writeback mirrors the shadow: pre writes the EA, post adds
    // the displacement after the access completes (the EA in scratch is
    // still the base for post forms, so write base+disp from it).
    let wb = match mode {
        Addressing::PreIndex(_) => Some(0i64),
        Addressing::PostIndex(d) => Some(d),
        _ => None,
    };
    if let Some(extra) = wb {
        x86::emit_push(ctx.buf, Reg::Rax);
        x86::emit_mov_rr(ctx.buf, true, Reg::Rax, SCRATCH);
        if extra != 0 {
            x86::emit_arith_ri(ctx.buf, ArithOp::Add, true, Reg::Rax, extra as i32);
        }
        if rn == 31 {
            x86::emit_push(ctx.buf, SCRATCH);
            ctx.emit_ctx_to_scratch();
            x86::emit_store(ctx.buf, true, Reg::Rax, SCRATCH, abi::CPU_SP_OFF);
            x86::emit_pop(ctx.buf, SCRATCH);
        } else {
            x86::emit_mov_rr(ctx.buf, true, host_gpr(rn), Reg::Rax);
        }
        x86::emit_pop(ctx.buf, Reg::Rax);
    }
}

/// Apply the shadow writeback after the access.
fn shadow_writeback<B: GuestBus>(ctx: &mut DisasContext<'_, B>, wb: Option<u64>) {
    if let Some(value) = wb {
        let rn = ctx.insn.rn();
        ctx.state.set_xr_sp(rn, value);
    }
}

/// How a GPR load extends into the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadExt {
    Zero,
    SignTo32,
    SignTo64,
}

fn shadow_load<B: GuestBus>(ctx: &mut DisasContext<'_, B>, ea: u64, size_log2: u32) -> u64 {
    let r = match size_log2 {
        0 => ctx.bus.read_u8(ea).map(u64::from),
        1 => ctx.bus.read_u16(ea).map(u64::from),
        2 => ctx.bus.read_u32(ea).map(u64::from),
        _ => ctx.bus.read_u64(ea),
    };
    match r {
        Ok(v) => v,
        Err(e) => {
            tracing::trace!(target: "arx_jit", "shadow load fault: {e}");
            0
        }
    }
}

fn shadow_store<B: GuestBus>(ctx: &mut DisasContext<'_, B>, ea: u64, size_log2: u32, value: u64) {
    let r = match size_log2 {
        0 => ctx.bus.write_u8(ea, value as u8),
        1 => ctx.bus.write_u16(ea, value as u16),
        2 => ctx.bus.write_u32(ea, value as u32),
        _ => ctx.bus.write_u64(ea, value),
    };
    if let Err(e) = r {
        tracing::trace!(target: "arx_jit", "shadow store fault: {e}");
    }
}

fn extend_loaded(value: u64, size_log2: u32, ext: LoadExt) -> u64 {
    match ext {
        LoadExt::Zero => value,
        LoadExt::SignTo32 => {
            let v = match size_log2 {
                0 => (value as u8 as i8) as i32,
                1 => (value as u16 as i16) as i32,
                _ => value as i32,
            };
            u64::from(v as u32)
        }
        LoadExt::SignTo64 => match size_log2 {
            0 => (value as u8 as i8) as i64 as u64,
            1 => (value as u16 as i16) as i64 as u64,
            2 => (value as u32 as i32) as i64 as u64,
            _ => value,
        },
    }
}

/// GPR load with the EA already in scratch.
fn emit_gpr_load<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    rt: u8,
    size_log2: u32,
    ext: LoadExt,
) {
    let buf = &mut *ctx.buf;
    // Loads to the zero register still access memory; discard into scratch.
    let dst = if rt == 31 { SCRATCH } else { host_gpr(rt) };
    match (size_log2, ext) {
        (0, LoadExt::Zero) => x86::emit_load8_zx(buf, dst, SCRATCH, 0),
        (0, LoadExt::SignTo32) => x86::emit_load8_sx(buf, false, dst, SCRATCH, 0),
        (0, LoadExt::SignTo64) => x86::emit_load8_sx(buf, true, dst, SCRATCH, 0),
        (1, LoadExt::Zero) => x86::emit_load16_zx(buf, dst, SCRATCH, 0),
        (1, LoadExt::SignTo32) => x86::emit_load16_sx(buf, false, dst, SCRATCH, 0),
        (1, LoadExt::SignTo64) => x86::emit_load16_sx(buf, true, dst, SCRATCH, 0),
        (2, LoadExt::SignTo64) => x86::emit_load32_sx(buf, dst, SCRATCH, 0),
        (2, _) => x86::emit_load(buf, false, dst, SCRATCH, 0),
        _ => x86::emit_load(buf, true, dst, SCRATCH, 0),
    }
}

/// GPR store with the EA already in scratch.
fn emit_gpr_store<B: GuestBus>(ctx: &mut DisasContext<'_, B>, rt: u8, size_log2: u32) {
    let buf = &mut *ctx.buf;
    let src = if rt == 31 { Reg::Rax } else { host_gpr(rt) };
    if rt == 31 {
        x86::emit_push(buf, Reg::Rax);
        x86::emit_mov_ri(buf, true, Reg::Rax, 0);
    }
    match size_log2 {
        0 => x86::emit_store8(buf, src, SCRATCH, 0),
        1 => x86::emit_store16(buf, src, SCRATCH, 0),
        2 => x86::emit_store(buf, false, src, SCRATCH, 0),
        _ => x86::emit_store(buf, true, src, SCRATCH, 0),
    }
    if rt == 31 {
        x86::emit_pop(buf, Reg::Rax);
    }
}

/// SIMD&FP load/store with the EA already in scratch. `size_log2` 0..4
/// (4 = full 128-bit register).
fn emit_vec_access<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    rt: u8,
    size_log2: u32,
    store: bool,
) {
    let buf = &mut *ctx.buf;
    let x = host_xmm(rt);
    match (size_log2, store) {
        (4, false) => x86::emit_sse_mem(buf, x86::OPC_MOVDQU_load, x, SCRATCH, 0),
        (4, true) => x86::emit_sse_mem(buf, x86::OPC_MOVDQU_store, x, SCRATCH, 0),
        (3, false) => x86::emit_sse_mem(buf, x86::OPC_MOVSD_load, x, SCRATCH, 0),
        (3, true) => x86::emit_sse_mem(buf, x86::OPC_MOVSD_store, x, SCRATCH, 0),
        (2, false) => x86::emit_sse_mem(buf, x86::OPC_MOVSS_load, x, SCRATCH, 0),
        (2, true) => x86::emit_sse_mem(buf, x86::OPC_MOVSS_store, x, SCRATCH, 0),
        (_, false) => {
            // Byte/halfword scalar load: zero-extend through rax.
            x86::emit_push(buf, Reg::Rax);
            if size_log2 == 0 {
                x86::emit_load8_zx(buf, Reg::Rax, SCRATCH, 0);
            } else {
                x86::emit_load16_zx(buf, Reg::Rax, SCRATCH, 0);
            }
            x86::emit_movd_g2x(buf, true, x, Reg::Rax);
            x86::emit_pop(buf, Reg::Rax);
        }
        (_, true) => {
            x86::emit_push(buf, Reg::Rax);
            x86::emit_movd_x2g(buf, true, Reg::Rax, x);
            if size_log2 == 0 {
                x86::emit_store8(buf, Reg::Rax, SCRATCH, 0);
            } else {
                x86::emit_store16(buf, Reg::Rax, SCRATCH, 0);
            }
            x86::emit_pop(buf, Reg::Rax);
        }
    }
}

/// Single GPR access, shadow + emitted.
fn gpr_access<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    mode: Addressing,
    rt: u8,
    size_log2: u32,
    load: Option<LoadExt>,
) -> TransResult {
    let (ea, wb) = shadow_ea(ctx, mode);
    match load {
        Some(ext) => {
            let raw = shadow_load(ctx, ea, size_log2);
            let value = extend_loaded(raw, size_log2, ext);
            // Writeback happens regardless; rt == rn writeback is resolved
            // in favor of the loaded value, matching the architecture.
            shadow_writeback(ctx, wb);
            ctx.state.set_xr(rt, value);
        }
        None => {
            let value = ctx.state.xr(rt);
            shadow_store(ctx, ea, size_log2, value);
            shadow_writeback(ctx, wb);
        }
    }

    emit_ea(ctx, mode);
    match load {
        Some(ext) => emit_gpr_load(ctx, rt, size_log2, ext),
        None => emit_gpr_store(ctx, rt, size_log2),
    }
    Ok(Outcome::Continue)
}

/// Single SIMD&FP access, shadow + emitted.
fn vec_access<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    mode: Addressing,
    rt: u8,
    size_log2: u32,
    store: bool,
) -> TransResult {
    let (ea, wb) = shadow_ea(ctx, mode);
    if store {
        let value = ctx.state.v[rt as usize];
        let r = match size_log2 {
            4 => ctx.bus.write_u128(ea, value),
            3 => ctx.bus.write_u64(ea, value as u64),
            2 => ctx.bus.write_u32(ea, value as u32),
            1 => ctx.bus.write_u16(ea, value as u16),
            _ => ctx.bus.write_u8(ea, value as u8),
        };
        if let Err(e) = r {
            tracing::trace!(target: "arx_jit", "shadow store fault: {e}");
        }
        shadow_writeback(ctx, wb);
    } else {
        let value = match size_log2 {
            4 => ctx.bus.read_u128(ea).unwrap_or(0),
            3 => ctx.bus.read_u64(ea).map(u128::from).unwrap_or(0),
            2 => ctx.bus.read_u32(ea).map(u128::from).unwrap_or(0),
            1 => ctx.bus.read_u16(ea).map(u128::from).unwrap_or(0),
            _ => ctx.bus.read_u8(ea).map(u128::from).unwrap_or(0),
        };
        shadow_writeback(ctx, wb);
        ctx.state.v[rt as usize] = value;
    }

    emit_ea(ctx, mode);
    emit_vec_access(ctx, rt, size_log2, store);
    Ok(Outcome::Continue)
}

/// Pair access: two registers at ea and ea + access size.
fn pair_access<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    mode: Addressing,
    size_log2: u32,
    vector: bool,
    load: bool,
    signed32: bool,
) -> TransResult {
    let insn = ctx.insn;
    let (rt, rt2) = (insn.rd(), insn.rt2());
    let step = 1u64 << size_log2;
    let (ea, wb) = shadow_ea(ctx, mode);

    if vector {
        for (i, reg) in [rt, rt2].into_iter().enumerate() {
            let addr = ea + step * i as u64;
            if load {
                let value = match size_log2 {
                    4 => ctx.bus.read_u128(addr).unwrap_or(0),
                    3 => ctx.bus.read_u64(addr).map(u128::from).unwrap_or(0),
                    _ => ctx.bus.read_u32(addr).map(u128::from).unwrap_or(0),
                };
                ctx.state.v[reg as usize] = value;
            } else {
                let value = ctx.state.v[reg as usize];
                let r = match size_log2 {
                    4 => ctx.bus.write_u128(addr, value),
                    3 => ctx.bus.write_u64(addr, value as u64),
                    _ => ctx.bus.write_u32(addr, value as u32),
                };
                if let Err(e) = r {
                    tracing::trace!(target: "arx_jit", "shadow store fault: {e}");
                }
            }
        }
    } else {
        for (i, reg) in [rt, rt2].into_iter().enumerate() {
            let addr = ea + step * i as u64;
            if load {
                let raw = shadow_load(ctx, addr, size_log2);
                let value = if signed32 {
                    extend_loaded(raw, 2, LoadExt::SignTo64)
                } else {
                    raw
                };
                ctx.state.set_xr(reg, value);
            } else {
                let value = ctx.state.xr(reg);
                shadow_store(ctx, addr, size_log2, value);
            }
        }
    }
    shadow_writeback(ctx, wb);

    emit_ea(ctx, mode);
    for (i, reg) in [rt, rt2].into_iter().enumerate() {
        if i == 1 {
            x86::emit_arith_ri(ctx.buf, ArithOp::Add, true, SCRATCH, step as i32);
        }
        if vector {
            emit_vec_access(ctx, reg, size_log2, !load);
        } else if load {
            let ext = if signed32 {
                LoadExt::SignTo64
            } else {
                LoadExt::Zero
            };
            let sz = if signed32 { 2 } else { size_log2 };
            emit_gpr_load(ctx, reg, sz, ext);
        } else {
            emit_gpr_store(ctx, reg, size_log2);
        }
    }
    Ok(Outcome::Continue)
}

/// LDR (literal): PC-relative load; the address is a translate-time
/// constant.
fn literal<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;
    let ea = ctx.pc.wrapping_add((insn.simm19() << 2) as u64);
    let opc = insn.bits(30, 31);
    let vector = insn.bit(26);
    let rt = insn.rd();

    if vector {
        let size_log2 = match opc {
            0 => 2,
            1 => 3,
            2 => 4,
            _ => return Err(ClassMiss),
        };
        let value = match size_log2 {
            4 => ctx.bus.read_u128(ea).unwrap_or(0),
            3 => ctx.bus.read_u64(ea).map(u128::from).unwrap_or(0),
            _ => ctx.bus.read_u32(ea).map(u128::from).unwrap_or(0),
        };
        ctx.state.v[rt as usize] = value;
        x86::emit_mov_ri(ctx.buf, true, SCRATCH, ea);
        emit_vec_access(ctx, rt, size_log2, false);
        return Ok(Outcome::Continue);
    }

    match opc {
        0 | 1 => {
            let size_log2 = if opc == 0 { 2 } else { 3 };
            let value = shadow_load(ctx, ea, size_log2);
            ctx.state.set_xr(rt, value);
            x86::emit_mov_ri(ctx.buf, true, SCRATCH, ea);
            emit_gpr_load(ctx, rt, size_log2, LoadExt::Zero);
        }
        2 => {
            let raw = shadow_load(ctx, ea, 2);
            ctx.state.set_xr(rt, extend_loaded(raw, 2, LoadExt::SignTo64));
            x86::emit_mov_ri(ctx.buf, true, SCRATCH, ea);
            emit_gpr_load(ctx, rt, 2, LoadExt::SignTo64);
        }
        _ => {
            // PRFM literal: hint only.
            x86::emit_nop(ctx.buf);
        }
    }
    Ok(Outcome::Continue)
}

/// Decode size/opc/V of the single-register forms into an access.
fn single_access<B: GuestBus>(
    ctx: &mut DisasContext<'_, B>,
    mode: Addressing,
) -> TransResult {
    let insn = ctx.insn;
    let size = insn.bits(30, 31);
    let opc = insn.bits(22, 23);
    let vector = insn.bit(26);
    let rt = insn.rd();

    if vector {
        let (size_log2, store) = match (size, opc) {
            (0, 2) => (4, true),
            (0, 3) => (4, false),
            (s, 0) => (s, true),
            (s, 1) => (s, false),
            _ => return Err(ClassMiss),
        };
        return vec_access(ctx, mode, rt, size_log2, store);
    }

    match (size, opc) {
        (s, 0) => gpr_access(ctx, mode, rt, s, None),
        (s, 1) => gpr_access(ctx, mode, rt, s, Some(LoadExt::Zero)),
        (3, 2) => Err(ClassMiss), // PRFM unsigned-offset shares this slot
        (2, 2) => gpr_access(ctx, mode, rt, 2, Some(LoadExt::SignTo64)),
        (s, 2) => gpr_access(ctx, mode, rt, s, Some(LoadExt::SignTo64)),
        (s @ (0 | 1), 3) => gpr_access(ctx, mode, rt, s, Some(LoadExt::SignTo32)),
        _ => Err(ClassMiss),
    }
}

pub fn translate<B: GuestBus>(ctx: &mut DisasContext<'_, B>) -> TransResult {
    let insn = ctx.insn;

    // Unsigned scaled immediate.
    if insn.matches(0x3B00_0000, 0x3900_0000) {
        let size = insn.bits(30, 31);
        let opc = insn.bits(22, 23);
        let scale = if insn.bit(26) && opc >= 2 { 4 } else { size };
        let disp = i64::from(insn.imm12()) << scale;
        return single_access(ctx, Addressing::Offset(disp));
    }

    // imm9 forms: unscaled, post-indexed, unprivileged, pre-indexed.
    if insn.matches(0x3B20_0000, 0x3800_0000) {
        let mode = match insn.bits(10, 11) {
            0 | 2 => Addressing::Offset(insn.simm9()),
            1 => Addressing::PostIndex(insn.simm9()),
            _ => Addressing::PreIndex(insn.simm9()),
        };
        return single_access(ctx, mode);
    }

    // Register offset.
    if insn.matches(0x3B20_0C00, 0x3820_0800) {
        let size = insn.bits(30, 31);
        let opc = insn.bits(22, 23);
        let scale = if insn.bit(26) && opc >= 2 { 4 } else { size };
        let option = insn.bits(13, 15);
        if option & 0b010 == 0 {
            return Err(ClassMiss); // sub-word offsets are reserved
        }
        let shift = if insn.bit(12) { scale } else { 0 };
        return single_access(ctx, Addressing::RegOffset { option, shift });
    }

    // Pair forms (bit 25 clear keeps the data-processing space out).
    if insn.matches(0x3A00_0000, 0x2800_0000) {
        let opc = insn.bits(30, 31);
        let vector = insn.bit(26);
        let load = insn.bit(22);
        let mode_bits = insn.bits(23, 25);
        let (size_log2, signed32) = if vector {
            match opc {
                0 => (2, false),
                1 => (3, false),
                2 => (4, false),
                _ => return Err(ClassMiss),
            }
        } else {
            match opc {
                0 => (2, false),
                1 if load => (2, true), // LDPSW
                2 => (3, false),
                _ => return Err(ClassMiss),
            }
        };
        let disp = insn.simm7() << size_log2;
        let mode = match mode_bits {
            1 => Addressing::PostIndex(disp),
            3 => Addressing::PreIndex(disp),
            0 | 2 => Addressing::Offset(disp),
            _ => return Err(ClassMiss),
        };
        return pair_access(ctx, mode, size_log2, vector, load, signed32);
    }

    // Literal.
    if insn.matches(0x3B00_0000, 0x1800_0000) {
        return literal(ctx);
    }

    Err(ClassMiss)
}
