//! Byte-level x86_64 encoder.
//!
//! Opcodes are described as a `u32` combining the opcode byte with prefix
//! flags (`P_*`); `emit_opc` turns the combination into the correct
//! legacy-prefix / REX / escape byte order. REX is suppressed when its
//! payload is zero. All emission errors are captured on the buffer as
//! overflow; the helpers themselves never fail.

#![allow(non_upper_case_globals)]

use arx_types::Cond;

use crate::code_buffer::CodeBuffer;
use crate::regs::{Reg, Xmm};

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F escape
pub const P_EXT38: u32 = 0x200; // 0x0F 0x38 escape
pub const P_EXT3A: u32 = 0x400; // 0x0F 0x3A escape
pub const P_DATA16: u32 = 0x800; // 0x66 prefix
pub const P_REXW: u32 = 0x1000; // REX.W = 1
pub const P_REXB_R: u32 = 0x2000; // reg field is a byte register
pub const P_REXB_RM: u32 = 0x4000; // r/m field is a byte register
pub const P_SIMDF3: u32 = 0x8000; // 0xF3 prefix
pub const P_SIMDF2: u32 = 0x10000; // 0xF2 prefix

// -- Opcode constants --

pub const OPC_ARITH_GvEv: u32 = 0x03;
pub const OPC_ARITH_EvGv: u32 = 0x01;
pub const OPC_ARITH_EvIb: u32 = 0x83;
pub const OPC_ARITH_EvIz: u32 = 0x81;

pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVB_EvGv: u32 = 0x88;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;

pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT;
pub const OPC_MOVZWL: u32 = 0xB7 | P_EXT;
pub const OPC_MOVSBL: u32 = 0xBE | P_EXT;
pub const OPC_MOVSWL: u32 = 0xBF | P_EXT;
pub const OPC_MOVSLQ: u32 = 0x63 | P_REXW;

pub const OPC_SHIFT_Ib: u32 = 0xC1;
pub const OPC_SHIFT_cl: u32 = 0xD3;

pub const OPC_TESTL: u32 = 0x85;
pub const OPC_IMUL_GvEv: u32 = 0xAF | P_EXT;
pub const OPC_GRP3: u32 = 0xF7;
pub const OPC_GRP5: u32 = 0xFF;

pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_CALL_Jz: u32 = 0xE8;
pub const OPC_SETCC: u32 = 0x90 | P_EXT | P_REXB_RM;
pub const OPC_LEA: u32 = 0x8D;
pub const OPC_PUSH_r: u32 = 0x50;
pub const OPC_POP_r: u32 = 0x58;
pub const OPC_RET: u32 = 0xC3;

// SSE data movement
pub const OPC_MOVAPS: u32 = 0x28 | P_EXT;
pub const OPC_MOVAPD: u32 = 0x28 | P_EXT | P_DATA16;
pub const OPC_MOVDQU_load: u32 = 0x6F | P_EXT | P_SIMDF3;
pub const OPC_MOVDQU_store: u32 = 0x7F | P_EXT | P_SIMDF3;
pub const OPC_MOVD_G2X: u32 = 0x6E | P_EXT | P_DATA16;
pub const OPC_MOVD_X2G: u32 = 0x7E | P_EXT | P_DATA16;
pub const OPC_MOVSS_load: u32 = 0x10 | P_EXT | P_SIMDF3;
pub const OPC_MOVSS_store: u32 = 0x11 | P_EXT | P_SIMDF3;
pub const OPC_MOVSD_load: u32 = 0x10 | P_EXT | P_SIMDF2;
pub const OPC_MOVSD_store: u32 = 0x11 | P_EXT | P_SIMDF2;

// Packed integer arithmetic (66 0F xx unless noted)
pub const OPC_PADDB: u32 = 0xFC | P_EXT | P_DATA16;
pub const OPC_PADDW: u32 = 0xFD | P_EXT | P_DATA16;
pub const OPC_PADDD: u32 = 0xFE | P_EXT | P_DATA16;
pub const OPC_PADDQ: u32 = 0xD4 | P_EXT | P_DATA16;
pub const OPC_PSUBB: u32 = 0xF8 | P_EXT | P_DATA16;
pub const OPC_PSUBW: u32 = 0xF9 | P_EXT | P_DATA16;
pub const OPC_PSUBD: u32 = 0xFA | P_EXT | P_DATA16;
pub const OPC_PSUBQ: u32 = 0xFB | P_EXT | P_DATA16;
pub const OPC_PMULLW: u32 = 0xD5 | P_EXT | P_DATA16;
pub const OPC_PMULLD: u32 = 0x40 | P_EXT38 | P_DATA16;
pub const OPC_PCMPEQB: u32 = 0x74 | P_EXT | P_DATA16;
pub const OPC_PCMPEQW: u32 = 0x75 | P_EXT | P_DATA16;
pub const OPC_PCMPEQD: u32 = 0x76 | P_EXT | P_DATA16;
pub const OPC_PCMPEQQ: u32 = 0x29 | P_EXT38 | P_DATA16;
pub const OPC_PCMPGTB: u32 = 0x64 | P_EXT | P_DATA16;
pub const OPC_PCMPGTW: u32 = 0x65 | P_EXT | P_DATA16;
pub const OPC_PCMPGTD: u32 = 0x66 | P_EXT | P_DATA16;
pub const OPC_PCMPGTQ: u32 = 0x37 | P_EXT38 | P_DATA16;
pub const OPC_PMAXSB: u32 = 0x3C | P_EXT38 | P_DATA16;
pub const OPC_PMAXSW: u32 = 0xEE | P_EXT | P_DATA16;
pub const OPC_PMAXSD: u32 = 0x3D | P_EXT38 | P_DATA16;
pub const OPC_PMINSB: u32 = 0x38 | P_EXT38 | P_DATA16;
pub const OPC_PMINSW: u32 = 0xEA | P_EXT | P_DATA16;
pub const OPC_PMINSD: u32 = 0x39 | P_EXT38 | P_DATA16;
pub const OPC_PMAXUB: u32 = 0xDE | P_EXT | P_DATA16;
pub const OPC_PMAXUW: u32 = 0x3E | P_EXT38 | P_DATA16;
pub const OPC_PMAXUD: u32 = 0x3F | P_EXT38 | P_DATA16;
pub const OPC_PMINUB: u32 = 0xDA | P_EXT | P_DATA16;
pub const OPC_PMINUW: u32 = 0x3A | P_EXT38 | P_DATA16;
pub const OPC_PMINUD: u32 = 0x3B | P_EXT38 | P_DATA16;
pub const OPC_PAND: u32 = 0xDB | P_EXT | P_DATA16;
pub const OPC_PANDN: u32 = 0xDF | P_EXT | P_DATA16;
pub const OPC_POR: u32 = 0xEB | P_EXT | P_DATA16;
pub const OPC_PXOR: u32 = 0xEF | P_EXT | P_DATA16;
pub const OPC_PSHUFD: u32 = 0x70 | P_EXT | P_DATA16;
pub const OPC_PSHUFB: u32 = 0x00 | P_EXT38 | P_DATA16;
pub const OPC_PALIGNR: u32 = 0x0F | P_EXT3A | P_DATA16;
pub const OPC_PEXTRB: u32 = 0x14 | P_EXT3A | P_DATA16;
pub const OPC_PEXTRW: u32 = 0x15 | P_EXT3A | P_DATA16;
pub const OPC_PEXTRD: u32 = 0x16 | P_EXT3A | P_DATA16;
pub const OPC_PINSRB: u32 = 0x20 | P_EXT3A | P_DATA16;
pub const OPC_PINSRW: u32 = 0xC4 | P_EXT | P_DATA16;
pub const OPC_PINSRD: u32 = 0x22 | P_EXT3A | P_DATA16;

// Packed/scalar FP arithmetic: base opcode | prefix picks the form.
pub const OPC_FP_ADD: u32 = 0x58 | P_EXT;
pub const OPC_FP_MUL: u32 = 0x59 | P_EXT;
pub const OPC_FP_SUB: u32 = 0x5C | P_EXT;
pub const OPC_FP_MIN: u32 = 0x5D | P_EXT;
pub const OPC_FP_DIV: u32 = 0x5E | P_EXT;
pub const OPC_FP_MAX: u32 = 0x5F | P_EXT;
pub const OPC_FP_SQRT: u32 = 0x51 | P_EXT;
pub const OPC_UCOMISS: u32 = 0x2E | P_EXT;
pub const OPC_UCOMISD: u32 = 0x2E | P_EXT | P_DATA16;
pub const OPC_ANDPS: u32 = 0x54 | P_EXT;
pub const OPC_ANDPD: u32 = 0x54 | P_EXT | P_DATA16;
pub const OPC_ORPS: u32 = 0x56 | P_EXT;
pub const OPC_XORPS: u32 = 0x57 | P_EXT;
pub const OPC_XORPD: u32 = 0x57 | P_EXT | P_DATA16;
pub const OPC_CVTSI2SS: u32 = 0x2A | P_EXT | P_SIMDF3;
pub const OPC_CVTSI2SD: u32 = 0x2A | P_EXT | P_SIMDF2;
pub const OPC_CVTTSS2SI: u32 = 0x2C | P_EXT | P_SIMDF3;
pub const OPC_CVTTSD2SI: u32 = 0x2C | P_EXT | P_SIMDF2;
pub const OPC_CVTSS2SD: u32 = 0x5A | P_EXT | P_SIMDF3;
pub const OPC_CVTSD2SS: u32 = 0x5A | P_EXT | P_SIMDF2;
pub const OPC_CVTDQ2PS: u32 = 0x5B | P_EXT;
pub const OPC_CVTTPS2DQ: u32 = 0x5B | P_EXT | P_SIMDF3;
pub const OPC_CVTDQ2PD: u32 = 0xE6 | P_EXT | P_SIMDF3;
pub const OPC_CVTTPD2DQ: u32 = 0xE6 | P_EXT | P_DATA16;

// -- Group sub-opcodes --

/// Arithmetic sub-opcodes, also the /r field of 0x81/0x83.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Shift sub-opcodes, the /r field of 0xC1/0xD3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Group-3 extension codes (/r of 0xF7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Not = 2,
    Neg = 3,
    Mul = 4,
    Imul = 5,
    Div = 6,
    Idiv = 7,
}

/// Group-5 extension codes (/r of 0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    Inc = 0,
    Dec = 1,
    CallN = 2,
    JmpN = 4,
}

/// x86 condition-code nibble for Jcc/SETcc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum X86Cond {
    O = 0x0,
    No = 0x1,
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    S = 0x8,
    Ns = 0x9,
    P = 0xA,
    Np = 0xB,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl X86Cond {
    /// Host condition for a guest condition, assuming guest NZCV has been
    /// loaded into the host N/Z/C/V flag positions. AL/NV have no Jcc and
    /// must be handled as unconditional jumps by the caller.
    #[must_use]
    pub fn from_guest(cond: Cond) -> Option<Self> {
        match cond {
            Cond::Eq => Some(X86Cond::E),
            Cond::Ne => Some(X86Cond::Ne),
            Cond::Cs => Some(X86Cond::B),
            Cond::Cc => Some(X86Cond::Ae),
            Cond::Mi => Some(X86Cond::S),
            Cond::Pl => Some(X86Cond::Ns),
            Cond::Vs => Some(X86Cond::O),
            Cond::Vc => Some(X86Cond::No),
            Cond::Hi => Some(X86Cond::A),
            Cond::Ls => Some(X86Cond::Be),
            Cond::Ge => Some(X86Cond::Ge),
            Cond::Lt => Some(X86Cond::L),
            Cond::Gt => Some(X86Cond::G),
            Cond::Le => Some(X86Cond::Le),
            Cond::Al | Cond::Nv => None,
        }
    }
}

// -- Core encoding --

#[inline]
fn rexw_flag(rexw: bool) -> u32 {
    if rexw {
        P_REXW
    } else {
        0
    }
}

/// Emit prefixes + escapes + opcode byte. `r` and `rm` are raw 0..15
/// register numbers; pass 0 for unused fields.
pub fn emit_opc(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc_index(buf, opc, r, rm, 0);
}

/// Like `emit_opc` with a SIB index register contributing REX.X.
pub fn emit_opc_index(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8, index: u8) {
    let mut rex: u8 = 0;
    if opc & P_REXW != 0 {
        rex |= 0x08;
    }
    if r >= 8 {
        rex |= 0x04;
    }
    if index >= 8 {
        rex |= 0x02;
    }
    if rm >= 8 {
        rex |= 0x01;
    }
    // Byte-register access to spl/bpl/sil/dil needs a bare REX prefix.
    if rex == 0 && ((opc & P_REXB_R != 0 && r >= 4) || (opc & P_REXB_RM != 0 && rm >= 4)) {
        rex = 0x40;
    }

    if opc & P_DATA16 != 0 {
        buf.emit_u8(0x66);
    }
    if opc & P_SIMDF3 != 0 {
        buf.emit_u8(0xF3);
    } else if opc & P_SIMDF2 != 0 {
        buf.emit_u8(0xF2);
    }
    if rex != 0 {
        buf.emit_u8(0x40 | rex);
    }
    if opc & (P_EXT | P_EXT38 | P_EXT3A) != 0 {
        buf.emit_u8(0x0F);
        if opc & P_EXT38 != 0 {
            buf.emit_u8(0x38);
        } else if opc & P_EXT3A != 0 {
            buf.emit_u8(0x3A);
        }
    }
    buf.emit_u8(opc as u8);
}

/// Opcode + ModR/M, register-register form. Raw register numbers.
fn emit_modrm_raw(buf: &mut CodeBuffer, opc: u32, r: u8, rm: u8) {
    emit_opc(buf, opc, r, rm);
    buf.emit_u8(0xC0 | ((r & 7) << 3) | (rm & 7));
}

/// Opcode + ModR/M + displacement for `[base + offset]`, raw `r` number.
/// rbp/r13 always take a disp8, rsp/r12 always take a SIB byte.
fn emit_modrm_offset_raw(buf: &mut CodeBuffer, opc: u32, r: u8, base: Reg, offset: i32) {
    emit_opc(buf, opc, r, base as u8);
    let r3 = r & 7;
    let b3 = base.low3();

    if offset == 0 && b3 != 5 {
        if b3 == 4 {
            buf.emit_u8((r3 << 3) | 0x04);
            buf.emit_u8(0x24);
        } else {
            buf.emit_u8((r3 << 3) | b3);
        }
    } else if (-128..=127).contains(&offset) {
        if b3 == 4 {
            buf.emit_u8(0x44 | (r3 << 3));
            buf.emit_u8(0x24);
        } else {
            buf.emit_u8(0x40 | (r3 << 3) | b3);
        }
        buf.emit_u8(offset as u8);
    } else {
        if b3 == 4 {
            buf.emit_u8(0x84 | (r3 << 3));
            buf.emit_u8(0x24);
        } else {
            buf.emit_u8(0x80 | (r3 << 3) | b3);
        }
        buf.emit_u32(offset as u32);
    }
}

/// Opcode + ModR/M, reg-reg.
pub fn emit_modrm(buf: &mut CodeBuffer, opc: u32, r: Reg, rm: Reg) {
    emit_modrm_raw(buf, opc, r as u8, rm as u8);
}

/// Opcode + ModR/M with a /ext field (group opcodes), reg operand.
pub fn emit_modrm_ext(buf: &mut CodeBuffer, opc: u32, ext: u8, rm: Reg) {
    emit_opc(buf, opc, ext, rm as u8);
    buf.emit_u8(0xC0 | (ext << 3) | rm.low3());
}

/// Opcode + ModR/M + disp for `[base + offset]`.
pub fn emit_modrm_offset(buf: &mut CodeBuffer, opc: u32, r: Reg, base: Reg, offset: i32) {
    emit_modrm_offset_raw(buf, opc, r as u8, base, offset);
}

/// Opcode + ModR/M + SIB for `[base + index*scale + offset]`.
pub fn emit_modrm_sib(
    buf: &mut CodeBuffer,
    opc: u32,
    r: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    emit_opc_index(buf, opc, r as u8, base as u8, index as u8);
    let r3 = r.low3();
    let b3 = base.low3();
    let sib = (shift << 6) | (index.low3() << 3) | b3;

    if offset == 0 && b3 != 5 {
        buf.emit_u8((r3 << 3) | 0x04);
        buf.emit_u8(sib);
    } else if (-128..=127).contains(&offset) {
        buf.emit_u8(0x44 | (r3 << 3));
        buf.emit_u8(sib);
        buf.emit_u8(offset as u8);
    } else {
        buf.emit_u8(0x84 | (r3 << 3));
        buf.emit_u8(sib);
        buf.emit_u32(offset as u32);
    }
}

/// Opcode + RIP-relative ModR/M with a zero disp32 placeholder. Returns the
/// buffer offset of the disp32 so the caller can `patch_u32` it once the
/// target (e.g. a constant-pool slot) is placed.
pub fn emit_modrm_rip(buf: &mut CodeBuffer, opc: u32, r: u8) -> usize {
    emit_opc(buf, opc, r, 0);
    buf.emit_u8(((r & 7) << 3) | 0x05);
    let at = buf.offset();
    buf.emit_u32(0);
    at
}

// -- Integer moves --

/// MOV reg, reg (32 or 64-bit).
pub fn emit_mov_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, dst);
}

/// MOV reg, imm. Picks the shortest of XOR, B8+imm32, C7 sign-extended
/// imm32 and the full imm64 form.
pub fn emit_mov_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, val: u64) {
    if val == 0 {
        emit_modrm(buf, 0x31, reg, reg);
    } else if !rexw || val <= u32::MAX as u64 {
        emit_opc(buf, OPC_MOVL_Iv + u32::from(reg.low3()), 0, reg as u8);
        buf.emit_u32(val as u32);
    } else if val as i64 >= i32::MIN as i64 && val as i64 <= i32::MAX as i64 {
        emit_modrm_ext(buf, OPC_MOVL_EvIz | P_REXW, 0, reg);
        buf.emit_u32(val as u32);
    } else {
        emit_opc(buf, (OPC_MOVL_Iv + u32::from(reg.low3())) | P_REXW, 0, reg as u8);
        buf.emit_u64(val);
    }
}

/// MOVZX dst, src (8-bit source).
pub fn emit_movzx8(buf: &mut CodeBuffer, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVZBL | P_REXB_RM, dst, src);
}

/// MOVZX dst, src (16-bit source).
pub fn emit_movzx16(buf: &mut CodeBuffer, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVZWL, dst, src);
}

/// MOVSX dst, src (8-bit source, 64-bit dest).
pub fn emit_movsx8(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVSBL | P_REXB_RM | rexw_flag(rexw), dst, src);
}

/// MOVSX dst, src (16-bit source, 64-bit dest).
pub fn emit_movsx16(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVSWL | rexw_flag(rexw), dst, src);
}

/// MOVSXD dst, src (32-bit source, 64-bit dest).
pub fn emit_movsxd(buf: &mut CodeBuffer, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_MOVSLQ, dst, src);
}

// -- Integer arithmetic --

/// ADD/SUB/AND/OR/XOR/ADC/SBB/CMP reg, reg.
pub fn emit_arith_rr(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, src: Reg) {
    let opc = (OPC_ARITH_GvEv + ((op as u32) << 3)) | rexw_flag(rexw);
    emit_modrm(buf, opc, dst, src);
}

/// Arithmetic reg, imm (auto imm8 vs imm32).
pub fn emit_arith_ri(buf: &mut CodeBuffer, op: ArithOp, rexw: bool, dst: Reg, imm: i32) {
    let w = rexw_flag(rexw);
    if (-128..=127).contains(&imm) {
        emit_modrm_ext(buf, OPC_ARITH_EvIb | w, op as u8, dst);
        buf.emit_u8(imm as u8);
    } else {
        emit_modrm_ext(buf, OPC_ARITH_EvIz | w, op as u8, dst);
        buf.emit_u32(imm as u32);
    }
}

pub fn emit_not(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3 | rexw_flag(rexw), Ext3Op::Not as u8, reg);
}

pub fn emit_neg(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3 | rexw_flag(rexw), Ext3Op::Neg as u8, reg);
}

pub fn emit_inc(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5 | rexw_flag(rexw), Ext5Op::Inc as u8, reg);
}

pub fn emit_dec(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5 | rexw_flag(rexw), Ext5Op::Dec as u8, reg);
}

/// Shift/rotate reg by imm8.
pub fn emit_shift_ri(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg, imm: u8) {
    emit_modrm_ext(buf, OPC_SHIFT_Ib | rexw_flag(rexw), op as u8, dst);
    buf.emit_u8(imm);
}

/// Shift/rotate reg by CL.
pub fn emit_shift_cl(buf: &mut CodeBuffer, op: ShiftOp, rexw: bool, dst: Reg) {
    emit_modrm_ext(buf, OPC_SHIFT_cl | rexw_flag(rexw), op as u8, dst);
}

pub fn emit_test_rr(buf: &mut CodeBuffer, rexw: bool, r1: Reg, r2: Reg) {
    emit_modrm(buf, OPC_TESTL | rexw_flag(rexw), r2, r1);
}

pub fn emit_cmp_rr(buf: &mut CodeBuffer, rexw: bool, a: Reg, b: Reg) {
    emit_arith_rr(buf, ArithOp::Cmp, rexw, a, b);
}

pub fn emit_cmp_ri(buf: &mut CodeBuffer, rexw: bool, a: Reg, imm: i32) {
    emit_arith_ri(buf, ArithOp::Cmp, rexw, a, imm);
}

/// Two-operand IMUL: dst = dst * src.
pub fn emit_imul_rr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, OPC_IMUL_GvEv | rexw_flag(rexw), dst, src);
}

/// Single-operand DIV: RDX:RAX / reg.
pub fn emit_div(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3 | rexw_flag(rexw), Ext3Op::Div as u8, reg);
}

/// Single-operand IDIV: RDX:RAX / reg.
pub fn emit_idiv(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP3 | rexw_flag(rexw), Ext3Op::Idiv as u8, reg);
}

/// BSWAP reg (32 or 64-bit). The register is encoded in the opcode byte.
pub fn emit_bswap(buf: &mut CodeBuffer, rexw: bool, reg: Reg) {
    emit_opc(
        buf,
        (0xC8 | P_EXT).wrapping_add(u32::from(reg.low3())) | rexw_flag(rexw),
        0,
        reg as u8,
    );
}

/// BSR dst, src (index of the highest set bit; undefined on zero input).
pub fn emit_bsr(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, 0xBD | P_EXT | rexw_flag(rexw), dst, src);
}

/// BT reg, imm8 (loads the selected bit into CF).
pub fn emit_bt_ri(buf: &mut CodeBuffer, rexw: bool, reg: Reg, bit: u8) {
    emit_modrm_ext(buf, 0xBA | P_EXT | rexw_flag(rexw), 4, reg);
    buf.emit_u8(bit);
}

/// CMOVcc dst, src.
pub fn emit_cmovcc(buf: &mut CodeBuffer, cond: X86Cond, rexw: bool, dst: Reg, src: Reg) {
    emit_modrm(buf, (0x40 | P_EXT | rexw_flag(rexw)) + cond as u32, dst, src);
}

/// CMC (complement carry flag).
pub fn emit_cmc(buf: &mut CodeBuffer) {
    buf.emit_u8(0xF5);
}

/// CDQ: sign-extend EAX into EDX:EAX.
pub fn emit_cdq(buf: &mut CodeBuffer) {
    buf.emit_u8(0x99);
}

/// CQO: sign-extend RAX into RDX:RAX.
pub fn emit_cqo(buf: &mut CodeBuffer) {
    buf.emit_u8(0x48);
    buf.emit_u8(0x99);
}

// -- Memory --

/// MOV reg, [base+offset] (32/64-bit load).
pub fn emit_load(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_GvEv | rexw_flag(rexw), dst, base, offset);
}

/// MOV [base+offset], reg (32/64-bit store).
pub fn emit_store(buf: &mut CodeBuffer, rexw: bool, src: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_EvGv | rexw_flag(rexw), src, base, offset);
}

/// MOVZX reg, byte [base+offset].
pub fn emit_load8_zx(buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVZBL, dst, base, offset);
}

/// MOVZX reg, word [base+offset].
pub fn emit_load16_zx(buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVZWL, dst, base, offset);
}

/// MOVSX reg, byte [base+offset].
pub fn emit_load8_sx(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVSBL | rexw_flag(rexw), dst, base, offset);
}

/// MOVSX reg, word [base+offset].
pub fn emit_load16_sx(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVSWL | rexw_flag(rexw), dst, base, offset);
}

/// MOVSXD reg, dword [base+offset].
pub fn emit_load32_sx(buf: &mut CodeBuffer, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVSLQ, dst, base, offset);
}

/// MOV byte [base+offset], reg.
pub fn emit_store8(buf: &mut CodeBuffer, src: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVB_EvGv | P_REXB_R, src, base, offset);
}

/// MOV word [base+offset], reg.
pub fn emit_store16(buf: &mut CodeBuffer, src: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_MOVL_EvGv | P_DATA16, src, base, offset);
}

/// LEA dst, [base+offset].
pub fn emit_lea(buf: &mut CodeBuffer, rexw: bool, dst: Reg, base: Reg, offset: i32) {
    emit_modrm_offset(buf, OPC_LEA | rexw_flag(rexw), dst, base, offset);
}

/// LEA dst, [base+index*scale+offset].
pub fn emit_lea_sib(
    buf: &mut CodeBuffer,
    rexw: bool,
    dst: Reg,
    base: Reg,
    index: Reg,
    shift: u8,
    offset: i32,
) {
    emit_modrm_sib(buf, OPC_LEA | rexw_flag(rexw), dst, base, index, shift, offset);
}

// -- Stack / flags --

pub fn emit_push(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_PUSH_r + u32::from(reg.low3()), 0, reg as u8);
}

pub fn emit_pop(buf: &mut CodeBuffer, reg: Reg) {
    emit_opc(buf, OPC_POP_r + u32::from(reg.low3()), 0, reg as u8);
}

pub fn emit_pushfq(buf: &mut CodeBuffer) {
    buf.emit_u8(0x9C);
}

pub fn emit_popfq(buf: &mut CodeBuffer) {
    buf.emit_u8(0x9D);
}

/// SETcc dst-low-byte.
pub fn emit_setcc(buf: &mut CodeBuffer, cond: X86Cond, dst: Reg) {
    emit_modrm_ext(buf, OPC_SETCC + cond as u32, 0, dst);
}

// -- Control flow --

/// Jcc rel32 with a zero placeholder; returns the disp32 offset for
/// patching.
pub fn emit_jcc_placeholder(buf: &mut CodeBuffer, cond: X86Cond) -> usize {
    emit_opc(buf, OPC_JCC_long + cond as u32, 0, 0);
    let at = buf.offset();
    buf.emit_u32(0);
    at
}

/// JMP rel32 with a zero placeholder; returns the disp32 offset.
pub fn emit_jmp_placeholder(buf: &mut CodeBuffer) -> usize {
    buf.emit_u8(OPC_JMP_long as u8);
    let at = buf.offset();
    buf.emit_u32(0);
    at
}

/// Jcc rel32 to an absolute buffer offset already known.
pub fn emit_jcc_to(buf: &mut CodeBuffer, cond: X86Cond, target_offset: usize) {
    emit_opc(buf, OPC_JCC_long + cond as u32, 0, 0);
    let disp = target_offset as i64 - (buf.offset() as i64 + 4);
    buf.emit_u32(disp as u32);
}

/// JMP rel32 to an absolute buffer offset already known.
pub fn emit_jmp_to(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_JMP_long as u8);
    let disp = target_offset as i64 - (buf.offset() as i64 + 4);
    buf.emit_u32(disp as u32);
}

/// Patch a previously emitted rel32 so it lands on `target_offset`.
pub fn patch_rel32(buf: &mut CodeBuffer, disp_offset: usize, target_offset: usize) {
    let disp = target_offset as i64 - (disp_offset as i64 + 4);
    buf.patch_u32(disp_offset, disp as u32);
}

/// JMP through a register.
pub fn emit_jmp_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::JmpN as u8, reg);
}

/// CALL through a register.
pub fn emit_call_reg(buf: &mut CodeBuffer, reg: Reg) {
    emit_modrm_ext(buf, OPC_GRP5, Ext5Op::CallN as u8, reg);
}

/// CALL rel32 to an absolute buffer offset.
pub fn emit_call_to(buf: &mut CodeBuffer, target_offset: usize) {
    buf.emit_u8(OPC_CALL_Jz as u8);
    let disp = target_offset as i64 - (buf.offset() as i64 + 4);
    buf.emit_u32(disp as u32);
}

pub fn emit_ret(buf: &mut CodeBuffer) {
    buf.emit_u8(OPC_RET as u8);
}

pub fn emit_nop(buf: &mut CodeBuffer) {
    buf.emit_u8(0x90);
}

/// `n` bytes of NOP padding using the recommended multi-byte forms.
pub fn emit_nops(buf: &mut CodeBuffer, mut n: usize) {
    while n > 0 {
        match n {
            1 => {
                buf.emit_u8(0x90);
                n -= 1;
            }
            2 => {
                buf.emit_bytes(&[0x66, 0x90]);
                n -= 2;
            }
            3 => {
                buf.emit_bytes(&[0x0F, 0x1F, 0x00]);
                n -= 3;
            }
            4 => {
                buf.emit_bytes(&[0x0F, 0x1F, 0x40, 0x00]);
                n -= 4;
            }
            _ => {
                buf.emit_bytes(&[0x0F, 0x1F, 0x44, 0x00, 0x00]);
                n -= 5;
            }
        }
    }
}

// -- SSE: moves --

/// MOVAPS/MOVAPD-style xmm, xmm.
pub fn emit_sse_rr(buf: &mut CodeBuffer, opc: u32, dst: Xmm, src: Xmm) {
    emit_modrm_raw(buf, opc, dst.num(), src.num());
}

/// SSE op xmm, [base+offset].
pub fn emit_sse_mem(buf: &mut CodeBuffer, opc: u32, x: Xmm, base: Reg, offset: i32) {
    emit_modrm_offset_raw(buf, opc, x.num(), base, offset);
}

/// SSE op xmm, [rip+disp32] with placeholder; returns the disp32 offset.
pub fn emit_sse_rip(buf: &mut CodeBuffer, opc: u32, x: Xmm) -> usize {
    emit_modrm_rip(buf, opc, x.num())
}

/// MOVD/MOVQ xmm, gpr.
pub fn emit_movd_g2x(buf: &mut CodeBuffer, rexw: bool, dst: Xmm, src: Reg) {
    emit_modrm_raw(buf, OPC_MOVD_G2X | rexw_flag(rexw), dst.num(), src as u8);
}

/// MOVD/MOVQ gpr, xmm.
pub fn emit_movd_x2g(buf: &mut CodeBuffer, rexw: bool, dst: Reg, src: Xmm) {
    emit_modrm_raw(buf, OPC_MOVD_X2G | rexw_flag(rexw), src.num(), dst as u8);
}

/// PSHUFD dst, src, imm8.
pub fn emit_pshufd(buf: &mut CodeBuffer, dst: Xmm, src: Xmm, imm: u8) {
    emit_sse_rr(buf, OPC_PSHUFD, dst, src);
    buf.emit_u8(imm);
}

/// PALIGNR dst, src, imm8.
pub fn emit_palignr(buf: &mut CodeBuffer, dst: Xmm, src: Xmm, imm: u8) {
    emit_sse_rr(buf, OPC_PALIGNR, dst, src);
    buf.emit_u8(imm);
}

/// PEXTRB/W/D/Q gpr, xmm, lane.
pub fn emit_pextr(buf: &mut CodeBuffer, size_log2: u32, dst: Reg, src: Xmm, lane: u8) {
    match size_log2 {
        0 => emit_modrm_raw(buf, OPC_PEXTRB, src.num(), dst as u8),
        1 => emit_modrm_raw(buf, OPC_PEXTRW, src.num(), dst as u8),
        2 => emit_modrm_raw(buf, OPC_PEXTRD, src.num(), dst as u8),
        _ => emit_modrm_raw(buf, OPC_PEXTRD | P_REXW, src.num(), dst as u8),
    }
    buf.emit_u8(lane);
}

/// PINSRB/W/D/Q xmm, gpr, lane.
pub fn emit_pinsr(buf: &mut CodeBuffer, size_log2: u32, dst: Xmm, src: Reg, lane: u8) {
    match size_log2 {
        0 => emit_modrm_raw(buf, OPC_PINSRB, dst.num(), src as u8),
        1 => emit_modrm_raw(buf, OPC_PINSRW, dst.num(), src as u8),
        2 => emit_modrm_raw(buf, OPC_PINSRD, dst.num(), src as u8),
        _ => emit_modrm_raw(buf, OPC_PINSRD | P_REXW, dst.num(), src as u8),
    }
    buf.emit_u8(lane);
}

/// Packed shift by immediate: PSLLW/D/Q (/6), PSRLW/D/Q (/2), PSRAW/D (/4).
/// `size_log2` is 1/2/3 for word/dword/qword lanes.
pub fn emit_psll_imm(buf: &mut CodeBuffer, size_log2: u32, x: Xmm, imm: u8) {
    emit_pshift_imm(buf, size_log2, 6, x, imm);
}

pub fn emit_psrl_imm(buf: &mut CodeBuffer, size_log2: u32, x: Xmm, imm: u8) {
    emit_pshift_imm(buf, size_log2, 2, x, imm);
}

pub fn emit_psra_imm(buf: &mut CodeBuffer, size_log2: u32, x: Xmm, imm: u8) {
    debug_assert!(size_log2 <= 2, "no packed qword arithmetic shift");
    emit_pshift_imm(buf, size_log2, 4, x, imm);
}

fn emit_pshift_imm(buf: &mut CodeBuffer, size_log2: u32, ext: u8, x: Xmm, imm: u8) {
    let opc = match size_log2 {
        1 => 0x71,
        2 => 0x72,
        _ => 0x73,
    } | P_EXT
        | P_DATA16;
    emit_opc(buf, opc, ext, x.num());
    buf.emit_u8(0xC0 | (ext << 3) | x.low3());
    buf.emit_u8(imm);
}

/// CVTSI2SS/CVTSI2SD xmm, gpr.
pub fn emit_cvtsi2fp(buf: &mut CodeBuffer, double: bool, rexw: bool, dst: Xmm, src: Reg) {
    let opc = if double { OPC_CVTSI2SD } else { OPC_CVTSI2SS };
    emit_modrm_raw(buf, opc | rexw_flag(rexw), dst.num(), src as u8);
}

/// CVTTSS2SI/CVTTSD2SI gpr, xmm.
pub fn emit_cvtfp2si(buf: &mut CodeBuffer, double: bool, rexw: bool, dst: Reg, src: Xmm) {
    let opc = if double { OPC_CVTTSD2SI } else { OPC_CVTTSS2SI };
    emit_modrm_raw(buf, opc | rexw_flag(rexw), dst as u8, src.num());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(f: impl FnOnce(&mut CodeBuffer)) -> Vec<u8> {
        let mut buf = CodeBuffer::new(64);
        f(&mut buf);
        assert!(!buf.overflowed());
        buf.bytes().to_vec()
    }

    #[test]
    fn mov_rr_64() {
        // mov rbx, rax
        assert_eq!(
            bytes(|b| emit_mov_rr(b, true, Reg::Rbx, Reg::Rax)),
            [0x48, 0x89, 0xC3]
        );
        // mov r8, r15
        assert_eq!(
            bytes(|b| emit_mov_rr(b, true, Reg::R8, Reg::R15)),
            [0x4D, 0x89, 0xF8]
        );
    }

    #[test]
    fn mov_ri_forms() {
        // xor eax, eax
        assert_eq!(bytes(|b| emit_mov_ri(b, true, Reg::Rax, 0)), [0x31, 0xC0]);
        // mov eax, 0x1234
        assert_eq!(
            bytes(|b| emit_mov_ri(b, true, Reg::Rax, 0x1234)),
            [0xB8, 0x34, 0x12, 0x00, 0x00]
        );
        // movabs rcx, imm64
        assert_eq!(
            bytes(|b| emit_mov_ri(b, true, Reg::Rcx, 0x1122334455667788)),
            [0x48, 0xB9, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
    }

    #[test]
    fn arith_rr() {
        // add rax, rcx
        assert_eq!(
            bytes(|b| emit_arith_rr(b, ArithOp::Add, true, Reg::Rax, Reg::Rcx)),
            [0x48, 0x03, 0xC1]
        );
        // sub r9d, edx
        assert_eq!(
            bytes(|b| emit_arith_rr(b, ArithOp::Sub, false, Reg::R9, Reg::Rdx)),
            [0x44, 0x2B, 0xCA]
        );
    }

    #[test]
    fn load_store_disp8_and_sib() {
        // mov rax, [rdi+0x10]
        assert_eq!(
            bytes(|b| emit_load(b, true, Reg::Rax, Reg::Rdi, 0x10)),
            [0x48, 0x8B, 0x47, 0x10]
        );
        // mov [rsp], rcx needs SIB
        assert_eq!(
            bytes(|b| emit_store(b, true, Reg::Rcx, Reg::Rsp, 0)),
            [0x48, 0x89, 0x0C, 0x24]
        );
        // mov rdx, [rbp] forces disp8
        assert_eq!(
            bytes(|b| emit_load(b, true, Reg::Rdx, Reg::Rbp, 0)),
            [0x48, 0x8B, 0x55, 0x00]
        );
    }

    #[test]
    fn packed_add_lane_widths() {
        // paddd xmm0, xmm2
        assert_eq!(
            bytes(|b| emit_sse_rr(b, OPC_PADDD, Xmm(0), Xmm(2))),
            [0x66, 0x0F, 0xFE, 0xC2]
        );
        // paddq xmm1, xmm3
        assert_eq!(
            bytes(|b| emit_sse_rr(b, OPC_PADDQ, Xmm(1), Xmm(3))),
            [0x66, 0x0F, 0xD4, 0xCB]
        );
        // pmulld xmm0, xmm1 (SSE4.1, 0F 38 escape)
        assert_eq!(
            bytes(|b| emit_sse_rr(b, OPC_PMULLD, Xmm(0), Xmm(1))),
            [0x66, 0x0F, 0x38, 0x40, 0xC1]
        );
    }

    #[test]
    fn sse_rex_for_high_xmm() {
        // paddd xmm9, xmm10 — 66 prefix must precede REX
        assert_eq!(
            bytes(|b| emit_sse_rr(b, OPC_PADDD, Xmm(9), Xmm(10))),
            [0x66, 0x45, 0x0F, 0xFE, 0xCA]
        );
    }

    #[test]
    fn packed_shift_groups() {
        // pslld xmm1, 5 => 66 0F 72 /6
        assert_eq!(
            bytes(|b| emit_psll_imm(b, 2, Xmm(1), 5)),
            [0x66, 0x0F, 0x72, 0xF1, 0x05]
        );
        // psraw xmm2, 3 => 66 0F 71 /4
        assert_eq!(
            bytes(|b| emit_psra_imm(b, 1, Xmm(2), 3)),
            [0x66, 0x0F, 0x71, 0xE2, 0x03]
        );
    }

    #[test]
    fn rip_relative_placeholder_patches() {
        let mut buf = CodeBuffer::new(64);
        // andps xmm0, [rip+disp]
        let at = emit_sse_rip(&mut buf, OPC_ANDPS, Xmm(0));
        assert_eq!(buf.bytes(), [0x0F, 0x54, 0x05, 0x00, 0x00, 0x00, 0x00]);
        buf.patch_u32(at, 0x20);
        assert_eq!(&buf.bytes()[3..], [0x20, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn jcc_placeholder_and_patch() {
        let mut buf = CodeBuffer::new(64);
        let at = emit_jcc_placeholder(&mut buf, X86Cond::E);
        emit_nop(&mut buf);
        let target = buf.offset();
        patch_rel32(&mut buf, at, target);
        // jz +1 over the nop
        assert_eq!(buf.bytes(), [0x0F, 0x84, 0x01, 0x00, 0x00, 0x00, 0x90]);
    }

    #[test]
    fn guest_cond_to_host_cc() {
        assert_eq!(X86Cond::from_guest(Cond::Eq), Some(X86Cond::E));
        assert_eq!(X86Cond::from_guest(Cond::Cs), Some(X86Cond::B));
        assert_eq!(X86Cond::from_guest(Cond::Hi), Some(X86Cond::A));
        assert_eq!(X86Cond::from_guest(Cond::Lt), Some(X86Cond::L));
        assert_eq!(X86Cond::from_guest(Cond::Al), None);
        assert_eq!(X86Cond::from_guest(Cond::Nv), None);
    }

    #[test]
    fn setcc_uses_rex_for_high_byte_regs() {
        // sete sil needs a bare REX
        assert_eq!(
            bytes(|b| emit_setcc(b, X86Cond::E, Reg::Rsi)),
            [0x40, 0x0F, 0x94, 0xC6]
        );
        // sete al does not
        assert_eq!(
            bytes(|b| emit_setcc(b, X86Cond::E, Reg::Rax)),
            [0x0F, 0x94, 0xC0]
        );
    }

    #[test]
    fn movd_movq_between_banks() {
        // movq xmm0, rax
        assert_eq!(
            bytes(|b| emit_movd_g2x(b, true, Xmm(0), Reg::Rax)),
            [0x66, 0x48, 0x0F, 0x6E, 0xC0]
        );
        // movd eax, xmm1
        assert_eq!(
            bytes(|b| emit_movd_x2g(b, false, Reg::Rax, Xmm(1))),
            [0x66, 0x0F, 0x7E, 0xC8]
        );
    }

    #[test]
    fn shifts_by_cl_and_imm() {
        // shl rax, cl
        assert_eq!(
            bytes(|b| emit_shift_cl(b, ShiftOp::Shl, true, Reg::Rax)),
            [0x48, 0xD3, 0xE0]
        );
        // sar rdx, 7
        assert_eq!(
            bytes(|b| emit_shift_ri(b, ShiftOp::Sar, true, Reg::Rdx, 7)),
            [0x48, 0xC1, 0xFA, 0x07]
        );
    }

    #[test]
    fn store_byte_word() {
        // mov [rdi+1], sil needs REX
        assert_eq!(
            bytes(|b| emit_store8(b, Reg::Rsi, Reg::Rdi, 1)),
            [0x40, 0x88, 0x77, 0x01]
        );
        // mov word [rdi], cx
        assert_eq!(
            bytes(|b| emit_store16(b, Reg::Rcx, Reg::Rdi, 0)),
            [0x66, 0x89, 0x0F]
        );
    }
}
