#![allow(dead_code)]

use arx_cpu_core::{CpuState, FlatTestBus, JitConfig};
use arx_jit::JitRuntime;

pub const BUS_SIZE: usize = 0x10000;
pub const CODE_BASE: u64 = 0x1000;

pub fn setup(words: &[u32]) -> (CpuState, FlatTestBus, JitRuntime) {
    setup_with(JitConfig::default(), words)
}

pub fn setup_with(cfg: JitConfig, words: &[u32]) -> (CpuState, FlatTestBus, JitRuntime) {
    let mut bus = FlatTestBus::new(BUS_SIZE);
    bus.load_words(CODE_BASE, words);
    let state = CpuState::new();
    (state, bus, JitRuntime::new(cfg))
}

/// Bytes of an installed block, for emitted-encoding assertions.
pub fn block_bytes(handle: arx_jit::BlockHandle) -> Vec<u8> {
    unsafe {
        std::slice::from_raw_parts(handle.host_addr as *const u8, handle.size as usize).to_vec()
    }
}

/// True if `needle` appears as a contiguous byte run in `haystack`.
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// -- A64 word encoders used across the suites --

pub fn movz(rd: u8, imm16: u16) -> u32 {
    movz_hw(rd, imm16, 0)
}

pub fn movz_w(rd: u8, imm16: u16) -> u32 {
    0x5280_0000 | (u32::from(imm16) << 5) | u32::from(rd)
}

pub fn movz_hw(rd: u8, imm16: u16, hw: u32) -> u32 {
    0xD280_0000 | (hw << 21) | (u32::from(imm16) << 5) | u32::from(rd)
}

pub fn movk_hw(rd: u8, imm16: u16, hw: u32) -> u32 {
    0xF280_0000 | (hw << 21) | (u32::from(imm16) << 5) | u32::from(rd)
}

pub fn movn(rd: u8, imm16: u16) -> u32 {
    0x9280_0000 | (u32::from(imm16) << 5) | u32::from(rd)
}

fn rrr(base: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    base | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn add(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x8B00_0000, rd, rn, rm)
}

pub fn add_lsl(rd: u8, rn: u8, rm: u8, shift: u32) -> u32 {
    rrr(0x8B00_0000 | (shift << 10), rd, rn, rm)
}

pub fn adds(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xAB00_0000, rd, rn, rm)
}

pub fn sub(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xCB00_0000, rd, rn, rm)
}

pub fn subs(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xEB00_0000, rd, rn, rm)
}

pub fn add_imm(rd: u8, rn: u8, imm12: u32) -> u32 {
    0x9100_0000 | (imm12 << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn sub_imm(rd: u8, rn: u8, imm12: u32) -> u32 {
    0xD100_0000 | (imm12 << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn and_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x8A00_0000, rd, rn, rm)
}

pub fn bic_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x8A20_0000, rd, rn, rm)
}

pub fn orr_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xAA00_0000, rd, rn, rm)
}

pub fn mvn_reg(rd: u8, rm: u8) -> u32 {
    rrr(0xAA20_0000, rd, 31, rm)
}

pub fn eor_reg(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xCA00_0000, rd, rn, rm)
}

pub fn ands(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xEA00_0000, rd, rn, rm)
}

pub fn madd(rd: u8, rn: u8, rm: u8, ra: u8) -> u32 {
    0x9B00_0000 | (u32::from(rm) << 16) | (u32::from(ra) << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn msub(rd: u8, rn: u8, rm: u8, ra: u8) -> u32 {
    madd(rd, rn, rm, ra) | 0x8000
}

pub fn mul(rd: u8, rn: u8, rm: u8) -> u32 {
    madd(rd, rn, rm, 31)
}

pub fn udiv(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x9AC0_0800, rd, rn, rm)
}

pub fn sdiv(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x9AC0_0C00, rd, rn, rm)
}

pub fn lslv(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x9AC0_2000, rd, rn, rm)
}

pub fn lsrv(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x9AC0_2400, rd, rn, rm)
}

pub fn asrv(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x9AC0_2800, rd, rn, rm)
}

pub fn adc(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0x9A00_0000, rd, rn, rm)
}

pub fn sbc(rd: u8, rn: u8, rm: u8) -> u32 {
    rrr(0xDA00_0000, rd, rn, rm)
}

pub fn csel(rd: u8, rn: u8, rm: u8, cond: u32) -> u32 {
    rrr(0x9A80_0000 | (cond << 12), rd, rn, rm)
}

pub fn csinc(rd: u8, rn: u8, rm: u8, cond: u32) -> u32 {
    rrr(0x9A80_0400 | (cond << 12), rd, rn, rm)
}

pub fn cmp_reg(rn: u8, rm: u8) -> u32 {
    subs(31, rn, rm)
}

pub fn cmp_imm(rn: u8, imm12: u32) -> u32 {
    0xF100_0000 | (imm12 << 10) | (u32::from(rn) << 5) | 31
}

pub fn cmn_reg(rn: u8, rm: u8) -> u32 {
    adds(31, rn, rm)
}

pub fn tst_reg(rn: u8, rm: u8) -> u32 {
    ands(31, rn, rm)
}

pub fn ubfm(rd: u8, rn: u8, immr: u32, imms: u32) -> u32 {
    0xD340_0000 | (immr << 16) | (imms << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn lsl_imm(rd: u8, rn: u8, shift: u32) -> u32 {
    ubfm(rd, rn, (64 - shift) % 64, 63 - shift)
}

pub fn lsr_imm(rd: u8, rn: u8, shift: u32) -> u32 {
    ubfm(rd, rn, shift, 63)
}

pub fn sbfm(rd: u8, rn: u8, immr: u32, imms: u32) -> u32 {
    0x9340_0000 | (immr << 16) | (imms << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

pub fn asr_imm(rd: u8, rn: u8, shift: u32) -> u32 {
    sbfm(rd, rn, shift, 63)
}

pub fn sxtb(rd: u8, rn: u8) -> u32 {
    sbfm(rd, rn, 0, 7)
}

pub fn extr(rd: u8, rn: u8, rm: u8, lsb: u32) -> u32 {
    0x93C0_0000 | (u32::from(rm) << 16) | (lsb << 10) | (u32::from(rn) << 5) | u32::from(rd)
}

// Memory.

pub fn ldr_imm(rt: u8, rn: u8, imm12_scaled: u32) -> u32 {
    0xF940_0000 | (imm12_scaled << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn str_imm(rt: u8, rn: u8, imm12_scaled: u32) -> u32 {
    0xF900_0000 | (imm12_scaled << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldr_w_imm(rt: u8, rn: u8, imm12_scaled: u32) -> u32 {
    0xB940_0000 | (imm12_scaled << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldrb_imm(rt: u8, rn: u8, imm12: u32) -> u32 {
    0x3940_0000 | (imm12 << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldrsb_imm(rt: u8, rn: u8, imm12: u32) -> u32 {
    0x3980_0000 | (imm12 << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldrsw_imm(rt: u8, rn: u8, imm12_scaled: u32) -> u32 {
    0xB980_0000 | (imm12_scaled << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn strb_imm(rt: u8, rn: u8, imm12: u32) -> u32 {
    0x3900_0000 | (imm12 << 10) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldur(rt: u8, rn: u8, simm9: i32) -> u32 {
    0xF840_0000 | (((simm9 as u32) & 0x1FF) << 12) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn str_pre(rt: u8, rn: u8, simm9: i32) -> u32 {
    0xF800_0C00 | (((simm9 as u32) & 0x1FF) << 12) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldr_post(rt: u8, rn: u8, simm9: i32) -> u32 {
    0xF840_0400 | (((simm9 as u32) & 0x1FF) << 12) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn ldr_reg(rt: u8, rn: u8, rm: u8) -> u32 {
    0xF860_6800 | (u32::from(rm) << 16) | (u32::from(rn) << 5) | u32::from(rt)
}

pub fn stp(rt: u8, rt2: u8, rn: u8, imm7_scaled: i32) -> u32 {
    0xA900_0000
        | (((imm7_scaled as u32) & 0x7F) << 15)
        | (u32::from(rt2) << 10)
        | (u32::from(rn) << 5)
        | u32::from(rt)
}

pub fn ldp(rt: u8, rt2: u8, rn: u8, imm7_scaled: i32) -> u32 {
    stp(rt, rt2, rn, imm7_scaled) | 0x0040_0000
}

// Branches / system.

pub fn b(imm26: i32) -> u32 {
    0x1400_0000 | ((imm26 as u32) & 0x03FF_FFFF)
}

pub fn bl(imm26: i32) -> u32 {
    0x9400_0000 | ((imm26 as u32) & 0x03FF_FFFF)
}

pub fn b_cond(cond: u32, imm19: i32) -> u32 {
    0x5400_0000 | (((imm19 as u32) & 0x7FFFF) << 5) | cond
}

pub fn cbz(rt: u8, imm19: i32) -> u32 {
    0xB400_0000 | (((imm19 as u32) & 0x7FFFF) << 5) | u32::from(rt)
}

pub fn cbnz(rt: u8, imm19: i32) -> u32 {
    0xB500_0000 | (((imm19 as u32) & 0x7FFFF) << 5) | u32::from(rt)
}

pub fn tbz(rt: u8, bit: u32, imm14: i32) -> u32 {
    let b5 = (bit >> 5) & 1;
    0x3600_0000
        | (b5 << 31)
        | ((bit & 0x1F) << 19)
        | (((imm14 as u32) & 0x3FFF) << 5)
        | u32::from(rt)
}

pub fn tbnz(rt: u8, bit: u32, imm14: i32) -> u32 {
    tbz(rt, bit, imm14) | 0x0100_0000
}

pub fn br(rn: u8) -> u32 {
    0xD61F_0000 | (u32::from(rn) << 5)
}

pub fn blr(rn: u8) -> u32 {
    0xD63F_0000 | (u32::from(rn) << 5)
}

pub fn ret() -> u32 {
    0xD65F_03C0
}

pub fn svc(imm16: u16) -> u32 {
    0xD400_0001 | (u32::from(imm16) << 5)
}

pub fn brk(imm16: u16) -> u32 {
    0xD420_0000 | (u32::from(imm16) << 5)
}

pub fn nop() -> u32 {
    0xD503_201F
}
