//! ALU class coverage: arithmetic, logicals, multiply/divide, variable
//! shifts, carries and conditional selects.

mod common;

use arx_cpu_core::flags::{PSTATE_C, PSTATE_N, PSTATE_V, PSTATE_Z};
use common::*;

fn translate(words: &[u32]) -> arx_cpu_core::CpuState {
    let (mut state, mut bus, mut rt) = setup(words);
    rt.translate_block(&mut state, &mut bus, CODE_BASE).unwrap();
    state
}

fn translate_from(state: &mut arx_cpu_core::CpuState, words: &[u32]) {
    let mut bus = arx_cpu_core::FlatTestBus::new(BUS_SIZE);
    bus.load_words(CODE_BASE, words);
    let mut rt = arx_jit::JitRuntime::new(arx_cpu_core::JitConfig::default());
    rt.translate_block(state, &mut bus, CODE_BASE).unwrap();
}

#[test]
fn add_sub_register() {
    let state = translate(&[
        movz(1, 100),
        movz(2, 30),
        add(0, 1, 2),
        sub(3, 1, 2),
        ret(),
    ]);
    assert_eq!(state.x[0], 130);
    assert_eq!(state.x[3], 70);
}

#[test]
fn add_with_shifted_operand() {
    // ADD X0, X1, X2, LSL #4
    let state = translate(&[movz(1, 1), movz(2, 2), add_lsl(0, 1, 2, 4), ret()]);
    assert_eq!(state.x[0], 1 + (2 << 4));
}

#[test]
fn add_sub_immediate_and_sp() {
    let mut state = arx_cpu_core::CpuState::new();
    state.sp = 0x8000;
    // ADD X0, SP, #0x10; SUB SP, SP, #0x20
    translate_from(&mut state, &[add_imm(0, 31, 0x10), sub_imm(31, 31, 0x20), ret()]);
    assert_eq!(state.x[0], 0x8010);
    assert_eq!(state.sp, 0x7FE0);
}

#[test]
fn w_form_truncates() {
    // ADD W0, W1, W2 with a 33-bit sum.
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 0xFFFF_FFFF;
    state.x[2] = 1;
    translate_from(&mut state, &[0x0B02_0020, ret()]);
    assert_eq!(state.x[0], 0, "W add wraps and zero-extends");
}

#[test]
fn logical_ops() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 0xF0F0;
    state.x[2] = 0x0FF0;
    translate_from(
        &mut state,
        &[
            and_reg(0, 1, 2),
            orr_reg(3, 1, 2),
            eor_reg(4, 1, 2),
            bic_reg(5, 1, 2),
            mvn_reg(6, 2),
            ret(),
        ],
    );
    assert_eq!(state.x[0], 0x00F0);
    assert_eq!(state.x[3], 0xFFF0);
    assert_eq!(state.x[4], 0xFF00);
    assert_eq!(state.x[5], 0xF000);
    assert_eq!(state.x[6], !0x0FF0u64);
}

#[test]
fn ands_sets_flags_and_clears_cv() {
    let mut state = arx_cpu_core::CpuState::new();
    state.pstate = PSTATE_C | PSTATE_V;
    state.x[1] = 1;
    state.x[2] = 2;
    translate_from(&mut state, &[ands(0, 1, 2), ret()]);
    assert_eq!(state.x[0], 0);
    assert_ne!(state.pstate & PSTATE_Z, 0);
    assert_eq!(state.pstate & (PSTATE_C | PSTATE_V), 0);
}

#[test]
fn logical_immediate() {
    // AND X0, X1, #0xFF -> N=1, immr=0, imms=7
    let and_imm = 0x9240_1C20u32;
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 0x1234;
    translate_from(&mut state, &[and_imm, ret()]);
    assert_eq!(state.x[0], 0x34);
}

#[test]
fn mul_madd_msub() {
    let state = translate(&[
        movz(1, 6),
        movz(2, 7),
        movz(3, 100),
        mul(0, 1, 2),
        madd(4, 1, 2, 3),
        msub(5, 1, 2, 3),
        ret(),
    ]);
    assert_eq!(state.x[0], 42);
    assert_eq!(state.x[4], 142);
    assert_eq!(state.x[5], 58);
}

#[test]
fn division_including_zero_divisor() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 100;
    state.x[2] = 7;
    state.x[3] = 0;
    translate_from(
        &mut state,
        &[udiv(0, 1, 2), udiv(4, 1, 3), sdiv(5, 1, 2), ret()],
    );
    assert_eq!(state.x[0], 14);
    assert_eq!(state.x[4], 0, "division by zero yields zero");
    assert_eq!(state.x[5], 14);
}

#[test]
fn signed_division_negative() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = (-100i64) as u64;
    state.x[2] = 7;
    translate_from(&mut state, &[sdiv(0, 1, 2), ret()]);
    assert_eq!(state.x[0] as i64, -14);
}

#[test]
fn sdiv_overflow_case() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = i64::MIN as u64;
    state.x[2] = (-1i64) as u64;
    translate_from(&mut state, &[sdiv(0, 1, 2), ret()]);
    assert_eq!(state.x[0], i64::MIN as u64);
}

#[test]
fn variable_shifts_mask_amount() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 1;
    state.x[2] = 68; // 68 % 64 == 4
    state.x[3] = 0x8000_0000_0000_0000;
    translate_from(
        &mut state,
        &[lslv(0, 1, 2), lsrv(4, 3, 2), asrv(5, 3, 2), ret()],
    );
    assert_eq!(state.x[0], 16);
    assert_eq!(state.x[4], 0x0800_0000_0000_0000);
    assert_eq!(state.x[5], 0xF800_0000_0000_0000);
}

#[test]
fn adc_uses_stored_carry() {
    let mut state = arx_cpu_core::CpuState::new();
    state.pstate = PSTATE_C;
    state.x[1] = 10;
    state.x[2] = 5;
    translate_from(&mut state, &[adc(0, 1, 2), ret()]);
    assert_eq!(state.x[0], 16, "carry-in adds one");

    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 10;
    state.x[2] = 5;
    translate_from(&mut state, &[adc(0, 1, 2), ret()]);
    assert_eq!(state.x[0], 15, "no carry pending");
}

#[test]
fn sbc_borrow_convention() {
    // With C set (no borrow) SBC == SUB.
    let mut state = arx_cpu_core::CpuState::new();
    state.pstate = PSTATE_C;
    state.x[1] = 10;
    state.x[2] = 4;
    translate_from(&mut state, &[sbc(0, 1, 2), ret()]);
    assert_eq!(state.x[0], 6);

    // With C clear an extra one is borrowed.
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 10;
    state.x[2] = 4;
    translate_from(&mut state, &[sbc(0, 1, 2), ret()]);
    assert_eq!(state.x[0], 5);
}

#[test]
fn adds_overflow_flags() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = i64::MAX as u64;
    state.x[2] = 1;
    translate_from(&mut state, &[adds(0, 1, 2), ret()]);
    assert_ne!(state.pstate & PSTATE_V, 0, "signed overflow");
    assert_ne!(state.pstate & PSTATE_N, 0, "negative result");
    assert_eq!(state.pstate & PSTATE_C, 0, "no unsigned carry");
}

#[test]
fn csel_and_csinc() {
    // CMP X1, X2 (equal) then CSEL EQ / CSINC NE.
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 5;
    state.x[2] = 5;
    state.x[3] = 111;
    state.x[4] = 222;
    translate_from(
        &mut state,
        &[
            cmp_reg(1, 2),
            csel(0, 3, 4, 0x0),  // EQ -> x3
            csel(5, 3, 4, 0x1),  // NE -> x4
            csinc(6, 3, 4, 0x1), // NE -> x4 + 1
            ret(),
        ],
    );
    assert_eq!(state.x[0], 111);
    assert_eq!(state.x[5], 222);
    assert_eq!(state.x[6], 223);
}

#[test]
fn cset_idiom() {
    // CSET X0, EQ == CSINC X0, XZR, XZR, NE
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 5;
    state.x[2] = 5;
    translate_from(&mut state, &[cmp_reg(1, 2), csinc(0, 31, 31, 0x1), ret()]);
    assert_eq!(state.x[0], 1);
}

#[test]
fn clz_counts_and_handles_zero() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 0x0000_1000_0000_0000;
    state.x[2] = 0;
    state.x[3] = 1;
    // CLZ X0, X1; CLZ X4, X2; CLZ W5, W3
    translate_from(
        &mut state,
        &[0xDAC0_1020, 0xDAC0_1044, 0x5AC0_1065, ret()],
    );
    assert_eq!(state.x[0], 19);
    assert_eq!(state.x[4], 64, "CLZ of zero is the operand width");
    assert_eq!(state.x[5], 31);
}

#[test]
fn rbit_and_rev_family() {
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 0x0102_0304_0506_0708;
    // RBIT X0, X1; REV X2, X1; REV16 X3, X1; REV32 X4, X1; REV W5, W1
    translate_from(
        &mut state,
        &[
            0xDAC0_0020,
            0xDAC0_0C22,
            0xDAC0_0423,
            0xDAC0_0824,
            0x5AC0_0825,
            ret(),
        ],
    );
    assert_eq!(state.x[0], 0x0102_0304_0506_0708u64.reverse_bits());
    assert_eq!(state.x[2], 0x0807_0605_0403_0201);
    assert_eq!(state.x[3], 0x0201_0403_0605_0807);
    assert_eq!(state.x[4], 0x0403_0201_0807_0605);
    assert_eq!(state.x[5], u64::from(0x0506_0708u32.swap_bytes()));
}

#[test]
fn ccmp_compares_or_loads_immediate() {
    // x1 == x2, so CCMP EQ performs the second compare (x3 vs x4).
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 5;
    state.x[2] = 5;
    state.x[3] = 9;
    state.x[4] = 9;
    // CMP X1, X2; CCMP X3, X4, #0, EQ
    let ccmp = 0xFA44_0060u32; // rm=4, cond=EQ, rn=3, nzcv=0
    translate_from(&mut state, &[cmp_reg(1, 2), ccmp, ret()]);
    assert_ne!(state.pstate & PSTATE_Z, 0, "second compare sets Z");
    assert_ne!(state.pstate & PSTATE_C, 0);

    // Condition fails: the immediate NZCV (0b0001 = V) is loaded.
    let mut state = arx_cpu_core::CpuState::new();
    state.x[1] = 5;
    state.x[2] = 6;
    state.x[3] = 9;
    state.x[4] = 9;
    let ccmp_v = 0xFA44_0061u32; // nzcv=0b0001
    translate_from(&mut state, &[cmp_reg(1, 2), ccmp_v, ret()]);
    assert_eq!(state.pstate & PSTATE_Z, 0);
    assert_ne!(state.pstate & PSTATE_V, 0, "fallback NZCV loaded");
}

#[test]
fn writes_to_xzr_are_suppressed() {
    let state = translate(&[movz(1, 9), movz(2, 9), add(31, 1, 2), ret()]);
    assert_eq!(state.x[31], 0);
    assert_eq!(state.xr(31), 0);
}
