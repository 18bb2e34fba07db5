//! MOV-wide family, ADR/ADRP, bitfield moves and system registers.

mod common;

use arx_cpu_core::flags::{NZCV_MASK, PSTATE_C, PSTATE_Z};
use arx_cpu_core::{CpuState, FlatTestBus, JitConfig};
use arx_jit::JitRuntime;
use common::*;

fn run_block(state: &mut CpuState, words: &[u32]) {
    let mut bus = FlatTestBus::new(BUS_SIZE);
    bus.load_words(CODE_BASE, words);
    let mut rt = JitRuntime::new(JitConfig::default());
    rt.translate_block(state, &mut bus, CODE_BASE).unwrap();
}

#[test]
fn movz_movk_compose_64bit_constant() {
    let mut state = CpuState::new();
    run_block(
        &mut state,
        &[
            movz_hw(0, 0x1111, 0),
            movk_hw(0, 0x2222, 1),
            movk_hw(0, 0x3333, 2),
            movk_hw(0, 0x4444, 3),
            ret(),
        ],
    );
    assert_eq!(state.x[0], 0x4444_3333_2222_1111);
}

#[test]
fn movk_preserves_other_fields() {
    let mut state = CpuState::new();
    state.x[0] = 0xAAAA_BBBB_CCCC_DDDD;
    run_block(&mut state, &[movk_hw(0, 0x1234, 1), ret()]);
    assert_eq!(state.x[0], 0xAAAA_BBBB_1234_DDDD);
}

#[test]
fn movn_inverts() {
    let mut state = CpuState::new();
    run_block(&mut state, &[movn(0, 0), ret()]);
    assert_eq!(state.x[0], u64::MAX);

    // 32-bit MOVZ zeroes the upper half.
    let mut state = CpuState::new();
    state.x[0] = u64::MAX;
    run_block(&mut state, &[movz_w(0, 0x12), ret()]);
    assert_eq!(state.x[0], 0x12);
}

#[test]
fn adr_and_adrp() {
    // ADR X0, #0 points at the instruction itself.
    let adr = 0x1000_0000u32;
    let mut state = CpuState::new();
    run_block(&mut state, &[adr, ret()]);
    assert_eq!(state.x[0], CODE_BASE);

    // ADRP X0, #0 yields the page of pc.
    let adrp = 0x9000_0000u32;
    let mut state = CpuState::new();
    run_block(&mut state, &[adrp, ret()]);
    assert_eq!(state.x[0], CODE_BASE & !0xFFF);
}

#[test]
fn shift_immediate_aliases() {
    let mut state = CpuState::new();
    state.x[1] = 0x8000_0000_0000_00F0;
    run_block(
        &mut state,
        &[
            lsl_imm(0, 1, 8),
            lsr_imm(2, 1, 4),
            asr_imm(3, 1, 4),
            ret(),
        ],
    );
    assert_eq!(state.x[0], 0x0000_0000_0000_F000);
    assert_eq!(state.x[2], 0x0800_0000_0000_000F);
    assert_eq!(state.x[3], 0xF800_0000_0000_000F);
}

#[test]
fn sxtb_alias() {
    let mut state = CpuState::new();
    state.x[1] = 0x80;
    run_block(&mut state, &[sxtb(0, 1), ret()]);
    assert_eq!(state.x[0], 0xFFFF_FFFF_FFFF_FF80);
}

#[test]
fn bfi_inserts_field() {
    // BFI X0, X1, #8, #8 == BFM X0, X1, #(64-8), #(8-1).
    let bfi = 0xB340_1C20u32 | (56 << 16);
    let mut state = CpuState::new();
    state.x[0] = 0xFFFF_FFFF_FFFF_FFFF;
    state.x[1] = 0xAB;
    run_block(&mut state, &[bfi, ret()]);
    assert_eq!(state.x[0], 0xFFFF_FFFF_FFFF_ABFF);
}

#[test]
fn extr_and_ror_alias() {
    let mut state = CpuState::new();
    state.x[1] = 0x1111_2222_3333_4444;
    state.x[2] = 0x5555_6666_7777_8888;
    run_block(&mut state, &[extr(0, 1, 2, 16), ret()]);
    assert_eq!(state.x[0], 0x4444_5555_6666_7777);

    // ROR X0, X1, #16 == EXTR X0, X1, X1, #16.
    let mut state = CpuState::new();
    state.x[1] = 0x1111_2222_3333_4444;
    run_block(&mut state, &[extr(0, 1, 1, 16), ret()]);
    assert_eq!(state.x[0], 0x4444_1111_2222_3333);
}

#[test]
fn nop_and_hints_advance() {
    let mut state = CpuState::new();
    run_block(&mut state, &[nop(), movz(0, 3), ret()]);
    assert_eq!(state.x[0], 3);
}

#[test]
fn mrs_msr_nzcv() {
    // MSR NZCV, X1 then MRS X0, NZCV.
    let msr_nzcv = 0xD51B_4200u32 | 1;
    let mrs_nzcv = 0xD53B_4200u32;
    let mut state = CpuState::new();
    state.x[1] = PSTATE_Z | PSTATE_C | 0xFF; // low bits must be masked off
    run_block(&mut state, &[msr_nzcv, mrs_nzcv, ret()]);
    assert_eq!(state.pstate, PSTATE_Z | PSTATE_C);
    assert_eq!(state.x[0], PSTATE_Z | PSTATE_C);
    assert_eq!(state.pstate & !NZCV_MASK, 0);
}

#[test]
fn mrs_msr_fpcr_and_tpidr() {
    // MSR FPCR, X1; MRS X0, FPCR.
    let msr_fpcr = 0xD51B_4400u32 | 1;
    let mrs_fpcr = 0xD53B_4400u32;
    let mut state = CpuState::new();
    state.x[1] = 0x0300_0000;
    run_block(&mut state, &[msr_fpcr, mrs_fpcr, ret()]);
    assert_eq!(state.fpcr, 0x0300_0000);
    assert_eq!(state.x[0], 0x0300_0000);

    // MSR TPIDR_EL0, X2; MRS X3, TPIDR_EL0.
    let msr_tpidr = 0xD51B_D040u32 | 2;
    let mrs_tpidr = 0xD53B_D040u32 | 3;
    let mut state = CpuState::new();
    state.x[2] = 0xDEAD_0000_BEEF_0000;
    run_block(&mut state, &[msr_tpidr, mrs_tpidr, ret()]);
    assert_eq!(state.tpidr, 0xDEAD_0000_BEEF_0000);
    assert_eq!(state.x[3], 0xDEAD_0000_BEEF_0000);
}
