//! NEON class coverage: lane arithmetic at each element size, compares,
//! logicals, shifts, moves, immediates and structure loads.

mod common;

use arx_cpu_core::{CpuState, FlatTestBus, GuestBus, JitConfig};
use arx_jit::JitRuntime;
use common::*;

fn lanes32(v: [u32; 4]) -> u128 {
    let mut out = 0u128;
    for (i, lane) in v.into_iter().enumerate() {
        out |= u128::from(lane) << (i * 32);
    }
    out
}

fn lanes16(v: [u16; 8]) -> u128 {
    let mut out = 0u128;
    for (i, lane) in v.into_iter().enumerate() {
        out |= u128::from(lane) << (i * 16);
    }
    out
}

fn lanes64(v: [u64; 2]) -> u128 {
    u128::from(v[0]) | (u128::from(v[1]) << 64)
}

fn run_block(state: &mut CpuState, words: &[u32]) {
    let mut bus = FlatTestBus::new(BUS_SIZE);
    bus.load_words(CODE_BASE, words);
    let mut rt = JitRuntime::new(JitConfig::default());
    rt.translate_block(state, &mut bus, CODE_BASE).unwrap();
}

/// Three-same encoder: 0.Q.U.01110.size.1.rm.opcode.1.rn.rd.
fn three_same(q: bool, u: bool, size: u32, opcode: u32, rd: u8, rn: u8, rm: u8) -> u32 {
    0x0E20_0400
        | (u32::from(q) << 30)
        | (u32::from(u) << 29)
        | (size << 22)
        | (u32::from(rm) << 16)
        | (opcode << 11)
        | (u32::from(rn) << 5)
        | u32::from(rd)
}

#[test]
fn vector_add_sub_per_size() {
    // 16B add wraps per byte.
    let mut state = CpuState::new();
    state.v[1] = 0xFF;
    state.v[2] = 0x02;
    run_block(&mut state, &[three_same(true, false, 0, 0b10000, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], 0x01, "byte lane wraps without carrying out");

    // 8H.
    let mut state = CpuState::new();
    state.v[1] = lanes16([1, 2, 3, 4, 5, 6, 7, 8]);
    state.v[2] = lanes16([10, 10, 10, 10, 10, 10, 10, 10]);
    run_block(&mut state, &[three_same(true, false, 1, 0b10000, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes16([11, 12, 13, 14, 15, 16, 17, 18]));

    // 2D sub.
    let mut state = CpuState::new();
    state.v[1] = lanes64([100, 7]);
    state.v[2] = lanes64([1, 9]);
    run_block(&mut state, &[three_same(true, true, 3, 0b10000, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes64([99, 7u64.wrapping_sub(9)]));
}

#[test]
fn vector_add_64bit_form_zeroes_upper() {
    // ADD V0.2S, V1.2S, V2.2S (Q = 0).
    let mut state = CpuState::new();
    state.v[1] = lanes32([1, 2, 0xDEAD, 0xDEAD]);
    state.v[2] = lanes32([10, 20, 0xDEAD, 0xDEAD]);
    run_block(&mut state, &[three_same(false, false, 2, 0b10000, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([11, 22, 0, 0]));
}

#[test]
fn vector_mul() {
    let mut state = CpuState::new();
    state.v[1] = lanes32([2, 3, 4, 5]);
    state.v[2] = lanes32([10, 10, 10, 10]);
    run_block(&mut state, &[three_same(true, false, 2, 0b10011, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([20, 30, 40, 50]));
}

#[test]
fn vector_mla_mls() {
    let mut state = CpuState::new();
    state.v[0] = lanes32([100, 100, 100, 100]);
    state.v[1] = lanes32([2, 3, 4, 5]);
    state.v[2] = lanes32([10, 10, 10, 10]);
    run_block(&mut state, &[three_same(true, false, 2, 0b10010, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([120, 130, 140, 150]));

    let mut state = CpuState::new();
    state.v[0] = lanes32([100, 100, 100, 100]);
    state.v[1] = lanes32([2, 3, 4, 5]);
    state.v[2] = lanes32([10, 10, 10, 10]);
    run_block(&mut state, &[three_same(true, true, 2, 0b10010, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([80, 70, 60, 50]));
}

#[test]
fn vector_compares() {
    // CMEQ.4S.
    let mut state = CpuState::new();
    state.v[1] = lanes32([1, 2, 3, 4]);
    state.v[2] = lanes32([1, 9, 3, 9]);
    run_block(&mut state, &[three_same(true, true, 2, 0b10001, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([u32::MAX, 0, u32::MAX, 0]));

    // CMGT.4S signed.
    let mut state = CpuState::new();
    state.v[1] = lanes32([5, 0x8000_0000, 7, 0]);
    state.v[2] = lanes32([3, 1, 9, 0]);
    run_block(&mut state, &[three_same(true, false, 2, 0b00110, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([u32::MAX, 0, 0, 0]));

    // CMHI.4S unsigned: 0x8000_0000 > 1.
    let mut state = CpuState::new();
    state.v[1] = lanes32([5, 0x8000_0000, 7, 0]);
    state.v[2] = lanes32([3, 1, 9, 0]);
    run_block(&mut state, &[three_same(true, true, 2, 0b00110, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([u32::MAX, u32::MAX, 0, 0]));
}

#[test]
fn vector_min_max() {
    // SMAX.4S picks signed maxima; UMIN.4S picks unsigned minima.
    let mut state = CpuState::new();
    state.v[1] = lanes32([5, 0x8000_0000, 7, 0]);
    state.v[2] = lanes32([3, 1, 9, 0]);
    run_block(&mut state, &[three_same(true, false, 2, 0b01100, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([5, 1, 9, 0]), "0x8000_0000 is negative");

    let mut state = CpuState::new();
    state.v[1] = lanes32([5, 0x8000_0000, 7, 0]);
    state.v[2] = lanes32([3, 1, 9, 0]);
    run_block(&mut state, &[three_same(true, true, 2, 0b01101, 0, 1, 2), ret()]);
    assert_eq!(state.v[0], lanes32([3, 1, 7, 0]));
}

#[test]
fn vector_logicals() {
    let a = 0x00FF_00FF_F0F0_F0F0_1234_5678_9ABC_DEF0u128;
    let b = 0x0F0F_0F0F_FF00_FF00_1111_1111_1111_1111u128;

    // AND (size 00), ORR (size 10), EOR (U=1 size 00), BIC (size 01).
    for (word, expect) in [
        (three_same(true, false, 0, 0b00011, 0, 1, 2), a & b),
        (three_same(true, false, 2, 0b00011, 0, 1, 2), a | b),
        (three_same(true, true, 0, 0b00011, 0, 1, 2), a ^ b),
        (three_same(true, false, 1, 0b00011, 0, 1, 2), a & !b),
    ] {
        let mut state = CpuState::new();
        state.v[1] = a;
        state.v[2] = b;
        run_block(&mut state, &[word, ret()]);
        assert_eq!(state.v[0], expect);
    }
}

#[test]
fn vector_not() {
    // NOT V0.16B, V1.16B = 0x6E205820 | rn<<5 | rd
    let mut state = CpuState::new();
    state.v[1] = 0x1234_5678_9ABC_DEF0_0F0F_0F0F_F0F0_F0F0u128;
    run_block(&mut state, &[0x6E20_5820, ret()]);
    assert_eq!(state.v[0], !state.v[1]);
}

#[test]
fn vector_neg_and_cmeq_zero() {
    // NEG V0.4S, V1.4S = 0 1 1 01110 10 10000 01011 10: 0x6EA0B820 | rn<<5
    let mut state = CpuState::new();
    state.v[1] = lanes32([1, 0, 5, u32::MAX]);
    run_block(&mut state, &[0x6EA0_B820, ret()]);
    assert_eq!(state.v[0], lanes32([u32::MAX, 0, 0u32.wrapping_sub(5), 1]));

    // CMEQ V0.4S, V1.4S, #0 = 0 1 0 01110 10 10000 01001 10: 0x4EA09820 | rn<<5
    let mut state = CpuState::new();
    state.v[1] = lanes32([0, 7, 0, 1]);
    run_block(&mut state, &[0x4EA0_9820, ret()]);
    assert_eq!(state.v[0], lanes32([u32::MAX, 0, u32::MAX, 0]));
}

#[test]
fn shift_immediates() {
    // SHL V0.4S, V1.4S, #4: immh:immb = 0100:100 -> esize 32, shift 4.
    let shl = 0x4F24_5420u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([1, 2, 0x8000_0000, 0xF000_0000]);
    run_block(&mut state, &[shl, ret()]);
    assert_eq!(state.v[0], lanes32([16, 32, 0, 0]));

    // USHR V0.4S, V1.4S, #8: immh:immb = 0111:000 -> shift 64-56 = 8.
    let ushr = 0x6F38_0420u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([0xFF00, 0xABCD_0000, 0, 0x8000_0000]);
    run_block(&mut state, &[ushr, ret()]);
    assert_eq!(state.v[0], lanes32([0xFF, 0x00AB_CD00, 0, 0x0080_0000]));

    // SSHR V0.4S, V1.4S, #8 replicates the sign.
    let sshr = 0x4F38_0420u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([0x8000_0000, 0x7F00_0000, 0, 0]);
    run_block(&mut state, &[sshr, ret()]);
    assert_eq!(state.v[0], lanes32([0xFF80_0000, 0x007F_0000, 0, 0]));
}

#[test]
fn dup_umov_ins() {
    // DUP V0.4S, V1.S[2]: imm5 = 10100.
    let dup_elem = 0x4E14_0420u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([10, 20, 30, 40]);
    run_block(&mut state, &[dup_elem, ret()]);
    assert_eq!(state.v[0], lanes32([30, 30, 30, 30]));

    // DUP V0.4S, W1: imm5 = 00100, imm4 = 0001.
    let dup_gen = 0x4E04_0C20u32;
    let mut state = CpuState::new();
    state.x[1] = 0x7F;
    run_block(&mut state, &[dup_gen, ret()]);
    assert_eq!(state.v[0], lanes32([0x7F; 4]));

    // UMOV W0, V1.S[1]: imm5 = 01100, imm4 = 0111.
    let umov = 0x0E0C_3C20u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([9, 0xAABB, 7, 8]);
    run_block(&mut state, &[umov, ret()]);
    assert_eq!(state.x[0], 0xAABB);

    // INS V0.S[3], W1: imm5 = 11100.
    let ins_gen = 0x4E1C_1C20u32;
    let mut state = CpuState::new();
    state.v[0] = lanes32([1, 2, 3, 4]);
    state.x[1] = 0x55;
    run_block(&mut state, &[ins_gen, ret()]);
    assert_eq!(state.v[0], lanes32([1, 2, 3, 0x55]));
}

#[test]
fn smov_sign_extends() {
    // SMOV X0, V1.B[0]: imm5 = 00001, imm4 = 0101, Q = 1.
    let smov = 0x4E01_2C20u32;
    let mut state = CpuState::new();
    state.v[1] = 0x80;
    run_block(&mut state, &[smov, ret()]);
    assert_eq!(state.x[0], 0xFFFF_FFFF_FFFF_FF80);
}

#[test]
fn movi_forms() {
    // MOVI V0.16B, #0x42: cmode 1110, op 0, abc=010 defgh=00010.
    let movi_bytes = 0x4F02_E440u32;
    let mut state = CpuState::new();
    run_block(&mut state, &[movi_bytes, ret()]);
    let mut expect = 0u128;
    for i in 0..16 {
        expect |= 0x42u128 << (i * 8);
    }
    assert_eq!(state.v[0], expect);

    // MOVI V0.4S, #0x12, LSL #8: cmode 0010.
    let movi_shifted = 0x4F00_2640u32 | 2; // abc=000 defgh=10010, rd=2
    let mut state = CpuState::new();
    run_block(&mut state, &[movi_shifted, ret()]);
    assert_eq!(state.v[2], lanes32([0x1200; 4]));
}

#[test]
fn ext_concatenation() {
    // EXT V0.16B, V1.16B, V2.16B, #4.
    let ext = 0x6E02_2020u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([0x11111111, 0x22222222, 0x33333333, 0x44444444]);
    state.v[2] = lanes32([0x55555555, 0x66666666, 0x77777777, 0x88888888]);
    run_block(&mut state, &[ext, ret()]);
    assert_eq!(
        state.v[0],
        lanes32([0x22222222, 0x33333333, 0x44444444, 0x55555555])
    );
}

#[test]
fn ld1_st1_round_trip() {
    // LD1 {V0.16B}, [X1]; ST1 {V0.16B}, [X2]
    let ld1 = 0x4C40_7020u32;
    let st1 = 0x4C00_7040u32;
    let mut state = CpuState::new();
    let mut bus = FlatTestBus::new(BUS_SIZE);
    bus.load_words(CODE_BASE, &[ld1, st1, ret()]);
    bus.write_u128(0x4000, 0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10u128)
        .unwrap();
    state.x[1] = 0x4000;
    state.x[2] = 0x5000;
    let mut rt = JitRuntime::new(JitConfig::default());
    rt.translate_block(&mut state, &mut bus, CODE_BASE).unwrap();
    assert_eq!(
        state.v[0],
        0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10u128
    );
    assert_eq!(bus.read_u128(0x5000).unwrap(), state.v[0]);
}

#[test]
fn ld2_simplified_sequential() {
    // LD2 {V0.16B, V1.16B}, [X1] is emitted as two sequential loads.
    let ld2 = 0x4C40_8020u32;
    let mut state = CpuState::new();
    let mut bus = FlatTestBus::new(BUS_SIZE);
    bus.load_words(CODE_BASE, &[ld2, ret()]);
    bus.write_u128(0x4000, 0xAAu128).unwrap();
    bus.write_u128(0x4010, 0xBBu128).unwrap();
    state.x[1] = 0x4000;
    let mut rt = JitRuntime::new(JitConfig::default());
    rt.translate_block(&mut state, &mut bus, CODE_BASE).unwrap();
    assert_eq!(state.v[0], 0xAA);
    assert_eq!(state.v[1], 0xBB);
}

#[test]
fn vector_fp_arithmetic() {
    let f32x4 = |v: [f32; 4]| lanes32([v[0].to_bits(), v[1].to_bits(), v[2].to_bits(), v[3].to_bits()]);

    // FADD V0.4S, V1.4S, V2.4S: U=0, size 0x, opcode 11010.
    let fadd = three_same(true, false, 0, 0b11010, 0, 1, 2);
    let mut state = CpuState::new();
    state.v[1] = f32x4([1.0, 2.0, 3.0, 4.0]);
    state.v[2] = f32x4([0.5, 0.5, 0.5, 0.5]);
    run_block(&mut state, &[fadd, ret()]);
    assert_eq!(state.v[0], f32x4([1.5, 2.5, 3.5, 4.5]));

    // FSUB has the size<1> bit set.
    let fsub = three_same(true, false, 2, 0b11010, 0, 1, 2);
    let mut state = CpuState::new();
    state.v[1] = f32x4([1.0, 2.0, 3.0, 4.0]);
    state.v[2] = f32x4([0.5, 0.5, 0.5, 0.5]);
    run_block(&mut state, &[fsub, ret()]);
    assert_eq!(state.v[0], f32x4([0.5, 1.5, 2.5, 3.5]));

    // FMUL: U=1, opcode 11011.
    let fmul = three_same(true, true, 0, 0b11011, 0, 1, 2);
    let mut state = CpuState::new();
    state.v[1] = f32x4([1.0, 2.0, 3.0, 4.0]);
    state.v[2] = f32x4([2.0, 2.0, 2.0, 2.0]);
    run_block(&mut state, &[fmul, ret()]);
    assert_eq!(state.v[0], f32x4([2.0, 4.0, 6.0, 8.0]));
}

#[test]
fn vector_scvtf_fcvtzs() {
    // SCVTF V0.4S, V1.4S: 0 1 0 01110 0 0 10000 11101 10.
    let scvtf = 0x4E21_D820u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([1, 2, 0xFFFF_FFFF, 100]);
    run_block(&mut state, &[scvtf, ret()]);
    assert_eq!(
        state.v[0],
        lanes32([
            1.0f32.to_bits(),
            2.0f32.to_bits(),
            (-1.0f32).to_bits(),
            100.0f32.to_bits()
        ])
    );

    // FCVTZS V0.4S, V1.4S: 0 1 0 01110 1 0 10000 11011 10.
    let fcvtzs = 0x4EA1_B820u32;
    let mut state = CpuState::new();
    state.v[1] = lanes32([
        2.9f32.to_bits(),
        (-2.9f32).to_bits(),
        0.0f32.to_bits(),
        41.5f32.to_bits(),
    ]);
    run_block(&mut state, &[fcvtzs, ret()]);
    assert_eq!(state.v[0], lanes32([2, (-2i32) as u32, 0, 41]));
}
