//! NZCV flag model.
//!
//! PSTATE carries N/Z/C/V at bits 31/30/29/28 and nothing else. Flag
//! writers clear all four bits and recompute them; the helpers here are
//! the reference semantics every flag-setting translator follows. Note the
//! A64 carry convention for subtraction: C set means *no* borrow, the
//! inverse of the host's CF.

use arx_types::{Cond, Width};

pub const PSTATE_N: u64 = 1 << 31;
pub const PSTATE_Z: u64 = 1 << 30;
pub const PSTATE_C: u64 = 1 << 29;
pub const PSTATE_V: u64 = 1 << 28;
pub const NZCV_MASK: u64 = PSTATE_N | PSTATE_Z | PSTATE_C | PSTATE_V;

/// Pack four flag bits into PSTATE layout.
#[must_use]
pub fn pack_nzcv(n: bool, z: bool, c: bool, v: bool) -> u64 {
    (u64::from(n) << 31) | (u64::from(z) << 30) | (u64::from(c) << 29) | (u64::from(v) << 28)
}

/// Replace the NZCV field of `pstate`.
#[must_use]
pub fn with_nzcv(pstate: u64, nzcv: u64) -> u64 {
    (pstate & !NZCV_MASK) | (nzcv & NZCV_MASK)
}

#[must_use]
fn sign_bit(value: u64, width: Width) -> bool {
    value >> (width.bits() - 1) & 1 != 0
}

/// NZCV for an addition `result = op1 + op2` (+ optional carry-in).
#[must_use]
pub fn nzcv_add(op1: u64, op2: u64, carry_in: bool, width: Width) -> u64 {
    let mask = width.mask();
    let (op1, op2) = (op1 & mask, op2 & mask);
    let wide = u128::from(op1) + u128::from(op2) + u128::from(carry_in);
    let result = (wide as u64) & mask;

    let n = sign_bit(result, width);
    let z = result == 0;
    let c = wide > u128::from(mask);
    let s1 = sign_bit(op1, width);
    let s2 = sign_bit(op2, width);
    let v = s1 == s2 && sign_bit(result, width) != s1;
    pack_nzcv(n, z, c, v)
}

/// NZCV for a subtraction `result = op1 - op2`. C is the borrow-inverted
/// carry: set iff `op1 >= op2` unsigned.
#[must_use]
pub fn nzcv_sub(op1: u64, op2: u64, width: Width) -> u64 {
    let mask = width.mask();
    let (op1, op2) = (op1 & mask, op2 & mask);
    let result = op1.wrapping_sub(op2) & mask;

    let n = sign_bit(result, width);
    let z = result == 0;
    let c = op1 >= op2;
    let s1 = sign_bit(op1, width);
    let s2 = sign_bit(op2, width);
    let v = s1 != s2 && sign_bit(result, width) != s1;
    pack_nzcv(n, z, c, v)
}

/// NZCV for a subtract-with-carry `result = op1 - op2 - (1 - carry_in)`,
/// computed as `op1 + ~op2 + carry_in` so C/V follow the additive rules.
#[must_use]
pub fn nzcv_sbc(op1: u64, op2: u64, carry_in: bool, width: Width) -> u64 {
    nzcv_add(op1, !op2 & width.mask(), carry_in, width)
}

/// NZCV for a flag-setting logical op: C and V are always cleared.
#[must_use]
pub fn nzcv_logical(result: u64, width: Width) -> u64 {
    let result = result & width.mask();
    pack_nzcv(sign_bit(result, width), result == 0, false, false)
}

/// Evaluate a guest condition against a PSTATE word.
#[must_use]
pub fn cond_holds(pstate: u64, cond: Cond) -> bool {
    cond.holds(
        pstate & PSTATE_N != 0,
        pstate & PSTATE_Z != 0,
        pstate & PSTATE_C != 0,
        pstate & PSTATE_V != 0,
    )
}
