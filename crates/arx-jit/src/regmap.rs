//! Static guest → host register mapping.
//!
//! Guest regs 0–15 map 1:1 onto host regs 0–15; guest regs 16–31 alias the
//! same bank (`& 0x0F`), which is legal because the translation contract
//! treats x16–x31 as transient, caller-saved values. Vector regs map onto
//! xmm0–xmm15 the same way. Every translator must route register numbers
//! through these two functions; nothing else may invent a mapping.

use arx_emit::{Reg, Xmm};

/// Host GPR for a guest register number.
#[must_use]
pub fn host_gpr(guest: u8) -> Reg {
    Reg::from_num(guest & 0x0F)
}

/// Host XMM for a guest vector register number.
#[must_use]
pub fn host_xmm(guest: u8) -> Xmm {
    Xmm(guest & 0x0F)
}

/// Designated emitter scratch. Lives inside the alias bank (guest x11/x27),
/// so sequences that clobber it rely on the same transience contract as the
/// aliasing itself.
pub const SCRATCH: Reg = Reg::R11;

/// Secondary scratch used only inside multi-step sequences that have
/// already saved it (division, flag materialization).
pub const SCRATCH2: Reg = Reg::Rax;

/// Scratch vector register for BIC/MLA-style two-step sequences.
pub const SCRATCH_XMM: Xmm = Xmm(15);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliasing_is_idempotent_under_mask() {
        for g in 0u8..32 {
            assert_eq!(host_gpr(g), host_gpr(g & 0x0F));
            assert_eq!(host_xmm(g), host_xmm(g & 0x0F));
        }
    }

    #[test]
    fn low_bank_is_identity() {
        for g in 0u8..16 {
            assert_eq!(host_gpr(g) as u8, g);
            assert_eq!(host_xmm(g).num(), g);
        }
    }
}
