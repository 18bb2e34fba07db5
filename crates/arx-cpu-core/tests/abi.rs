//! Locks down the `CpuState` field offsets that translated code embeds.

use arx_cpu_core::state::{abi, CpuState};
use memoffset::offset_of;

#[test]
fn gpr_block_offsets() {
    assert_eq!(offset_of!(CpuState, x), 0);
    assert_eq!(abi::x_off(0), 0);
    assert_eq!(abi::x_off(30), 240);
}

#[test]
fn scalar_field_offsets() {
    assert_eq!(offset_of!(CpuState, sp), abi::CPU_SP_OFF as usize);
    assert_eq!(offset_of!(CpuState, pc), abi::CPU_PC_OFF as usize);
    assert_eq!(offset_of!(CpuState, pstate), abi::CPU_PSTATE_OFF as usize);
    assert_eq!(offset_of!(CpuState, host_sp), abi::CPU_HOST_SP_OFF as usize);
    assert_eq!(offset_of!(CpuState, fpcr), abi::CPU_FPCR_OFF as usize);
    assert_eq!(offset_of!(CpuState, fpsr), abi::CPU_FPSR_OFF as usize);
    assert_eq!(offset_of!(CpuState, tid), abi::CPU_TID_OFF as usize);
    assert_eq!(
        offset_of!(CpuState, last_syscall),
        abi::CPU_LAST_SYSCALL_OFF as usize
    );
    assert_eq!(
        offset_of!(CpuState, syscall_ret),
        abi::CPU_SYSCALL_RET_OFF as usize
    );
    assert_eq!(offset_of!(CpuState, tpidr), abi::CPU_TPIDR_OFF as usize);
}

#[test]
fn vector_block_offsets() {
    assert_eq!(offset_of!(CpuState, v), abi::CPU_V_OFF as usize);
    assert_eq!(abi::v_off(1), abi::CPU_V_OFF + 16);
    assert_eq!(abi::v_off(31), abi::CPU_V_OFF + 31 * 16);
}
