//! Host register names.

/// x86_64 general-purpose registers in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    /// Register for a raw 0..15 encoding number.
    #[must_use]
    pub fn from_num(n: u8) -> Self {
        match n & 0xF {
            0 => Reg::Rax,
            1 => Reg::Rcx,
            2 => Reg::Rdx,
            3 => Reg::Rbx,
            4 => Reg::Rsp,
            5 => Reg::Rbp,
            6 => Reg::Rsi,
            7 => Reg::Rdi,
            8 => Reg::R8,
            9 => Reg::R9,
            10 => Reg::R10,
            11 => Reg::R11,
            12 => Reg::R12,
            13 => Reg::R13,
            14 => Reg::R14,
            _ => Reg::R15,
        }
    }

    /// Low three bits for ModR/M / SIB fields.
    #[must_use]
    pub fn low3(self) -> u8 {
        self as u8 & 0x7
    }

    /// True for r8..r15 (need REX.R/.B/.X).
    #[must_use]
    pub fn needs_rex(self) -> bool {
        self as u8 >= 8
    }
}

/// SSE registers xmm0..xmm15.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xmm(pub u8);

impl Xmm {
    #[must_use]
    pub fn num(self) -> u8 {
        self.0 & 0xF
    }

    #[must_use]
    pub fn low3(self) -> u8 {
        self.0 & 0x7
    }

    #[must_use]
    pub fn needs_rex(self) -> bool {
        self.num() >= 8
    }
}
