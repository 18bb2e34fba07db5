//! Guest memory access.
//!
//! The loader collaborator guarantees guest code and data are mapped; the
//! bus trait is how the translator reads guest instruction words and how
//! the shadow interpretation performs data accesses. `FlatTestBus` is the
//! test double used throughout the integration suites.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("guest address {0:#x} not mapped")]
pub struct BusError(pub u64);

pub trait GuestBus {
    fn read(&self, addr: u64, out: &mut [u8]) -> Result<(), BusError>;
    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), BusError>;

    fn read_u8(&self, addr: u64) -> Result<u8, BusError> {
        let mut b = [0u8; 1];
        self.read(addr, &mut b)?;
        Ok(b[0])
    }

    fn read_u16(&self, addr: u64) -> Result<u16, BusError> {
        let mut b = [0u8; 2];
        self.read(addr, &mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    fn read_u32(&self, addr: u64) -> Result<u32, BusError> {
        let mut b = [0u8; 4];
        self.read(addr, &mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64(&self, addr: u64) -> Result<u64, BusError> {
        let mut b = [0u8; 8];
        self.read(addr, &mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn read_u128(&self, addr: u64) -> Result<u128, BusError> {
        let mut b = [0u8; 16];
        self.read(addr, &mut b)?;
        Ok(u128::from_le_bytes(b))
    }

    fn write_u8(&mut self, addr: u64, v: u8) -> Result<(), BusError> {
        self.write(addr, &[v])
    }

    fn write_u16(&mut self, addr: u64, v: u16) -> Result<(), BusError> {
        self.write(addr, &v.to_le_bytes())
    }

    fn write_u32(&mut self, addr: u64, v: u32) -> Result<(), BusError> {
        self.write(addr, &v.to_le_bytes())
    }

    fn write_u64(&mut self, addr: u64, v: u64) -> Result<(), BusError> {
        self.write(addr, &v.to_le_bytes())
    }

    fn write_u128(&mut self, addr: u64, v: u128) -> Result<(), BusError> {
        self.write(addr, &v.to_le_bytes())
    }
}

/// Flat zero-based memory for tests.
#[derive(Clone)]
pub struct FlatTestBus {
    mem: Vec<u8>,
}

impl FlatTestBus {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { mem: vec![0; size] }
    }

    /// Copy `data` into memory at `addr`.
    pub fn load(&mut self, addr: u64, data: &[u8]) {
        let start = addr as usize;
        self.mem[start..start + data.len()].copy_from_slice(data);
    }

    /// Load a sequence of 32-bit guest instruction words at `addr`.
    pub fn load_words(&mut self, addr: u64, words: &[u32]) {
        for (i, w) in words.iter().enumerate() {
            self.load(addr + 4 * i as u64, &w.to_le_bytes());
        }
    }

    #[must_use]
    pub fn mem(&self) -> &[u8] {
        &self.mem
    }

    fn range(&self, addr: u64, len: usize) -> Result<usize, BusError> {
        let start = usize::try_from(addr).map_err(|_| BusError(addr))?;
        let end = start.checked_add(len).ok_or(BusError(addr))?;
        if end > self.mem.len() {
            return Err(BusError(addr));
        }
        Ok(start)
    }
}

impl GuestBus for FlatTestBus {
    fn read(&self, addr: u64, out: &mut [u8]) -> Result<(), BusError> {
        let start = self.range(addr, out.len())?;
        out.copy_from_slice(&self.mem[start..start + out.len()]);
        Ok(())
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), BusError> {
        let start = self.range(addr, data.len())?;
        self.mem[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_and_bounds() {
        let mut bus = FlatTestBus::new(0x100);
        bus.write_u64(0x10, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(bus.read_u64(0x10).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(bus.read_u32(0x10).unwrap(), 0x5566_7788);
        assert_eq!(bus.read_u8(0x17).unwrap(), 0x11);
        assert_eq!(bus.read_u32(0xFE), Err(BusError(0xFE)));
        assert_eq!(bus.read_u8(0x100), Err(BusError(0x100)));
    }

    #[test]
    fn load_words_little_endian() {
        let mut bus = FlatTestBus::new(0x40);
        bus.load_words(0x8, &[0xD282_4680, 0xD65F_03C0]);
        assert_eq!(bus.read_u32(0x8).unwrap(), 0xD282_4680);
        assert_eq!(bus.read_u32(0xC).unwrap(), 0xD65F_03C0);
    }
}
