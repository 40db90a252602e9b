// General-purpose CPU-memory DMA: a blocking word-for-word copy from an
// arbitrary 22-bit bus address into a 14-bit target (almost always the PPU's
// sprite or line-attribute tables, but the engine itself is bus-agnostic —
// it goes through the same `Bus` trait the CPU does). The target wraps at
// 0x3fff; this is a different mask from the PPU's own sprite-DMA engine,
// which wraps its target at 0x3ff. The two are not unified deliberately:
// they are separate pieces of silicon with separate wrap widths.

use crate::bus::Bus;
use crate::common::Addr;

pub struct Dma {
    source: Addr,
    target: u16,
    length: u16,
}

impl Dma {
    pub fn new() -> Self {
        Dma { source: 0, target: 0, length: 0 }
    }

    pub fn reset(&mut self) {
        *self = Dma::new();
    }

    pub fn get_source_lo(&self) -> u16 {
        (self.source & 0xffff) as u16
    }

    pub fn set_source_lo(&mut self, value: u16) {
        self.source = (self.source & !0xffff) | value as Addr;
    }

    pub fn get_source_hi(&self) -> u16 {
        ((self.source >> 16) & 0x3f) as u16
    }

    pub fn set_source_hi(&mut self, value: u16) {
        self.source = ((value as Addr & 0x3f) << 16) | (self.source & 0xffff);
    }

    pub fn get_length(&self) -> u16 {
        self.length
    }

    /// Writing the length register fires the transfer immediately and
    /// blocks until it completes, matching the reference core (there is no
    /// separate "start" bit).
    pub fn start_dma<B: Bus>(&mut self, value: u16, bus: &mut B) {
        self.length = value;
        while self.length != 0 {
            let word = bus.read_word(self.source);
            self.source = self.source.wrapping_add(1);
            bus.write_word(self.target as Addr, word);
            self.target = self.target.wrapping_add(1) & 0x3fff;
            self.length -= 1;
        }
    }

    pub fn get_target(&self) -> u16 {
        self.target
    }

    pub fn set_target(&mut self, value: u16) {
        self.target = value & 0x3fff;
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestBus(HashMap<Addr, u16>);
    impl Bus for TestBus {
        fn read_word(&mut self, addr: Addr) -> u16 {
            *self.0.get(&addr).unwrap_or(&0)
        }
        fn write_word(&mut self, addr: Addr, value: u16) {
            self.0.insert(addr, value);
        }
    }

    #[test]
    fn copies_words_from_source_to_target() {
        let mut dma = Dma::new();
        let mut bus = TestBus(HashMap::new());
        bus.0.insert(0x100, 0xaaaa);
        bus.0.insert(0x101, 0xbbbb);
        dma.set_source_lo(0x100);
        dma.set_target(0x10);
        dma.start_dma(2, &mut bus);
        assert_eq!(bus.0[&0x10], 0xaaaa);
        assert_eq!(bus.0[&0x11], 0xbbbb);
        assert_eq!(dma.get_target(), 0x12);
        assert_eq!(dma.get_length(), 0);
    }

    #[test]
    fn target_wraps_at_0x3fff_not_0x3ff() {
        let mut dma = Dma::new();
        let mut bus = TestBus(HashMap::new());
        dma.set_target(0x3ffe);
        dma.start_dma(4, &mut bus);
        assert_eq!(dma.get_target(), 0x2);
    }

    #[test]
    fn source_hi_extends_into_22_bit_address() {
        let mut dma = Dma::new();
        dma.set_source_hi(0x3f);
        dma.set_source_lo(0xffff);
        assert_eq!(dma.source, 0x3f_ffff);
        assert_eq!(dma.get_source_hi(), 0x3f);
        assert_eq!(dma.get_source_lo(), 0xffff);
    }
}
