// External-memory chip-select decoder. Everything at or above the
// on-chip/PPU/SPU/system windows (`bus::EXTMEM_BASE` and up) lands here;
// `address_decode` picks how that remaining space is carved up between up to
// four chip selects (cartridge ROM, system ROM, and up to two NVRAM/SRAM
// banks), and dispatches the resulting local offset to the matching
// [`HostIo`] method. `addr` passed in is already relative to
// `bus::EXTMEM_BASE` — the caller (`Machine`) subtracts the base before
// calling in.

use crate::common::Addr;
use crate::host::HostIo;

#[derive(Debug, Clone, Copy, Default)]
struct ExternalMemControl(u16);

impl ExternalMemControl {
    const WRITE_MASK: u16 = 0x0ffe;

    fn address_decode(self) -> u16 {
        (self.0 >> 6) & 0x3
    }
}

pub struct Extmem {
    control: ExternalMemControl,
}

impl Extmem {
    pub fn new() -> Self {
        Extmem { control: ExternalMemControl(5 << 3) } // bus_arbiter = 5
    }

    pub fn reset(&mut self) {
        *self = Extmem::new();
    }

    pub fn get_control(&self) -> u16 {
        self.control.0
    }

    pub fn set_control(&mut self, value: u16) {
        self.control = ExternalMemControl(value & ExternalMemControl::WRITE_MASK);
    }

    pub fn read_word<H: HostIo>(&self, addr: Addr, host: &mut H) -> u16 {
        match self.control.address_decode() {
            0 => host.read_rom_csb(addr),
            1 => match addr >> 21 {
                0 => host.read_rom_csb(addr & 0x1f_ffff),
                _ => host.read_csb1(addr & 0x1f_ffff),
            },
            _ => match addr >> 20 {
                0 => host.read_rom_csb(addr & 0x0f_ffff),
                1 => host.read_csb1(addr & 0x0f_ffff),
                2 => host.read_csb2(addr & 0x0f_ffff),
                _ => host.read_csb3(addr & 0x0f_ffff),
            },
        }
    }

    pub fn write_word<H: HostIo>(&self, addr: Addr, value: u16, host: &mut H) {
        match self.control.address_decode() {
            0 => {} // ROM chip select, no write path
            1 => match addr >> 21 {
                0 => {}
                _ => host.write_csb1(addr & 0x1f_ffff, value),
            },
            _ => match addr >> 20 {
                0 => {}
                1 => host.write_csb1(addr & 0x0f_ffff, value),
                2 => host.write_csb2(addr & 0x0f_ffff, value),
                _ => host.write_csb3(addr & 0x0f_ffff, value),
            },
        }
    }
}

impl Default for Extmem {
    fn default() -> Self {
        Self::new()
    }
}
