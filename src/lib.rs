// SPG200 core — a cycle-driven reimplementation of the Sunplus SPG200-family
// system-on-chip used in the VTech V.Smile console.
//
// The crate is the emulation core only: a cartridge/system ROM in, a stream
// of 320x240 framebuffers and stereo audio samples out, driven entirely by
// `Machine::run_frame`. Everything host-side (file loading, resampling,
// texture upload, GUI, WAV dumping, save persistence) lives outside this
// crate behind the [`HostIo`] trait and the [`Presentation`] read side.

pub mod bus;
pub mod common;
pub mod controller;
pub mod cpu;
pub mod debug;
pub mod error;
pub mod host;
pub mod machine;
pub mod peripherals;
pub mod ppu;
pub mod ram;
pub mod spu;

pub use bus::Bus;
pub use controller::{Controller, JoyInput, JoyLedStatus, JoySend};
pub use cpu::Cpu;
pub use debug::{CpuTrace, LogLevel, Logger, PpuTrace, TraceEntry};
pub use error::{ConfigError, CoreError, CoreResult};
pub use host::{ControllerLed, HostIo, Presentation};
pub use machine::{Machine, MachineConfig, Region};
pub use peripherals::{Adc, Dma, Extmem, Gpio, Irq, Random, Timer, Uart};
pub use ppu::Ppu;
pub use ram::Ram;
pub use spu::Spu;

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHost;

    impl HostIo for NullHost {
        fn advance(&mut self, _cycles: u32) {}
        fn get_adc(&mut self, _channel: u8) -> u16 {
            0
        }
        fn get_port_a(&mut self) -> u16 {
            0
        }
        fn get_port_b(&mut self) -> u16 {
            0
        }
        fn get_port_c(&mut self) -> u16 {
            0
        }
        fn set_port_a(&mut self, _value: u16, _mask: u16) {}
        fn set_port_b(&mut self, _value: u16, _mask: u16) {}
        fn set_port_c(&mut self, _value: u16, _mask: u16) {}
        fn read_rom_csb(&mut self, _addr: u32) -> u16 {
            0
        }
        fn read_csb1(&mut self, _addr: u32) -> u16 {
            0
        }
        fn read_csb2(&mut self, _addr: u32) -> u16 {
            0
        }
        fn read_csb3(&mut self, _addr: u32) -> u16 {
            0
        }
        fn write_csb1(&mut self, _addr: u32, _value: u16) {}
        fn write_csb2(&mut self, _addr: u32, _value: u16) {}
        fn write_csb3(&mut self, _addr: u32, _value: u16) {}
        fn tx_uart(&mut self, _byte: u16) {}
        fn rx_uart_done(&mut self) {}
    }

    #[test]
    fn all_components_construct_and_the_machine_resets() {
        let _cpu = Cpu::new();
        let _ppu = Ppu::new(true);
        let _spu = Spu::new();
        let _bus_map = bus::RAM_BASE;
        let _controller = Controller::new();
        let _ram = Ram::new();

        let mut machine = Machine::new(Region::Ntsc);
        let mut host = NullHost;
        machine.reset(&mut host);
        assert_eq!(machine.cycle_count(), 0);
    }
}
