// Minimal embedding smoke test for the SPG200 core.
//
// This is not a frontend: there is no window, no audio device, no gamepad.
// It wires the smallest `HostIo` that can get a cartridge ROM through
// `reset()`/`run_frame()` and prints cycle/frame counters, demonstrating the
// embedding contract without pulling in any presentation stack.

use spg200_core::{CoreResult, HostIo, Machine, Region};
use std::env;
use std::fs;
use std::process::ExitCode;

/// A flat ROM image read as little-endian word pairs (§6, "ROM byte order on
/// disk is little-endian pairs forming each word").
struct FlatRom {
    words: Vec<u16>,
}

impl FlatRom {
    fn load(path: &str) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let words = bytes
            .chunks(2)
            .map(|pair| match pair {
                [lo, hi] => u16::from_le_bytes([*lo, *hi]),
                [lo] => u16::from_le_bytes([*lo, 0]),
                _ => 0,
            })
            .collect();
        Ok(FlatRom { words })
    }

    fn read(&self, addr: u32) -> u16 {
        self.words.get(addr as usize).copied().unwrap_or(0)
    }
}

/// A host with a cartridge ROM behind CSB0 and nothing else wired: no NVRAM,
/// no ADC, no GPIO, no UART peer. Every other capability is either a fixed
/// idle value or a silent no-op, matching spec.md §7's "reads from unmapped
/// registers return 0" posture for the parts of the machine this smoke test
/// doesn't exercise.
struct MinimalHost {
    cart: FlatRom,
}

impl HostIo for MinimalHost {
    fn advance(&mut self, _cycles: u32) {}

    fn get_adc(&mut self, _channel: u8) -> u16 {
        0
    }

    fn get_port_a(&mut self) -> u16 {
        0xffff
    }
    fn get_port_b(&mut self) -> u16 {
        0xffff
    }
    fn get_port_c(&mut self) -> u16 {
        0xffff
    }

    fn set_port_a(&mut self, _value: u16, _mask: u16) {}
    fn set_port_b(&mut self, _value: u16, _mask: u16) {}
    fn set_port_c(&mut self, _value: u16, _mask: u16) {}

    fn read_rom_csb(&mut self, addr: u32) -> u16 {
        self.cart.read(addr)
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

const MAX_FRAMES: u32 = 60;

fn run() -> CoreResult<()> {
    let path = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("usage: spg200-core <cartridge.rom>");
        std::process::exit(2);
    });

    let cart = FlatRom::load(&path).unwrap_or_else(|e| {
        eprintln!("failed to read '{path}': {e}");
        std::process::exit(2);
    });

    let mut machine = Machine::new(Region::Ntsc);
    let mut host = MinimalHost { cart };

    machine.reset(&mut host);
    println!("SPG200 core smoke test: {path}");

    for frame in 0..MAX_FRAMES {
        let cycles = machine.run_frame(&mut host)?;
        if frame == MAX_FRAMES - 1 {
            println!(
                "ran {MAX_FRAMES} frames, {} total cycles, last frame {cycles} cycles",
                machine.cycle_count()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
