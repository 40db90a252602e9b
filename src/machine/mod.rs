// `Machine` ties every block together: the CPU supplies the clock (`step`
// returns a cycle count), and that count drives every other peripheral's own
// `run_cycles`, matching the reference core's own `RunFrame` loop one cycle
// batch at a time. `Machine` is also the bus's only implementation — not
// through a vtable per device, but by handing the CPU (and, reentrantly, the
// DMA engines) a short-lived [`BusCtx`] that borrows every field except the
// one currently driving the call, and flattening the entire register map
// into one `match`. See DESIGN.md for why the borrow shape looks the way it
// does.

mod config;

pub use config::{MachineConfig, Region};

use crate::bus::{
    Bus, DMA_BASE, DMA_END, EXTMEM_BASE, PPU_BASE, PPU_END, RAM_BASE, RAM_END, SPU_BASE, SPU_END,
    SYSTEM_BASE, SYSTEM_END,
};
use crate::common::Addr;
use crate::cpu::decode::CpuReg;
use crate::cpu::Cpu;
use crate::debug::{CpuTrace, Logger, PpuTrace};
use crate::error::CoreResult;
use crate::host::HostIo;
use crate::peripherals::{Adc, Dma, Extmem, Gpio, Irq, Random, Timer, Uart};
use crate::ppu::Ppu;
use crate::ram::Ram;
use crate::spu::Spu;

/// Builds a [`BusCtx`] that borrows every `Machine` field except `cpu`
/// directly off `$m` (so it can be constructed in the same statement that
/// also holds `&mut $m.cpu`), plus the caller's scratch `ds` mirror and
/// sticky error slot.
macro_rules! bus_ctx {
    ($m:expr, $host:expr, $ds:expr, $error:expr) => {
        BusCtx {
            ram: &mut $m.ram,
            ppu: &mut $m.ppu,
            spu: &mut $m.spu,
            gpio: &mut $m.gpio,
            timer: &mut $m.timer,
            irq: &mut $m.irq,
            extmem: &mut $m.extmem,
            adc: &mut $m.adc,
            uart: &mut $m.uart,
            dma: &mut $m.dma,
            random1: &mut $m.random1,
            random2: &mut $m.random2,
            region: $m.region,
            ds: $ds,
            host: $host,
            error: $error,
        }
    };
}

/// Cycle-driven SPG200 SoC: CPU, PPU, SPU and the system peripheral block
/// behind one 22-bit word-addressed bus.
pub struct Machine {
    ram: Ram,
    cpu: Cpu,
    ppu: Ppu,
    spu: Spu,
    gpio: Gpio,
    timer: Timer,
    irq: Irq,
    extmem: Extmem,
    adc: Adc,
    uart: Uart,
    dma: Dma,
    random1: Random,
    random2: Random,
    region: Region,
    cycle_count: u64,
    logger: Logger,
}

impl Machine {
    pub fn new(region: Region) -> Self {
        Machine {
            ram: Ram::new(),
            cpu: Cpu::new(),
            ppu: Ppu::new(region.is_ntsc()),
            spu: Spu::new(),
            gpio: Gpio::new(),
            timer: Timer::new(),
            irq: Irq::new(),
            extmem: Extmem::new(),
            adc: Adc::new(),
            uart: Uart::new(),
            dma: Dma::new(),
            random1: Random::new(),
            random2: Random::new(),
            region,
            cycle_count: 0,
            logger: Logger::new(),
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut Logger {
        &mut self.logger
    }

    /// One 5:5:5-packed BGR pixel per entry, row-major, 320x240.
    pub fn picture(&self) -> &[u16] {
        self.ppu.framebuffer()
    }

    /// Interleaved L/R samples generated since the last call. The SPU mixes
    /// in unsigned 16-bit PCM (0x8000 = silence, matching the reference
    /// core's DAC convention); reinterpreting the bits as signed gives the
    /// centered waveform a host audio API expects, the same trick
    /// [`crate::ppu::Ppu::framebuffer`] uses to flatten its boxed grid.
    pub fn audio(&mut self) -> &[i16] {
        let samples = self.spu.audio();
        unsafe { std::slice::from_raw_parts(samples.as_ptr() as *const i16, samples.len()) }
    }

    /// Deliver a byte the host received from the joystick UART line into the
    /// core's RX register (mirrors the reference core's `UartTx`; the name
    /// there refers to the *joystick's* TX, which is this side's RX).
    pub fn uart_rx(&mut self, byte: u8) {
        self.uart.rx_start(byte);
    }

    pub fn set_ext1_irq(&mut self, value: bool) {
        self.irq.set_ext1_irq(value);
    }

    pub fn set_ext2_irq(&mut self, value: bool) {
        self.irq.set_ext2_irq(value);
    }

    /// Zero RAM and return every block to its power-on state, in the same
    /// order the reference core's constructor/`Reset` does: RAM first (so
    /// nothing downstream can observe stale contents), then CPU (which reads
    /// the reset vector off the bus), then everything else, with the two
    /// random registers reseeded to their fixed initial taps last.
    pub fn reset<H: HostIo>(&mut self, host: &mut H) {
        self.ram.reset();

        let mut ds_mirror = 0u16;
        let mut error = None;
        {
            let mut ctx = bus_ctx!(self, host, &mut ds_mirror, &mut error);
            self.cpu.reset(&mut ctx);
        }
        self.cpu.set_ds(ds_mirror);

        self.ppu.reset();
        self.spu.reset();
        self.irq.reset();
        self.timer.reset();
        self.extmem.reset();
        self.gpio.reset();
        self.adc.reset();
        self.uart.reset();
        self.dma.reset();
        self.random1.set(0x1418);
        self.random2.set(0x1658);
        self.cycle_count = 0;
    }

    /// Run until a full video frame (one full pass over all visible
    /// scanlines) has been drawn, returning the number of CPU cycles it
    /// took. Interrupt lines are polled and pushed onto the CPU once per
    /// step, ahead of the fetch, matching [`crate::peripherals::irq::Irq`]'s
    /// own poll-then-push contract.
    pub fn run_frame<H: HostIo>(&mut self, host: &mut H) -> CoreResult<u32> {
        let mut frame_cycles: u32 = 0;
        loop {
            for line in 0..8u8 {
                let level = self.irq.line(line);
                self.cpu.set_irq(line, level);
            }
            self.cpu.set_fiq(self.irq.fiq());

            let mut ds_mirror = self.cpu.get_ds();
            let mut error = None;
            let cycles = {
                let mut ctx = bus_ctx!(self, host, &mut ds_mirror, &mut error);
                self.cpu.step(&mut ctx)?
            };
            self.cpu.set_ds(ds_mirror);
            if let Some(err) = error.take() {
                return Err(err);
            }

            if self.logger.is_cpu_trace_enabled() {
                let trace = CpuTrace {
                    cs: self.cpu.get_cs(),
                    pc: self.cpu.pc(),
                    sr: self.cpu.sr(),
                    regs: [
                        self.cpu.reg(CpuReg::Sp),
                        self.cpu.reg(CpuReg::R1),
                        self.cpu.reg(CpuReg::R2),
                        self.cpu.reg(CpuReg::R3),
                        self.cpu.reg(CpuReg::R4),
                        self.cpu.reg(CpuReg::Bp),
                        self.cpu.reg(CpuReg::Sr),
                        self.cpu.reg(CpuReg::Pc),
                    ],
                };
                self.logger.log_cpu_state(&trace);
            }

            frame_cycles = frame_cycles.wrapping_add(cycles);
            self.cycle_count = self.cycle_count.wrapping_add(cycles as u64);
            host.advance(cycles);

            self.adc.run_cycles(cycles, &mut self.irq, host);
            self.uart.run_cycles(cycles, host);
            self.timer.run_cycles(cycles, &mut self.irq);
            self.irq.set_uart_irq(self.uart.irq_line());

            {
                let mut spu = std::mem::take(&mut self.spu);
                let mut ds_scratch = self.cpu.get_ds();
                let mut spu_error = None;
                {
                    let mut ctx = bus_ctx!(self, host, &mut ds_scratch, &mut spu_error);
                    spu.run_cycles(cycles, &mut ctx);
                }
                self.spu = spu;
                if let Some(err) = spu_error.take() {
                    return Err(err);
                }
            }
            self.irq.set_spu_channel_irq(self.spu.channel_irq_line());
            self.irq.set_spu_beat_irq(self.spu.beat_irq_line());

            let frame_done = {
                let placeholder = Ppu::new(self.region.is_ntsc());
                let mut ppu = std::mem::replace(&mut self.ppu, placeholder);
                let mut ds_scratch = self.cpu.get_ds();
                let mut ppu_error = None;
                let done = {
                    let mut ctx = bus_ctx!(self, host, &mut ds_scratch, &mut ppu_error);
                    ppu.run_cycles(cycles, &mut ctx)
                };
                self.ppu = ppu;
                if let Some(err) = ppu_error.take() {
                    return Err(err);
                }
                done
            };
            self.irq.set_ppu_irq(self.ppu.irq_line());

            if self.logger.is_ppu_trace_enabled() {
                let trace =
                    PpuTrace { scanline: self.ppu.get_line_counter() as i32, frame_count: self.ppu.get_frame_counter() };
                self.logger.log_ppu_state(&trace);
            }

            if frame_done {
                return Ok(frame_cycles);
            }
        }
    }
}

/// A one-step-of-the-bus view over every `Machine` field except `cpu`. Built
/// fresh for each `Cpu::step`/`Spu::run_cycles`/`Ppu::run_cycles` call by the
/// [`bus_ctx!`] macro so the receiver of that call (which needs `&mut self`
/// on its own field) never has to appear inside this struct too.
///
/// `ds` stands in for the CPU's own data-segment register at bus address
/// `0x3d2f`: the real register lives on `Cpu`, which is mid-call as the
/// receiver, so the caller hands in a scratch copy and syncs it back
/// afterwards instead.
///
/// `error` is a sticky first-error slot. `Bus::write_word` has no `Result`
/// of its own (every other bus write is infallible), but three registers —
/// the ADC's and both timers' control words — reject unsupported hardware
/// configurations the reference core would abort on. The first such
/// rejection during a step is latched here and surfaced by the caller right
/// after the call returns.
struct BusCtx<'a, H: HostIo> {
    ram: &'a mut Ram,
    ppu: &'a mut Ppu,
    spu: &'a mut Spu,
    gpio: &'a mut Gpio,
    timer: &'a mut Timer,
    irq: &'a mut Irq,
    extmem: &'a mut Extmem,
    adc: &'a mut Adc,
    uart: &'a mut Uart,
    dma: &'a mut Dma,
    random1: &'a mut Random,
    random2: &'a mut Random,
    region: Region,
    ds: &'a mut u16,
    host: &'a mut H,
    error: &'a mut Option<crate::error::CoreError>,
}

impl<'a, H: HostIo> Bus for BusCtx<'a, H> {
    fn read_word(&mut self, addr: Addr) -> u16 {
        let addr = addr & crate::common::ADDR_MASK;
        if addr < RAM_END {
            self.ram.read(addr)
        } else if addr < PPU_END {
            self.read_ppu(addr)
        } else if addr < SPU_END {
            self.read_spu(addr)
        } else if addr < SYSTEM_END {
            self.read_system(addr)
        } else if addr < DMA_END {
            self.read_dma(addr)
        } else {
            self.extmem.read_word(addr - EXTMEM_BASE, self.host)
        }
    }

    fn write_word(&mut self, addr: Addr, value: u16) {
        let addr = addr & crate::common::ADDR_MASK;
        if addr < RAM_END {
            self.ram.write(addr, value);
        } else if addr < PPU_END {
            self.write_ppu(addr, value);
        } else if addr < SPU_END {
            self.write_spu(addr, value);
        } else if addr < SYSTEM_END {
            self.write_system(addr, value);
        } else if addr < DMA_END {
            self.write_dma(addr, value);
        } else {
            self.extmem.write_word(addr - EXTMEM_BASE, value, self.host);
        }
    }
}

impl<'a, H: HostIo> BusCtx<'a, H> {
    fn read_ppu(&mut self, addr: Addr) -> u16 {
        match addr {
            PPU_BASE..=0x281b => {
                let bg = ((addr - PPU_BASE) / 6) as usize;
                match (addr - PPU_BASE) % 6 {
                    0 => self.ppu.get_bg_xscroll(bg),
                    1 => self.ppu.get_bg_yscroll(bg),
                    2 => self.ppu.get_bg_attribute(bg),
                    3 => self.ppu.get_bg_control(bg),
                    4 => self.ppu.get_bg_tile_map_ptr(bg),
                    _ => self.ppu.get_bg_attribute_map_ptr(bg),
                }
            }
            0x281c => self.ppu.get_vertical_compress_amount(),
            0x281d => self.ppu.get_vertical_compress_offset(),
            0x2820 => self.ppu.get_bg_segment_ptr(0),
            0x2821 => self.ppu.get_bg_segment_ptr(1),
            0x2822 => self.ppu.get_sprite_segment_ptr(),
            0x282a => self.ppu.get_blend_level(),
            0x2830 => self.ppu.get_fade_level(),
            0x2836 => self.ppu.get_irq_vpos(),
            0x2837 => self.ppu.get_irq_hpos(),
            0x2842 => self.ppu.get_sprite_control(),
            0x2854 => self.ppu.get_stn_lcd_control(),
            0x2862 => self.ppu.get_irq_control(),
            0x2863 => self.ppu.get_irq_status(),
            0x2870 => self.ppu.get_sprite_dma_source(),
            0x2871 => self.ppu.get_sprite_dma_target(),
            0x2872 => self.ppu.get_sprite_dma_length(),
            0x2900..=0x29ff => self.ppu.get_line_scroll((addr & 0xff) as u8),
            0x2a00..=0x2aff => self.ppu.get_line_compress((addr & 0xff) as u8),
            0x2b00..=0x2bff => self.ppu.get_palette_color((addr & 0xff) as u8),
            0x2c00..=0x2fff => self.ppu.read_sprite_memory((addr & 0x3ff) as u16),
            _ => 0,
        }
    }

    fn write_ppu(&mut self, addr: Addr, value: u16) {
        match addr {
            PPU_BASE..=0x281b => {
                let bg = ((addr - PPU_BASE) / 6) as usize;
                match (addr - PPU_BASE) % 6 {
                    0 => self.ppu.set_bg_xscroll(bg, value),
                    1 => self.ppu.set_bg_yscroll(bg, value),
                    2 => self.ppu.set_bg_attribute(bg, value),
                    3 => self.ppu.set_bg_control(bg, value),
                    4 => self.ppu.set_bg_tile_map_ptr(bg, value),
                    _ => self.ppu.set_bg_attribute_map_ptr(bg, value),
                }
            }
            0x281c => self.ppu.set_vertical_compress_amount(value),
            0x281d => self.ppu.set_vertical_compress_offset(value),
            0x2820 => self.ppu.set_bg_segment_ptr(0, value),
            0x2821 => self.ppu.set_bg_segment_ptr(1, value),
            0x2822 => self.ppu.set_sprite_segment_ptr(value),
            0x282a => self.ppu.set_blend_level(value),
            0x2830 => self.ppu.set_fade_level(value),
            0x2836 => self.ppu.set_irq_vpos(value),
            0x2837 => self.ppu.set_irq_hpos(value),
            0x2842 => self.ppu.set_sprite_control(value),
            0x2854 => self.ppu.set_stn_lcd_control(value),
            0x2862 => self.ppu.set_irq_control(value),
            0x2863 => self.ppu.clear_irq_status(value),
            0x2870 => self.ppu.set_sprite_dma_source(value),
            0x2871 => self.ppu.set_sprite_dma_target(value),
            0x2872 => {
                let placeholder = Ppu::new(self.region.is_ntsc());
                let mut ppu = std::mem::replace(self.ppu, placeholder);
                ppu.start_sprite_dma(value, self);
                *self.ppu = ppu;
            }
            0x2900..=0x29ff => self.ppu.set_line_scroll((addr & 0xff) as u8, value),
            0x2a00..=0x2aff => self.ppu.set_line_compress((addr & 0xff) as u8, value),
            0x2b00..=0x2bff => self.ppu.set_palette_color((addr & 0xff) as u8, value),
            0x2c00..=0x2fff => self.ppu.write_sprite_memory((addr & 0x3ff) as u16, value),
            _ => {}
        }
    }

    fn read_spu(&mut self, addr: Addr) -> u16 {
        if addr < 0x3100 {
            let ch = ((addr >> 4) & 0xf) as usize;
            match addr & 0xf {
                0 => self.spu.get_wave_address_lo(ch),
                1 => self.spu.get_mode(ch),
                2 => self.spu.get_loop_address_lo(ch),
                3 => self.spu.get_pan(ch),
                4 => self.spu.get_envelope0(ch),
                5 => self.spu.get_envelope_data(ch),
                6 => self.spu.get_envelope1(ch),
                7 => self.spu.get_envelope_address_hi(ch),
                8 => self.spu.get_envelope_address_lo(ch),
                9 => self.spu.get_wave_data0(ch),
                10 => self.spu.get_envelope_loop_control(ch),
                11 => self.spu.get_wave_data(ch),
                _ => 0,
            }
        } else if (0x3200..0x3300).contains(&addr) {
            let ch = ((addr >> 4) & 0xf) as usize;
            match addr & 0xf {
                0 => self.spu.get_phase_hi(ch),
                1 => self.spu.get_phase_accumulator_hi(ch),
                2 => self.spu.get_target_phase_hi(ch),
                3 => self.spu.get_ramp_down_clock(ch),
                4 => self.spu.get_phase_lo(ch),
                5 => self.spu.get_phase_accumulator_lo(ch),
                6 => self.spu.get_target_phase_lo(ch),
                7 => self.spu.get_pitch_bend_control(ch),
                _ => 0,
            }
        } else if (0x3400..=0x3418).contains(&addr) {
            match addr - 0x3400 {
                0 => self.spu.get_channel_enable(),
                1 => self.spu.get_main_volume(),
                2 => self.spu.get_channel_fiq_enable(),
                3 => self.spu.get_channel_fiq_status(),
                4 => self.spu.get_beat_base_count(),
                5 => self.spu.get_beat_count(),
                6 => self.spu.get_env_clk0_3(),
                7 => self.spu.get_env_clk4_7(),
                8 => self.spu.get_env_clk8_11(),
                9 => self.spu.get_env_clk12_15(),
                10 => self.spu.get_env_rampdown(),
                11 => self.spu.get_channel_stop(),
                12 => self.spu.get_channel_zero_cross(),
                13 => self.spu.get_control(),
                14 => self.spu.get_compress_control(),
                15 => self.spu.get_channel_status(),
                16 | 17 => 0, // wave_in_left/right: write-only
                18 => self.spu.get_wave_out_left(),
                19 => self.spu.get_wave_out_right(),
                20 => self.spu.get_channel_repeat(),
                21 => self.spu.get_channel_env_mode(),
                22 => self.spu.get_channel_tone_release(),
                23 => self.spu.get_channel_env_irq(),
                _ => self.spu.get_channel_pitch_bend(),
            }
        } else {
            0
        }
    }

    fn write_spu(&mut self, addr: Addr, value: u16) {
        if addr < 0x3100 {
            let ch = ((addr >> 4) & 0xf) as usize;
            match addr & 0xf {
                0 => self.spu.set_wave_address_lo(ch, value),
                1 => self.spu.set_mode(ch, value),
                2 => self.spu.set_loop_address_lo(ch, value),
                3 => self.spu.set_pan(ch, value),
                4 => self.spu.set_envelope0(ch, value),
                5 => self.spu.set_envelope_data(ch, value),
                6 => self.spu.set_envelope1(ch, value),
                7 => self.spu.set_envelope_address_hi(ch, value),
                8 => self.spu.set_envelope_address_lo(ch, value),
                9 => self.spu.set_wave_data0(ch, value),
                10 => self.spu.set_envelope_loop_control(ch, value),
                11 => self.spu.set_wave_data(ch, value),
                _ => {}
            }
        } else if (0x3200..0x3300).contains(&addr) {
            let ch = ((addr >> 4) & 0xf) as usize;
            match addr & 0xf {
                0 => self.spu.set_phase_hi(ch, value),
                1 => self.spu.set_phase_accumulator_hi(ch, value),
                2 => self.spu.set_target_phase_hi(ch, value),
                3 => self.spu.set_ramp_down_clock(ch, value),
                4 => self.spu.set_phase_lo(ch, value),
                5 => self.spu.set_phase_accumulator_lo(ch, value),
                6 => self.spu.set_target_phase_lo(ch, value),
                7 => self.spu.set_pitch_bend_control(ch, value),
                _ => {}
            }
        } else if (0x3400..=0x3418).contains(&addr) {
            match addr - 0x3400 {
                0 => self.spu.set_channel_enable(value),
                1 => self.spu.set_main_volume(value),
                2 => self.spu.set_channel_fiq_enable(value),
                3 => self.spu.clear_channel_fiq_status(value),
                4 => self.spu.set_beat_base_count(value),
                5 => self.spu.set_beat_count(value),
                6 => self.spu.set_env_clk0_3(value),
                7 => self.spu.set_env_clk4_7(value),
                8 => self.spu.set_env_clk8_11(value),
                9 => self.spu.set_env_clk12_15(value),
                10 => self.spu.set_env_rampdown(value),
                11 => self.spu.clear_channel_stop(value),
                12 => self.spu.set_channel_zero_cross(value),
                13 => self.spu.set_control(value),
                14 => self.spu.set_compress_control(value),
                15 => {} // channel_status: read-only
                16 => self.spu.set_wave_in_left(value),
                17 => self.spu.set_wave_in_right(value),
                18 | 19 => {} // wave_out_left/right: read-only
                20 => self.spu.set_channel_repeat(value),
                21 => self.spu.set_channel_env_mode(value),
                22 => self.spu.set_channel_tone_release(value),
                23 => self.spu.clear_channel_env_irq(value),
                _ => self.spu.set_channel_pitch_bend(value),
            }
        }
    }

    fn read_system(&mut self, addr: Addr) -> u16 {
        match addr {
            0x3d00 => self.gpio.get_mode(),
            0x3d01 | 0x3d06 | 0x3d0b => self.gpio.get_data(gpio_port(addr), self.host),
            0x3d02 | 0x3d07 | 0x3d0c => self.gpio.get_buffer(gpio_port(addr)),
            0x3d03 | 0x3d08 | 0x3d0d => self.gpio.get_dir(gpio_port(addr)),
            0x3d04 | 0x3d09 | 0x3d0e => self.gpio.get_attrib(gpio_port(addr)),
            0x3d05 | 0x3d0a | 0x3d0f => self.gpio.get_mask(gpio_port(addr)),
            0x3d10 => self.timer.get_timebase_setup(),
            0x3d12 => self.timer.get_timer_a_data(),
            0x3d13 => self.timer.get_timer_a_control(),
            0x3d14 => self.timer.get_timer_a_enabled(),
            0x3d16 => self.timer.get_timer_b_data(),
            0x3d17 => self.timer.get_timer_b_control(),
            0x3d18 => self.timer.get_timer_b_enabled(),
            0x3d1c => self.ppu.get_line_counter(),
            0x3d21 => self.irq.get_io_irq_control(),
            0x3d22 => self.irq.get_io_irq_status(),
            0x3d23 => self.extmem.get_control(),
            0x3d25 => self.adc.get_control(),
            0x3d27 => self.adc.get_data(),
            0x3d2b => self.region.is_pal() as u16,
            0x3d2c => self.random1.next(),
            0x3d2d => self.random2.next(),
            0x3d2e => self.irq.get_fiq_select(),
            0x3d2f => *self.ds,
            0x3d30 => self.uart.get_control(),
            0x3d31 => self.uart.get_status(),
            0x3d33 => self.uart.get_baud_lo(),
            0x3d34 => self.uart.get_baud_hi(),
            0x3d35 => self.uart.get_tx(),
            0x3d36 => {
                let value = self.uart.rx();
                self.host.rx_uart_done();
                value
            }
            _ => 0,
        }
    }

    fn write_system(&mut self, addr: Addr, value: u16) {
        match addr {
            0x3d00 => self.gpio.set_mode(value),
            0x3d02 | 0x3d07 | 0x3d0c => self.gpio.set_buffer(gpio_port(addr), value, self.host),
            0x3d03 | 0x3d08 | 0x3d0d => self.gpio.set_dir(gpio_port(addr), value, self.host),
            0x3d04 | 0x3d09 | 0x3d0e => self.gpio.set_attrib(gpio_port(addr), value, self.host),
            0x3d05 | 0x3d0a | 0x3d0f => self.gpio.set_mask(gpio_port(addr), value, self.host),
            0x3d10 => {
                if let Err(e) = self.timer.set_timebase_setup(value) {
                    *self.error = Some(e);
                }
            }
            0x3d11 => self.timer.clear_timebase_counter(),
            0x3d12 => self.timer.set_timer_a_data(value),
            0x3d13 => {
                if let Err(e) = self.timer.set_timer_a_control(value) {
                    *self.error = Some(e);
                }
            }
            0x3d14 => self.timer.set_timer_a_enabled(value),
            0x3d15 => self.timer.clear_timer_a_irq(self.irq),
            0x3d16 => self.timer.set_timer_b_data(value),
            0x3d17 => self.timer.set_timer_b_control(value),
            0x3d18 => self.timer.set_timer_b_enabled(value),
            0x3d19 => self.timer.clear_timer_b_irq(self.irq),
            0x3d20 | 0x3d24 | 0x3d28 | 0x3d29 | 0x3d2a => {} // system control/watchdog/sleep/wakeup: no-op
            0x3d21 => self.irq.set_io_irq_control(value),
            0x3d22 => self.irq.clear_io_irq_status(value),
            0x3d23 => self.extmem.set_control(value),
            0x3d25 => {
                if let Err(e) = self.adc.set_control(value, self.irq) {
                    *self.error = Some(e);
                }
            }
            0x3d2c => self.random1.set(value),
            0x3d2d => self.random2.set(value),
            0x3d2e => self.irq.set_fiq_select(value),
            0x3d2f => *self.ds = value & 0x3f,
            0x3d30 => self.uart.set_control(value),
            0x3d31 => self.uart.set_status(value),
            0x3d32 => self.uart.soft_reset(),
            0x3d33 => self.uart.set_baud_lo(value),
            0x3d34 => self.uart.set_baud_hi(value),
            0x3d35 => self.uart.tx(value),
            _ => {}
        }
    }

    fn read_dma(&mut self, addr: Addr) -> u16 {
        match addr {
            0x3e00 => self.dma.get_source_lo(),
            0x3e01 => self.dma.get_source_hi(),
            0x3e02 => self.dma.get_length(),
            0x3e03 => self.dma.get_target(),
            _ => 0,
        }
    }

    fn write_dma(&mut self, addr: Addr, value: u16) {
        match addr {
            0x3e00 => self.dma.set_source_lo(value),
            0x3e01 => self.dma.set_source_hi(value),
            0x3e02 => {
                let mut dma = std::mem::take(self.dma);
                dma.start_dma(value, self);
                *self.dma = dma;
            }
            0x3e03 => self.dma.set_target(value),
            _ => {}
        }
    }
}

/// GPIO port index (0=A, 1=B, 2=C) for any of the three per-port register
/// bases spaced 5 words apart starting at `0x3d01`.
fn gpio_port(addr: Addr) -> usize {
    ((addr - 0x3d01) / 5) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostIo;

    struct StubHost {
        rom: Vec<u16>,
    }

    impl StubHost {
        fn new() -> Self {
            // Reset vector lives at 0xfff7, which lands in the ROM chip
            // select's address space ((0xfff7 - 0x4000) when decode=0).
            let mut rom = vec![0u16; 0x20_0000];
            rom[0xfff7 - 0x4000] = 0x0100; // cs=0, pc=0x0100
            StubHost { rom }
        }
    }

    impl HostIo for StubHost {
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
        fn read_rom_csb(&mut self, addr: u32) -> u16 {
            self.rom.get(addr as usize).copied().unwrap_or(0)
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
    fn reset_loads_the_vector_from_rom() {
        let mut machine = Machine::new(Region::Ntsc);
        let mut host = StubHost::new();
        machine.reset(&mut host);
        assert_eq!(machine.cpu.pc(), 0x0100);
        assert_eq!(machine.cpu.get_cs(), 0);
    }

    #[test]
    fn ram_round_trips_through_the_bus() {
        let mut machine = Machine::new(Region::Ntsc);
        let mut host = StubHost::new();
        machine.reset(&mut host);
        let mut ds_mirror = 0;
        let mut error = None;
        {
            let mut ctx = bus_ctx!(machine, &mut host, &mut ds_mirror, &mut error);
            ctx.write_word(0x10, 0xbeef);
            assert_eq!(ctx.read_word(0x10), 0xbeef);
        }
        assert!(error.is_none());
    }

    #[test]
    fn region_bit_reads_back_from_the_system_register() {
        let mut machine = Machine::new(Region::Pal);
        let mut host = StubHost::new();
        let mut ds_mirror = 0;
        let mut error = None;
        let mut ctx = bus_ctx!(machine, &mut host, &mut ds_mirror, &mut error);
        assert_eq!(ctx.read_word(0x3d2b), 1);
    }

    #[test]
    fn unsupported_timer_a_source_surfaces_as_a_fatal_error() {
        let mut machine = Machine::new(Region::Ntsc);
        let mut host = StubHost::new();
        machine.reset(&mut host);
        let mut ds_mirror = 0;
        let mut error = None;
        {
            let mut ctx = bus_ctx!(machine, &mut host, &mut ds_mirror, &mut error);
            ctx.write_word(0x3d13, 5 | (7 << 3));
        }
        assert!(error.is_some());
    }
}
