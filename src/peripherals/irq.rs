// IRQ/FIQ aggregator. Eight OR-reduced IRQ lines feed the CPU directly; a
// 3-bit `fiq_select` field additionally routes exactly one of seven sources
// onto the single FIQ line. Lines 2, 3, 5, 6 and 7 are themselves an OR of
// several "IO" sources gated through a shared control/status register pair
// (`ctrl & status` is the active set; status is write-1-to-clear). Lines 0,
// 1 and 4 (PPU, SPU-channel, SPU-beat) bypass that register pair entirely
// and are wired straight through from their owning peripheral.
//
// Register writes only ever update this aggregator's own state; nothing
// here reaches into the CPU. `Machine` reads the eight lines and the FIQ
// line back out with `line`/`fiq` once per step and pushes them onto the
// CPU itself, which keeps every peripheral free of a `&mut Cpu` parameter
// and sidesteps the aliasing that would otherwise come from the CPU's own
// instruction stream writing the registers that feed its own interrupt
// lines.

const ADC: u16 = 1 << 13;
const EXT2: u16 = 1 << 12;
const TIMER_A: u16 = 1 << 11;
const TIMER_B: u16 = 1 << 10;
const EXT1: u16 = 1 << 9;
const UART: u16 = 1 << 8;
const KEY_CHANGE: u16 = 1 << 7;
const TICK_4096HZ: u16 = 1 << 6;
const TICK_2048HZ: u16 = 1 << 5;
const TICK_1024HZ: u16 = 1 << 4;
const TICK_4HZ: u16 = 1 << 3;
const TMB2: u16 = 1 << 1;
const TMB1: u16 = 1 << 0;

pub struct Irq {
    io_ctrl: u16,
    io_status: u16,
    fiq_select: u8,
    ppu_active: bool,
    spu_channel_active: bool,
    spu_beat_active: bool,
    lines: [bool; 8],
    fiq: bool,
}

impl Irq {
    pub fn new() -> Self {
        let mut irq = Irq {
            io_ctrl: 0,
            io_status: 0,
            fiq_select: 7,
            ppu_active: false,
            spu_channel_active: false,
            spu_beat_active: false,
            lines: [false; 8],
            fiq: false,
        };
        irq.recompute();
        irq
    }

    pub fn reset(&mut self) {
        *self = Irq::new();
    }

    /// Current level of IRQ line `n` (0..=7). `Machine` polls this once per
    /// CPU step and pushes it onto the CPU.
    pub fn line(&self, n: u8) -> bool {
        self.lines[n as usize]
    }

    pub fn fiq(&self) -> bool {
        self.fiq
    }

    fn active(&self) -> u16 {
        self.io_ctrl & self.io_status
    }

    fn recompute(&mut self) {
        let active = self.active();
        self.lines[0] = self.ppu_active;
        self.lines[1] = self.spu_channel_active;
        self.lines[2] = active & (TIMER_A | TIMER_B) != 0;
        self.lines[3] = active & (UART | ADC) != 0;
        self.lines[4] = self.spu_beat_active;
        self.lines[5] = active & (EXT1 | EXT2) != 0;
        self.lines[6] = active & (TICK_4096HZ | TICK_2048HZ | TICK_1024HZ) != 0;
        self.lines[7] = active & (KEY_CHANGE | TICK_4HZ | TMB1 | TMB2) != 0;

        self.fiq = match self.fiq_select {
            0 => self.ppu_active,
            1 => self.spu_channel_active,
            2 => active & TIMER_A != 0,
            3 => active & TIMER_B != 0,
            4 => active & UART != 0,
            5 => active & (EXT1 | EXT2) != 0,
            6 => active & ADC != 0,
            _ => false,
        };
    }

    pub fn get_io_irq_control(&self) -> u16 {
        self.io_ctrl
    }

    pub fn set_io_irq_control(&mut self, value: u16) {
        self.io_ctrl = value;
        self.recompute();
    }

    pub fn get_io_irq_status(&self) -> u16 {
        self.io_status
    }

    pub fn clear_io_irq_status(&mut self, value: u16) {
        self.io_status &= !value;
        self.recompute();
    }

    pub fn get_fiq_select(&self) -> u16 {
        self.fiq_select as u16
    }

    pub fn set_fiq_select(&mut self, value: u16) {
        self.fiq_select = (value & 0x7) as u8;
        self.recompute();
    }

    pub fn set_ppu_irq(&mut self, value: bool) {
        self.ppu_active = value;
        self.recompute();
    }

    pub fn set_spu_channel_irq(&mut self, value: bool) {
        self.spu_channel_active = value;
        self.recompute();
    }

    pub fn set_spu_beat_irq(&mut self, value: bool) {
        self.spu_beat_active = value;
        self.recompute();
    }

    fn set_status_bit(&mut self, bit: u16, value: bool) {
        if value {
            self.io_status |= bit;
        } else {
            self.io_status &= !bit;
        }
        self.recompute();
    }

    pub fn set_timer_a_irq(&mut self, value: bool) {
        self.set_status_bit(TIMER_A, value);
    }
    pub fn set_timer_b_irq(&mut self, value: bool) {
        self.set_status_bit(TIMER_B, value);
    }
    pub fn set_adc_irq(&mut self, value: bool) {
        self.set_status_bit(ADC, value);
    }
    pub fn set_uart_irq(&mut self, value: bool) {
        self.set_status_bit(UART, value);
    }
    pub fn set_ext1_irq(&mut self, value: bool) {
        self.set_status_bit(EXT1, value);
    }
    pub fn set_ext2_irq(&mut self, value: bool) {
        self.set_status_bit(EXT2, value);
    }
    pub fn set_1024hz_irq(&mut self, value: bool) {
        self.set_status_bit(TICK_1024HZ, value);
    }
    pub fn set_2048hz_irq(&mut self, value: bool) {
        self.set_status_bit(TICK_2048HZ, value);
    }
    pub fn set_4096hz_irq(&mut self, value: bool) {
        self.set_status_bit(TICK_4096HZ, value);
    }
    pub fn set_4hz_irq(&mut self, value: bool) {
        self.set_status_bit(TICK_4HZ, value);
    }
    pub fn set_tmb1_irq(&mut self, value: bool) {
        self.set_status_bit(TMB1, value);
    }
    pub fn set_tmb2_irq(&mut self, value: bool) {
        self.set_status_bit(TMB2, value);
    }
    pub fn set_key_change_irq(&mut self, value: bool) {
        self.set_status_bit(KEY_CHANGE, value);
    }
}

impl Default for Irq {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_a_and_b_both_feed_line_2() {
        let mut irq = Irq::new();
        irq.set_io_irq_control(TIMER_A | TIMER_B);
        irq.set_timer_a_irq(true);
        assert!(irq.line(2));
        irq.set_timer_a_irq(false);
        assert!(!irq.line(2));
        irq.set_timer_b_irq(true);
        assert!(irq.line(2));
    }

    #[test]
    fn status_write_1_to_clear_lowers_the_line() {
        let mut irq = Irq::new();
        irq.set_io_irq_control(UART);
        irq.set_uart_irq(true);
        assert!(irq.line(3));
        irq.clear_io_irq_status(UART);
        assert!(!irq.line(3));
    }

    #[test]
    fn fiq_select_routes_timer_b_only_when_chosen() {
        let mut irq = Irq::new();
        irq.set_io_irq_control(TIMER_B);
        irq.set_fiq_select(3);
        irq.set_timer_b_irq(true);
        assert!(irq.fiq());
        irq.set_fiq_select(2);
        assert!(!irq.fiq());
    }

    #[test]
    fn ppu_irq_bypasses_the_io_register_pair() {
        let mut irq = Irq::new();
        irq.set_ppu_irq(true);
        assert!(irq.line(0));
    }

    #[test]
    fn spu_beat_drives_line_4_directly() {
        let mut irq = Irq::new();
        irq.set_spu_beat_irq(true);
        assert!(irq.line(4));
    }

    #[test]
    fn ungated_status_bits_do_not_leak_into_unrelated_lines() {
        let mut irq = Irq::new();
        // Control never enables TIMER_A, so raising the status bit alone
        // must not assert line 2.
        irq.set_timer_a_irq(true);
        assert!(!irq.line(2));
    }
}
