// Timebase + two general-purpose up-counters (Timer A, Timer B). All three
// run off one divisible clock ticking at 32768 Hz relative to the 27 MHz
// system clock; the sub-rate ticks (4096/2048/1024/4 Hz, and the
// programmable TMB1/TMB2 slow ticks) are just gated taps off the same
// divider counter, same as the reference core's `GetDividedTick`.

use crate::common::DivisibleClock;
use crate::error::{fatal, CoreResult};

use super::irq::Irq;

#[derive(Debug, Clone, Copy, Default)]
struct TimebaseSetup(u16);

impl TimebaseSetup {
    const WRITE_MASK: u16 = 0x000f;

    fn tmb2(self) -> u32 {
        ((self.0 >> 2) & 0x3) as u32
    }
    fn tmb1(self) -> u32 {
        (self.0 & 0x3) as u32
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerAControl(u16);

impl TimerAControl {
    fn source_a(self) -> u16 {
        self.0 & 0x7
    }
    fn source_b(self) -> u16 {
        (self.0 >> 3) & 0x7
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerBControl(u16);

impl TimerBControl {
    fn source_c(self) -> u16 {
        self.0 & 0x7
    }
}

pub struct Timer {
    timer_clock: DivisibleClock,
    timebase_setup: TimebaseSetup,

    timer_a_control: TimerAControl,
    timer_a_divisor: Option<u32>,
    timer_a_enabled: bool,
    timer_a_data: u16,
    timer_a_preload: u16,

    timer_b_control: TimerBControl,
    timer_b_divisor: Option<u32>,
    timer_b_enabled: bool,
    timer_b_data: u16,
    timer_b_preload: u16,
}

impl Timer {
    pub fn new() -> Self {
        let mut timer = Timer {
            timer_clock: DivisibleClock::new(27_000_000, 32768),
            timebase_setup: TimebaseSetup::default(),
            timer_a_control: TimerAControl(0x36), // source_a = source_b = 6 (off)
            timer_a_divisor: None,
            timer_a_enabled: false,
            timer_a_data: 0,
            timer_a_preload: 0,
            timer_b_control: TimerBControl(0x6), // source_c = 6 (off)
            timer_b_divisor: None,
            timer_b_enabled: false,
            timer_b_data: 0,
            timer_b_preload: 0,
        };
        // Both starting selectors are the "off" encoding, so neither update
        // can observe the unsupported-combination condition here.
        timer.update_timer_a_divisors().expect("off selector never fatal");
        timer.update_timer_b_divisors();
        timer
    }

    pub fn reset(&mut self) {
        *self = Timer::new();
    }

    pub fn run_cycles(&mut self, cycles: u32, irq: &mut Irq) {
        if !self.timer_clock.tick(cycles) {
            return;
        }

        if self.timer_a_enabled {
            if let Some(div) = self.timer_a_divisor {
                if self.timer_clock.get_divided_tick(div) {
                    self.tick_timer_a(irq);
                }
            }
        }
        if self.timer_b_enabled {
            if let Some(div) = self.timer_b_divisor {
                if self.timer_clock.get_divided_tick(div) {
                    self.tick_timer_b(irq);
                }
            }
        }

        if !self.timer_clock.get_divided_tick(3) {
            return;
        }
        irq.set_4096hz_irq(true);

        if !self.timer_clock.get_divided_tick(4) {
            return;
        }
        irq.set_2048hz_irq(true);

        if !self.timer_clock.get_divided_tick(5) {
            return;
        }
        irq.set_1024hz_irq(true);

        if self.timer_clock.get_divided_tick(8 - self.timebase_setup.tmb2()) {
            irq.set_tmb2_irq(true);
        }
        if self.timer_clock.get_divided_tick(12 - self.timebase_setup.tmb1()) {
            irq.set_tmb1_irq(true);
        }

        if !self.timer_clock.get_divided_tick(13) {
            return;
        }
        irq.set_4hz_irq(true);
    }

    fn tick_timer_a(&mut self, irq: &mut Irq) {
        self.timer_a_data = self.timer_a_data.wrapping_add(1);
        if self.timer_a_data == 0 {
            self.timer_a_data = self.timer_a_preload;
            irq.set_timer_a_irq(true);
        }
    }

    fn tick_timer_b(&mut self, irq: &mut Irq) {
        self.timer_b_data = self.timer_b_data.wrapping_add(1);
        if self.timer_b_data == 0 {
            self.timer_b_data = self.timer_b_preload;
            irq.set_timer_b_irq(true);
        }
    }

    fn update_timer_a_divisors(&mut self) -> CoreResult<()> {
        self.timer_a_divisor = None;

        let source_a = self.timer_a_control.source_a();
        if matches!(source_a, 0 | 1 | 6 | 7) {
            return Ok(());
        }

        if source_a == 5 {
            self.timer_a_divisor = match self.timer_a_control.source_b() {
                0 => Some(4),                               // 2048 Hz
                1 => Some(5),                                // 1024 Hz
                2 => Some(7),                                // 256 Hz
                3 => Some(12 - self.timebase_setup.tmb1()),  // TMB1
                4 => Some(13),                               // 4 Hz
                5 => Some(14),                               // 2 Hz
                _ => None,
            };
            Ok(())
        } else if self.timer_a_control.source_b() == 6 {
            self.timer_a_divisor = match source_a {
                2 => Some(0), // 32768 Hz
                3 => Some(2), // 8192 Hz
                4 => Some(3), // 4096 Hz
                _ => None,
            };
            Ok(())
        } else {
            Err(fatal("timer", "unsupported timer A source combination"))
        }
    }

    fn update_timer_b_divisors(&mut self) {
        self.timer_b_divisor = match self.timer_b_control.source_c() {
            2 => Some(0), // 32768 Hz
            3 => Some(2), // 8192 Hz
            4 => Some(3), // 4096 Hz
            _ => None,
        };
    }

    pub fn get_timebase_setup(&self) -> u16 {
        self.timebase_setup.0
    }

    pub fn set_timebase_setup(&mut self, value: u16) -> CoreResult<()> {
        self.timebase_setup = TimebaseSetup(value & TimebaseSetup::WRITE_MASK);
        self.update_timer_a_divisors()
    }

    pub fn clear_timebase_counter(&mut self) {
        self.timer_clock.clear_div_counter();
    }

    pub fn get_timer_a_data(&self) -> u16 {
        self.timer_a_data
    }

    pub fn set_timer_a_data(&mut self, value: u16) {
        self.timer_a_preload = value;
        self.timer_a_data = value;
    }

    pub fn get_timer_a_control(&self) -> u16 {
        self.timer_a_control.0
    }

    pub fn set_timer_a_control(&mut self, value: u16) -> CoreResult<()> {
        self.timer_a_control = TimerAControl(value);
        self.update_timer_a_divisors()
    }

    pub fn get_timer_a_enabled(&self) -> u16 {
        self.timer_a_enabled as u16
    }

    pub fn set_timer_a_enabled(&mut self, value: u16) {
        self.timer_a_enabled = value & 1 != 0;
    }

    pub fn clear_timer_a_irq(&mut self, irq: &mut Irq) {
        irq.set_timer_a_irq(false);
    }

    pub fn get_timer_b_data(&self) -> u16 {
        self.timer_b_data
    }

    pub fn set_timer_b_data(&mut self, value: u16) {
        self.timer_b_preload = value;
        self.timer_b_data = value;
    }

    pub fn get_timer_b_control(&self) -> u16 {
        self.timer_b_control.0
    }

    pub fn set_timer_b_control(&mut self, value: u16) {
        self.timer_b_control = TimerBControl(value);
        self.update_timer_b_divisors();
    }

    pub fn get_timer_b_enabled(&self) -> u16 {
        self.timer_b_enabled as u16
    }

    pub fn set_timer_b_enabled(&mut self, value: u16) {
        self.timer_b_enabled = value & 1 != 0;
    }

    pub fn clear_timer_b_irq(&mut self, irq: &mut Irq) {
        irq.set_timer_b_irq(false);
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_a_rolls_over_to_preload_and_raises_irq() {
        let mut timer = Timer::new();
        let mut irq = Irq::new();
        irq.set_io_irq_control(1 << 11); // TIMER_A line

        timer.set_timer_a_data(0xfffe);
        timer.set_timer_a_control(2).unwrap(); // source_a = 32768 Hz, source_b off (6)
        timer.set_timer_a_enabled(1);

        // one 32768 Hz tick per 824 cycles (27_000_000 / 32768, rounded).
        timer.run_cycles(824, &mut irq);
        assert_eq!(timer.get_timer_a_data(), 0xffff);
        assert!(!irq.line(2));

        timer.run_cycles(824, &mut irq);
        assert_eq!(timer.get_timer_a_data(), 0xfffe);
        assert!(irq.line(2));
    }

    #[test]
    fn unsupported_source_combination_is_fatal() {
        let mut timer = Timer::new();
        // source_a = 5 (gate through source_b), source_b = 7: not one of the
        // documented source_b cases and not the "off" encoding (6) either.
        let value = 5 | (7 << 3);
        assert!(timer.set_timer_a_control(value).is_err());
    }

    #[test]
    fn timer_b_only_accepts_its_three_fixed_rates() {
        let mut timer = Timer::new();
        timer.set_timer_b_control(4); // source_c = 4096 Hz
        assert_eq!(timer.timer_b_divisor, Some(3));
        timer.set_timer_b_control(0); // unmapped source, timer stays idle
        assert_eq!(timer.timer_b_divisor, None);
    }

    #[test]
    fn disabled_timer_does_not_advance() {
        let mut timer = Timer::new();
        let mut irq = Irq::new();
        timer.set_timer_a_data(0xfffe);
        timer.set_timer_a_control(2).unwrap();
        // left disabled
        timer.run_cycles(824 * 4, &mut irq);
        assert_eq!(timer.get_timer_a_data(), 0xfffe);
    }
}
