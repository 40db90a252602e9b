// One-shot ADC: software writes a channel and sets `request`; a divisible
// clock (16 cycles per tick, further divided by the `clock` field) times out
// the conversion, after which the core asks the host for a 10-bit sample and
// raises the ADC IRQ line through the aggregator if enabled.
// `req_auto_8k` (continuous 8 kHz sampling) is wired into the silicon but
// the reference core never finishes implementing it — treated as fatal here
// rather than silently behaving like one-shot mode.

use crate::common::DivisibleClock;
use crate::error::{fatal, CoreResult};
use crate::host::HostIo;

use super::irq::Irq;

#[derive(Debug, Clone, Copy, Default)]
struct AdcControl(u16);

impl AdcControl {
    const WRITE_MASK: u16 = 0x177f;

    fn request(self) -> bool {
        self.0 & 0x1000 != 0
    }
    fn clear_request(&mut self) {
        self.0 &= !0x1000;
    }
    fn req_auto_8k(self) -> bool {
        self.0 & 0x0400 != 0
    }
    fn int_enable(self) -> bool {
        self.0 & 0x0200 != 0
    }
    fn channel(self) -> u8 {
        ((self.0 >> 4) & 0x3) as u8
    }
    fn clock(self) -> u32 {
        ((self.0 >> 2) & 0x3) as u32
    }
    fn enabled(self) -> bool {
        self.0 & 0x1 != 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct AdcStatus(u16);

impl AdcStatus {
    const WRITE_MASK: u16 = 0x2000;

    fn irq(self) -> bool {
        self.0 & 0x2000 != 0
    }
    fn set_irq(&mut self, value: bool) {
        if value {
            self.0 |= 0x2000;
        } else {
            self.0 &= !0x2000;
        }
    }
}

pub struct Adc {
    control: AdcControl,
    status: AdcStatus,
    data: u16,
    ready: bool,
    clock: DivisibleClock,
    active_channel: Option<u8>,
}

impl Adc {
    pub fn new() -> Self {
        Adc {
            control: AdcControl::default(),
            status: AdcStatus::default(),
            data: 0,
            ready: false,
            clock: DivisibleClock::new(16, 1),
            active_channel: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Adc::new();
    }

    pub fn run_cycles<H: HostIo>(&mut self, cycles: u32, irq: &mut Irq, host: &mut H) {
        let Some(channel) = self.active_channel else {
            return;
        };
        if self.clock.tick(cycles) && self.clock.get_divided_tick(self.control.clock()) {
            self.data = host.get_adc(channel) & 0x3ff;
            self.ready = true;
            self.status.set_irq(true);
            self.active_channel = None;
            if self.control.int_enable() {
                irq.set_adc_irq(true);
            }
        }
    }

    pub fn get_control(&self) -> u16 {
        self.control.0 | self.status.0
    }

    pub fn set_control(&mut self, value: u16, irq: &mut Irq) -> CoreResult<()> {
        self.control = AdcControl(value & AdcControl::WRITE_MASK);
        self.status.0 &= !(value & AdcStatus::WRITE_MASK);

        if self.control.req_auto_8k() {
            return Err(fatal("adc", "req_auto_8k continuous sampling is not implemented"));
        }

        if !self.status.irq() {
            irq.set_adc_irq(false);
        }

        if self.control.enabled() {
            self.status.set_irq(true);
            if self.control.request() {
                self.status.set_irq(false);
                self.control.clear_request();
                self.active_channel = Some(self.control.channel());
                self.ready = false;
            }
        } else {
            self.active_channel = None;
        }
        Ok(())
    }

    pub fn get_data(&self) -> u16 {
        let ready = if self.ready { 0x8000 } else { 0 };
        ready | (self.data & 0x3ff)
    }
}

impl Default for Adc {
    fn default() -> Self {
        Self::new()
    }
}
