// The capability set the embedding host implements. Everything the core
// needs from the outside world — ADC samples, GPIO pin state, UART byte
// delivery, the joystick's own timer advance — is a method here, called by
// mutable reference from `Machine::run_frame`. The core never stores a
// reference back to the host between calls; it only ever borrows one for the
// duration of a single `run_frame`.

/// Host-provided capabilities consumed by the core (§6, "Host I/O port").
pub trait HostIo {
    /// Called once per `step()`, before any peripheral advances. Lets the
    /// host tick things it owns on the same cycle clock (the V.Smile
    /// joystick's idle/probe timers, for instance).
    fn advance(&mut self, cycles: u32);

    /// 10-bit ADC sample for channel 0..=3.
    fn get_adc(&mut self, channel: u8) -> u16;

    fn get_port_a(&mut self) -> u16;
    fn get_port_b(&mut self) -> u16;
    fn get_port_c(&mut self) -> u16;

    /// `value` carries the bits to drive, `mask` identifies which of them
    /// are actually driven this call.
    fn set_port_a(&mut self, value: u16, mask: u16);
    fn set_port_b(&mut self, value: u16, mask: u16);
    fn set_port_c(&mut self, value: u16, mask: u16);

    fn read_rom_csb(&mut self, addr: u32) -> u16;
    fn read_csb1(&mut self, addr: u32) -> u16;
    fn read_csb2(&mut self, addr: u32) -> u16;
    fn read_csb3(&mut self, addr: u32) -> u16;

    /// Only meaningful when the host has configured a writable region
    /// (NVRAM) behind the given chip select; otherwise a no-op.
    fn write_csb1(&mut self, addr: u32, value: u16);
    fn write_csb2(&mut self, addr: u32, value: u16);
    fn write_csb3(&mut self, addr: u32, value: u16);

    /// The core transmitted one byte out of the UART.
    fn tx_uart(&mut self, byte: u16);
    /// The core consumed one pending UART RX byte.
    fn rx_uart_done(&mut self);
}

/// Per-frame and per-sample output the core hands back to the embedder.
///
/// `Machine` owns the framebuffer and audio ring directly (§5: "The host
/// must not touch the picture or audio buffers while `run_frame()` is in
/// progress"); this type is just the read side exposed between frames.
pub struct Presentation<'a> {
    pub picture: &'a [u16],
    pub audio: &'a [i16],
    pub controller_led: ControllerLed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerLed {
    pub red: bool,
    pub yellow: bool,
    pub blue: bool,
    pub green: bool,
}
