// The system peripherals that sit behind the 0x3d00..0x3e03 register window
// (plus the external-memory mapper beyond it). Each one is a small,
// independently testable unit; `Machine` owns one instance of each and is
// the only thing that wires them to the bus, the IRQ aggregator and the CPU.

pub mod adc;
pub mod dma;
pub mod extmem;
pub mod gpio;
pub mod irq;
pub mod random;
pub mod timer;
pub mod uart;

pub use adc::Adc;
pub use dma::Dma;
pub use extmem::Extmem;
pub use gpio::Gpio;
pub use irq::Irq;
pub use random::Random;
pub use timer::Timer;
pub use uart::Uart;
