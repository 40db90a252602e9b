// Trace logging for CPU and PPU execution, kept around between `run_frame`
// calls so the embedder can dump recent history after a fatal error without
// the core having to know anything about how it's displayed.

pub mod logger;

pub use logger::{CpuTrace, LogLevel, Logger, PpuTrace, TraceEntry};
