//! Nilan ventilation Modbus RTU client
//!
//! Polls the register blocks of a Nilan heat-recovery controller over a
//! single half-duplex serial line, decodes them into named readings and
//! interleaves setpoint writes requested by the caller.

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod registers;
pub mod scheduler;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{Nilan, NilanClimate, NilanCommand, Reading, Value, ValueSink};
pub use modbus::{ResponseSource, SerialTransport, Transport};
pub use output::{DataFormatter, DataSender};
pub use registers::{BlockId, Catalog, Decoder};
pub use scheduler::{Scheduler, SchedulerState, StepOutcome, WriteRequest};
pub use services::PollService;
pub use utils::error::ModbusError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
