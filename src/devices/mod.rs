pub mod climate;
pub mod nilan;
pub mod sinks;
pub mod traits;

pub use climate::{ClimateCall, ClimateFanMode, NilanClimate};
pub use nilan::{temperature_to_raw, Nilan, NilanCommand};
pub use sinks::{ChannelSink, ReadingCache, TimestampedReading};
pub use traits::{Reading, Value, ValueSink};
