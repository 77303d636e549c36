pub mod settings;

pub use settings::{
    ClimateConfig,
    Config,
    FileOutputConfig,
    OutputConfig,
    ParityConfig,
    RegisterSelection,
};
