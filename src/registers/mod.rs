pub mod catalog;
pub mod decoder;
pub mod labels;

pub use catalog::{BlockId, Catalog, CatalogCursor, RegisterBlock};
pub use decoder::{scale_temperature, Decoder};

/// Holding registers the controller accepts writes on.
pub mod holding {
    pub const RUNSET: u16 = 1001;
    pub const MODESET: u16 = 1002;
    pub const VENTSET: u16 = 1003;
    pub const TEMPSET: u16 = 1004;
}
