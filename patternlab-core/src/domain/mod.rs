//! Domain types shared by every pipeline stage and the storage layer.

pub mod frame;
pub mod timeframe;
pub mod window;

pub use frame::{BarFrame, FrameColumn};
pub use timeframe::{TimeUnit, Timeframe};
pub use window::PatternWindow;
