//! Raw input: per-timeframe bar files on disk.

pub mod loader;

pub use loader::{read_raw_table, RawBar, RawDataLoader, RawTable};
