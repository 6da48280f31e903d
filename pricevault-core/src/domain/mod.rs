//! Domain types for PriceVault

pub mod bar;
pub mod series;
pub mod ticker;

pub use bar::{Interval, OhlcvRow, RawRow};
pub use series::{MergedSeries, RawSeries, SeriesError};
pub use ticker::Ticker;
