//! # flexmo-ts: Market-Data Fusion
//!
//! Turns a directory of heterogeneous reserve-market exports into one
//! quarter-hourly [`MarketFrame`]:
//!
//! - [`family`] - which exports are understood and how each is laid out
//! - [`parse`] - per-family CSV readers producing bucketed means
//! - [`resample`] - quarter-hour buckets and cross-file averaging
//! - [`spot`] - day-ahead prices from a [`DayAheadProvider`]
//! - [`fusion`] - directory scan, merge, ratios, spot fill, window cut
//! - [`frame`] - the fused frame and its `market_data.csv` form

pub mod family;
pub mod frame;
pub mod fusion;
pub mod parse;
pub mod resample;
pub mod spot;

pub use family::{classify, FileFamily};
pub use frame::{format_decimal_comma, MarketFrame, TIMESTAMP_FORMAT};
pub use fusion::{
    activation_ratios, discover_inputs, fuse_directory, fuse_files, FileReport, FileStatus,
    FusionConfig, FusionOutput, FusionSummary,
};
pub use parse::ParseContext;
pub use spot::{
    DayAheadProvider, EntsoeProvider, NoSpotProvider, PriceInterval, StaticSpotProvider,
    DE_LU_BIDDING_ZONE,
};
