//! # flexmo-core: Shared Types for Flexibility Co-Optimization
//!
//! Data structures used by every stage of the pipeline:
//!
//! - [`TimeGrid`] / [`BlockGrid`] - interval index and its partition into
//!   reserve product blocks
//! - [`Market`] / [`Direction`] - FCR, aFRR-pos, aFRR-neg, plus the canonical
//!   market-data column names in [`columns`]
//! - [`EnergySystem`] - directed component graph (buses, sources, sinks,
//!   storages, converters) that the LP model is built from
//! - [`FlexError`] - error kinds shared by fusion, model building, solving
//!   and extraction
//! - [`Diagnostics`] - non-fatal issues collected along the way
//!
//! ## Units
//!
//! Powers are MW, energies MWh, capacity prices €/MW per hour, energy prices
//! €/MWh, interval lengths hours.

pub mod diagnostics;
pub mod error;
pub mod grid;
pub mod market;
pub mod system;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{FlexError, FlexResult};
pub use grid::{BlockGrid, TimeGrid, DEFAULT_BLOCK_SIZE, DEFAULT_DT_HOURS};
pub use market::{columns, Direction, Market, AFRR_DURATION_HOURS, FCR_DURATION_HOURS};
pub use petgraph::graph::{EdgeIndex, NodeIndex};
pub use system::{Component, Converter, CostSeries, EnergySystem, Flow, Storage, SystemStats};
