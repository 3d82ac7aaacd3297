//! # flexmo-algo: Reserve Co-Optimization
//!
//! Linear programs that split the power and energy of a battery, a flexible
//! load, or both behind one grid connection between the day-ahead spot
//! market and the balancing-reserve markets (FCR, aFRR-pos, aFRR-neg).
//!
//! ## Pipeline
//!
//! | Step | Item | Output |
//! |------|------|--------|
//! | Site | [`battery_site`], [`power_to_heat_site`], [`fleet_site`] | [`EnergySystem`](flexmo_core::EnergySystem) + [`ReserveTarget`]s |
//! | Base model | [`EnergyModel::build`] | flows, storage contents, cost `J` |
//! | Reserve layer | [`add_reserve_constraints`], once per asset | block bids `C[m][b]`, revenue `R` |
//! | Solve | [`solve`] | primal values for `min J − Σ R` |
//! | Extract | [`ResultSet::extract`], [`FleetResult::extract`] | dispatch, bids, cashflow, KPIs |
//!
//! [`activation_profile`] estimates the activation factors from market data
//! before the reserve layer is built.
//!
//! ## Example
//!
//! ```ignore
//! use flexmo_algo::*;
//!
//! let (system, target) = battery_site(&BatterySpec::new(1.0, 2.0), &spot)?;
//! let model = EnergyModel::build(system, frame.time_grid(0.25)?)?;
//! let config = ReserveConfig::from_market_frame(&frame, 1.0, 2.0);
//! let results = optimize(model, &target, &config, &SolverSettings::default())?;
//! println!("profit: {:.2} €", results.total_profit());
//! ```

pub mod activation;
pub mod io;
pub mod model;
pub mod reserve;
pub mod results;
pub mod site;
pub mod solve;

pub use activation::{activation_profile, BidStrategy, DEFAULT_SEED};
pub use model::{EnergyModel, VariableIndex};
pub use reserve::{
    add_reserve_constraints, ActivationFactor, ReserveConfig, ReserveHandle, ReserveTarget,
    ResolvedInputs,
};
pub use results::{
    asset_output_path, Cashflow, FleetKpis, FleetResult, KpiSummary, OperatingState, ResultSet,
    EXTRACTION_TOLERANCE, STATE_THRESHOLD_MW,
};
pub use site::{
    battery_site, fleet_site, power_to_heat_site, BatterySpec, PowerToHeatSpec,
    ThermalStorageSpec,
};
pub use solve::{optimize, optimize_fleet, solve, LpSolverKind, SolvedModel, SolverSettings};
