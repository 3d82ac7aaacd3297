//! Standard sites: a grid-connected battery, a power-to-heat load, and both
//! behind one connection.

use flexmo_core::{
    Component, Converter, CostSeries, EnergySystem, FlexError, FlexResult, Flow, Storage,
};
use serde::{Deserialize, Serialize};

use crate::reserve::ReserveTarget;

pub const ELECTRICITY_BUS: &str = "electricity";
pub const HEAT_BUS: &str = "heat";
pub const SPOT_BUY: &str = "spot_buy";
pub const SPOT_SELL: &str = "spot_sell";
pub const BATTERY: &str = "battery";
pub const POWER_TO_HEAT: &str = "pth";
pub const THERMAL_STORAGE: &str = "thermal_storage";
pub const HEAT_DEMAND: &str = "heat_demand";

fn default_efficiency() -> f64 {
    0.95
}

fn default_initial_level() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

fn default_pth_efficiency() -> f64 {
    0.99
}

fn default_thermal_loss() -> f64 {
    0.005
}

/// Battery parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySpec {
    /// Charge and discharge power limit (MW)
    pub p_max: f64,
    /// Energy capacity (MWh)
    pub e_max: f64,
    #[serde(default = "default_efficiency")]
    pub inflow_efficiency: f64,
    #[serde(default = "default_efficiency")]
    pub outflow_efficiency: f64,
    /// Relative self-discharge per hour
    #[serde(default)]
    pub loss_rate: f64,
    #[serde(default = "default_initial_level")]
    pub initial_level: f64,
    #[serde(default = "default_true")]
    pub balanced: bool,
    /// Grid connection limit (MW) on spot purchases and sales
    #[serde(default)]
    pub grid_limit: Option<f64>,
}

impl BatterySpec {
    pub fn new(p_max: f64, e_max: f64) -> Self {
        Self {
            p_max,
            e_max,
            inflow_efficiency: default_efficiency(),
            outflow_efficiency: default_efficiency(),
            loss_rate: 0.0,
            initial_level: default_initial_level(),
            balanced: true,
            grid_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThermalStorageSpec {
    /// Capacity (MWh thermal)
    pub capacity: f64,
    #[serde(default = "default_thermal_loss")]
    pub loss_rate: f64,
    #[serde(default = "default_initial_level")]
    pub initial_level: f64,
}

/// Power-to-heat parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerToHeatSpec {
    /// Electrical power limit (MW)
    pub p_max: f64,
    #[serde(default = "default_pth_efficiency")]
    pub efficiency: f64,
    /// Operating cost per MWh of heat
    #[serde(default)]
    pub variable_cost: f64,
    #[serde(default)]
    pub thermal_storage: Option<ThermalStorageSpec>,
    #[serde(default)]
    pub grid_limit: Option<f64>,
}

impl PowerToHeatSpec {
    pub fn new(p_max: f64) -> Self {
        Self {
            p_max,
            efficiency: default_pth_efficiency(),
            variable_cost: 0.0,
            thermal_storage: None,
            grid_limit: None,
        }
    }
}

fn spot_flow(spot_prices: &[f64], grid_limit: Option<f64>, sell: bool) -> Flow {
    let costs = CostSeries::Series(spot_prices.to_vec());
    let flow = Flow::new().with_costs(if sell { costs.negated() } else { costs });
    match grid_limit {
        Some(limit) => flow.with_nominal(limit),
        None => flow,
    }
}

fn check_positive(name: &str, value: f64) -> FlexResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FlexError::BadInput(format!("{name} must be non-negative, got {value}")))
    }
}

fn add_grid_connection(
    es: &mut EnergySystem,
    spot_prices: &[f64],
    grid_limit: Option<f64>,
    sell: bool,
) -> FlexResult<()> {
    es.add(Component::Bus(ELECTRICITY_BUS.into()))?;
    es.add(Component::Source(SPOT_BUY.into()))?;
    es.connect(SPOT_BUY, ELECTRICITY_BUS, spot_flow(spot_prices, grid_limit, false))?;
    if sell {
        es.add(Component::Sink(SPOT_SELL.into()))?;
        es.connect(ELECTRICITY_BUS, SPOT_SELL, spot_flow(spot_prices, grid_limit, true))?;
    }
    Ok(())
}

fn add_battery(es: &mut EnergySystem, spec: &BatterySpec) -> FlexResult<ReserveTarget> {
    check_positive("p_max", spec.p_max)?;
    check_positive("e_max", spec.e_max)?;
    es.add(Component::Storage(Storage {
        label: BATTERY.into(),
        nominal_capacity: spec.e_max,
        inflow_efficiency: spec.inflow_efficiency,
        outflow_efficiency: spec.outflow_efficiency,
        loss_rate: spec.loss_rate,
        initial_level: spec.initial_level,
        balanced: spec.balanced,
    }))?;
    es.connect(ELECTRICITY_BUS, BATTERY, Flow::new().with_nominal(spec.p_max))?;
    es.connect(BATTERY, ELECTRICITY_BUS, Flow::new().with_nominal(spec.p_max))?;
    Ok(ReserveTarget::Battery {
        storage: BATTERY.into(),
        bus: ELECTRICITY_BUS.into(),
    })
}

fn add_power_to_heat(
    es: &mut EnergySystem,
    spec: &PowerToHeatSpec,
    heat_demand: &[f64],
    horizon: usize,
) -> FlexResult<ReserveTarget> {
    check_positive("p_max", spec.p_max)?;
    if heat_demand.len() != horizon {
        return Err(FlexError::BadInput(format!(
            "heat demand has {} values but spot prices have {horizon}",
            heat_demand.len()
        )));
    }

    es.add(Component::Bus(HEAT_BUS.into()))?;
    es.add(Component::Converter(Converter {
        label: POWER_TO_HEAT.into(),
        efficiency: spec.efficiency,
    }))?;
    es.add(Component::Sink(HEAT_DEMAND.into()))?;
    es.connect(ELECTRICITY_BUS, POWER_TO_HEAT, Flow::new().with_nominal(spec.p_max))?;
    es.connect(
        POWER_TO_HEAT,
        HEAT_BUS,
        Flow::new()
            .with_nominal(spec.p_max * spec.efficiency)
            .with_costs(CostSeries::Constant(spec.variable_cost)),
    )?;
    es.connect(HEAT_BUS, HEAT_DEMAND, Flow::new().with_fix(heat_demand.to_vec()))?;

    if let Some(tes) = &spec.thermal_storage {
        check_positive("thermal storage capacity", tes.capacity)?;
        es.add(Component::Storage(Storage {
            label: THERMAL_STORAGE.into(),
            nominal_capacity: tes.capacity,
            inflow_efficiency: 1.0,
            outflow_efficiency: 1.0,
            loss_rate: tes.loss_rate,
            initial_level: tes.initial_level,
            balanced: false,
        }))?;
        es.connect(HEAT_BUS, THERMAL_STORAGE, Flow::new())?;
        es.connect(THERMAL_STORAGE, HEAT_BUS, Flow::new())?;
    }

    Ok(ReserveTarget::FlexibleLoad {
        component: POWER_TO_HEAT.into(),
        bus: ELECTRICITY_BUS.into(),
    })
}

/// Battery on an electricity bus trading at spot.
pub fn battery_site(
    spec: &BatterySpec,
    spot_prices: &[f64],
) -> FlexResult<(EnergySystem, ReserveTarget)> {
    let mut es = EnergySystem::new();
    add_grid_connection(&mut es, spot_prices, spec.grid_limit, true)?;
    let target = add_battery(&mut es, spec)?;
    Ok((es, target))
}

/// Electric boiler serving a fixed heat demand, with optional heat storage.
pub fn power_to_heat_site(
    spec: &PowerToHeatSpec,
    spot_prices: &[f64],
    heat_demand: &[f64],
) -> FlexResult<(EnergySystem, ReserveTarget)> {
    let mut es = EnergySystem::new();
    add_grid_connection(&mut es, spot_prices, spec.grid_limit, false)?;
    let target = add_power_to_heat(&mut es, spec, heat_demand, spot_prices.len())?;
    Ok((es, target))
}

/// Battery and power-to-heat unit behind one grid connection.
///
/// Both assets hang off the same electricity bus, so the battery can feed
/// the boiler directly. Targets are returned battery first.
pub fn fleet_site(
    battery: &BatterySpec,
    power_to_heat: &PowerToHeatSpec,
    spot_prices: &[f64],
    heat_demand: &[f64],
    grid_limit: Option<f64>,
) -> FlexResult<(EnergySystem, Vec<ReserveTarget>)> {
    let mut es = EnergySystem::new();
    add_grid_connection(&mut es, spot_prices, grid_limit, true)?;
    let battery = add_battery(&mut es, battery)?;
    let load = add_power_to_heat(&mut es, power_to_heat, heat_demand, spot_prices.len())?;
    Ok((es, vec![battery, load]))
}
