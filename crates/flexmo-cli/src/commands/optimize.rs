use anyhow::{Context, Result};
use flexmo_algo::{
    battery_site, fleet_site, optimize, optimize_fleet, power_to_heat_site, EnergyModel,
    FleetKpis, FleetResult, KpiSummary, LpSolverKind, ResultSet, SolverSettings,
};
use flexmo_cli::{AssetKind, OptimizeArgs, OptimizeCommands, ScenarioConfig};
use flexmo_core::columns;
use flexmo_ts::MarketFrame;
use serde::Serialize;
use tracing::info;

use super::print_json;

#[derive(Serialize)]
struct OptimizeReport {
    asset: &'static str,
    output: String,
    #[serde(flatten)]
    kpis: KpiSummary,
}

#[derive(Serialize)]
struct FleetReport {
    asset: &'static str,
    outputs: Vec<String>,
    #[serde(flatten)]
    kpis: FleetKpis,
}

pub fn handle(command: &OptimizeCommands) -> Result<()> {
    match command {
        OptimizeCommands::Battery(args) => run(args, AssetKind::Battery),
        OptimizeCommands::Load(args) => run(args, AssetKind::PowerToHeat),
        OptimizeCommands::Fleet(args) => run_fleet(args),
    }
}

struct Inputs {
    frame: MarketFrame,
    scenario: ScenarioConfig,
    settings: SolverSettings,
    spot: Vec<f64>,
}

fn load_inputs(args: &OptimizeArgs) -> Result<Inputs> {
    let frame = MarketFrame::read_csv(&args.market_data)
        .with_context(|| format!("reading {}", args.market_data.display()))?;
    let scenario = ScenarioConfig::load(&args.config)?;
    let mut settings = scenario.solver.clone();
    if let Some(solver) = &args.solver {
        settings.kind = solver.parse::<LpSolverKind>()?;
    }
    let spot = frame.column_or_zero(columns::SPOT_PRICE);
    Ok(Inputs {
        frame,
        scenario,
        settings,
        spot,
    })
}

fn run(args: &OptimizeArgs, asset: AssetKind) -> Result<()> {
    let Inputs {
        frame,
        scenario,
        settings,
        spot,
    } = load_inputs(args)?;
    let grid = frame.time_grid(scenario.dt_hours)?;
    let (system, target, reserve) = match asset {
        AssetKind::Battery => {
            let spec = scenario.battery()?;
            let (system, target) = battery_site(spec, &spot)?;
            let reserve = scenario.reserve_config(&frame, asset, spec.p_max, spec.e_max)?;
            (system, target, reserve)
        }
        AssetKind::PowerToHeat => {
            let (spec, demand) = scenario.power_to_heat()?;
            let (system, target) = power_to_heat_site(spec, &spot, &demand.profile(&frame)?)?;
            let reserve = scenario.reserve_config(&frame, asset, spec.p_max, 0.0)?;
            (system, target, reserve)
        }
    };
    info!(
        asset = asset.as_str(),
        intervals = grid.len(),
        solver = %settings.kind,
        "building model"
    );

    let model = EnergyModel::build(system, grid)?;
    let results = optimize(model, &target, &reserve, &settings)?;
    write_outputs(&results, args)?;

    print_json(&OptimizeReport {
        asset: asset.as_str(),
        output: args.output.display().to_string(),
        kpis: results.kpis(),
    })
}

fn run_fleet(args: &OptimizeArgs) -> Result<()> {
    let Inputs {
        frame,
        scenario,
        settings,
        spot,
    } = load_inputs(args)?;
    let grid = frame.time_grid(scenario.dt_hours)?;
    let (battery, power_to_heat, demand, grid_limit) = scenario.fleet()?;
    let (system, targets) = fleet_site(
        battery,
        power_to_heat,
        &spot,
        &demand.profile(&frame)?,
        grid_limit,
    )?;
    let configs = [
        scenario.reserve_config(&frame, AssetKind::Battery, battery.p_max, battery.e_max)?,
        scenario.reserve_config(&frame, AssetKind::PowerToHeat, power_to_heat.p_max, 0.0)?,
    ];
    let assets: Vec<_> = targets.into_iter().zip(configs).collect();
    info!(
        assets = assets.len(),
        intervals = grid.len(),
        solver = %settings.kind,
        "building fleet model"
    );

    let model = EnergyModel::build(system, grid)?;
    let fleet = optimize_fleet(model, &assets, &settings)?;
    let outputs = write_fleet_outputs(&fleet, args)?;

    print_json(&FleetReport {
        asset: "fleet",
        outputs: outputs.iter().map(|p| p.display().to_string()).collect(),
        kpis: fleet.kpis(),
    })
}

fn write_outputs(results: &ResultSet, args: &OptimizeArgs) -> Result<()> {
    results.write_csv(&args.output)?;
    if let Some(path) = &args.parquet {
        results.write_parquet(path)?;
    }
    if let Some(path) = &args.summary {
        results.write_summary(path)?;
    }
    info!(output = %args.output.display(), "wrote results");
    Ok(())
}

fn write_fleet_outputs(fleet: &FleetResult, args: &OptimizeArgs) -> Result<Vec<std::path::PathBuf>> {
    let written = fleet.write_csv(&args.output)?;
    if let Some(path) = &args.parquet {
        fleet.write_parquet(path)?;
    }
    if let Some(path) = &args.summary {
        fleet.write_summary(path)?;
    }
    info!(files = written.len(), "wrote fleet results");
    Ok(written)
}
