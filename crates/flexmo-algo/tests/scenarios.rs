use chrono::NaiveDate;
use flexmo_algo::{
    battery_site, fleet_site, optimize, optimize_fleet, power_to_heat_site, ActivationFactor,
    BatterySpec, EnergyModel, OperatingState, PowerToHeatSpec, ReserveConfig, ResultSet,
    SolverSettings,
};
use flexmo_core::{FlexError, Market, TimeGrid};

const TOL: f64 = 1e-4;

fn grid(n: usize) -> TimeGrid {
    let start = NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    TimeGrid::regular(start, n, 0.25).unwrap()
}

fn battery(p_max: f64, e_max: f64) -> BatterySpec {
    let mut spec = BatterySpec::new(p_max, e_max);
    spec.grid_limit = Some(p_max);
    spec
}

fn run_battery(spec: &BatterySpec, spot: &[f64], config: &ReserveConfig) -> ResultSet {
    let (system, target) = battery_site(spec, spot).unwrap();
    let model = EnergyModel::build(system, grid(spot.len())).unwrap();
    optimize(model, &target, config, &SolverSettings::default()).unwrap()
}

fn fcr_only(n: usize, p_max: f64, e_max: f64, price: f64) -> ReserveConfig {
    let mut config = ReserveConfig::new(n, p_max, e_max);
    config.enable_afrr_pos = false;
    config.enable_afrr_neg = false;
    config.fcr_prices = vec![price; n];
    config
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < TOL,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn fcr_bid_uses_full_power_when_energy_allows() {
    let results = run_battery(&battery(1.0, 2.0), &[0.0; 16], &fcr_only(16, 1.0, 2.0, 10.0));

    assert_eq!(results.block_bids[&Market::Fcr].len(), 1);
    assert_close(results.block_bids[&Market::Fcr][0], 1.0);
    assert_close(results.reserve_revenue(), 40.0);
    assert_close(results.objective_value, -40.0);
    assert!(results.bid(Market::AfrrPos).iter().all(|c| c.abs() < TOL));
    assert_eq!(results.state_counts()[&OperatingState::FcrOnly], 16);
}

#[test]
fn small_battery_is_limited_by_headroom_and_footroom() {
    // 0.25·C ≤ SOC ≤ 0.1 − 0.25·C
    let results = run_battery(&battery(1.0, 0.1), &[0.0; 16], &fcr_only(16, 1.0, 0.1, 10.0));

    assert_close(results.block_bids[&Market::Fcr][0], 0.2);
    assert_close(results.reserve_revenue(), 8.0);
    let soc = results.soc.as_ref().unwrap();
    assert!(soc.iter().all(|s| (s - 0.05).abs() < TOL));
}

#[test]
fn positive_afrr_is_limited_by_delivery_and_headroom() {
    let mut spec = battery(1.0, 10.0);
    spec.initial_level = 1.0;
    spec.balanced = false;
    let mut config = ReserveConfig::new(16, 1.0, 10.0);
    config.enable_fcr = false;
    config.activation_factor_pos = ActivationFactor::Scalar(1.0);
    config.activation_factor_neg = ActivationFactor::Scalar(0.0);
    config.afrr_pos_energy_prices = vec![50.0; 16];

    let results = run_battery(&spec, &[0.0; 16], &config);

    assert_close(results.block_bids[&Market::AfrrPos][0], 0.5);
    for t in 0..16 {
        assert_close(results.f_out[t], 0.5);
        assert!(results.real_spot_out[t] < TOL);
    }
    assert_close(results.market_revenue(Market::AfrrPos), 100.0);
    assert_close(results.cashflow.rev_afrr_pos_en.iter().sum(), 100.0);
    assert_close(results.total_profit(), 100.0);
}

#[test]
fn power_to_heat_offers_negative_afrr() {
    let mut spec = PowerToHeatSpec::new(2.0);
    spec.efficiency = 1.0;
    let (system, target) = power_to_heat_site(&spec, &[0.0; 4], &[1.0; 4]).unwrap();
    let model = EnergyModel::build(system, grid(4)).unwrap();

    let mut config = ReserveConfig::new(4, 2.0, 0.0);
    config.market_block_size = 4;
    config.enable_afrr_pos = false;
    config.activation_factor_neg = ActivationFactor::Scalar(0.5);
    config.afrr_neg_cap_prices = vec![5.0; 4];
    config.afrr_neg_energy_prices = vec![-10.0; 4];

    let results = optimize(model, &target, &config, &SolverSettings::default()).unwrap();

    assert_close(results.block_bids[&Market::AfrrNeg][0], 1.0);
    assert_close(results.reserve_revenue(), 10.0);
    assert!(results.soc.is_none());
    assert!(results.equivalent_full_cycles().is_none());
    // FCR is never offered by a load, even with the default switch on
    assert!(results.bid(Market::Fcr).iter().all(|c| c.abs() < TOL));
    let planned = results.planned_consumption.as_ref().unwrap();
    assert!(planned.iter().all(|p| (p - 0.5).abs() < TOL));
}

#[test]
fn power_to_heat_offers_positive_afrr_down_to_its_demand() {
    // f_in ≥ C_pos and f_in ≤ P_max − C_pos·α_pos with f_in = 1.5
    let mut spec = PowerToHeatSpec::new(2.0);
    spec.efficiency = 1.0;
    let (system, target) = power_to_heat_site(&spec, &[0.0; 4], &[1.5; 4]).unwrap();
    let model = EnergyModel::build(system, grid(4)).unwrap();

    let mut config = ReserveConfig::new(4, 2.0, 0.0);
    config.market_block_size = 4;
    config.enable_afrr_neg = false;
    config.activation_factor_pos = ActivationFactor::Scalar(1.0);
    config.afrr_pos_cap_prices = vec![5.0; 4];

    let results = optimize(model, &target, &config, &SolverSettings::default()).unwrap();

    assert_close(results.block_bids[&Market::AfrrPos][0], 0.5);
    for t in 0..4 {
        assert_close(results.f_in[t], 1.5);
    }
    assert_close(results.market_revenue(Market::AfrrPos), 2.5);
    assert!(results.bid(Market::AfrrNeg).iter().all(|c| c.abs() < TOL));
}

#[test]
fn fleet_earns_reserve_revenue_from_both_assets() {
    let n = 16;
    let mut pth = PowerToHeatSpec::new(2.0);
    pth.efficiency = 1.0;
    let (system, targets) =
        fleet_site(&BatterySpec::new(1.0, 2.0), &pth, &vec![0.0; n], &vec![1.0; n], Some(3.0))
            .unwrap();
    let model = EnergyModel::build(system, grid(n)).unwrap();

    let battery_config = fcr_only(n, 1.0, 2.0, 10.0);
    let mut load_config = ReserveConfig::new(n, 2.0, 0.0);
    load_config.enable_afrr_pos = false;
    load_config.activation_factor_neg = ActivationFactor::Scalar(0.5);
    load_config.afrr_neg_cap_prices = vec![5.0; n];
    load_config.afrr_neg_energy_prices = vec![-10.0; n];

    let assets = vec![
        (targets[0].clone(), battery_config),
        (targets[1].clone(), load_config),
    ];
    let fleet = optimize_fleet(model, &assets, &SolverSettings::default()).unwrap();

    let battery = fleet.asset("battery").unwrap();
    let load = fleet.asset("pth").unwrap();
    assert_close(battery.block_bids[&Market::Fcr][0], 1.0);
    assert_close(load.block_bids[&Market::AfrrNeg][0], 1.0);
    assert_close(battery.reserve_revenue(), 40.0);
    assert_close(load.reserve_revenue(), 40.0);
    assert_close(fleet.reserve_revenue(), 80.0);
    assert_close(fleet.objective_value, fleet.base_cost - 80.0);
    assert!(load.soc.is_none());
    assert!(battery.soc.is_some());

    let kpis = fleet.kpis();
    assert_eq!(kpis.intervals, n);
    assert_eq!(kpis.assets.len(), 2);
    assert!((kpis.assets["pth"].reserve_revenue - 40.0).abs() < TOL);

    let dir = tempfile::tempdir().unwrap();
    let written = fleet.write_csv(&dir.path().join("fleet.csv")).unwrap();
    assert_eq!(
        written,
        vec![dir.path().join("fleet_battery.csv"), dir.path().join("fleet_pth.csv")]
    );
    let load_csv = std::fs::read_to_string(&written[1]).unwrap();
    assert!(load_csv.starts_with("timestamp;Consumption_MW;"));
}

#[test]
fn one_asset_cannot_carry_two_reserve_layers() {
    let (system, target) = battery_site(&battery(1.0, 2.0), &[0.0; 4]).unwrap();
    let model = EnergyModel::build(system, grid(4)).unwrap();
    let config = fcr_only(4, 1.0, 2.0, 10.0);
    let assets = vec![(target.clone(), config.clone()), (target, config)];

    let err = optimize_fleet(model, &assets, &SolverSettings::default()).unwrap_err();
    assert!(matches!(err, FlexError::BadInput(msg) if msg.contains("more than one")));
}

#[test]
fn bids_are_constant_within_blocks() {
    let n = 32;
    let spot: Vec<f64> = (0..n).map(|t| if t % 8 < 4 { 20.0 } else { 80.0 }).collect();
    let mut config = ReserveConfig::new(n, 1.0, 2.0);
    config.fcr_prices = (0..n).map(|t| if t < 16 { 5.0 } else { 15.0 }).collect();
    config.afrr_pos_cap_prices = vec![3.0; n];
    config.afrr_neg_cap_prices = vec![2.0; n];
    config.activation_factor_pos = ActivationFactor::Scalar(0.1);
    config.activation_factor_neg = ActivationFactor::Scalar(0.1);
    config.afrr_pos_energy_prices = vec![100.0; n];
    config.afrr_neg_energy_prices = vec![-20.0; n];

    let results = run_battery(&battery(1.0, 2.0), &spot, &config);

    assert_eq!(results.t_to_block[15], 0);
    assert_eq!(results.t_to_block[16], 1);
    for market in Market::ALL {
        let blocks = &results.block_bids[&market];
        assert_eq!(blocks.len(), 2);
        for (t, c) in results.bid(market).iter().enumerate() {
            assert_close(*c, blocks[t / 16]);
        }
    }
    let soc = results.soc.as_ref().unwrap();
    assert!(soc.iter().all(|s| *s > -TOL && *s < 2.0 + TOL));
    assert_close(
        results.cashflow.cum_profit[n - 1],
        results.cashflow.total_profit.iter().sum(),
    );
    assert_eq!(results.states.len(), n);
    assert!(results.equivalent_full_cycles().unwrap() >= 0.0);
}

#[test]
fn misaligned_prices_are_rejected() {
    let (system, target) = battery_site(&battery(1.0, 2.0), &[0.0; 8]).unwrap();
    let model = EnergyModel::build(system, grid(8)).unwrap();
    let mut config = ReserveConfig::new(8, 1.0, 2.0);
    config.fcr_prices = vec![10.0; 7];

    let err = optimize(model, &target, &config, &SolverSettings::default()).unwrap_err();
    assert!(matches!(err, FlexError::BadInput(msg) if msg.contains("fcr_prices")));
}

#[test]
fn results_export_to_csv_and_json() {
    let results = run_battery(&battery(1.0, 2.0), &[0.0; 16], &fcr_only(16, 1.0, 2.0, 10.0));
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("out/results.csv");
    results.write_csv(&csv_path).unwrap();
    let text = std::fs::read_to_string(&csv_path).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("timestamp;Charge_MW;Discharge_MW;SOC_MWh"));
    assert!(header.ends_with("Total_Profit;Cum_Profit;State"));
    assert_eq!(text.lines().count(), 17);
    assert!(text.lines().nth(1).unwrap().ends_with("FCR only"));

    let json_path = dir.path().join("summary.json");
    results.write_summary(&json_path).unwrap();
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert!((summary["total_profit"].as_f64().unwrap() - 40.0).abs() < TOL);
    assert_eq!(summary["state_counts"]["FCR only"], 16);

    let df = results.to_dataframe().unwrap();
    assert_eq!(df.height(), 16);
}
