use chrono::NaiveDate;
use flexmo_algo::{
    activation_profile, battery_site, optimize, ActivationFactor, BatterySpec, BidStrategy,
    EnergyModel, ReserveConfig, ResultSet, SolverSettings,
};
use flexmo_core::{Market, TimeGrid};

const TOL: f64 = 1e-4;
const N: usize = 32;

fn grid(n: usize) -> TimeGrid {
    let start = NaiveDate::from_ymd_opt(2024, 3, 11)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    TimeGrid::regular(start, n, 0.25).unwrap()
}

fn spot() -> Vec<f64> {
    (0..N)
        .map(|t| 40.0 + 30.0 * ((t as f64) * std::f64::consts::PI / 8.0).sin())
        .collect()
}

fn spec() -> BatterySpec {
    let mut spec = BatterySpec::new(1.0, 2.0);
    spec.grid_limit = Some(1.0);
    spec
}

fn market_config() -> ReserveConfig {
    let mut config = ReserveConfig::new(N, 1.0, 2.0);
    config.fcr_prices = vec![8.0; N];
    config.afrr_pos_cap_prices = vec![4.0; N];
    config.afrr_neg_cap_prices = vec![6.0; N];
    config.afrr_pos_energy_prices = vec![120.0; N];
    config.afrr_neg_energy_prices = vec![-15.0; N];
    config.activation_factor_pos = ActivationFactor::Scalar(0.2);
    config.activation_factor_neg = ActivationFactor::Series(
        (0..N).map(|t| if t % 2 == 0 { 0.1 } else { 0.3 }).collect(),
    );
    config
}

fn run(spot: &[f64], config: &ReserveConfig) -> ResultSet {
    let (system, target) = battery_site(&spec(), spot).unwrap();
    let model = EnergyModel::build(system, grid(spot.len())).unwrap();
    optimize(model, &target, config, &SolverSettings::default()).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < TOL
}

#[test]
fn disabling_a_market_equals_pricing_it_at_zero() {
    let spot = spot();
    for market in Market::ALL {
        let mut disabled = market_config();
        disabled.set_enabled(market, false);

        let mut zero_priced = market_config();
        match market {
            Market::Fcr => zero_priced.fcr_prices = vec![0.0; N],
            Market::AfrrPos => {
                zero_priced.afrr_pos_cap_prices = vec![0.0; N];
                zero_priced.afrr_pos_energy_prices = vec![0.0; N];
            }
            Market::AfrrNeg => {
                zero_priced.afrr_neg_cap_prices = vec![0.0; N];
                zero_priced.afrr_neg_energy_prices = vec![0.0; N];
            }
        }

        let a = run(&spot, &disabled);
        let b = run(&spot, &zero_priced);
        assert!(
            close(a.objective_value, b.objective_value),
            "{market}: {} vs {}",
            a.objective_value,
            b.objective_value
        );
        assert!(a.bid(market).iter().all(|c| c.abs() < TOL));
    }
}

#[test]
fn disabled_market_inputs_are_not_inspected() {
    let mut config = market_config();
    config.enable_afrr_neg = false;
    config.afrr_neg_cap_prices.clear();
    config.afrr_neg_energy_prices = vec![f64::NAN; 3];
    config.activation_factor_neg = ActivationFactor::Scalar(4.0);

    let results = run(&spot(), &config);
    assert!(close(results.market_revenue(Market::AfrrNeg), 0.0));
}

#[test]
fn zero_activation_leaves_only_capacity_revenue() {
    let spot = spot();
    let mut with_energy = market_config();
    with_energy.activation_factor_pos = ActivationFactor::Scalar(0.0);
    with_energy.activation_factor_neg = ActivationFactor::Scalar(0.0);

    let mut capacity_only = with_energy.clone();
    capacity_only.afrr_pos_energy_prices = vec![0.0; N];
    capacity_only.afrr_neg_energy_prices = vec![0.0; N];

    let a = run(&spot, &with_energy);
    let b = run(&spot, &capacity_only);
    assert!(close(a.objective_value, b.objective_value));
    assert!(a.cashflow.rev_afrr_pos_en.iter().all(|r| r.abs() < TOL));
    assert!(a.cashflow.rev_afrr_neg_en.iter().all(|r| r.abs() < TOL));

    let capacity: f64 = a.cashflow.rev_fcr_cap.iter().sum::<f64>()
        + a.cashflow.rev_afrr_pos_cap.iter().sum::<f64>()
        + a.cashflow.rev_afrr_neg_cap.iter().sum::<f64>();
    assert!(close(a.objective_value, a.base_cost - capacity));
}

#[test]
fn doubling_reserve_prices_doubles_revenue() {
    let spot = vec![0.0; N];
    let mut base = ReserveConfig::new(N, 1.0, 2.0);
    base.enable_afrr_pos = false;
    base.enable_afrr_neg = false;
    base.fcr_prices = vec![10.0; N];
    let mut doubled = base.clone();
    doubled.scale_prices(2.0);

    let a = run(&spot, &base);
    let b = run(&spot, &doubled);
    assert!(close(b.reserve_revenue(), 2.0 * a.reserve_revenue()));
    for (ca, cb) in a.block_bids[&Market::Fcr]
        .iter()
        .zip(&b.block_bids[&Market::Fcr])
    {
        assert!(close(*ca, *cb));
    }
}

#[test]
fn objective_equals_cost_minus_revenue() {
    let results = run(&spot(), &market_config());
    assert!(close(
        results.objective_value,
        results.base_cost - results.reserve_revenue()
    ));
    let reserve: f64 = Market::ALL.iter().map(|m| results.market_revenue(*m)).sum();
    assert!(close(reserve, results.reserve_revenue()));
    let counted: usize = results.state_counts().values().sum();
    assert_eq!(counted, N);
}

#[test]
fn activation_is_deterministic_per_seed() {
    let clearing: Vec<f64> = (0..96).map(|t| (t % 5) as f64 * 10.0).collect();
    let volumes: Vec<f64> = (0..96).map(|t| (t % 7) as f64 - 3.0).collect();
    let strategy = BidStrategy::new(20.0, 2.0).with_seed(1234);

    let a = strategy.profile(&clearing, &volumes).unwrap();
    let b = strategy.profile(&clearing, &volumes).unwrap();
    assert_eq!(a, b);
    assert_eq!(
        a,
        activation_profile(&clearing, &volumes, 20.0, 2.0, 1234).unwrap()
    );
    assert!(a.iter().all(|f| (0.0..=1.0).contains(f)));
}

#[test]
fn activation_profile_feeds_the_builder() {
    let clearing: Vec<f64> = (0..N).map(|t| if t < 16 { 200.0 } else { 0.0 }).collect();
    let volumes = vec![0.5; N];
    let alpha = BidStrategy::new(100.0, 1.0)
        .profile(&clearing, &volumes)
        .unwrap();
    assert!(alpha[..16].iter().all(|a| (*a - 0.5).abs() < 1e-12));
    assert!(alpha[16..].iter().all(|a| *a == 0.0));

    let mut config = market_config();
    config.activation_factor_pos = ActivationFactor::Series(alpha);
    let results = run(&spot(), &config);
    for t in 16..N {
        assert!(results.cashflow.rev_afrr_pos_en[t].abs() < TOL);
    }
}
