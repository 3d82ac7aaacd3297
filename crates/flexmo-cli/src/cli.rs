use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use flexmo_algo::DEFAULT_SEED;
use flexmo_core::Direction;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flexmo", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fuse reserve-market exports into one quarter-hourly market_data.csv
    Fuse {
        /// Directory holding the exported CSV files
        #[arg(long, value_hint = ValueHint::DirPath)]
        input_dir: PathBuf,
        /// Output CSV path
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: PathBuf,
        /// Optional Parquet copy of the output
        #[arg(long)]
        parquet: Option<PathBuf>,
        /// Zone naive timestamps are read in
        #[arg(long, default_value = "Europe/Berlin")]
        timezone: String,
        /// Grid-area tag of the activation columns
        #[arg(long, default_value = "TenneT TSO")]
        grid_area: String,
        /// Hours added to capacity-file timestamps
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        capacity_offset_hours: i64,
        /// First local timestamp to keep, `YYYY-MM-DD HH:MM`
        #[arg(long)]
        start: Option<String>,
        /// Last local timestamp to keep, `YYYY-MM-DD HH:MM`
        #[arg(long)]
        end: Option<String>,
        /// ENTSO-E API token; falls back to ENTSOE_API_KEY
        #[arg(long)]
        entsoe_key: Option<String>,
        /// ENTSO-E EIC code of the day-ahead bidding zone
        #[arg(long, default_value = flexmo_ts::DE_LU_BIDDING_ZONE)]
        bidding_zone: String,
    },
    /// Expected activation profile of an aFRR bid
    Activation {
        /// Fused market_data.csv
        #[arg(long, value_hint = ValueHint::FilePath)]
        market_data: PathBuf,
        #[arg(long, value_enum)]
        direction: DirectionArg,
        /// Energy price of the bid (€/MWh)
        #[arg(long, allow_hyphen_values = true)]
        bid_price: f64,
        /// Offered power (MW)
        #[arg(long)]
        bid_capacity: f64,
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
        /// Output CSV path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Co-optimize spot trading and reserve bids
    Optimize {
        #[command(subcommand)]
        command: OptimizeCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum OptimizeCommands {
    /// Grid-connected battery
    Battery(OptimizeArgs),
    /// Power-to-heat unit as a flexible load
    Load(OptimizeArgs),
    /// Battery and power-to-heat unit behind one grid connection; writes one
    /// results file per asset
    Fleet(OptimizeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    /// Fused market_data.csv
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub market_data: PathBuf,
    /// Scenario TOML file
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: PathBuf,
    /// Interval results CSV
    #[arg(short, long)]
    pub output: PathBuf,
    /// Override the solver of the scenario (clarabel, highs)
    #[arg(long)]
    pub solver: Option<String>,
    /// Write the KPI summary as JSON
    #[arg(long)]
    pub summary: Option<PathBuf>,
    /// Optional Parquet copy of the results
    #[arg(long)]
    pub parquet: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectionArg {
    Pos,
    Neg,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Pos => Direction::Pos,
            DirectionArg::Neg => Direction::Neg,
        }
    }
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn optimize_battery_parses() {
        let cli = Cli::try_parse_from([
            "flexmo",
            "optimize",
            "battery",
            "--market-data",
            "market_data.csv",
            "--config",
            "scenario.toml",
            "-o",
            "results.csv",
            "--solver",
            "clarabel",
        ])
        .unwrap();
        match cli.command {
            Commands::Optimize {
                command: OptimizeCommands::Battery(args),
            } => assert_eq!(args.solver.as_deref(), Some("clarabel")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn optimize_fleet_parses() {
        let cli = Cli::try_parse_from([
            "flexmo",
            "optimize",
            "fleet",
            "--market-data",
            "market_data.csv",
            "--config",
            "fleet.toml",
            "-o",
            "out/results.csv",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Optimize {
                command: OptimizeCommands::Fleet(_)
            }
        ));
    }
}
