pub mod cli;
pub mod config;

pub use cli::{build_cli_command, Cli, Commands, DirectionArg, OptimizeArgs, OptimizeCommands};
pub use config::{AssetKind, HeatDemand, ScenarioConfig};
