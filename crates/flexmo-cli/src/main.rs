use std::process::ExitCode;

use clap::Parser;
use flexmo_algo::BidStrategy;
use flexmo_cli::cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

use crate::commands::{activation, fuse, optimize};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let (label, result) = match &cli.command {
        Commands::Fuse {
            input_dir,
            output,
            parquet,
            timezone,
            grid_area,
            capacity_offset_hours,
            start,
            end,
            entsoe_key,
            bidding_zone,
        } => (
            "Fusion",
            fuse::handle(&fuse::FuseArgs {
                input_dir,
                output,
                parquet: parquet.as_deref(),
                timezone,
                grid_area,
                capacity_offset_hours: *capacity_offset_hours,
                start: start.as_deref(),
                end: end.as_deref(),
                entsoe_key: entsoe_key.as_deref(),
                bidding_zone,
            }),
        ),
        Commands::Activation {
            market_data,
            direction,
            bid_price,
            bid_capacity,
            seed,
            output,
        } => (
            "Activation",
            activation::handle(
                market_data,
                (*direction).into(),
                &BidStrategy::new(*bid_price, *bid_capacity).with_seed(*seed),
                output,
            ),
        ),
        Commands::Optimize { command } => ("Optimization", optimize::handle(command)),
    };

    match result {
        Ok(()) => {
            info!("{label} command successful!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{label} command failed: {e:?}");
            ExitCode::FAILURE
        }
    }
}
