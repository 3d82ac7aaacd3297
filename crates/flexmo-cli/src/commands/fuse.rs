use std::env;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use flexmo_ts::{
    fuse_directory, DayAheadProvider, EntsoeProvider, FusionConfig, FusionSummary, NoSpotProvider,
    ParseContext,
};
use serde::Serialize;
use tracing::{info, warn};

use super::print_json;

pub struct FuseArgs<'a> {
    pub input_dir: &'a Path,
    pub output: &'a Path,
    pub parquet: Option<&'a Path>,
    pub timezone: &'a str,
    pub grid_area: &'a str,
    pub capacity_offset_hours: i64,
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub entsoe_key: Option<&'a str>,
    pub bidding_zone: &'a str,
}

#[derive(Serialize)]
struct FuseReport<'a> {
    output: String,
    #[serde(flatten)]
    summary: FusionSummary,
    files: &'a [flexmo_ts::FileReport],
}

/// `YYYY-MM-DD HH:MM[:SS]` as a local timestamp.
pub fn parse_local_timestamp(value: &str) -> Result<NaiveDateTime> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("cannot parse timestamp '{value}', expected YYYY-MM-DD HH:MM"))
}

pub fn handle(args: &FuseArgs<'_>) -> Result<()> {
    let timezone: Tz = args
        .timezone
        .parse()
        .map_err(|e| anyhow!("unknown timezone '{}': {e}", args.timezone))?;
    let config = FusionConfig {
        context: ParseContext {
            timezone,
            grid_area: args.grid_area.to_string(),
            capacity_offset_hours: args.capacity_offset_hours,
        },
        start: args.start.map(parse_local_timestamp).transpose()?,
        end: args.end.map(parse_local_timestamp).transpose()?,
    };

    let token = args
        .entsoe_key
        .map(str::to_string)
        .or_else(|| env::var("ENTSOE_API_KEY").ok())
        .filter(|k| !k.trim().is_empty());
    let provider: Box<dyn DayAheadProvider> = match token {
        Some(token) => {
            Box::new(EntsoeProvider::new(token).with_bidding_zone(args.bidding_zone))
        }
        None => {
            info!("no ENTSO-E token given, spot prices will be 0");
            Box::new(NoSpotProvider)
        }
    };

    let fused = fuse_directory(args.input_dir, &config, provider.as_ref())
        .with_context(|| format!("fusing {}", args.input_dir.display()))?;
    for issue in &fused.diagnostics.issues {
        warn!(%issue, "fusion");
    }

    fused.frame.write_csv(args.output)?;
    if let Some(path) = args.parquet {
        fused.frame.write_parquet(path)?;
    }
    info!(
        output = %args.output.display(),
        rows = fused.frame.len(),
        "wrote market data"
    );

    print_json(&FuseReport {
        output: args.output.display().to_string(),
        summary: fused.summary(),
        files: &fused.files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_accept_common_layouts() {
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        assert_eq!(parse_local_timestamp("2024-03-01 06:30").unwrap(), expected);
        assert_eq!(parse_local_timestamp("2024-03-01T06:30:00").unwrap(), expected);
        assert_eq!(
            parse_local_timestamp("2024-03-01").unwrap(),
            expected.date().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_local_timestamp("01.03.2024").is_err());
    }
}
