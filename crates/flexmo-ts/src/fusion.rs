//! Directory-level fusion of market exports into one quarter-hourly frame.
//!
//! Files are classified by name and parsed per family. Within a family,
//! coinciding buckets are averaged; across families the buckets are
//! outer-joined and gaps become 0. Activation ratios and the spot column
//! are derived last, then the frame is cut to the optional window.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use flexmo_core::{columns, Diagnostics, Direction, FlexError, FlexResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::family::{classify, is_previous_output, FileFamily};
use crate::frame::MarketFrame;
use crate::parse::{parse_file, ParseContext};
use crate::resample::{covered_buckets, merge_mean, BucketFrame, QUARTER_HOUR};
use crate::spot::{fill_onto, DayAheadProvider};

/// Capacity below which an activation ratio is left at 0 (MW).
pub const MIN_RATIO_CAPACITY_MW: f64 = 0.1;

#[derive(Debug, Clone, Default)]
pub struct FusionConfig {
    pub context: ParseContext,
    /// Inclusive window of local timestamps kept in the output
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// What happened to one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Parsed,
    Failed,
    Unrecognized,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub family: Option<&'static str>,
    pub status: FileStatus,
}

#[derive(Debug, Clone)]
pub struct FusionOutput {
    pub frame: MarketFrame,
    pub diagnostics: Diagnostics,
    pub files: Vec<FileReport>,
    /// Whether the spot column came from the provider
    pub spot_filled: bool,
}

/// Run summary printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct FusionSummary {
    pub rows: usize,
    pub parsed_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub warnings: usize,
    pub spot_filled: bool,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl FusionOutput {
    pub fn summary(&self) -> FusionSummary {
        let count = |status| self.files.iter().filter(|f| f.status == status).count();
        let fmt = |ts: &NaiveDateTime| ts.format(crate::frame::TIMESTAMP_FORMAT).to_string();
        FusionSummary {
            rows: self.frame.len(),
            parsed_files: count(FileStatus::Parsed),
            failed_files: count(FileStatus::Failed),
            skipped_files: count(FileStatus::Unrecognized),
            warnings: self.diagnostics.warning_count(),
            spot_filled: self.spot_filled,
            first: self.frame.timestamps().first().map(fmt),
            last: self.frame.timestamps().last().map(fmt),
        }
    }
}

/// CSV files of `dir`, sorted by name, excluding earlier outputs.
pub fn discover_inputs(dir: &Path) -> FlexResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        FlexError::NoInput(format!("cannot read input directory {}: {e}", dir.display()))
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        let name = file_name(&path);
        if is_previous_output(&name) {
            debug!(file = %name, "skipping earlier fusion output");
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Fuse every market export found in `dir`.
pub fn fuse_directory(
    dir: &Path,
    config: &FusionConfig,
    provider: &dyn DayAheadProvider,
) -> FlexResult<FusionOutput> {
    let paths = discover_inputs(dir)?;
    fuse_files(&paths, config, provider)
}

/// Fuse the given files. Fails with [`FlexError::NoInput`] when none of
/// them belongs to a known family; per-file failures become diagnostics.
pub fn fuse_files(
    paths: &[PathBuf],
    config: &FusionConfig,
    provider: &dyn DayAheadProvider,
) -> FlexResult<FusionOutput> {
    let mut diagnostics = Diagnostics::new();
    let mut files = Vec::with_capacity(paths.len());
    let mut by_family: BTreeMap<FileFamily, Vec<BucketFrame>> = BTreeMap::new();

    for path in paths {
        let name = file_name(path);
        let Some(family) = classify(&name) else {
            warn!(file = %name, "unrecognized market file, skipping");
            diagnostics.add_warning_with_file("input", "unrecognized file name", &name);
            files.push(FileReport {
                path: path.clone(),
                family: None,
                status: FileStatus::Unrecognized,
            });
            continue;
        };
        let status = match parse_file(path, family, &config.context) {
            Ok(frame) => {
                by_family.entry(family).or_default().push(frame);
                FileStatus::Parsed
            }
            Err(err) if err.is_recoverable() => {
                warn!(file = %name, error = %err, "failed to parse market file");
                diagnostics.record(&err);
                FileStatus::Failed
            }
            Err(err) => return Err(err),
        };
        files.push(FileReport {
            path: path.clone(),
            family: Some(family.as_str()),
            status,
        });
    }

    if files.iter().all(|f| f.status == FileStatus::Unrecognized) {
        return Err(FlexError::NoInput(format!(
            "none of {} files is a known market export",
            paths.len()
        )));
    }

    let merged: Vec<BucketFrame> = by_family.values().map(|f| merge_mean(f)).collect();
    let (frame, spot_filled) = assemble(&merged, config, provider, &mut diagnostics)?;
    let frame = frame.window(config.start, config.end);

    info!(
        rows = frame.len(),
        families = merged.len(),
        warnings = diagnostics.warning_count(),
        "fused market data"
    );
    Ok(FusionOutput {
        frame,
        diagnostics,
        files,
        spot_filled,
    })
}

fn assemble(
    families: &[BucketFrame],
    config: &FusionConfig,
    provider: &dyn DayAheadProvider,
    diagnostics: &mut Diagnostics,
) -> FlexResult<(MarketFrame, bool)> {
    let refs: Vec<&BucketFrame> = families.iter().collect();
    let buckets = covered_buckets(&refs, QUARTER_HOUR);
    let instants: Vec<DateTime<Utc>> = buckets
        .iter()
        .filter_map(|b| DateTime::<Utc>::from_timestamp(*b, 0))
        .collect();
    let tz = config.context.timezone;
    let local: Vec<NaiveDateTime> = instants
        .iter()
        .map(|ts| ts.with_timezone(&tz).naive_local())
        .collect();

    let mut frame = MarketFrame::new(local);
    let observed = [
        columns::AFRR_POS_ENERGY_PRICE,
        columns::AFRR_NEG_ENERGY_PRICE,
        columns::FCR_CAP_PRICE,
        columns::AFRR_POS_CAP_PRICE,
        columns::AFRR_NEG_CAP_PRICE,
        columns::FCR_CAPACITY,
        columns::AFRR_POS_CAPACITY,
        columns::AFRR_NEG_CAPACITY,
        columns::AFRR_POS_ACTIVATION_MW,
        columns::AFRR_NEG_ACTIVATION_MW,
    ];
    for column in observed {
        let values = buckets
            .iter()
            .map(|b| {
                families
                    .iter()
                    .find_map(|f| f.mean(*b, column))
                    .unwrap_or(0.0)
            })
            .collect();
        frame.insert(column, values)?;
    }

    for direction in Direction::BOTH {
        let ratios = activation_ratios(
            &frame.column_or_zero(columns::activation_mw(direction)),
            &frame.column_or_zero(columns::capacity(direction)),
        );
        frame.insert(columns::activation_ratio(direction), ratios)?;
    }

    let (spot, filled) = match (instants.first(), instants.last()) {
        (Some(first), Some(last)) => {
            let end = *last + Duration::seconds(QUARTER_HOUR);
            match provider.fetch(*first, end) {
                Ok(intervals) => (fill_onto(&instants, &intervals), true),
                Err(err) => {
                    let message = format!("{}: {err:#}", provider.name());
                    warn!(error = %message, "spot prices unavailable, using 0");
                    diagnostics.add_warning("spot", &message);
                    (vec![0.0; instants.len()], false)
                }
            }
        }
        _ => (Vec::new(), false),
    };
    frame.insert(columns::SPOT_PRICE, spot)?;
    Ok((frame, filled))
}

/// Activated share of contracted capacity, clipped to `[0, 1]`. Intervals
/// with less than [`MIN_RATIO_CAPACITY_MW`] contracted get 0.
pub fn activation_ratios(activated_mw: &[f64], capacity_mw: &[f64]) -> Vec<f64> {
    activated_mw
        .iter()
        .zip(capacity_mw)
        .map(|(mw, cap)| {
            if *cap > MIN_RATIO_CAPACITY_MW {
                (mw / cap).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_clip_and_require_capacity() {
        let ratios = activation_ratios(&[50.0, 300.0, 10.0, -5.0], &[100.0, 200.0, 0.05, 10.0]);
        assert_eq!(ratios, vec![0.5, 1.0, 0.0, 0.0]);
    }
}
