//! Per-family CSV parsers.
//!
//! Every parser reads one file into a quarter-hourly [`BucketFrame`] keyed by
//! canonical column names. Problems that make the whole file unusable come
//! back as [`FlexError::ParseWarn`]; single bad cells are treated as missing.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use csv::{ReaderBuilder, StringRecord, Trim};
use flexmo_core::{columns, FlexError, FlexResult};
use tracing::debug;

use crate::family::{DecimalMark, FamilySpec, FileFamily, TimeLocator, ValueLocator};
use crate::resample::{BucketFrame, BucketStats};

/// Settings shared by all parsers of one fusion run.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub timezone: Tz,
    /// Grid-area tag selecting activation columns, e.g. `TenneT TSO`
    pub grid_area: String,
    /// Shift applied to capacity-file timestamps
    pub capacity_offset_hours: i64,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Berlin,
            grid_area: "TenneT TSO".to_string(),
            capacity_offset_hours: 0,
        }
    }
}

/// Raw table as read from disk.
struct Table {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

impl Table {
    fn read(path: &Path, spec: &FamilySpec) -> FlexResult<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(spec.separator)
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .map_err(|e| warn_for(path, format!("cannot open: {e}")))?;
        let headers = reader
            .headers()
            .map_err(|e| warn_for(path, format!("cannot read header: {e}")))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim_matches('"').trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.map_err(|e| warn_for(path, e.to_string()))?);
        }
        Ok(Self { headers, rows })
    }

    fn find(&self, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.headers.iter().position(|h| pred(h.as_str()))
    }

    fn cell<'a>(&self, row: &'a StringRecord, col: usize) -> &'a str {
        row.get(col).unwrap_or("").trim_matches('"').trim()
    }
}

fn warn_for(path: &Path, message: impl Into<String>) -> FlexError {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    FlexError::parse_warn(file, message)
}

/// Read one market export of the given family.
pub fn parse_file(path: &Path, family: FileFamily, ctx: &ParseContext) -> FlexResult<BucketFrame> {
    let spec = family.spec();
    let table = Table::read(path, spec)?;
    let mut localizer = Localizer::new(ctx.timezone);
    let times = extract_times(&table, spec, &mut localizer).map_err(|m| warn_for(path, m))?;
    if times.iter().all(Option::is_none) {
        return Err(warn_for(path, "no parseable timestamps"));
    }

    let frame = match spec.values {
        [ValueLocator::Pivot {
            price_all_of,
            volume_all_of,
            type_column,
            direction_column,
        }] => {
            let shift = Duration::hours(ctx.capacity_offset_hours);
            let times: Vec<Option<i64>> = times
                .iter()
                .map(|t| t.map(|t| (t + shift).timestamp()))
                .collect();
            pivot_capacity(
                &table,
                spec,
                &times,
                price_all_of,
                volume_all_of,
                type_column,
                direction_column,
            )
        }
        locators => select_columns(&table, spec, &times, locators, &ctx.grid_area),
    }
    .map_err(|m| warn_for(path, m))?;

    debug!(
        file = %path.display(),
        family = family.as_str(),
        rows = table.rows.len(),
        "parsed market file"
    );
    Ok(frame)
}

fn extract_times(
    table: &Table,
    spec: &FamilySpec,
    localizer: &mut Localizer,
) -> Result<Vec<Option<DateTime<Utc>>>, String> {
    match spec.time {
        TimeLocator::Column { any_of } => {
            let col = table
                .find(|h| {
                    let upper = h.to_uppercase();
                    any_of.iter().any(|tag| upper.contains(tag))
                })
                .ok_or_else(|| format!("no timestamp column matching {any_of:?}"))?;
            Ok(table
                .rows
                .iter()
                .map(|row| {
                    let raw = table.cell(row, col);
                    parse_absolute(raw)
                        .or_else(|| parse_naive(raw, NAIVE_FORMATS).and_then(|n| localizer.localize(n)))
                })
                .collect())
        }
        TimeLocator::IntervalStart { contains } => {
            let col = table
                .find(|h| h.to_uppercase().contains(contains))
                .ok_or_else(|| format!("no interval column containing '{contains}'"))?;
            Ok(table
                .rows
                .iter()
                .map(|row| {
                    let start = interval_start(table.cell(row, col));
                    parse_naive(start, DAY_FIRST_FORMATS).and_then(|n| localizer.localize(n))
                })
                .collect())
        }
        TimeLocator::DateAndTime { date, time, format } => {
            let date_col = table
                .find(|h| h == date)
                .ok_or_else(|| format!("no '{date}' column"))?;
            let time_col = table
                .find(|h| h == time)
                .ok_or_else(|| format!("no '{time}' column"))?;
            Ok(table
                .rows
                .iter()
                .map(|row| {
                    let joined = format!(
                        "{} {}",
                        table.cell(row, date_col),
                        table.cell(row, time_col)
                    );
                    NaiveDateTime::parse_from_str(&joined, format)
                        .ok()
                        .and_then(|n| localizer.localize(n))
                })
                .collect())
        }
    }
}

fn select_columns(
    table: &Table,
    spec: &FamilySpec,
    times: &[Option<DateTime<Utc>>],
    locators: &[ValueLocator],
    grid_area: &str,
) -> Result<BucketFrame, String> {
    let mut selected: Vec<(&'static str, usize)> = Vec::new();
    for locator in locators {
        let found = match *locator {
            ValueLocator::Priority {
                target,
                suffix,
                tsos,
            } => tsos
                .iter()
                .find_map(|tso| {
                    let key = format!("{tso}{suffix}");
                    table.find(|h| h.to_uppercase().contains(&key))
                })
                .map(|col| (target, col)),
            ValueLocator::GridArea { target, tag } => table
                .find(|h| h.contains(grid_area) && h.contains(tag))
                .map(|col| (target, col)),
            ValueLocator::Pivot { .. } => None,
        };
        selected.extend(found);
    }
    if selected.is_empty() {
        return Err("no value columns recognized".to_string());
    }

    let mut frame = BucketFrame::quarter_hourly();
    for (row, ts) in table.rows.iter().zip(times) {
        let Some(ts) = ts else { continue };
        for &(target, col) in &selected {
            let value = parse_number(table.cell(row, col), spec.decimal, spec.na_values);
            frame.push(ts.timestamp(), target, value);
        }
    }
    Ok(frame)
}

#[allow(clippy::too_many_arguments)]
fn pivot_capacity(
    table: &Table,
    spec: &FamilySpec,
    times: &[Option<i64>],
    price_all_of: &[&str],
    volume_all_of: &[&str],
    type_column: &str,
    direction_column: &str,
) -> Result<BucketFrame, String> {
    let all_of = |tags: &[&str]| table.find(|h| tags.iter().all(|t| h.contains(t)));
    let price_col = all_of(price_all_of);
    let volume_col = all_of(volume_all_of);
    if price_col.is_none() && volume_col.is_none() {
        return Err("neither a price nor a volume column".to_string());
    }
    let type_col = table
        .find(|h| h.contains(type_column))
        .ok_or_else(|| format!("no '{type_column}' column"))?;
    let dir_col = table
        .find(|h| h.contains(direction_column))
        .ok_or_else(|| format!("no '{direction_column}' column"))?;

    // Mean per exact timestamp first, then per bucket.
    let mut exact: BTreeMap<(i64, &'static str), BucketStats> = BTreeMap::new();
    let mut classified: Vec<i64> = Vec::new();
    for (row, ts) in table.rows.iter().zip(times) {
        let Some(ts) = *ts else { continue };
        let reserve = table.cell(row, type_col).to_uppercase();
        let direction = table.cell(row, dir_col).to_uppercase();
        let Some((price_target, volume_target)) = classify_product(&reserve, &direction) else {
            continue;
        };
        classified.push(ts);
        for (col, target) in [(price_col, price_target), (volume_col, volume_target)] {
            let Some(col) = col else { continue };
            if let Some(v) = parse_number(table.cell(row, col), spec.decimal, spec.na_values) {
                exact.entry((ts, target)).or_default().push(v);
            }
        }
    }
    if classified.is_empty() {
        return Err("no FCR or aFRR rows".to_string());
    }

    let mut frame = BucketFrame::quarter_hourly();
    for ts in classified {
        frame.touch(ts);
    }
    for ((ts, target), stats) in exact {
        frame.push(ts, target, stats.mean());
    }
    Ok(frame)
}

/// Canonical (price, volume) columns for a reserve type and direction.
fn classify_product(reserve: &str, direction: &str) -> Option<(&'static str, &'static str)> {
    if reserve.contains("AFRR") {
        if direction.contains("UP") {
            return Some((columns::AFRR_POS_CAP_PRICE, columns::AFRR_POS_CAPACITY));
        }
        if direction.contains("DOWN") {
            return Some((columns::AFRR_NEG_CAP_PRICE, columns::AFRR_NEG_CAPACITY));
        }
        return None;
    }
    if reserve.contains("FCR") {
        return Some((columns::FCR_CAP_PRICE, columns::FCR_CAPACITY));
    }
    None
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
];

const DAY_FIRST_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Parse a timestamp that carries its own UTC offset.
pub fn parse_absolute(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = match raw.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => raw.to_string(),
    };
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&normalized, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_naive(raw: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Start of an `"start - end"` interval, without a trailing zone label.
fn interval_start(raw: &str) -> &str {
    let start = raw.split(" - ").next().unwrap_or(raw);
    start.split('(').next().unwrap_or(start).trim()
}

/// Parse a numeric cell. Unparseable cells are missing.
pub fn parse_number(raw: &str, decimal: DecimalMark, na_values: &[&str]) -> Option<f64> {
    let cell = raw.trim().trim_matches('"').trim();
    if na_values.contains(&cell) {
        return None;
    }
    match decimal {
        DecimalMark::Point => cell.parse().ok(),
        DecimalMark::Comma => cell.replace('.', "").replace(',', ".").parse().ok(),
    }
}

/// Map local wall-clock times to instants.
///
/// Nonexistent times (spring gap) are dropped. For the repeated hour in
/// autumn the earlier instant is taken until the sequence steps backwards,
/// then the later one.
#[derive(Debug, Clone)]
pub struct Localizer {
    tz: Tz,
    last: Option<DateTime<Utc>>,
}

impl Localizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz, last: None }
    }

    pub fn localize(&mut self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        let instant = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(early, late) => {
                let early = early.with_timezone(&Utc);
                if self.last.map_or(true, |last| early > last) {
                    early
                } else {
                    late.with_timezone(&Utc)
                }
            }
            LocalResult::None => return None,
        };
        self.last = Some(instant);
        Some(instant)
    }
}
