//! The fused quarter-hourly market frame and its `market_data.csv` form.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, WriterBuilder};
use flexmo_core::{columns, FlexError, FlexResult, TimeGrid};
use polars::prelude::*;

/// Timestamp format of `market_data.csv`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time-aligned market series. Timestamps are local wall-clock times with the
/// zone stripped; every column has one value per timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketFrame {
    timestamps: Vec<NaiveDateTime>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl MarketFrame {
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Self {
        Self {
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    /// Insert or replace a column. Its length must match the index.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> FlexResult<()> {
        let name = name.into();
        if values.len() != self.timestamps.len() {
            return Err(FlexError::BadInput(format!(
                "column {name} has {} values for {} timestamps",
                values.len(),
                self.timestamps.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column values, or zeros when the column is absent.
    pub fn column_or_zero(&self, name: &str) -> Vec<f64> {
        self.column(name)
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; self.len()])
    }

    /// Canonical columns first, then any others by name.
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = columns::CANONICAL
            .iter()
            .copied()
            .filter(|c| self.columns.contains_key(*c))
            .collect();
        names.extend(
            self.columns
                .keys()
                .map(String::as_str)
                .filter(|c| !columns::CANONICAL.contains(c)),
        );
        names
    }

    /// Rows whose timestamp lies in `[start, end]`; open ends when `None`.
    pub fn window(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        let keep: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(_, ts)| start.map_or(true, |s| **ts >= s) && end.map_or(true, |e| **ts <= e))
            .map(|(i, _)| i)
            .collect();
        Self {
            timestamps: keep.iter().map(|&i| self.timestamps[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), keep.iter().map(|&i| v[i]).collect()))
                .collect(),
        }
    }

    /// Time grid over this frame's index.
    pub fn time_grid(&self, dt_hours: f64) -> FlexResult<TimeGrid> {
        TimeGrid::new(self.timestamps.clone(), dt_hours)
    }

    /// Write as `;`-separated CSV with `,` decimals.
    pub fn write_csv(&self, path: &Path) -> FlexResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = WriterBuilder::new().delimiter(b';').from_path(path)?;
        let names = self.column_names();
        let mut header = vec![columns::TIMESTAMP];
        header.extend(names.iter().copied());
        writer.write_record(&header)?;
        for (i, ts) in self.timestamps.iter().enumerate() {
            let mut record = vec![ts.format(TIMESTAMP_FORMAT).to_string()];
            record.extend(names.iter().map(|n| format_decimal_comma(self.columns[*n][i])));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read a frame written by [`MarketFrame::write_csv`]. Empty cells are 0.
    pub fn read_csv(path: &Path) -> FlexResult<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .from_path(path)
            .map_err(|e| FlexError::BadInput(format!("{}: {e}", path.display())))?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(FlexError::BadInput(format!(
                "{} has no header",
                path.display()
            )));
        }
        let mut timestamps = Vec::new();
        let mut values: Vec<Vec<f64>> = vec![Vec::new(); headers.len() - 1];
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let raw_ts = record.get(0).unwrap_or("").trim();
            let ts = NaiveDateTime::parse_from_str(raw_ts, TIMESTAMP_FORMAT).map_err(|e| {
                FlexError::BadInput(format!(
                    "{} row {}: timestamp '{raw_ts}': {e}",
                    path.display(),
                    line + 2
                ))
            })?;
            timestamps.push(ts);
            for (j, column) in values.iter_mut().enumerate() {
                let cell = record.get(j + 1).unwrap_or("").trim();
                let value = if cell.is_empty() {
                    0.0
                } else {
                    cell.replace(',', ".").parse::<f64>().map_err(|e| {
                        FlexError::BadInput(format!(
                            "{} row {} column {}: '{cell}': {e}",
                            path.display(),
                            line + 2,
                            headers[j + 1]
                        ))
                    })?
                };
                column.push(value);
            }
        }
        let mut frame = MarketFrame::new(timestamps);
        for (name, column) in headers.into_iter().skip(1).zip(values) {
            frame.insert(name, column)?;
        }
        Ok(frame)
    }

    /// Convert to a polars frame with a string timestamp column.
    pub fn to_dataframe(&self) -> anyhow::Result<DataFrame> {
        let mut series = vec![Series::new(
            columns::TIMESTAMP,
            self.timestamps
                .iter()
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
                .collect::<Vec<_>>(),
        )];
        for name in self.column_names() {
            series.push(Series::new(name, self.columns[name].as_slice()));
        }
        DataFrame::new(series).context("building market frame")
    }

    /// Write as Parquet through polars.
    #[cfg(feature = "parquet")]
    pub fn write_parquet(&self, path: &Path) -> anyhow::Result<()> {
        let mut df = self.to_dataframe()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory '{}'", parent.display()))?;
        }
        let mut file =
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        ParquetWriter::new(&mut file)
            .finish(&mut df)
            .context("writing Parquet file")?;
        Ok(())
    }

    #[cfg(not(feature = "parquet"))]
    pub fn write_parquet(&self, _path: &Path) -> anyhow::Result<()> {
        anyhow::bail!("parquet support is disabled; rebuild with the 'parquet' feature")
    }
}

/// `12.5` → `12,5`, matching the decimal-comma convention of the inputs.
pub fn format_decimal_comma(value: f64) -> String {
    format!("{value}").replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use tempfile::tempdir;

    fn frame() -> MarketFrame {
        let t0 = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ts = (0..4).map(|i| t0 + Duration::minutes(15 * i)).collect();
        let mut frame = MarketFrame::new(ts);
        frame
            .insert(columns::FCR_CAP_PRICE, vec![10.0, 10.5, 11.25, 0.0])
            .unwrap();
        frame
            .insert(columns::AFRR_POS_ACTIVATION, vec![0.0, 0.5, 1.0, 0.125])
            .unwrap();
        frame
    }

    #[test]
    fn csv_uses_semicolons_and_decimal_commas() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market_data.csv");
        frame().write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp;FCR_Leistungspreis;aFRR_Activation_Pos"
        );
        assert_eq!(lines.next().unwrap(), "2024-03-01 00:00:00;10;0");
        assert_eq!(lines.next().unwrap(), "2024-03-01 00:15:00;10,5;0,5");
    }

    #[test]
    fn csv_round_trip_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market_data.csv");
        let original = frame();
        original.write_csv(&path).unwrap();
        let back = MarketFrame::read_csv(&path).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn window_is_inclusive() {
        let f = frame();
        let cut = f.window(Some(f.timestamps()[1]), Some(f.timestamps()[2]));
        assert_eq!(cut.len(), 2);
        assert_eq!(cut.column(columns::FCR_CAP_PRICE).unwrap(), &[10.5, 11.25]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut f = frame();
        assert!(f.insert("x", vec![1.0]).is_err());
        assert_eq!(f.column_or_zero("missing"), vec![0.0; 4]);
    }

    #[test]
    fn dataframe_has_timestamp_first() {
        let df = frame().to_dataframe().unwrap();
        assert_eq!(df.width(), 3);
        assert_eq!(df.get_column_names()[0], "timestamp");
    }
}
