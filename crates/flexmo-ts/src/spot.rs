//! Day-ahead spot prices.
//!
//! Fusion asks a [`DayAheadProvider`] for the frame's time range and
//! forward-fills the returned price intervals onto the quarter-hour grid. A
//! failing provider never fails fusion; the spot column stays at zero.

use std::time::Duration as StdDuration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use quick_xml::{events::Event, Reader};

/// Bidding zone DE-LU.
pub const DE_LU_BIDDING_ZONE: &str = "10Y1001A1001A82H";

const ENTSOE_ENDPOINT: &str = "https://web-api.tp.entsoe.eu/api";

/// A price valid on `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// €/MWh
    pub price: f64,
}

pub trait DayAheadProvider {
    fn name(&self) -> &str;

    /// Prices covering `[start, end)`.
    fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PriceInterval>>;
}

/// Provider used when no API access is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpotProvider;

impl DayAheadProvider for NoSpotProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn fetch(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<PriceInterval>> {
        bail!("no day-ahead price source configured")
    }
}

/// Fixed prices, e.g. loaded from an earlier download.
#[derive(Debug, Default, Clone)]
pub struct StaticSpotProvider {
    pub intervals: Vec<PriceInterval>,
}

impl DayAheadProvider for StaticSpotProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PriceInterval>> {
        Ok(self
            .intervals
            .iter()
            .filter(|iv| iv.end > start && iv.start < end)
            .copied()
            .collect())
    }
}

/// ENTSO-E transparency platform, day-ahead prices (document type A44).
#[derive(Debug, Clone)]
pub struct EntsoeProvider {
    token: String,
    bidding_zone: String,
    endpoint: String,
    timeout: StdDuration,
}

impl EntsoeProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            bidding_zone: DE_LU_BIDDING_ZONE.to_string(),
            endpoint: ENTSOE_ENDPOINT.to_string(),
            timeout: StdDuration::from_secs(30),
        }
    }

    pub fn with_bidding_zone(mut self, zone: impl Into<String>) -> Self {
        self.bidding_zone = zone.into();
        self
    }
}

impl DayAheadProvider for EntsoeProvider {
    fn name(&self) -> &str {
        "entsoe"
    }

    fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PriceInterval>> {
        let fmt = "%Y%m%d%H%M";
        let response = ureq::get(&self.endpoint)
            .timeout(self.timeout)
            .query("securityToken", &self.token)
            .query("documentType", "A44")
            .query("in_Domain", &self.bidding_zone)
            .query("out_Domain", &self.bidding_zone)
            .query("periodStart", &start.format(fmt).to_string())
            .query("periodEnd", &end.format(fmt).to_string())
            .call()
            .context("calling ENTSO-E day-ahead API")?;
        let body = response
            .into_string()
            .context("reading ENTSO-E response body")?;
        parse_entsoe_document(&body)
    }
}

#[derive(Default)]
struct PeriodBuilder {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    resolution: Option<Duration>,
    points: Vec<(i64, f64)>,
    position: Option<i64>,
    price: Option<f64>,
}

impl PeriodBuilder {
    fn finish(self, out: &mut Vec<PriceInterval>) -> Result<()> {
        let start = self.start.ok_or_else(|| anyhow!("period without start"))?;
        let end = self.end.ok_or_else(|| anyhow!("period without end"))?;
        let resolution = self
            .resolution
            .ok_or_else(|| anyhow!("period without resolution"))?;
        let mut points = self.points;
        points.sort_by_key(|(pos, _)| *pos);
        // Repeated prices may be omitted (curve type A03): each point holds
        // until the next listed position.
        for (i, (pos, price)) in points.iter().enumerate() {
            let from = start + resolution * (*pos as i32 - 1);
            let until = match points.get(i + 1) {
                Some((next, _)) => start + resolution * (*next as i32 - 1),
                None => end,
            };
            if from < until {
                out.push(PriceInterval {
                    start: from,
                    end: until,
                    price: *price,
                });
            }
        }
        Ok(())
    }
}

/// Parse a `Publication_MarketDocument` into price intervals.
pub fn parse_entsoe_document(xml: &str) -> Result<Vec<PriceInterval>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut out = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut period: Option<PeriodBuilder> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match tag.as_str() {
                    "Period" => period = Some(PeriodBuilder::default()),
                    "Point" => {
                        if let Some(p) = period.as_mut() {
                            p.position = None;
                            p.price = None;
                        }
                    }
                    _ => {}
                }
                path.push(tag);
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape()?.trim().to_string();
                let (Some(p), Some(tag)) = (period.as_mut(), path.last()) else {
                    if path.iter().any(|t| t == "Reason") && path.last().is_some_and(|t| t == "text") {
                        bail!("ENTSO-E returned no data: {text}");
                    }
                    continue;
                };
                let parent = path.len().checked_sub(2).map(|i| path[i].as_str());
                match (parent, tag.as_str()) {
                    (Some("timeInterval"), "start") => p.start = Some(parse_entsoe_time(&text)?),
                    (Some("timeInterval"), "end") => p.end = Some(parse_entsoe_time(&text)?),
                    (_, "resolution") => p.resolution = Some(parse_resolution(&text)?),
                    (Some("Point"), "position") => p.position = Some(text.parse()?),
                    (Some("Point"), "price.amount") => p.price = Some(text.parse()?),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match tag.as_str() {
                    "Point" => {
                        if let Some(p) = period.as_mut() {
                            if let (Some(pos), Some(price)) = (p.position, p.price) {
                                p.points.push((pos, price));
                            }
                        }
                    }
                    "Period" => {
                        if let Some(p) = period.take() {
                            p.finish(&mut out)?;
                        }
                    }
                    _ => {}
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed ENTSO-E document: {e}")),
            _ => {}
        }
    }

    if out.is_empty() {
        bail!("ENTSO-E document contains no price points");
    }
    out.sort_by_key(|iv| iv.start);
    Ok(out)
}

fn parse_entsoe_time(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim_end_matches('Z');
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .with_context(|| format!("invalid ENTSO-E timestamp '{raw}'"))?;
    Ok(naive.and_utc())
}

fn parse_resolution(raw: &str) -> Result<Duration> {
    match raw {
        "PT15M" => Ok(Duration::minutes(15)),
        "PT30M" => Ok(Duration::minutes(30)),
        "PT60M" | "PT1H" => Ok(Duration::hours(1)),
        other => Err(anyhow!("unsupported resolution '{other}'")),
    }
}

/// Forward-fill price intervals onto `instants`; uncovered instants get 0.
pub fn fill_onto(instants: &[DateTime<Utc>], intervals: &[PriceInterval]) -> Vec<f64> {
    let mut sorted = intervals.to_vec();
    sorted.sort_by_key(|iv| iv.start);
    instants
        .iter()
        .map(|ts| {
            let idx = sorted.partition_point(|iv| iv.start <= *ts);
            idx.checked_sub(1)
                .map(|i| sorted[i])
                .filter(|iv| *ts < iv.end)
                .map(|iv| iv.price)
                .unwrap_or(0.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Publication_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-3:publicationdocument:7:3">
  <TimeSeries>
    <Period>
      <timeInterval>
        <start>2024-03-01T23:00Z</start>
        <end>2024-03-02T03:00Z</end>
      </timeInterval>
      <resolution>PT60M</resolution>
      <Point><position>1</position><price.amount>80.5</price.amount></Point>
      <Point><position>2</position><price.amount>75</price.amount></Point>
      <Point><position>4</position><price.amount>-5.25</price.amount></Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>"#;

    fn utc(h: u32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, 0).unwrap()
    }

    #[test]
    fn parses_compressed_curve() {
        let intervals = parse_entsoe_document(DOC).unwrap();
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].start, utc(23, 0, 1));
        // position 3 was omitted: price 75 holds for two hours
        assert_eq!(intervals[1].end, utc(2, 0, 2));
        assert_eq!(intervals[2].end, utc(3, 0, 2));
        assert_eq!(intervals[2].price, -5.25);
    }

    #[test]
    fn acknowledgement_document_is_an_error() {
        let ack = r#"<Acknowledgement_MarketDocument><Reason><code>999</code><text>No matching data found</text></Reason></Acknowledgement_MarketDocument>"#;
        assert!(parse_entsoe_document(ack).is_err());
    }

    #[test]
    fn forward_fill_to_quarter_hours() {
        let intervals = parse_entsoe_document(DOC).unwrap();
        let instants: Vec<_> = (0..6)
            .map(|i| utc(23, 0, 1) + Duration::minutes(15 * i))
            .collect();
        let filled = fill_onto(&instants, &intervals);
        assert_eq!(filled, vec![80.5, 80.5, 80.5, 80.5, 75.0, 75.0]);

        let outside = fill_onto(&[utc(3, 0, 2)], &intervals);
        assert_eq!(outside, vec![0.0]);
    }

    #[test]
    fn static_provider_filters_range() {
        let provider = StaticSpotProvider {
            intervals: parse_entsoe_document(DOC).unwrap(),
        };
        let got = provider.fetch(utc(2, 0, 2), utc(4, 0, 2)).unwrap();
        assert_eq!(got.len(), 1);
        assert!(NoSpotProvider.fetch(utc(0, 0, 1), utc(1, 0, 1)).is_err());
    }
}
