use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use flexmo_core::{columns, FlexError};
use flexmo_ts::{
    fuse_directory, FileStatus, FusionConfig, MarketFrame, NoSpotProvider, PriceInterval,
    StaticSpotProvider,
};
use tempfile::tempdir;

fn local(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn capacity_export(dir: &Path) {
    write(
        dir,
        "GUI_BALANCING_RESERVES.csv",
        "ISP (CET/CEST),Reserve Type,Direction,Price (EUR/MW),Volume (MW)\n\
         01/03/2024 00:00 - 01/03/2024 00:15,FCR,Symmetric,12.5,600\n\
         01/03/2024 00:00 - 01/03/2024 00:15,aFRR,Up,8,2000\n\
         01/03/2024 00:00 - 01/03/2024 00:15,aFRR,Down,4,1800\n\
         01/03/2024 00:00 - 01/03/2024 00:15,mFRR,Up,99,99\n\
         01/03/2024 00:15 - 01/03/2024 00:30,aFRR,Up,10,2000\n",
    );
}

fn activation_export(dir: &Path) {
    write(
        dir,
        "Aktivierte_aFRR_Maerz.csv",
        "Datum;von;bis;TenneT TSO Positiv (MW);TenneT TSO Negativ (MW);50Hertz Positiv (MW)\n\
         01.03.2024;00:00;00:15;500,0;900,0;100\n",
    );
}

#[test]
fn overlapping_reserve_energy_files_are_averaged() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "picasso_a.csv",
        "ZEIT;TNG_POS\n2024-03-01T00:00:00+01:00;40\n2024-03-01T00:15:00+01:00;60\n",
    );
    write(
        dir.path(),
        "PICASSO_b.csv",
        "ZEIT;50HZT_POS;AMP_NEG\n2024-03-01T00:00:00+01:00;20;-3\n2024-03-01T00:15:00+01:00;80;-5\n",
    );

    let out = fuse_directory(dir.path(), &FusionConfig::default(), &NoSpotProvider).unwrap();
    let frame = &out.frame;
    assert_eq!(frame.timestamps(), &[local(0, 0), local(0, 15)]);
    assert_eq!(
        frame.column(columns::AFRR_POS_ENERGY_PRICE).unwrap(),
        &[30.0, 70.0]
    );
    assert_eq!(
        frame.column(columns::AFRR_NEG_ENERGY_PRICE).unwrap(),
        &[-3.0, -5.0]
    );
    for name in columns::CANONICAL {
        assert!(frame.column(name).is_some(), "missing column {name}");
    }
}

#[test]
fn capacity_and_activation_give_ratios() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());
    activation_export(dir.path());

    let out = fuse_directory(dir.path(), &FusionConfig::default(), &NoSpotProvider).unwrap();
    let frame = &out.frame;
    assert_eq!(frame.len(), 2);
    assert_eq!(frame.column(columns::FCR_CAP_PRICE).unwrap(), &[12.5, 0.0]);
    assert_eq!(frame.column(columns::FCR_CAPACITY).unwrap(), &[600.0, 0.0]);
    assert_eq!(
        frame.column(columns::AFRR_POS_CAP_PRICE).unwrap(),
        &[8.0, 10.0]
    );
    assert_eq!(frame.column(columns::AFRR_NEG_CAPACITY).unwrap(), &[1800.0, 0.0]);
    assert_eq!(
        frame.column(columns::AFRR_POS_ACTIVATION_MW).unwrap(),
        &[500.0, 0.0]
    );
    assert_eq!(frame.column(columns::AFRR_POS_ACTIVATION).unwrap(), &[0.25, 0.0]);
    assert_eq!(frame.column(columns::AFRR_NEG_ACTIVATION).unwrap(), &[0.5, 0.0]);
}

#[test]
fn capacity_offset_shifts_timestamps() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());
    let mut config = FusionConfig::default();
    config.context.capacity_offset_hours = 1;

    let out = fuse_directory(dir.path(), &config, &NoSpotProvider).unwrap();
    assert_eq!(out.frame.timestamps()[0], local(1, 0));
}

#[test]
fn spot_prices_are_forward_filled() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());
    let provider = StaticSpotProvider {
        intervals: vec![PriceInterval {
            start: Utc.with_ymd_and_hms(2024, 2, 29, 23, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            price: 55.0,
        }],
    };

    let out = fuse_directory(dir.path(), &FusionConfig::default(), &provider).unwrap();
    assert!(out.spot_filled);
    assert_eq!(out.frame.column(columns::SPOT_PRICE).unwrap(), &[55.0, 55.0]);
}

#[test]
fn missing_spot_source_is_a_warning() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());

    let out = fuse_directory(dir.path(), &FusionConfig::default(), &NoSpotProvider).unwrap();
    assert!(!out.spot_filled);
    assert_eq!(out.frame.column(columns::SPOT_PRICE).unwrap(), &[0.0, 0.0]);
    assert!(out.diagnostics.warning_count() >= 1);
}

#[test]
fn no_recognized_files_is_no_input() {
    let dir = tempdir().unwrap();
    write(dir.path(), "notes.csv", "a;b\n1;2\n");
    write(dir.path(), "market_data.csv", "timestamp;x\n");

    let err = fuse_directory(dir.path(), &FusionConfig::default(), &NoSpotProvider).unwrap_err();
    assert!(matches!(err, FlexError::NoInput(_)));

    let empty = tempdir().unwrap();
    let err =
        fuse_directory(empty.path(), &FusionConfig::default(), &NoSpotProvider).unwrap_err();
    assert!(matches!(err, FlexError::NoInput(_)));
}

#[test]
fn broken_and_unknown_files_do_not_stop_the_run() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());
    write(dir.path(), "picasso_broken.csv", "foo;bar\n1;2\n");
    write(dir.path(), "readme.csv", "x\n");

    let out = fuse_directory(dir.path(), &FusionConfig::default(), &NoSpotProvider).unwrap();
    let status = |name: &str| {
        out.files
            .iter()
            .find(|f| f.path.file_name().unwrap() == name)
            .map(|f| f.status)
    };
    assert_eq!(status("picasso_broken.csv"), Some(FileStatus::Failed));
    assert_eq!(status("readme.csv"), Some(FileStatus::Unrecognized));
    assert_eq!(status("GUI_BALANCING_RESERVES.csv"), Some(FileStatus::Parsed));
    assert_eq!(out.frame.len(), 2);

    let summary = out.summary();
    assert_eq!(summary.parsed_files, 1);
    assert_eq!(summary.failed_files, 1);
    assert_eq!(summary.skipped_files, 1);
}

#[test]
fn window_cuts_inclusive_local_range() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());
    let config = FusionConfig {
        start: Some(local(0, 15)),
        ..FusionConfig::default()
    };

    let out = fuse_directory(dir.path(), &config, &NoSpotProvider).unwrap();
    assert_eq!(out.frame.timestamps(), &[local(0, 15)]);
}

#[test]
fn market_data_csv_round_trip() {
    let dir = tempdir().unwrap();
    capacity_export(dir.path());
    activation_export(dir.path());
    let out = fuse_directory(dir.path(), &FusionConfig::default(), &NoSpotProvider).unwrap();

    let path = dir.path().join("out").join("market_data.csv");
    out.frame.write_csv(&path).unwrap();
    let back = MarketFrame::read_csv(&path).unwrap();
    assert_eq!(back, out.frame);
    assert_eq!(
        back.column(columns::AFRR_POS_ACTIVATION).unwrap(),
        out.frame.column(columns::AFRR_POS_ACTIVATION).unwrap()
    );
}
