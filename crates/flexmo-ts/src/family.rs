//! Market CSV families.
//!
//! Each family is one row of [`FAMILIES`]: how to recognize a file by name,
//! how to read it (separator, decimal mark), where its timestamp lives and
//! which columns carry values. Parsers in [`crate::parse`] interpret the
//! table; no column lookups live anywhere else.

use flexmo_core::columns;

/// Recognized kinds of market export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileFamily {
    /// Reserve energy prices (PICASSO platform export)
    ReserveEnergy,
    /// Reserve capacity prices and volumes (transparency platform GUI export)
    Capacity,
    /// Market-wide activated aFRR per TSO zone
    Activation,
}

impl FileFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFamily::ReserveEnergy => "reserve-energy",
            FileFamily::Capacity => "capacity",
            FileFamily::Activation => "activation",
        }
    }

    pub fn spec(&self) -> &'static FamilySpec {
        match self {
            FileFamily::ReserveEnergy => &FAMILIES[0],
            FileFamily::Capacity => &FAMILIES[1],
            FileFamily::Activation => &FAMILIES[2],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalMark {
    Point,
    /// German convention: `1.234,5`
    Comma,
}

/// Where the timestamp of a row comes from.
#[derive(Debug, Clone, Copy)]
pub enum TimeLocator {
    /// First column whose upper-cased name contains any of the tags. Values
    /// with a UTC offset are absolute, naive values are local.
    Column { any_of: &'static [&'static str] },
    /// Column containing the tag, formatted `"start - end"`; the start is
    /// parsed day-first and localized.
    IntervalStart { contains: &'static str },
    /// Date and time columns joined with a space and parsed with `format`.
    DateAndTime {
        date: &'static str,
        time: &'static str,
        format: &'static str,
    },
}

/// How value columns are selected.
#[derive(Debug, Clone, Copy)]
pub enum ValueLocator {
    /// First column named `<TSO><suffix>` in TSO priority order.
    Priority {
        target: &'static str,
        suffix: &'static str,
        tsos: &'static [&'static str],
    },
    /// Long-format rows classified by reserve type and direction, then
    /// pivoted into per-product price and volume columns.
    Pivot {
        price_all_of: &'static [&'static str],
        volume_all_of: &'static [&'static str],
        type_column: &'static str,
        direction_column: &'static str,
    },
    /// Column whose name contains both the configured grid area and `tag`.
    GridArea {
        target: &'static str,
        tag: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct FamilySpec {
    pub family: FileFamily,
    /// Case-insensitive file-name substrings
    pub name_patterns: &'static [&'static str],
    pub separator: u8,
    pub decimal: DecimalMark,
    /// Cell values treated as missing
    pub na_values: &'static [&'static str],
    pub time: TimeLocator,
    pub values: &'static [ValueLocator],
}

/// TSO priority for reserve energy price columns.
pub const TSO_PRIORITY: [&str; 4] = ["TNG", "50HZT", "AMP", "TTG"];

pub const FAMILIES: [FamilySpec; 3] = [
    FamilySpec {
        family: FileFamily::ReserveEnergy,
        name_patterns: &["picasso"],
        separator: b';',
        decimal: DecimalMark::Point,
        na_values: &["", "N/A", "NaN", "-"],
        time: TimeLocator::Column {
            any_of: &["ZEIT", "ISO"],
        },
        values: &[
            ValueLocator::Priority {
                target: columns::AFRR_POS_ENERGY_PRICE,
                suffix: "_POS",
                tsos: &TSO_PRIORITY,
            },
            ValueLocator::Priority {
                target: columns::AFRR_NEG_ENERGY_PRICE,
                suffix: "_NEG",
                tsos: &TSO_PRIORITY,
            },
        ],
    },
    FamilySpec {
        family: FileFamily::Capacity,
        name_patterns: &["gui"],
        separator: b',',
        decimal: DecimalMark::Point,
        na_values: &["", "N/A", "NaN"],
        time: TimeLocator::IntervalStart { contains: "ISP" },
        values: &[ValueLocator::Pivot {
            price_all_of: &["Price", "EUR"],
            volume_all_of: &["Volume", "MW"],
            type_column: "Reserve Type",
            direction_column: "Direction",
        }],
    },
    FamilySpec {
        family: FileFamily::Activation,
        name_patterns: &["aktivierte", "betrieblich"],
        separator: b';',
        decimal: DecimalMark::Comma,
        na_values: &["", "N/A", "NaN"],
        time: TimeLocator::DateAndTime {
            date: "Datum",
            time: "von",
            format: "%d.%m.%Y %H:%M",
        },
        values: &[
            ValueLocator::GridArea {
                target: columns::AFRR_POS_ACTIVATION_MW,
                tag: "Positiv",
            },
            ValueLocator::GridArea {
                target: columns::AFRR_NEG_ACTIVATION_MW,
                tag: "Negativ",
            },
        ],
    },
];

/// File names of earlier fusion outputs, never read back as inputs.
const OUTPUT_MARKERS: [&str; 2] = ["market_data", "marktdaten"];

/// Family of a file, by name. Earlier outputs are never classified.
pub fn classify(file_name: &str) -> Option<FileFamily> {
    let lower = file_name.to_lowercase();
    if OUTPUT_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }
    FAMILIES
        .iter()
        .find(|spec| spec.name_patterns.iter().any(|p| lower.contains(p)))
        .map(|spec| spec.family)
}

pub fn is_previous_output(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    OUTPUT_MARKERS.iter().any(|m| lower.contains(m))
}
