//! Reserve markets and the canonical market-data column names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FlexError;

/// Delivery horizon of FCR in hours.
pub const FCR_DURATION_HOURS: f64 = 0.25;
/// Delivery horizon of aFRR in hours.
pub const AFRR_DURATION_HOURS: f64 = 1.0;

/// Balancing markets a flexibility asset can bid into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Symmetric primary reserve, capacity remuneration only.
    Fcr,
    /// Upward secondary reserve.
    AfrrPos,
    /// Downward secondary reserve.
    AfrrNeg,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::Fcr, Market::AfrrPos, Market::AfrrNeg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Fcr => "FCR",
            Market::AfrrPos => "aFRR_pos",
            Market::AfrrNeg => "aFRR_neg",
        }
    }

    pub fn default_duration_hours(&self) -> f64 {
        match self {
            Market::Fcr => FCR_DURATION_HOURS,
            Market::AfrrPos | Market::AfrrNeg => AFRR_DURATION_HOURS,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Market::Fcr => None,
            Market::AfrrPos => Some(Direction::Pos),
            Market::AfrrNeg => Some(Direction::Neg),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = FlexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().replace('-', "_").as_str() {
            "fcr" => Ok(Market::Fcr),
            "afrr_pos" | "afrr+" => Ok(Market::AfrrPos),
            "afrr_neg" | "afrr-" => Ok(Market::AfrrNeg),
            other => Err(FlexError::BadInput(format!(
                "unknown market '{other}'; expected fcr, afrr_pos or afrr_neg"
            ))),
        }
    }
}

/// Direction of a secondary-reserve product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Upward: more generation or less consumption
    Pos,
    /// Downward: less generation or more consumption
    Neg,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Pos, Direction::Neg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pos => "pos",
            Direction::Neg => "neg",
        }
    }

    pub fn market(&self) -> Market {
        match self {
            Direction::Pos => Market::AfrrPos,
            Direction::Neg => Market::AfrrNeg,
        }
    }
}

impl FromStr for Direction {
    type Err = FlexError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pos" | "up" | "positive" => Ok(Direction::Pos),
            "neg" | "down" | "negative" => Ok(Direction::Neg),
            other => Err(FlexError::BadInput(format!(
                "unknown direction '{other}'; expected pos or neg"
            ))),
        }
    }
}

/// Canonical column names of the fused quarter-hourly market frame.
pub mod columns {
    use super::Direction;

    pub const TIMESTAMP: &str = "timestamp";

    pub const AFRR_POS_ENERGY_PRICE: &str = "aFRR_Pos_Arbeitspreis";
    pub const AFRR_NEG_ENERGY_PRICE: &str = "aFRR_Neg_Arbeitspreis";
    pub const FCR_CAP_PRICE: &str = "FCR_Leistungspreis";
    pub const AFRR_POS_CAP_PRICE: &str = "aFRR_Pos_Leistungspreis";
    pub const AFRR_NEG_CAP_PRICE: &str = "aFRR_Neg_Leistungspreis";
    pub const FCR_CAPACITY: &str = "FCR_Capacity";
    pub const AFRR_POS_CAPACITY: &str = "aFRR_Pos_Capacity";
    pub const AFRR_NEG_CAPACITY: &str = "aFRR_Neg_Capacity";
    pub const AFRR_POS_ACTIVATION_MW: &str = "aFRR_Activation_Pos_MW";
    pub const AFRR_NEG_ACTIVATION_MW: &str = "aFRR_Activation_Neg_MW";
    pub const AFRR_POS_ACTIVATION: &str = "aFRR_Activation_Pos";
    pub const AFRR_NEG_ACTIVATION: &str = "aFRR_Activation_Neg";
    pub const SPOT_PRICE: &str = "Spotmarkt_Preis";

    /// Output order of `market_data.csv` after the timestamp column.
    pub const CANONICAL: [&str; 13] = [
        AFRR_POS_ENERGY_PRICE,
        AFRR_NEG_ENERGY_PRICE,
        FCR_CAP_PRICE,
        AFRR_POS_CAP_PRICE,
        AFRR_NEG_CAP_PRICE,
        FCR_CAPACITY,
        AFRR_POS_CAPACITY,
        AFRR_NEG_CAPACITY,
        AFRR_POS_ACTIVATION_MW,
        AFRR_NEG_ACTIVATION_MW,
        AFRR_POS_ACTIVATION,
        AFRR_NEG_ACTIVATION,
        SPOT_PRICE,
    ];

    pub fn energy_price(direction: Direction) -> &'static str {
        match direction {
            Direction::Pos => AFRR_POS_ENERGY_PRICE,
            Direction::Neg => AFRR_NEG_ENERGY_PRICE,
        }
    }

    pub fn capacity(direction: Direction) -> &'static str {
        match direction {
            Direction::Pos => AFRR_POS_CAPACITY,
            Direction::Neg => AFRR_NEG_CAPACITY,
        }
    }

    pub fn activation_mw(direction: Direction) -> &'static str {
        match direction {
            Direction::Pos => AFRR_POS_ACTIVATION_MW,
            Direction::Neg => AFRR_NEG_ACTIVATION_MW,
        }
    }

    pub fn activation_ratio(direction: Direction) -> &'static str {
        match direction {
            Direction::Pos => AFRR_POS_ACTIVATION,
            Direction::Neg => AFRR_NEG_ACTIVATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_follow_product_rules() {
        assert_eq!(Market::Fcr.default_duration_hours(), 0.25);
        assert_eq!(Market::AfrrPos.default_duration_hours(), 1.0);
        assert_eq!(Market::AfrrNeg.default_duration_hours(), 1.0);
    }

    #[test]
    fn market_parsing_is_lenient() {
        assert_eq!("FCR".parse::<Market>().unwrap(), Market::Fcr);
        assert_eq!("afrr-pos".parse::<Market>().unwrap(), Market::AfrrPos);
        assert_eq!("aFRR_neg".parse::<Market>().unwrap(), Market::AfrrNeg);
        assert!("mFRR".parse::<Market>().is_err());
    }

    #[test]
    fn direction_maps_to_market_and_columns() {
        assert_eq!("UP".parse::<Direction>().unwrap(), Direction::Pos);
        assert_eq!(Direction::Neg.market(), Market::AfrrNeg);
        assert_eq!(
            columns::activation_ratio(Direction::Neg),
            "aFRR_Activation_Neg"
        );
        assert_eq!(Market::AfrrPos.direction(), Some(Direction::Pos));
    }
}
