use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-width of the band, as a fraction of price, inside which a value is
/// considered in line with the market.
pub const FAIR_VALUE_BAND: f64 = 0.05;

/// Where an intrinsic value sits relative to the market price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceRelation {
    Above,
    Approx,
    Below,
}

impl PriceRelation {
    pub fn classify(value: f64, price: f64) -> Self {
        if !value.is_finite() {
            return PriceRelation::Below;
        }
        let band = FAIR_VALUE_BAND * price.abs();
        if (value - price).abs() <= band {
            PriceRelation::Approx
        } else if value > price {
            PriceRelation::Above
        } else {
            PriceRelation::Below
        }
    }

    pub fn classify_decimal(value: Decimal, price: Decimal) -> Self {
        match (value.to_f64(), price.to_f64()) {
            (Some(v), Some(p)) => Self::classify(v, p),
            _ => PriceRelation::Below,
        }
    }

    /// Relation for a method whose simulation produced no usable values.
    pub fn from_optional(value: Option<f64>, price: f64) -> Self {
        value.map_or(PriceRelation::Below, |v| Self::classify(v, price))
    }
}

/// Investment signal derived from the FCFE and FCFF price relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Caution,
    Speculative,
    Avoid,
}

impl Signal {
    /// FCFE relation selects the row, FCFF relation the column.
    pub fn from_relations(fcfe: PriceRelation, fcff: PriceRelation) -> Self {
        use PriceRelation::*;
        match (fcfe, fcff) {
            (Above, Above) => Signal::StrongBuy,
            (Above, Approx) | (Approx, Above) => Signal::Buy,
            (Approx, Approx) => Signal::Hold,
            (Above, Below) | (Below, Above) => Signal::Caution,
            (Approx, Below) | (Below, Approx) => Signal::Speculative,
            (Below, Below) => Signal::Avoid,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Signal::StrongBuy => "Strong Buy",
            Signal::Buy => "Buy",
            Signal::Hold => "Hold",
            Signal::Caution => "Caution",
            Signal::Speculative => "Speculative",
            Signal::Avoid => "Avoid",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use super::PriceRelation::*;

    #[test]
    fn test_band_edges() {
        assert_eq!(PriceRelation::classify(105.0, 100.0), Approx);
        assert_eq!(PriceRelation::classify(95.0, 100.0), Approx);
        assert_eq!(PriceRelation::classify(105.01, 100.0), Above);
        assert_eq!(PriceRelation::classify(94.99, 100.0), Below);
    }

    #[test]
    fn test_non_finite_value_is_below() {
        assert_eq!(PriceRelation::classify(f64::NAN, 100.0), Below);
        assert_eq!(PriceRelation::from_optional(None, 100.0), Below);
    }

    #[test]
    fn test_decimal_classification() {
        assert_eq!(PriceRelation::classify_decimal(dec!(150), dec!(100)), Above);
    }

    #[test]
    fn test_signal_table() {
        let expected = [
            [Signal::StrongBuy, Signal::Buy, Signal::Caution],
            [Signal::Buy, Signal::Hold, Signal::Speculative],
            [Signal::Caution, Signal::Speculative, Signal::Avoid],
        ];
        let order = [Above, Approx, Below];
        for (i, fcfe) in order.iter().enumerate() {
            for (j, fcff) in order.iter().enumerate() {
                assert_eq!(Signal::from_relations(*fcfe, *fcff), expected[i][j]);
            }
        }
    }

    #[test]
    fn test_signal_labels() {
        assert_eq!(Signal::StrongBuy.to_string(), "Strong Buy");
        assert_eq!(Signal::Avoid.label(), "Avoid");
    }
}
