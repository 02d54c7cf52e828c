//! Location updates and their comma-joined wire format
//!
//! A payload on every location channel is `"<source_id>,<x>,<y>"`: UTF-8,
//! no trailing delimiter, no escaping.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of fractional digits kept when a coordinate is encoded.
pub const COORDINATE_PRECISION: usize = 6;

/// Largest difference between an encoded and decoded coordinate.
///
/// Rounding to [`COORDINATE_PRECISION`] digits moves the decimal text at most
/// 5e-7 from the original value. Parsing returns the closest `f64` to that
/// text, and the original value is itself a candidate, so the decoded value
/// lands at most another 5e-7 away.
pub const COORDINATE_TOLERANCE: f64 = 1e-6;

/// Reasons a payload is not a valid location update
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty payload")]
    Empty,

    #[error("expected 3 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("invalid source id: {0:?}")]
    InvalidSourceId(String),

    #[error("invalid {axis} coordinate: {value:?}")]
    InvalidCoordinate { axis: &'static str, value: String },
}

/// Latest position reported by one source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationUpdate {
    pub source_id: i64,
    pub x: f64,
    pub y: f64,
}

impl LocationUpdate {
    #[must_use]
    pub const fn new(source_id: i64, x: f64, y: f64) -> Self {
        Self { source_id, x, y }
    }

    /// Starting position of a freshly launched source: `(10 + id, 20 + id)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn initial(source_id: i64) -> Self {
        Self::new(source_id, 10.0 + source_id as f64, 20.0 + source_id as f64)
    }

    /// Same source moved by `step` along both axes
    #[must_use]
    pub fn advanced(self, step: f64) -> Self {
        Self::new(self.source_id, self.x + step, self.y + step)
    }

    /// Slot index for a table of `population` sources, if the id fits.
    #[must_use]
    pub fn slot(&self, population: usize) -> Option<usize> {
        usize::try_from(self.source_id)
            .ok()
            .filter(|idx| *idx < population)
    }

    /// Encode into the wire format
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a wire payload
    pub fn parse(payload: &str) -> Result<Self, ParseError> {
        if payload.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let fields: Vec<&str> = payload.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(ParseError::FieldCount(fields.len()));
        }

        let source_id = fields[0]
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidSourceId(fields[0].to_string()))?;
        let x = parse_coordinate("x", fields[1])?;
        let y = parse_coordinate("y", fields[2])?;

        Ok(Self { source_id, x, y })
    }
}

impl fmt::Display for LocationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.source_id,
            format_coordinate(self.x),
            format_coordinate(self.y)
        )
    }
}

impl FromStr for LocationUpdate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_coordinate(axis: &'static str, raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidCoordinate {
            axis,
            value: raw.to_string(),
        })
}

/// Fixed precision with trailing zeros dropped: `10.5`, `1`, `-0.25`.
fn format_coordinate(value: f64) -> String {
    let mut out = format!("{:.*}", COORDINATE_PRECISION, value);
    if out.contains('.') {
        let trimmed = out.trim_end_matches('0').trim_end_matches('.').len();
        out.truncate(trimmed);
    }
    if out == "-0" {
        out = "0".to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid_payload() {
        let update = LocationUpdate::parse("2,10.5,20.5").unwrap();
        assert_eq!(update, LocationUpdate::new(2, 10.5, 20.5));
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let update = LocationUpdate::parse(" 3 , 1.25 ,-4\n").unwrap();
        assert_eq!(update, LocationUpdate::new(3, 1.25, -4.0));
    }

    #[test]
    fn test_parse_malformed_payloads() {
        assert_eq!(LocationUpdate::parse(""), Err(ParseError::Empty));
        assert_eq!(LocationUpdate::parse("   "), Err(ParseError::Empty));
        assert_eq!(LocationUpdate::parse("2"), Err(ParseError::FieldCount(1)));
        assert_eq!(LocationUpdate::parse("2,1.0"), Err(ParseError::FieldCount(2)));
        assert_eq!(
            LocationUpdate::parse("2,1.0,2.0,3.0"),
            Err(ParseError::FieldCount(4))
        );
        assert!(matches!(
            LocationUpdate::parse("abc,1.0,2.0"),
            Err(ParseError::InvalidSourceId(_))
        ));
        assert!(matches!(
            LocationUpdate::parse("1.5,1.0,2.0"),
            Err(ParseError::InvalidSourceId(_))
        ));
        assert!(matches!(
            LocationUpdate::parse("1,north,2.0"),
            Err(ParseError::InvalidCoordinate { axis: "x", .. })
        ));
        assert!(matches!(
            LocationUpdate::parse("1,1.0,"),
            Err(ParseError::InvalidCoordinate { axis: "y", .. })
        ));
        assert!(matches!(
            LocationUpdate::parse("1,NaN,2.0"),
            Err(ParseError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            LocationUpdate::parse("1,1.0,inf"),
            Err(ParseError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_negative_id_parses() {
        // Range checks belong to the consumer, not the codec.
        let update = LocationUpdate::parse("-1,0,0").unwrap();
        assert_eq!(update.source_id, -1);
        assert_eq!(update.slot(5), None);
    }

    #[test]
    fn test_encode_trims_trailing_zeros() {
        assert_eq!(LocationUpdate::new(2, 10.5, 20.5).encode(), "2,10.5,20.5");
        assert_eq!(LocationUpdate::new(7, 1.0, 1.0).encode(), "7,1,1");
        assert_eq!(LocationUpdate::new(0, -0.25, 0.0).encode(), "0,-0.25,0");
        assert_eq!(LocationUpdate::new(1, -0.0000001, 3.0).encode(), "1,0,3");
    }

    #[test]
    fn test_encode_hides_float_drift() {
        let mut update = LocationUpdate::initial(0);
        for _ in 0..3 {
            update = update.advanced(0.1);
        }
        assert_eq!(update.encode(), "0,10.3,20.3");
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let samples = [
            (0, 10.0, 20.0),
            (4, 13.123_456_789, -0.000_000_4),
            (3, 1e6 + 0.123_456_4, -1e6 - 0.987_654_1),
            (i64::MAX, 0.1, 0.2),
            (i64::MIN, -179.999_999_9, 89.999_999_95),
            // Just above a rounding midpoint: the parse adds to the rounding error
            (0, 1.002_732_5, 0.0),
        ];

        for (id, x, y) in samples {
            let original = LocationUpdate::new(id, x, y);
            let decoded = LocationUpdate::parse(&original.encode()).unwrap();
            assert_eq!(decoded.source_id, id);
            assert!((decoded.x - x).abs() <= COORDINATE_TOLERANCE, "x {x} -> {}", decoded.x);
            assert!((decoded.y - y).abs() <= COORDINATE_TOLERANCE, "y {y} -> {}", decoded.y);
        }
    }

    #[test]
    fn test_slot() {
        assert_eq!(LocationUpdate::new(0, 0.0, 0.0).slot(5), Some(0));
        assert_eq!(LocationUpdate::new(4, 0.0, 0.0).slot(5), Some(4));
        assert_eq!(LocationUpdate::new(5, 0.0, 0.0).slot(5), None);
        assert_eq!(LocationUpdate::new(7, 0.0, 0.0).slot(5), None);
    }

    #[test]
    fn test_initial_position() {
        assert_eq!(LocationUpdate::initial(2), LocationUpdate::new(2, 12.0, 22.0));
    }

    fn finite_coordinate() -> impl Strategy<Value = f64> {
        any::<f64>().prop_filter("finite", |v| v.is_finite())
    }

    proptest! {
        /// Any id and any finite coordinates survive encode then parse.
        #[test]
        fn prop_round_trip_within_tolerance(
            id in any::<i64>(),
            x in finite_coordinate(),
            y in finite_coordinate(),
        ) {
            let decoded = LocationUpdate::parse(&LocationUpdate::new(id, x, y).encode());
            prop_assert!(decoded.is_ok(), "{:?}", decoded);
            let decoded = decoded.unwrap();
            prop_assert_eq!(decoded.source_id, id);
            prop_assert!((decoded.x - x).abs() <= COORDINATE_TOLERANCE, "x {} -> {}", x, decoded.x);
            prop_assert!((decoded.y - y).abs() <= COORDINATE_TOLERANCE, "y {} -> {}", y, decoded.y);
        }

        /// Parsing arbitrary text never panics, and anything it accepts
        /// encodes back to a payload that parses to the same update.
        #[test]
        fn prop_parse_arbitrary_text(payload in any::<String>()) {
            if let Ok(update) = LocationUpdate::parse(&payload) {
                prop_assert_eq!(payload.matches(',').count(), 2);
                prop_assert!(update.x.is_finite() && update.y.is_finite());
                let again = LocationUpdate::parse(&update.encode());
                prop_assert!(again.is_ok());
            }
        }

        /// Payloads without exactly three fields are always rejected.
        #[test]
        fn prop_wrong_field_count_rejected(
            payload in prop_oneof!["[^,]*", "[^,]*,[^,]*", "[^,]*(,[^,]*){3,6}"],
        ) {
            prop_assert!(LocationUpdate::parse(&payload).is_err());
        }
    }
}
