//! Amount + unit pairs that are persisted as a single combined string.
//!
//! Existing records store dosage and package quantity as free text such as
//! `"500 mg"` or `"20 tablets"`. The model splits them into two logical
//! fields but always writes the combined form back, so records stay readable
//! by older clients.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A free-form amount with its unit (e.g. `500` + `mg`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Measure {
    /// Leading numeric part, kept as text ("2.5", "1,5", "")
    pub amount: String,
    /// Everything after the amount, trimmed ("mg", "tablets", "")
    pub unit: String,
}

impl Measure {
    /// Create a measure from its two parts.
    pub fn new(amount: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            amount: amount.into().trim().to_string(),
            unit: unit.into().trim().to_string(),
        }
    }

    /// Split a persisted combined string into amount and unit.
    ///
    /// The amount is the leading run of digits, `.` and `,`; the rest is the
    /// unit. A string that does not start with a number is all unit.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let split = raw
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == ','))
            .map(|(i, _)| i)
            .unwrap_or(raw.len());
        let (amount, unit) = raw.split_at(split);
        Self::new(amount, unit)
    }

    /// The combined string written to the store.
    pub fn to_persisted(&self) -> String {
        match (self.amount.is_empty(), self.unit.is_empty()) {
            (false, false) => format!("{} {}", self.amount, self.unit),
            (false, true) => self.amount.clone(),
            (true, false) => self.unit.clone(),
            (true, true) => String::new(),
        }
    }

    /// Whether both parts are empty.
    pub fn is_empty(&self) -> bool {
        self.amount.is_empty() && self.unit.is_empty()
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_persisted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_and_unit() {
        assert_eq!(Measure::parse("500 mg"), Measure::new("500", "mg"));
        assert_eq!(Measure::parse("2.5ml"), Measure::new("2.5", "ml"));
        assert_eq!(Measure::parse("  20   tablets "), Measure::new("20", "tablets"));
    }

    #[test]
    fn test_parse_without_number_is_all_unit() {
        assert_eq!(Measure::parse("as needed"), Measure::new("", "as needed"));
    }

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(Measure::parse("12"), Measure::new("12", ""));
    }

    #[test]
    fn test_empty() {
        let m = Measure::parse("   ");
        assert!(m.is_empty());
        assert_eq!(m.to_persisted(), "");
    }

    #[test]
    fn test_persisted_form_is_stable() {
        for raw in ["500 mg", "2.5 ml", "12", "drops", ""] {
            assert_eq!(Measure::parse(raw).to_persisted(), raw);
        }
    }
}
