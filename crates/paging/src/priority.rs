//! Incident priority levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Incident priority, ordered by urgency.
///
/// Variants are declared lowest urgency first so that the derived `Ord`
/// makes `P1` the greatest value: `Priority::P5 < Priority::P1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    #[default]
    P5,
    P4,
    P3,
    P2,
    P1,
}

impl Priority {
    /// Lowest urgency.
    pub const LOWEST: Self = Self::P5;
    /// Highest urgency; the target of every escalation.
    pub const HIGHEST: Self = Self::P1;

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::P5 => "P5",
            Self::P4 => "P4",
            Self::P3 => "P3",
            Self::P2 => "P2",
            Self::P1 => "P1",
        }
    }

    #[must_use]
    pub fn is_highest(self) -> bool {
        self == Self::HIGHEST
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            "P4" => Ok(Self::P4),
            "P5" => Ok(Self::P5),
            _ => Err(format!("Unknown priority: {s}. Supported: P1-P5")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_ordering() {
        assert!(Priority::P1 > Priority::P2);
        assert!(Priority::P2 > Priority::P5);
        assert_eq!(Priority::P3.max(Priority::HIGHEST), Priority::P1);
        assert_eq!(Priority::P1.max(Priority::P4), Priority::P1);
    }

    #[test]
    fn test_parse() {
        assert_eq!("p3".parse::<Priority>(), Ok(Priority::P3));
        assert_eq!(" P1 ".parse::<Priority>(), Ok(Priority::P1));
        assert!("P0".parse::<Priority>().is_err());
        assert!("".parse::<Priority>().is_err());
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(Priority::P5.to_string(), "P5");
        assert_eq!(serde_json::to_string(&Priority::P2).unwrap(), "\"P2\"");
    }
}
