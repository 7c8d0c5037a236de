use std::fmt;

use serde::{Deserialize, Serialize};

/// What the weights of a profile represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
    /// Sample count.
    Count,
    /// Memory in bytes.
    Bytes,
    #[serde(other)]
    Unknown,
}

impl ValueUnit {
    /// Format a value in this unit for display.
    pub fn format_value(&self, value: f64) -> String {
        match self {
            Self::Nanoseconds => {
                if value >= 1_000_000_000.0 {
                    format!("{:.2}s", value / 1_000_000_000.0)
                } else if value >= 1_000_000.0 {
                    format!("{:.1}ms", value / 1_000_000.0)
                } else if value >= 1_000.0 {
                    format!("{:.0}µs", value / 1_000.0)
                } else {
                    format!("{value:.0}ns")
                }
            }
            Self::Microseconds => {
                if value >= 1_000_000.0 {
                    format!("{:.2}s", value / 1_000_000.0)
                } else if value >= 1_000.0 {
                    format!("{:.1}ms", value / 1_000.0)
                } else {
                    format!("{value:.0}µs")
                }
            }
            Self::Milliseconds => {
                if value >= 1_000.0 {
                    format!("{:.2}s", value / 1_000.0)
                } else {
                    format!("{value:.1}ms")
                }
            }
            Self::Seconds => format!("{value:.2}s"),
            Self::Count => format!("{} samples", value as u64),
            Self::Bytes => {
                if value >= 1_073_741_824.0 {
                    format!("{:.1} GiB", value / 1_073_741_824.0)
                } else if value >= 1_048_576.0 {
                    format!("{:.1} MiB", value / 1_048_576.0)
                } else if value >= 1_024.0 {
                    format!("{:.1} KiB", value / 1_024.0)
                } else {
                    format!("{} B", value as u64)
                }
            }
            Self::Unknown => format!("{value:.0}"),
        }
    }
}

impl fmt::Display for ValueUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nanoseconds => "nanoseconds",
            Self::Microseconds => "microseconds",
            Self::Milliseconds => "milliseconds",
            Self::Seconds => "seconds",
            Self::Count => "count",
            Self::Bytes => "bytes",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_known_and_unknown_units() {
        let unit: ValueUnit = serde_json::from_str(r#""nanoseconds""#).unwrap();
        assert_eq!(unit, ValueUnit::Nanoseconds);
        let unit: ValueUnit = serde_json::from_str(r#""furlongs""#).unwrap();
        assert_eq!(unit, ValueUnit::Unknown);
    }

    #[test]
    fn format_microseconds() {
        assert_eq!(ValueUnit::Microseconds.format_value(500.0), "500µs");
        assert_eq!(ValueUnit::Microseconds.format_value(1500.0), "1.5ms");
        assert_eq!(ValueUnit::Microseconds.format_value(2_500_000.0), "2.50s");
    }

    #[test]
    fn format_nanoseconds() {
        assert_eq!(ValueUnit::Nanoseconds.format_value(12.0), "12ns");
        assert_eq!(ValueUnit::Nanoseconds.format_value(3_000_000.0), "3.0ms");
    }

    #[test]
    fn format_count_and_bytes() {
        assert_eq!(ValueUnit::Count.format_value(42.0), "42 samples");
        assert_eq!(ValueUnit::Bytes.format_value(2048.0), "2.0 KiB");
    }
}
