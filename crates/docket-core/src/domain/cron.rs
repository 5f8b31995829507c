//! Five-field cron specs restricted to `*` or a literal per field.
//!
//! Fields: minute hour day-of-month month day-of-week (0 = Sunday).
//! Matching a whole table of sites against "now" is done by listing the 32
//! `{*, literal}` combinations for the current minute and looking the sites'
//! normalized specs up in that set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),
    #[error("field '{field}': invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("field '{field}': {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CronField {
    Any,
    At(u32),
}

impl CronField {
    fn matches(self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::At(v) => v == value,
        }
    }
}

impl fmt::Display for CronField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CronField::Any => f.write_str("*"),
            CronField::At(v) => write!(f, "{v}"),
        }
    }
}

const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day_of_month", 1, 31),
    ("month", 1, 12),
    ("day_of_week", 0, 6),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CronSpec {
    fields: [CronField; 5],
}

impl CronSpec {
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.fields
            .iter()
            .zip(components(at))
            .all(|(field, value)| field.matches(value))
    }

    /// Every spec that matches `at`: the cross product of `{*, literal}`.
    pub fn candidates(at: DateTime<Utc>) -> Vec<CronSpec> {
        let values = components(at);
        (0u32..32)
            .map(|mask| {
                let mut fields = [CronField::Any; 5];
                for (i, field) in fields.iter_mut().enumerate() {
                    if mask & (1 << i) != 0 {
                        *field = CronField::At(values[i]);
                    }
                }
                CronSpec { fields }
            })
            .collect()
    }
}

fn components(at: DateTime<Utc>) -> [u32; 5] {
    [
        at.minute(),
        at.hour(),
        at.day(),
        at.month(),
        at.weekday().num_days_from_sunday(),
    ]
}

impl FromStr for CronSpec {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::FieldCount(parts.len()));
        }
        let mut fields = [CronField::Any; 5];
        for (i, part) in parts.iter().enumerate() {
            let (name, min, max) = FIELDS[i];
            if *part == "*" {
                continue;
            }
            let value: u32 = part.parse().map_err(|_| CronError::InvalidValue {
                field: name,
                value: (*part).to_string(),
            })?;
            if value < min || value > max {
                return Err(CronError::OutOfRange {
                    field: name,
                    value,
                    min,
                    max,
                });
            }
            fields[i] = CronField::At(value);
        }
        Ok(CronSpec { fields })
    }
}

impl fmt::Display for CronSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [m, h, dom, mon, dow] = self.fields;
        write!(f, "{m} {h} {dom} {mon} {dow}")
    }
}
