//! Data types for FlatDB
//!
//! This module defines the column datatypes supported by the language and
//! the literal validation rules attached to each of them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Column datatypes.
///
/// The variant set is closed: every attribute in the catalog carries exactly
/// one of these, and the executor never sees a datatype outside this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer, written `int`
    Integer,
    /// `true` / `false`, written `boolean`
    Boolean,
    /// Calendar date `YYYY-MM-DD`
    Date,
    /// Date plus time of day `YYYY-MM-DD HH:MM:SS`
    Datetime,
    /// Fixed-length character string
    Char(usize),
    /// Variable-length character string with max length
    Varchar(usize),
    /// Numeric identifier of up to 16 digits
    Uuid,
}

/// Default capacity for a `varchar` declared without an explicit size.
pub const DEFAULT_VARCHAR_LENGTH: usize = 500;

impl DataType {
    /// Maximum rendered length of a value of this type. Always positive.
    pub fn max_length(&self) -> usize {
        match self {
            DataType::Integer => 10,
            DataType::Boolean => 5,
            DataType::Date => 10,
            DataType::Datetime => 19,
            DataType::Char(n) => *n,
            DataType::Varchar(n) => *n,
            DataType::Uuid => 16,
        }
    }

    /// The keyword this type is declared with (`char`/`varchar` without size).
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Integer => "int",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Char(_) => "char",
            DataType::Varchar(_) => "varchar",
            DataType::Uuid => "uuid",
        }
    }

    /// Parse the serialized form used by the attribute registry and the
    /// instruction stream: `int`, `boolean`, `date`, `datetime`, `uuid`,
    /// `char(n)`, `varchar(n)`.
    pub fn parse(text: &str) -> Result<Self> {
        match text {
            "int" => return Ok(DataType::Integer),
            "boolean" => return Ok(DataType::Boolean),
            "date" => return Ok(DataType::Date),
            "datetime" => return Ok(DataType::Datetime),
            "uuid" => return Ok(DataType::Uuid),
            "varchar" => return Ok(DataType::Varchar(DEFAULT_VARCHAR_LENGTH)),
            _ => {}
        }

        if let Some(size) = parse_sized(text, "varchar") {
            return Ok(DataType::Varchar(size));
        }
        if let Some(size) = parse_sized(text, "char") {
            return Ok(DataType::Char(size));
        }

        Err(Error::UnknownDataType(text.to_string()))
    }

    /// Check a literal (quotes already stripped) against this type.
    pub fn validate(&self, value: &str) -> bool {
        match self {
            DataType::Integer => is_integer(value) && value.len() <= self.max_length(),
            DataType::Boolean => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"),
            DataType::Date => is_date(value),
            DataType::Datetime => is_datetime(value),
            DataType::Char(n) => value.chars().count() == *n,
            DataType::Varchar(n) => value.chars().count() <= *n,
            DataType::Uuid => {
                !value.is_empty()
                    && value.len() <= 16
                    && value.bytes().all(|b| b.is_ascii_digit())
            }
        }
    }

    /// Validate a literal, turning a mismatch into a typed error.
    pub fn check(&self, value: &str) -> Result<()> {
        if self.validate(value) {
            Ok(())
        } else {
            Err(Error::InvalidLiteral {
                value: value.to_string(),
                type_name: self.to_string(),
            })
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Char(n) => write!(f, "char({})", n),
            DataType::Varchar(n) => write!(f, "varchar({})", n),
            other => write!(f, "{}", other.name()),
        }
    }
}

fn parse_sized(text: &str, keyword: &str) -> Option<usize> {
    let inner = text
        .strip_prefix(keyword)?
        .strip_prefix('(')?
        .strip_suffix(')')?;
    let size: usize = inner.parse().ok()?;
    if size > 0 {
        Some(size)
    } else {
        None
    }
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// `YYYY-MM-DD` with real month/day ranges.
fn is_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }

    let year = match value[0..4].parse::<u32>() {
        Ok(y) => y,
        Err(_) => return false,
    };
    let month = match value[5..7].parse::<u32>() {
        Ok(m) => m,
        Err(_) => return false,
    };
    let day = match value[8..10].parse::<u32>() {
        Ok(d) => d,
        Err(_) => return false,
    };

    (1..=12).contains(&month) && day >= 1 && day <= days_in_month(year, month)
}

/// `YYYY-MM-DD HH:MM:SS`
fn is_datetime(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 19 || bytes[10] != b' ' || bytes[13] != b':' || bytes[16] != b':' {
        return false;
    }
    if !is_date(&value[0..10]) {
        return false;
    }

    let hour = match value[11..13].parse::<u32>() {
        Ok(h) => h,
        Err(_) => return false,
    };
    let minute = match value[14..16].parse::<u32>() {
        Ok(m) => m,
        Err(_) => return false,
    };
    let second = match value[17..19].parse::<u32>() {
        Ok(s) => s,
        Err(_) => return false,
    };

    hour <= 23 && minute <= 59 && second <= 59
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for text in ["int", "boolean", "date", "datetime", "uuid", "char(4)", "varchar(20)"] {
            let data_type = DataType::parse(text).unwrap();
            assert_eq!(data_type.to_string(), text);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(DataType::parse("text").is_err());
        assert!(DataType::parse("varchar(0)").is_err());
        assert!(DataType::parse("char(x)").is_err());
    }

    #[test]
    fn test_max_length_positive() {
        for data_type in [
            DataType::Integer,
            DataType::Boolean,
            DataType::Date,
            DataType::Datetime,
            DataType::Char(1),
            DataType::Varchar(DEFAULT_VARCHAR_LENGTH),
            DataType::Uuid,
        ] {
            assert!(data_type.max_length() > 0);
        }
    }

    #[test]
    fn test_integer_validation() {
        assert!(DataType::Integer.validate("42"));
        assert!(DataType::Integer.validate("-7"));
        assert!(!DataType::Integer.validate("4.2"));
        assert!(!DataType::Integer.validate("abc"));
        assert!(!DataType::Integer.validate(""));
    }

    #[test]
    fn test_boolean_validation() {
        assert!(DataType::Boolean.validate("true"));
        assert!(DataType::Boolean.validate("FALSE"));
        assert!(!DataType::Boolean.validate("yes"));
    }

    #[test]
    fn test_date_validation() {
        assert!(DataType::Date.validate("2024-02-29"));
        assert!(!DataType::Date.validate("2023-02-29"));
        assert!(!DataType::Date.validate("2024-13-01"));
        assert!(!DataType::Date.validate("2024-1-1"));
    }

    #[test]
    fn test_datetime_validation() {
        assert!(DataType::Datetime.validate("2024-06-15 23:59:59"));
        assert!(!DataType::Datetime.validate("2024-06-15 24:00:00"));
        assert!(!DataType::Datetime.validate("2024-06-15T12:00:00"));
    }

    #[test]
    fn test_char_and_varchar_lengths() {
        assert!(DataType::Char(4).validate("abcd"));
        assert!(!DataType::Char(4).validate("abc"));
        assert!(DataType::Varchar(4).validate("abc"));
        assert!(!DataType::Varchar(4).validate("abcde"));
    }

    #[test]
    fn test_uuid_validation() {
        assert!(DataType::Uuid.validate("1234567890123456"));
        assert!(!DataType::Uuid.validate("12345678901234567"));
        assert!(!DataType::Uuid.validate("12ab"));
    }
}
