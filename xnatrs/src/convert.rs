//! Conversion between XNAT wire strings and typed scalar values.
//!
//! Every scalar property carries a primitive type tag from the schema; the
//! getters and setters funnel through [convert_to] and [convert_from] so the
//! conversion rules live in one place.

use std::fmt;

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, PrimitiveDateTime, Time};

use crate::errors::XnatError;

const DATE_FORMAT: &[FormatItem] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem] = format_description!("[hour]:[minute]:[second]");
const DATETIME_FORMAT: &[FormatItem] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Primitive type tags recognized in schema documents (`xs:` namespace).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Int,
    Float,
    Boolean,
    Date,
    Time,
    DateTime,
    Duration,
}

impl ScalarType {
    /// Map a schema primitive identifier to a type tag. Unrecognized `xs:`
    /// primitives (anyURI, base64Binary, ...) are treated as strings.
    pub fn from_xs(name: &str) -> ScalarType {
        match name.trim_start_matches("xs:") {
            "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
            | "positiveInteger" => ScalarType::Int,
            "float" | "double" | "decimal" => ScalarType::Float,
            "boolean" => ScalarType::Boolean,
            "date" => ScalarType::Date,
            "time" => ScalarType::Time,
            "dateTime" => ScalarType::DateTime,
            "duration" => ScalarType::Duration,
            _ => ScalarType::String,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
            ScalarType::Date => "date",
            ScalarType::Time => "time",
            ScalarType::DateTime => "dateTime",
            ScalarType::Duration => "duration",
        }
    }
}

/// A typed scalar value of a generated property.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(Date),
    Time(Time),
    DateTime(PrimitiveDateTime),
    Duration(Duration),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(v) => f.write_str(v),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Bool(v) => f.write_str(if *v { "true" } else { "false" }),
            FieldValue::Date(v) => f.write_str(&v.format(DATE_FORMAT).map_err(|_| fmt::Error)?),
            FieldValue::Time(v) => f.write_str(&v.format(TIME_FORMAT).map_err(|_| fmt::Error)?),
            FieldValue::DateTime(v) => {
                f.write_str(&v.format(DATETIME_FORMAT).map_err(|_| fmt::Error)?)
            }
            FieldValue::Duration(v) => f.write_str(&format_iso_duration(*v)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

fn conversion_error(value: &str, type_: ScalarType) -> XnatError {
    XnatError::Conversion {
        value: value.to_string(),
        type_name: type_.name().to_string(),
    }
}

/// Convert a wire string to a typed value.
pub fn convert_to(raw: &str, type_: ScalarType) -> Result<FieldValue, XnatError> {
    let value = match type_ {
        ScalarType::String => FieldValue::String(raw.to_string()),
        ScalarType::Int => FieldValue::Int(
            raw.trim()
                .parse()
                .map_err(|_| conversion_error(raw, type_))?,
        ),
        ScalarType::Float => FieldValue::Float(
            raw.trim()
                .parse()
                .map_err(|_| conversion_error(raw, type_))?,
        ),
        ScalarType::Boolean => FieldValue::Bool(matches!(raw, "true" | "1")),
        ScalarType::Date => FieldValue::Date(
            Date::parse(raw, DATE_FORMAT).map_err(|_| conversion_error(raw, type_))?,
        ),
        ScalarType::Time => FieldValue::Time(
            Time::parse(raw, TIME_FORMAT).map_err(|_| conversion_error(raw, type_))?,
        ),
        ScalarType::DateTime => FieldValue::DateTime(
            // Some servers separate date and time with a space.
            PrimitiveDateTime::parse(&raw.replacen(' ', "T", 1), DATETIME_FORMAT)
                .map_err(|_| conversion_error(raw, type_))?,
        ),
        ScalarType::Duration => FieldValue::Duration(parse_iso_duration(raw)?),
    };
    Ok(value)
}

/// Convert a typed value to its wire representation, checking that the value
/// matches the declared primitive type.
pub fn convert_from(value: &FieldValue, type_: ScalarType) -> Result<String, XnatError> {
    // A raw string is accepted for any declared type, but it has to parse as
    // that type first; a string the server would reject never goes out.
    if let FieldValue::String(s) = value {
        if type_ != ScalarType::String {
            convert_to(s, type_)?;
        }
        return Ok(s.clone());
    }
    let ok = matches!(
        (value, type_),
        (FieldValue::Int(_), ScalarType::Int)
            | (FieldValue::Int(_), ScalarType::Float)
            | (FieldValue::Float(_), ScalarType::Float)
            | (FieldValue::Bool(_), ScalarType::Boolean)
            | (FieldValue::Date(_), ScalarType::Date)
            | (FieldValue::Time(_), ScalarType::Time)
            | (FieldValue::DateTime(_), ScalarType::DateTime)
            | (FieldValue::Duration(_), ScalarType::Duration)
    );
    if ok {
        Ok(value.to_string())
    } else {
        Err(conversion_error(&value.to_string(), type_))
    }
}

/// Parse an ISO-8601 duration (`PnWnDTnHnMnS`). Year and month components are
/// rejected: they have no fixed length in seconds.
pub fn parse_iso_duration(raw: &str) -> Result<Duration, XnatError> {
    let err = || conversion_error(raw, ScalarType::Duration);
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let rest = rest.strip_prefix('P').ok_or_else(err)?;

    let mut total = Duration::ZERO;
    let mut in_time = false;
    let mut number = String::new();
    let mut seen_component = false;

    for c in rest.chars() {
        match c {
            'T' => {
                if in_time {
                    return Err(err());
                }
                in_time = true;
            }
            '0'..='9' | '.' => number.push(c),
            'Y' => return Err(err()),
            'M' if !in_time => return Err(err()),
            designator => {
                let amount: f64 = number.parse().map_err(|_| err())?;
                number.clear();
                seen_component = true;
                let seconds = match (designator, in_time) {
                    ('W', false) => amount * 7.0 * 86400.0,
                    ('D', false) => amount * 86400.0,
                    ('H', true) => amount * 3600.0,
                    ('M', true) => amount * 60.0,
                    ('S', true) => amount,
                    _ => return Err(err()),
                };
                total += Duration::seconds_f64(seconds);
            }
        }
    }

    if !number.is_empty() || !seen_component {
        return Err(err());
    }
    Ok(if negative { -total } else { total })
}

fn format_iso_duration(d: Duration) -> String {
    let mut out = String::new();
    if d.is_negative() {
        out.push('-');
    }
    out.push('P');
    let mut secs = d.whole_seconds().unsigned_abs();
    let subsec = d.subsec_nanoseconds().unsigned_abs();
    let days = secs / 86400;
    secs %= 86400;
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if secs > 0 || subsec > 0 || days == 0 {
        out.push('T');
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if subsec > 0 {
            out.push_str(&format!("{}S", seconds as f64 + subsec as f64 / 1e9));
        } else {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}
