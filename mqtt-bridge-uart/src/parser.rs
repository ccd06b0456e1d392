//! Sensor response line parser.
//!
//! The microcontroller answers each request with one line of
//! whitespace-separated `KEY:VALUE` tokens:
//!
//! ```text
//! TEMP:23.5 HUM:60.2 STATUS:1
//! ```
//!
//! `TEMP` and `HUM` are required decimals, `STATUS` is an optional integer.
//! Unknown keys are skipped so newer firmware can add fields. Tokens are
//! scanned left to right, so a repeated key keeps its last value.

use thiserror::Error;

const TEMP_PREFIX: &str = "TEMP:";
const HUM_PREFIX: &str = "HUM:";
const STATUS_PREFIX: &str = "STATUS:";

/// A validated sensor sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Device status code, if reported.
    pub status: Option<i64>,
}

/// Why a response line was not turned into a [`Reading`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRejected {
    #[error("empty line")]
    Empty,

    #[error("invalid {key} value '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("missing {0} field")]
    MissingField(&'static str),
}

/// Parse one response line.
///
/// A bad value on any recognised key rejects the whole line; no partial
/// reading is ever returned.
pub fn parse(raw: &str) -> Result<Reading, ParseRejected> {
    let line = raw.trim();
    if line.is_empty() {
        return Err(ParseRejected::Empty);
    }

    let mut temperature = None;
    let mut humidity = None;
    let mut status = None;

    for token in line.split_whitespace() {
        if let Some(value) = token.strip_prefix(TEMP_PREFIX) {
            temperature = Some(parse_decimal("TEMP", value)?);
        } else if let Some(value) = token.strip_prefix(HUM_PREFIX) {
            humidity = Some(parse_decimal("HUM", value)?);
        } else if let Some(value) = token.strip_prefix(STATUS_PREFIX) {
            status = Some(value.parse::<i64>().map_err(|_| invalid("STATUS", value))?);
        }
    }

    Ok(Reading {
        temperature: temperature.ok_or(ParseRejected::MissingField("TEMP"))?,
        humidity: humidity.ok_or(ParseRejected::MissingField("HUM"))?,
        status,
    })
}

/// Decimals must be finite; NaN and infinities cannot be carried in JSON.
fn parse_decimal(key: &'static str, value: &str) -> Result<f64, ParseRejected> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &'static str, value: &str) -> ParseRejected {
    ParseRejected::InvalidValue {
        key,
        value: value.to_string(),
    }
}
