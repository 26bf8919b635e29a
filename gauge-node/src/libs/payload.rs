//! Fixed-width payload encoding.
//!
//! Every value is rendered into exactly `L + T` ASCII characters as described by its
//! [`DataFormat`]: `L` zero-padded whole-number digits followed by `T` decimal digits, without a
//! decimal point. An absent value (failed reading) is rendered as `L + T` copies of [`NULL_CHAR`].
//!
//! Rounding is done on the exact binary value of the `f64` with round-half-to-even on ties, so
//! `0.125` with two decimals is `"012"` and `2.675` (stored as `2.67499..`) becomes `"267"`.

use std::{fmt, str::FromStr};

use super::error::{FormatError, ParseFormatError};

/// Width specification `<L>.<T>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataFormat {
    /// Count of whole-number character positions.
    pub whole: usize,
    /// Count of decimal character positions.
    pub decimal: usize,
}

/// Placeholder character for absent values.
pub const NULL_CHAR: char = '#';

/// Water level in centimeters.
pub const FLOOD_FORMAT: DataFormat = DataFormat::new(5, 0);
/// Instantaneous rain.
pub const RAIN_DATA_FORMAT: DataFormat = DataFormat::new(4, 2);
/// Accumulated rain.
pub const RAIN_ACCU_FORMAT: DataFormat = DataFormat::new(4, 17);

impl DataFormat {
    pub const fn new(whole: usize, decimal: usize) -> Self {
        DataFormat { whole, decimal }
    }

    /// Rendered width in characters.
    pub const fn width(&self) -> usize {
        self.whole + self.decimal
    }
}

impl FromStr for DataFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (whole, decimal) = match s.split_once('.') {
            None => return Err(ParseFormatError(s.to_string())),
            Some(parts) => parts,
        };
        let is_count = |v: &str| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit());
        if !is_count(whole) || !is_count(decimal) {
            return Err(ParseFormatError(s.to_string()));
        }
        match (whole.parse::<usize>(), decimal.parse::<usize>()) {
            (Ok(whole), Ok(decimal)) => Ok(DataFormat { whole, decimal }),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.whole, self.decimal)
    }
}

/// The placeholder string for an absent value.
pub fn get_null_format(format: DataFormat) -> String {
    NULL_CHAR.to_string().repeat(format.width())
}

/// Render a value into its fixed-width field.
///
/// Returns [`FormatError::Overflow`] when the rounded whole part has more digits than `L`; the
/// value is never truncated.
pub fn render(value: Option<f64>, format: DataFormat) -> Result<String, FormatError> {
    let value = match value {
        None => return Ok(get_null_format(format)),
        Some(value) => value,
    };
    if !value.is_finite() {
        return Err(FormatError::NotFinite(value));
    }

    // `{:.*}` never switches to exponent notation and rounds on the exact binary value.
    let rounded = format!("{:.*}", format.decimal, value.abs());
    let (whole, decimal) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let whole = whole.trim_start_matches('0');
    let decimal = decimal.trim_end_matches('0');

    if value.is_sign_negative() && !(whole.is_empty() && decimal.is_empty()) {
        return Err(FormatError::Negative(value));
    }
    if whole.len() > format.whole {
        return Err(FormatError::Overflow {
            value,
            format,
            digits: whole.len(),
        });
    }

    Ok(format!(
        "{whole:0>w$}{decimal:0<d$}",
        w = format.whole,
        d = format.decimal
    ))
}
