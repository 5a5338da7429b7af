//! Display formatting for calculation results.
//!
//! The format is fixed rather than negotiated: thousands grouped with the
//! configured separator, the configured decimal separator, trailing zeros
//! dropped, and the unit appended after one space (`1.234,5 kWh`).

use heatcalc_model::NumberFormat;

/// Rounds half away from zero to `decimals` places. Values too large to
/// scale have no fractional digits left and are returned unchanged.
pub(crate) fn round_half_away(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    if !scaled.is_finite() || factor == 0.0 {
        return value;
    }
    scaled.round() / factor
}

/// Formats `value` rounded (half away from zero) to `decimals` places.
pub fn format_number(value: f64, decimals: u32, format: &NumberFormat) -> String {
    let rounded = round_half_away(value, decimals as i32);
    let fixed = format!("{:.*}", decimals as usize, rounded.abs());
    let (integer, fraction) = match fixed.split_once('.') {
        Some((integer, fraction)) => (integer, fraction.trim_end_matches('0')),
        None => (fixed.as_str(), ""),
    };

    let mut out = String::with_capacity(fixed.len() + integer.len() / 3 + 2);
    let negative = rounded < 0.0 && (integer.bytes().any(|b| b != b'0') || !fraction.is_empty());
    if negative {
        out.push('-');
    }
    for (idx, digit) in integer.chars().enumerate() {
        if idx > 0 && (integer.len() - idx) % 3 == 0 {
            out.push(format.thousands_separator);
        }
        out.push(digit);
    }
    if !fraction.is_empty() {
        out.push(format.decimal_separator);
        out.push_str(fraction);
    }
    out
}

/// Appends the unit after one space when one is declared.
pub fn format_with_unit(formatted: &str, unit: Option<&str>) -> String {
    match unit.map(str::trim).filter(|unit| !unit.is_empty()) {
        Some(unit) => format!("{formatted} {unit}"),
        None => formatted.to_string(),
    }
}

/// Parses a value produced by [`format_number`] (optionally followed by a
/// unit) back into a number.
pub fn parse_formatted(text: &str, format: &NumberFormat) -> Option<f64> {
    let number: String = text
        .trim()
        .chars()
        .take_while(|c| {
            c.is_ascii_digit()
                || *c == '-'
                || *c == format.thousands_separator
                || *c == format.decimal_separator
        })
        .filter(|c| *c != format.thousands_separator)
        .map(|c| if c == format.decimal_separator { '.' } else { c })
        .collect();
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok()
}
