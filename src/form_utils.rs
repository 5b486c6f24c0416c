//! Serde and parsing helpers for HTML form input.
//!
//! Amounts arrive the way people type them (`1.234,56`, `R$ 10`) and are
//! stored as integer cents; quantities as thousandths.

use serde::{Deserialize, Deserializer};

/// Checkbox fields are absent when unchecked and `"on"` (or `"true"`) otherwise.
pub fn deserialize_checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(matches!(
        s.as_deref().map(str::trim),
        Some("on") | Some("true") | Some("1")
    ))
}

/// Largest accepted amount: R$ 999.999.999,99.
pub const MAX_AMOUNT_CENTS: i64 = 99_999_999_999;

/// Largest accepted quantity: 999.999,999 units.
pub const MAX_QUANTITY_MILLI: i64 = 999_999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberError {
    Invalid,
    TooManyDecimals,
    TooLarge,
}

/// Reduce a human-typed number to `[-]digits[.digits]`.
///
/// When both `.` and `,` appear the right-most one is the decimal separator.
/// A lone `,` is decimal. Repeated `.` with no comma (`1.234.567`) are
/// thousands separators. Currency symbols and spaces are dropped.
pub fn clean_decimal(input: &str) -> String {
    let last_dot = input.rfind('.');
    let last_comma = input.rfind(',');

    let decimal_char = match (last_dot, last_comma) {
        (Some(d), Some(c)) => {
            if d > c {
                Some('.')
            } else {
                Some(',')
            }
        }
        (Some(_), None) if input.matches('.').count() > 1 => None,
        (Some(_), None) => Some('.'),
        (None, Some(_)) if input.matches(',').count() > 1 => None,
        (None, Some(_)) => Some(','),
        (None, None) => None,
    };

    let decimal_pos = match decimal_char {
        Some('.') => last_dot,
        Some(',') => last_comma,
        _ => None,
    };

    let mut result = String::new();
    for (i, c) in input.char_indices() {
        if c.is_ascii_digit() {
            result.push(c);
        } else if Some(i) == decimal_pos {
            result.push('.');
        } else if c == '-' && result.is_empty() {
            result.push(c);
        }
    }

    result
}

/// `"1.500"` with no comma is one thousand five hundred in pt-BR input.
fn is_lone_thousands_dot(input: &str) -> bool {
    if input.contains(',') || input.matches('.').count() != 1 {
        return false;
    }
    input
        .rsplit_once('.')
        .map(|(_, tail)| tail.trim().len() == 3 && tail.trim().bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Parse a cleaned `[-]digits[.digits]` string into an integer scaled by
/// `10^decimals`. Never rounds and never overflows.
fn parse_fixed(cleaned: &str, decimals: u32, max: i64) -> Result<i64, NumberError> {
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(NumberError::Invalid);
    }
    if frac.len() > decimals as usize {
        return Err(NumberError::TooManyDecimals);
    }

    let scale = 10_i64.pow(decimals);
    let whole_value = match whole.trim_start_matches('0') {
        "" => 0,
        w if w.len() > 18 => return Err(NumberError::TooLarge),
        w => w.parse::<i64>().map_err(|_| NumberError::Invalid)?,
    };
    let frac_value = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse::<i64>().map_err(|_| NumberError::Invalid)?
    };

    let value = whole_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .filter(|v| *v <= max)
        .ok_or(NumberError::TooLarge)?;
    Ok(if negative { -value } else { value })
}

/// Parse a money amount into cents: `"1.234,56"`, `"1,234.56"`, `"1.500"`
/// (thousands), `"1234.56"`, `"R$ 10"`. More than two decimals is an error.
pub fn parse_money(input: &str) -> Result<i64, NumberError> {
    let cleaned = if is_lone_thousands_dot(input) {
        clean_decimal(&input.replace('.', ""))
    } else {
        clean_decimal(input)
    };
    parse_fixed(&cleaned, 2, MAX_AMOUNT_CENTS)
}

pub fn parse_money_cents(input: &str) -> Option<i64> {
    parse_money(input).ok()
}

/// Parse a quantity into thousandths: `"0,5"` is 500 and `"1.250"` is 1250.
pub fn parse_quantity_milli(input: &str) -> Option<i64> {
    parse_fixed(&clean_decimal(input), 3, MAX_QUANTITY_MILLI).ok()
}

/// Format cents for an `<input>` value using a decimal comma: `123456` → `"1234,56"`.
pub fn cents_to_input(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{},{:02}", sign, abs / 100, abs % 100)
}

/// Format thousandths for an `<input>` value: `1500` → `"1,5"`, `2000` → `"2"`.
pub fn milli_to_input(milli: i64) -> String {
    let whole = milli / 1000;
    let frac = (milli % 1000).abs();
    if frac == 0 {
        whole.to_string()
    } else {
        let digits = format!("{:03}", frac);
        format!("{},{}", whole, digits.trim_end_matches('0'))
    }
}
