//! Money and percentage formatting for display.
//!
//! Amounts are rendered the Brazilian way: currency symbol, `.` as the
//! thousands separator and `,` as the decimal separator (`R$ 1.234,56`).

/// Format cents as plain text without sign prefix: `R$ 1.234,56`, `-R$ 3,00`.
pub fn format_money(cents: i64, currency: &str) -> String {
    let abs_cents = cents.abs();
    let whole = abs_cents / 100;
    let fractional = abs_cents % 100;
    let sign = if cents < 0 { "-" } else { "" };

    format!(
        "{}{}\u{00a0}{},{:02}",
        sign,
        currency_symbol(currency),
        format_with_thousands(whole, '.'),
        fractional
    )
}

/// Shorthand for the default currency.
pub fn format_brl(cents: i64) -> String {
    format_money(cents, "BRL")
}

/// Two decimals with a decimal comma: `20.0` → `"20,00%"`.
pub fn format_percent(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    format!("{}%", formatted.replace('.', ","))
}

/// Signed variant used for trends: `"+5,00%"`, `"-3,10%"`.
pub fn format_signed_percent(value: f64) -> String {
    if value > 0.0 {
        format!("+{}", format_percent(value))
    } else {
        format_percent(value)
    }
}

fn format_with_thousands(n: i64, sep: char) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(sep);
        }
        result.push(c);
    }
    result
}

fn currency_symbol(currency: &str) -> &'static str {
    match currency.to_uppercase().as_str() {
        "BRL" => "R$",
        "USD" => "US$",
        "EUR" => "\u{20ac}",
        _ => "R$",
    }
}
