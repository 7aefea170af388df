//! Display formatting
//!
//! Unknown values always render as a `--` placeholder, never as zero.

pub const PLACEHOLDER: &str = "--";
pub const NOT_COMPUTED: &str = "not computed";

/// Group the integer part of an already-formatted number: "1234.50" -> "1,234.50"
fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// "$1,234.56", "-$12.00" or "$--"
pub fn format_usd(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) if v < 0.0 => format!("-${}", group_thousands(&format!("{:.2}", -v))),
        Some(v) => format!("${}", group_thousands(&format!("{v:.2}"))),
        None => format!("${PLACEHOLDER}"),
    }
}

/// Signed percent with two decimals: "+1.23%", "-0.50%" or "--%"
pub fn format_percent(value: Option<f64>) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) if v >= 0.0 => format!("+{v:.2}%"),
        Some(v) => format!("{v:.2}%"),
        None => format!("{PLACEHOLDER}%"),
    }
}

/// Win rate style percent, one decimal, no sign
pub fn format_rate(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map_or_else(|| NOT_COMPUTED.to_string(), |v| format!("{v:.1}%"))
}

pub fn format_ratio(value: Option<f64>) -> String {
    value
        .filter(|v| v.is_finite())
        .map_or_else(|| NOT_COMPUTED.to_string(), |v| format!("{v:.2}"))
}

/// Fixed decimals, `--` when unknown
pub fn format_amount(value: Option<f64>, decimals: usize) -> String {
    value
        .filter(|v| v.is_finite())
        .map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{v:.decimals$}"))
}

/// Decimals used when showing a balance of `asset`
pub fn balance_decimals(asset: &str, quote_asset: &str) -> usize {
    if asset.eq_ignore_ascii_case(quote_asset) { 2 } else { 5 }
}
