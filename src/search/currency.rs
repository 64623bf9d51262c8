use crate::config::CurrencyConfig;

/// Render an amount the way receipts print it, e.g. `170606.16` -> `R$ 170.606,16`
/// and `-42` -> `R$ -42,00`.
pub fn format_amount(value: f64, cfg: &CurrencyConfig) -> String {
    let digits = group_digits(value.abs(), &cfg.thousands, &cfg.decimal);
    let body = if is_negative(value) { format!("-{digits}") } else { digits };
    if cfg.symbol.is_empty() {
        body
    } else {
        format!("{} {}", cfg.symbol, body)
    }
}

/// Plain two-decimal form used in file names, e.g. `150.00`.
pub fn plain_amount(value: f64) -> String {
    let sign = if is_negative(value) { "-" } else { "" };
    format!("{sign}{:.2}", value.abs())
}

/// Negative once rounded to cents, so `-0.001` prints without a sign.
fn is_negative(value: f64) -> bool {
    (value * 100.0).round() < 0.0
}

fn group_digits(value: f64, thousands: &str, decimal: &str) -> String {
    let fixed = format!("{value:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(thousands);
        }
        grouped.push(*c);
    }
    format!("{grouped}{decimal}{frac_part}")
}

/// Parse amount text in either `1.234,56` or `1,234.56` style.
///
/// The last `.` or `,` is the decimal separator when one or two digits
/// follow it; every other separator is a thousands mark.
pub fn parse_amount_text(raw: &str) -> Option<f64> {
    let negative = raw.trim_start().starts_with('-') || raw.contains('(') && raw.contains(')');
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match kept.rfind(['.', ',']) {
        Some(pos) if (1..=2).contains(&(kept.len() - pos - 1)) => {
            let int_part: String = kept[..pos].chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", int_part, &kept[pos + 1..])
        }
        _ => kept.chars().filter(char::is_ascii_digit).collect(),
    };

    let value: f64 = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}
