const GROUP_SEPARATOR: char = '\u{00A0}';
const DECIMAL_SEPARATOR: char = ',';

/// Swedish-style currency: grouped thousands, comma decimals, two fraction digits.
pub fn format_currency(value: f64, suffix: &str) -> String {
    if !value.is_finite() {
        return format!("-{GROUP_SEPARATOR}{suffix}");
    }
    let cents = (value * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = group_thousands(cents / 100);
    let amount = format!("{sign}{whole}{DECIMAL_SEPARATOR}{:02}", cents % 100);
    if suffix.is_empty() {
        amount
    } else {
        format!("{amount}{GROUP_SEPARATOR}{suffix}")
    }
}

/// Distances print with at most one decimal and no trailing zero.
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let tenths = (value * 10.0).round() as i64;
    let sign = if tenths < 0 { "-" } else { "" };
    let tenths = tenths.unsigned_abs();
    let whole = group_thousands(tenths / 10);
    if tenths % 10 == 0 {
        format!("{sign}{whole}")
    } else {
        format!("{sign}{whole}{DECIMAL_SEPARATOR}{}", tenths % 10)
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(GROUP_SEPARATOR);
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_currency_with_grouping_and_comma() {
        assert_eq!(format_currency(455.5, "kr"), "455,50\u{a0}kr");
        assert_eq!(format_currency(1234567.891, "kr"), "1\u{a0}234\u{a0}567,89\u{a0}kr");
        assert_eq!(format_currency(-3.0, ""), "-3,00");
    }

    #[test]
    fn rounds_to_whole_cents() {
        assert_eq!(format_currency(0.005, "kr"), "0,01\u{a0}kr");
        assert_eq!(format_currency(105.0, "SEK"), "105,00\u{a0}SEK");
    }

    #[test]
    fn formats_distances_compactly() {
        assert_eq!(format_decimal(42.0), "42");
        assert_eq!(format_decimal(12.25), "12,3");
        assert_eq!(format_decimal(1500.0), "1\u{a0}500");
    }
}
