// src/number.rs

use serde::{Deserialize, Deserializer};

/// Parse a user- or file-supplied number, accepting both Italian
/// (`1.234,56`) and English (`1,234.56`) grouping plus a currency sign.
///
/// Anything that does not reduce to a finite number yields `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let mut s: String = raw
        .trim()
        .trim_start_matches("EUR")
        .trim_end_matches("EUR")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€' && *c != '$' && *c != '\'')
        .collect();

    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || ".,+-eE".contains(c)) {
        return None;
    }

    let commas = s.matches(',').count();
    let dots = s.matches('.').count();

    s = match (commas, dots) {
        (0, 0) => s,
        // Both present: whichever comes last is the decimal separator.
        (_, _) if commas > 0 && dots > 0 => {
            let last_comma = s.rfind(',').unwrap_or(0);
            let last_dot = s.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                s.replace('.', "").replace(',', ".")
            } else {
                s.replace(',', "")
            }
        }
        (1, 0) => s.replace(',', "."),
        (_, 0) => s.replace(',', ""),
        (0, 1) => s,
        _ => s.replace('.', ""),
    };

    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Keep only finite values; NaN and infinities count as "not entered".
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Serde helper for optional numeric fields that may arrive as numbers,
/// numeric strings, `null`, or garbage. Garbage becomes `None`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => finite(n.as_f64()),
        Some(serde_json::Value::String(s)) => parse_number(&s),
        _ => None,
    })
}

/// Format an amount the Italian way: `1.234,56`.
pub fn format_it(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(f) => format!("{sign}{grouped},{f}"),
        None => format!("{sign}{grouped}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_decimal_comma() {
        assert_eq!(parse_number("12"), Some(12.0));
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("-3,25"), Some(-3.25));
    }

    #[test]
    fn test_parse_grouped_amounts() {
        assert_eq!(parse_number("1.234,56"), Some(1234.56));
        assert_eq!(parse_number("1,234.56"), Some(1234.56));
        assert_eq!(parse_number("1.234.567"), Some(1234567.0));
        assert_eq!(parse_number("€ 12,50"), Some(12.5));
        assert_eq!(parse_number("12.50 €"), Some(12.5));
        assert_eq!(parse_number("EUR 7,00"), Some(7.0));
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("12 m"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_lenient_deserialize() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default, deserialize_with = "lenient_f64")]
            v: Option<f64>,
        }

        let parse = |json: &str| serde_json::from_str::<Row>(json).unwrap().v;
        assert_eq!(parse(r#"{"v": 2.5}"#), Some(2.5));
        assert_eq!(parse(r#"{"v": "2,5"}"#), Some(2.5));
        assert_eq!(parse(r#"{"v": "two"}"#), None);
        assert_eq!(parse(r#"{"v": null}"#), None);
        assert_eq!(parse(r#"{"v": true}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[test]
    fn test_format_it() {
        assert_eq!(format_it(1234.5, 2), "1.234,50");
        assert_eq!(format_it(12.0, 2), "12,00");
        assert_eq!(format_it(-8.0, 2), "-8,00");
        assert_eq!(format_it(1_000_000.0, 0), "1.000.000");
        assert_eq!(format_it(-0.001, 2), "0,00");
    }
}
