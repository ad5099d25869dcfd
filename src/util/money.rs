//! Naira amount helpers

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Round to two decimal places (kobo precision)
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Read an amount sent either as a JSON number or a numeric string.
/// Non-finite values are rejected.
pub fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

/// Serde helper for stored amounts that older clients wrote as strings
pub fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(parse_amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rounds_to_kobo() {
        assert_eq!(round2(0.1 + 0.2), 0.3);
        assert_eq!(round2(1250.006), 1250.01);
        assert_eq!(round2(-3.333), -3.33);
    }

    #[test]
    fn parses_numbers_and_strings() {
        assert_eq!(parse_amount(&json!(5000)), Some(5000.0));
        assert_eq!(parse_amount(&json!("10,000.50")), Some(10000.5));
        assert_eq!(parse_amount(&json!(" 300 ")), Some(300.0));
        assert_eq!(parse_amount(&json!("abc")), None);
        assert_eq!(parse_amount(&json!(null)), None);
        assert_eq!(parse_amount(&json!(true)), None);
    }
}
