// Utility functions
use serde_json::Value;

/// Parses a price given either as a JSON number or as text like "$1,299.99".
/// Returns `None` for anything that isn't a finite, non-negative amount.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_price_text(s)?,
        _ => return None,
    };
    (price.is_finite() && price >= 0.0).then_some(price)
}

pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// First decimal number in free text: "4.6 out of 5 stars" gives 4.6.
pub fn first_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let number: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.trim_end_matches('.').parse().ok()
}

/// Digits of a count like "(1,204 reviews)".
pub fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Trimmed string content of a JSON value, `None` when absent or blank.
/// Numeric ids (OpenFoodFacts barcodes sometimes arrive as numbers) are accepted.
pub fn non_empty_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Cuts a response body down to something reasonable to put in a log line.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut out: String = body.chars().take(max_chars).collect();
    out.push('…');
    out
}
