//! Fallible field extraction over parsed event payloads.
//!
//! Payloads are loosely typed upstream: numbers arrive as JSON numbers or
//! numeric strings, commerce fields may live at the top level or nested
//! under an `items` list. Every helper returns an `Option` instead of
//! erroring on a type mismatch.

use serde_json::Value;

/// Payload keys that can carry a purchase price, in precedence order.
pub const PRICE_KEYS: &[&str] = &["price", "total", "revenue", "amount", "value"];

/// Read a top-level field as a number. Accepts JSON numbers and numeric
/// strings; anything else is `None`.
pub fn number_field(payload: &Value, key: &str) -> Option<f64> {
    as_number(payload.as_object()?.get(key)?)
}

/// Read a top-level field as a string.
pub fn string_field(payload: &Value, key: &str) -> Option<String> {
    match payload.as_object()?.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First numeric value among `keys`, in order.
pub fn first_number(payload: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| number_field(payload, k))
}

/// Sum a numeric field across the payload's `items` list. `None` when
/// there is no list, the list is empty, or no item carries the field.
pub fn items_number_sum(payload: &Value, key: &str) -> Option<f64> {
    let items = payload.as_object()?.get("items")?.as_array()?;
    let values: Vec<f64> = items
        .iter()
        .filter_map(|item| item.as_object()?.get(key).and_then(as_number))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum())
    }
}

/// First string value of a field across the payload's `items` list.
pub fn items_string_first(payload: &Value, key: &str) -> Option<String> {
    let items = payload.as_object()?.get("items")?.as_array()?;
    items.iter().find_map(|item| match item.as_object()?.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_field_accepts_numeric_strings() {
        let p = json!({"price": "19.99", "quantity": 2});
        assert_eq!(number_field(&p, "price"), Some(19.99));
        assert_eq!(number_field(&p, "quantity"), Some(2.0));
        assert_eq!(number_field(&p, "missing"), None);
    }

    #[test]
    fn number_field_rejects_non_numeric() {
        let p = json!({"price": {"nested": true}, "total": "abc"});
        assert_eq!(number_field(&p, "price"), None);
        assert_eq!(number_field(&p, "total"), None);
    }

    #[test]
    fn first_number_respects_precedence() {
        let p = json!({"total": 30.0, "amount": 10.0});
        assert_eq!(first_number(&p, PRICE_KEYS), Some(30.0));
    }

    #[test]
    fn items_sum_and_first() {
        let p = json!({"items": [
            {"quantity": 2, "sku": "A-1"},
            {"quantity": 1, "sku": "B-2"},
        ]});
        assert_eq!(items_number_sum(&p, "quantity"), Some(3.0));
        assert_eq!(items_string_first(&p, "sku"), Some("A-1".into()));
        assert_eq!(items_number_sum(&p, "price"), None);
    }

    #[test]
    fn non_object_payloads_yield_none() {
        let p = json!([1, 2, 3]);
        assert_eq!(number_field(&p, "price"), None);
        assert_eq!(items_number_sum(&p, "quantity"), None);
    }
}
