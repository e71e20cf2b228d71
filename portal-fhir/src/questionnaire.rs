//! Display helpers for Questionnaire answer options.

use portal_core::DisplayValue;
use serde_json::Value;
use tracing::warn;

/// Display value of a single `answerOption`.
///
/// Codings without a display render as an empty string. Unsupported value
/// types are logged and rendered empty.
pub fn answer_option_display(option: &Value) -> DisplayValue {
    if let Some(coding) = option.get("valueCoding") {
        let display = coding
            .get("display")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return DisplayValue::Text(display.to_string());
    }

    if let Some(text) = option.get("valueString").and_then(Value::as_str) {
        return DisplayValue::Text(text.to_string());
    }

    if let Some(number) = option.get("valueInteger").and_then(Value::as_i64) {
        return DisplayValue::Integer(number);
    }

    warn!(option = %option, "no display mapping for answer option");
    DisplayValue::default()
}

/// Displays of every answer option of a questionnaire item, in order.
pub fn item_option_displays(item: &Value) -> Vec<DisplayValue> {
    item.get("answerOption")
        .and_then(Value::as_array)
        .map(|options| options.iter().map(answer_option_display).collect())
        .unwrap_or_default()
}
