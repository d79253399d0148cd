/// Two-stage decoding of result payloads: outer array → element list.
use serde_json::Value;

use crate::perception::types::DetectionElement;
use crate::remote::literal::parse_literal;
use crate::remote::types::{DecodeFailure, RawResult};

/// Stage one: strict JSON parse of a frame payload.
///
/// Returns `Ok(None)` for well-formed payloads that are not yet a result
/// (anything other than an array of at least two members).
pub fn decode_raw_result(payload: &str) -> Result<Option<RawResult>, DecodeFailure> {
    let parsed: Value = serde_json::from_str(payload)
        .map_err(|e| DecodeFailure::new(format!("payload is not valid JSON: {e}"), payload))?;

    match parsed {
        Value::Array(items) if items.len() >= 2 => {
            let mut items = items.into_iter();
            let marked_image = items.next().unwrap_or(Value::Null);
            let element_list = items.next().unwrap_or(Value::Null);
            Ok(Some(RawResult {
                marked_image,
                element_list,
            }))
        }
        other => {
            tracing::debug!(kind = json_kind(&other), "payload is not a result array yet");
            Ok(None)
        }
    }
}

/// Stage two: turn the result's element list into typed elements.
///
/// A string member is decoded again, strictly first and then with the
/// permissive literal parser.
pub fn decode_elements(raw: &RawResult) -> Result<Vec<DetectionElement>, DecodeFailure> {
    let list = match &raw.element_list {
        Value::Array(_) => raw.element_list.clone(),
        Value::String(text) => decode_embedded_list(text)?,
        other => {
            return Err(DecodeFailure::new(
                format!("element list has unexpected type {}", json_kind(other)),
                &other.to_string(),
            ))
        }
    };

    if !list.is_array() {
        return Err(DecodeFailure::new(
            format!("decoded element list is {}, expected array", json_kind(&list)),
            &list.to_string(),
        ));
    }

    serde_json::from_value::<Vec<DetectionElement>>(list.clone())
        .map_err(|e| DecodeFailure::new(format!("invalid element: {e}"), &list.to_string()))
}

fn decode_embedded_list(text: &str) -> Result<Value, DecodeFailure> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            tracing::debug!(error = %json_err, "element list is not strict JSON, trying literal syntax");
            parse_literal(text).map_err(|lit_err| {
                DecodeFailure::new(
                    format!("element list is neither JSON ({json_err}) nor a literal ({lit_err})"),
                    text,
                )
            })
        }
    }
}

/// Decode a frame payload all the way to elements.
pub fn decode_payload(payload: &str) -> Result<Option<(RawResult, Vec<DetectionElement>)>, DecodeFailure> {
    let Some(raw) = decode_raw_result(payload)? else {
        return Ok(None);
    };
    let elements = decode_elements(&raw)?;
    Ok(Some((raw, elements)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
