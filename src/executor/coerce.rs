//! Declared-type coercion of AI and user responses
//!
//! The engine decides what structured output a request requires from the
//! destination variable's declared type; how a provider enforces it is the
//! adapter's concern. Whatever comes back is coerced here; a shape
//! mismatch is `TypeCoercion`, never a silently stored untyped value.

use serde_json::Value as JsonValue;

use super::errors::EngineError;
use super::types::{json_to_val, TypeAnnotation, Val};

/// Coerce raw response text to the declared target type
pub fn coerce_text(content: &str, target: Option<TypeAnnotation>) -> Result<Val, EngineError> {
    let Some(target) = target else {
        return Ok(Val::Text(content.to_string()));
    };

    let fail = || EngineError::TypeCoercion {
        value: truncate_for_error(content),
        target,
    };

    match target {
        TypeAnnotation::Text | TypeAnnotation::Prompt => Ok(Val::Text(content.to_string())),
        TypeAnnotation::Number => content
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Val::Num)
            .ok_or_else(fail),
        TypeAnnotation::Boolean => match content.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Val::Bool(true)),
            "false" => Ok(Val::Bool(false)),
            _ => Err(fail()),
        },
        TypeAnnotation::Json => serde_json::from_str::<JsonValue>(content.trim())
            .map(|json| json_to_val(&json))
            .map_err(|_| fail()),
        TypeAnnotation::Array => {
            let json = serde_json::from_str::<JsonValue>(content.trim()).map_err(|_| fail())?;
            if json.is_array() {
                Ok(json_to_val(&json))
            } else {
                Err(fail())
            }
        }
        // A response can never become configuration
        TypeAnnotation::Model => Err(fail()),
    }
}

/// Coerce a full provider response: a pre-parsed structured value wins when
/// its shape matches the target, otherwise the raw content text is coerced
pub fn coerce_response(
    parsed: Option<&JsonValue>,
    content: &str,
    target: Option<TypeAnnotation>,
) -> Result<Val, EngineError> {
    if let Some(json) = parsed {
        let val = json_to_val(json);
        return match target {
            None | Some(TypeAnnotation::Json) => Ok(val),
            Some(t) => {
                if shape_matches(&val, t) {
                    Ok(val)
                } else {
                    Err(EngineError::TypeCoercion {
                        value: truncate_for_error(&val.display_text()),
                        target: t,
                    })
                }
            }
        };
    }
    coerce_text(content, target)
}

fn shape_matches(val: &Val, target: TypeAnnotation) -> bool {
    match target {
        TypeAnnotation::Text | TypeAnnotation::Prompt => matches!(val, Val::Text(_)),
        TypeAnnotation::Number => matches!(val, Val::Num(_)),
        TypeAnnotation::Boolean => matches!(val, Val::Bool(_)),
        TypeAnnotation::Array => matches!(val, Val::List(_)),
        TypeAnnotation::Json => true,
        TypeAnnotation::Model => false,
    }
}

fn truncate_for_error(s: &str) -> String {
    const MAX: usize = 120;
    if s.len() > MAX {
        let mut end = MAX;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    } else {
        s.to_string()
    }
}
