//! Runtime value types

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// Declared type of a variable, used for AI response coercion and for
/// context filtering (`model`/`prompt` declarations are configuration, not
/// data, and never appear in assembled context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeAnnotation {
    Text,
    Number,
    Boolean,
    Json,
    Array,
    Model,
    Prompt,
}

impl fmt::Display for TypeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeAnnotation::Text => "text",
            TypeAnnotation::Number => "number",
            TypeAnnotation::Boolean => "boolean",
            TypeAnnotation::Json => "json",
            TypeAnnotation::Array => "array",
            TypeAnnotation::Model => "model",
            TypeAnnotation::Prompt => "prompt",
        };
        f.write_str(s)
    }
}

impl TypeAnnotation {
    /// Annotations that mark configuration rather than data
    pub fn is_config(&self) -> bool {
        matches!(self, TypeAnnotation::Model | TypeAnnotation::Prompt)
    }
}

/// Reference to an AI model, resolved from a `model` declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider adapter name (e.g. "openai", "anthropic")
    pub provider: String,
    /// Provider-specific model identifier
    pub model: String,
    /// Opaque parameter bag passed through to the adapter
    #[serde(default)]
    pub params: JsonValue,
}

/// Runtime value type
///
/// One exhaustive sum over the value domain; every consumption site matches
/// exhaustively, so adding a variant is a compile-time sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Text(String),
    List(Vec<Val>),
    Obj(HashMap<String, Val>),
    /// A model reference (config, filtered from context)
    Model(ModelConfig),
    /// A registered host tool, by name
    ToolRef(String),
    /// A function-table entry, by name
    FuncRef(String),
}

impl Val {
    /// Check if value is truthy (for conditionals)
    ///
    /// Falsy: false, null, 0, NaN, "" (empty string). Everything else is
    /// truthy, including empty lists and objects.
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Bool(b) => *b,
            Val::Null => false,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Short name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Text(_) => "text",
            Val::List(_) => "array",
            Val::Obj(_) => "json",
            Val::Model(_) => "model",
            Val::ToolRef(_) => "tool",
            Val::FuncRef(_) => "function",
        }
    }

    /// Render a value the way the context assembler and tool results show it
    ///
    /// Numbers print without a trailing `.0` when integral; text prints
    /// quoted; lists/objects print as compact JSON.
    pub fn display_text(&self) -> String {
        match self {
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => fmt_num(*n),
            Val::Text(s) => format!("{:?}", s),
            Val::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.display_text()).collect();
                format!("[{}]", parts.join(", "))
            }
            Val::Obj(map) => {
                // Sort keys so rendering is deterministic
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let parts: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{:?}: {}", k, map[*k].display_text()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Val::Model(cfg) => format!("<model {}/{}>", cfg.provider, cfg.model),
            Val::ToolRef(name) => format!("<tool {}>", name),
            Val::FuncRef(name) => format!("<function {}>", name),
        }
    }

    /// Render a value as raw text for prompt interpolation: text unquoted,
    /// everything else as `display_text`.
    pub fn prompt_text(&self) -> String {
        match self {
            Val::Text(s) => s.clone(),
            other => other.display_text(),
        }
    }
}

/// Format a number without a trailing `.0` when it is integral
pub fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A bound variable: value plus declaration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub value: Val,
    #[serde(default)]
    pub annotation: Option<TypeAnnotation>,
    #[serde(default)]
    pub is_const: bool,
}

impl Variable {
    pub fn new(value: Val) -> Self {
        Self {
            value,
            annotation: None,
            is_const: false,
        }
    }

    pub fn with_annotation(mut self, annotation: Option<TypeAnnotation>) -> Self {
        self.annotation = annotation;
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_const = true;
        self
    }
}

/* ===================== JSON bridge ===================== */

/// Convert a JSON document into a runtime value
pub fn json_to_val(json: &JsonValue) -> Val {
    match json {
        JsonValue::Null => Val::Null,
        JsonValue::Bool(b) => Val::Bool(*b),
        JsonValue::Number(n) => Val::Num(n.as_f64().unwrap_or(0.0)),
        JsonValue::String(s) => Val::Text(s.clone()),
        JsonValue::Array(arr) => Val::List(arr.iter().map(json_to_val).collect()),
        JsonValue::Object(obj) => {
            let mut map = HashMap::new();
            for (key, value) in obj {
                map.insert(key.clone(), json_to_val(value));
            }
            Val::Obj(map)
        }
    }
}

/// Convert a runtime value into JSON
///
/// `Model`/`ToolRef`/`FuncRef` encode as their serde representation; a
/// non-finite number has no JSON encoding and yields `None` (the serializer
/// turns that into `UnsupportedValue`).
pub fn val_to_json(val: &Val) -> Option<JsonValue> {
    match val {
        Val::Null => Some(JsonValue::Null),
        Val::Bool(b) => Some(JsonValue::Bool(*b)),
        Val::Num(n) => serde_json::Number::from_f64(*n).map(JsonValue::Number),
        Val::Text(s) => Some(JsonValue::String(s.clone())),
        Val::List(arr) => {
            let vals: Option<Vec<JsonValue>> = arr.iter().map(val_to_json).collect();
            vals.map(JsonValue::Array)
        }
        Val::Obj(obj) => {
            let mut map = serde_json::Map::new();
            for (key, value) in obj {
                map.insert(key.clone(), val_to_json(value)?);
            }
            Some(JsonValue::Object(map))
        }
        Val::Model(_) | Val::ToolRef(_) | Val::FuncRef(_) => serde_json::to_value(val).ok(),
    }
}
