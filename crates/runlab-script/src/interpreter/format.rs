//! Conversions from runtime values to text and JSON.
//!
//! Three renderings exist:
//! - [`to_display`]: JavaScript `String(value)`
//! - [`to_console`]: what `console.log` prints for one argument
//! - [`snapshot`]: the JSON stored in variable snapshots and results

use indexmap::IndexMap;
use serde_json::json;

use super::error::RuntimeError;
use super::value::{ObjectClass, PromiseState, Value};

/// Containers nested deeper than this are summarised in snapshots.
pub const SNAPSHOT_DEPTH: usize = 8;

/// JavaScript `Number.prototype.toString()` for radix 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{n}");
    }
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
        _ => formatted,
    }
}

fn function_label(name: &str) -> String {
    if name.is_empty() {
        "[Function (anonymous)]".to_string()
    } else {
        format!("[Function: {name}]")
    }
}

fn error_label(props: &IndexMap<String, Value>) -> String {
    let name = props.get("name").map(to_display).unwrap_or_else(|| "Error".to_string());
    match props.get("message").map(to_display) {
        Some(message) if !message.is_empty() => format!("{name}: {message}"),
        _ => name,
    }
}

/// JavaScript `String(value)`.
pub fn to_display(value: &Value) -> String {
    let mut seen = Vec::new();
    display_inner(value, &mut seen)
}

fn display_inner(value: &Value, seen: &mut Vec<*const ()>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::Str(s) => s.to_string(),
        Value::Array(items) => {
            let Some(id) = value.identity() else {
                return String::new();
            };
            if seen.contains(&id) {
                return String::new();
            }
            seen.push(id);
            let parts: Vec<String> = items
                .borrow()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        display_inner(item, seen)
                    }
                })
                .collect();
            seen.pop();
            parts.join(",")
        }
        Value::Object(obj) => {
            let obj = obj.borrow();
            match obj.class {
                ObjectClass::Error => error_label(&obj.props),
                ObjectClass::Plain => "[object Object]".to_string(),
            }
        }
        Value::Function(func) => function_label(&func.name()),
        Value::Promise(_) => "[object Promise]".to_string(),
    }
}

/// Rendering of a single `console.*` argument.
pub fn to_console(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Object(obj) if obj.borrow().class == ObjectClass::Error => to_display(value),
        Value::Array(_) | Value::Object(_) => snapshot(value).to_string(),
        Value::Promise(p) => format!("Promise {{ <{}> }}", p.state_label()),
        other => to_display(other),
    }
}

/// Joins console arguments with single spaces.
pub fn format_console_args(args: &[Value]) -> String {
    args.iter().map(to_console).collect::<Vec<_>>().join(" ")
}

/// Message for an uncaught thrown value.
pub fn describe_thrown(value: &Value) -> String {
    match value {
        Value::Object(obj) if obj.borrow().class == ObjectClass::Error => {
            error_label(&obj.borrow().props)
        }
        other => format!("Uncaught {}", to_console(other)),
    }
}

fn number_json(n: f64) -> serde_json::Value {
    if n.is_nan() {
        return json!("NaN");
    }
    if n.is_infinite() {
        return json!(if n > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return json!(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// JSON form of a value for variable snapshots and results.
///
/// Never fails: `undefined` becomes `null`, non-finite numbers become
/// strings, functions and cycles become descriptive strings, and containers
/// deeper than [`SNAPSHOT_DEPTH`] are summarised.
pub fn snapshot(value: &Value) -> serde_json::Value {
    let mut seen = Vec::new();
    snapshot_inner(value, 0, &mut seen)
}

fn snapshot_inner(value: &Value, depth: usize, seen: &mut Vec<*const ()>) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Number(n) => number_json(*n),
        Value::Str(s) => json!(&**s),
        Value::Array(_) | Value::Object(_) => {
            let Some(id) = value.identity() else {
                return serde_json::Value::Null;
            };
            if seen.contains(&id) {
                return json!("[Circular]");
            }
            if depth >= SNAPSHOT_DEPTH {
                return json!(if matches!(value, Value::Array(_)) { "[Array]" } else { "[Object]" });
            }
            seen.push(id);
            let out = match value {
                Value::Array(items) => serde_json::Value::Array(
                    items
                        .borrow()
                        .iter()
                        .map(|item| snapshot_inner(item, depth + 1, seen))
                        .collect(),
                ),
                Value::Object(obj) => {
                    let map = obj
                        .borrow()
                        .props
                        .iter()
                        .map(|(k, v)| (k.clone(), snapshot_inner(v, depth + 1, seen)))
                        .collect();
                    serde_json::Value::Object(map)
                }
                _ => serde_json::Value::Null,
            };
            seen.pop();
            out
        }
        Value::Function(func) => json!(function_label(&func.name())),
        Value::Promise(p) => match p.state() {
            PromiseState::Pending => json!({ "promise": "pending" }),
            PromiseState::Fulfilled(v) => {
                json!({ "promise": "fulfilled", "value": snapshot_inner(&v, depth + 1, seen) })
            }
            PromiseState::Rejected(v) => {
                json!({ "promise": "rejected", "value": snapshot_inner(&v, depth + 1, seen) })
            }
        },
    }
}

/// `JSON.stringify`. `Ok(None)` is JavaScript's `undefined` result.
pub fn json_stringify(value: &Value, pretty: bool) -> Result<Option<String>, RuntimeError> {
    let mut seen = Vec::new();
    let Some(json) = to_json(value, &mut seen)? else {
        return Ok(None);
    };
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    };
    text.map(Some)
        .map_err(|e| RuntimeError::type_error(format!("JSON serialisation failed: {e}")))
}

fn to_json(value: &Value, seen: &mut Vec<*const ()>) -> Result<Option<serde_json::Value>, RuntimeError> {
    let json = match value {
        Value::Undefined | Value::Function(_) => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Number(n) if n.is_finite() => number_json(*n),
        Value::Number(_) => serde_json::Value::Null,
        Value::Str(s) => json!(&**s),
        Value::Promise(_) => json!({}),
        Value::Array(_) | Value::Object(_) => {
            let Some(id) = value.identity() else {
                return Ok(None);
            };
            if seen.contains(&id) {
                return Err(RuntimeError::type_error("Converting circular structure to JSON"));
            }
            seen.push(id);
            let out = match value {
                Value::Array(items) => {
                    let items = items.borrow().clone();
                    let mut out = Vec::with_capacity(items.len());
                    for item in &items {
                        out.push(to_json(item, seen)?.unwrap_or(serde_json::Value::Null));
                    }
                    serde_json::Value::Array(out)
                }
                Value::Object(obj) => {
                    let props = obj.borrow().props.clone();
                    let mut map = serde_json::Map::new();
                    for (key, item) in &props {
                        if let Some(json) = to_json(item, seen)? {
                            map.insert(key.clone(), json);
                        }
                    }
                    serde_json::Value::Object(map)
                }
                _ => serde_json::Value::Null,
            };
            seen.pop();
            out
        }
    };
    Ok(Some(json))
}

/// `JSON.parse` result conversion.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_json(v)))
                .collect(),
        ),
    }
}
