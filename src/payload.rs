use serde_value::Value;
use std::collections::BTreeMap;

/// Free-form structured data attached to messages, proposals and memory records.
pub type Payload = BTreeMap<String, Value>;

/// Build a payload from key/value pairs.
pub fn payload<K, I>(entries: I) -> Payload
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    entries.into_iter().map(|(key, val)| (key.into(), val)).collect()
}

pub fn text<S: Into<String>>(val: S) -> Value {
    Value::String(val.into())
}

pub fn number(val: f64) -> Value {
    Value::F64(val)
}

/// Integer stored as a float: MessagePack reads integers back at their
/// narrowest width, so `U64` would not survive a checkpoint.
pub fn count(val: u64) -> Value {
    number(val as f64)
}

/// Numeric view of a value, if it holds a number.
pub fn as_f64(val: &Value) -> Option<f64> {
    match *val {
        Value::F64(num) => Some(num),
        Value::F32(num) => Some(num as f64),
        Value::U64(num) => Some(num as f64),
        Value::U32(num) => Some(num as f64),
        Value::U16(num) => Some(num as f64),
        Value::U8(num) => Some(num as f64),
        Value::I64(num) => Some(num as f64),
        Value::I32(num) => Some(num as f64),
        Value::I16(num) => Some(num as f64),
        Value::I8(num) => Some(num as f64),
        _ => None,
    }
}

/// Flat `key: value` rendering used for keyword matching and message bodies.
pub fn render(payload: &Payload) -> String {
    let mut out = String::new();
    for (key, val) in payload {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push_str(": ");
        render_value(val, &mut out);
    }
    out
}

fn render_value(val: &Value, out: &mut String) {
    match val {
        Value::String(s) => out.push_str(s),
        Value::Char(c) => out.push(*c),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Unit => out.push_str("null"),
        Value::Option(None) => out.push_str("null"),
        Value::Option(Some(inner)) | Value::Newtype(inner) => render_value(inner, out),
        Value::Seq(items) => {
            out.push('[');
            for (i_item, item) in items.iter().enumerate() {
                if i_item > 0 {
                    out.push_str(", ");
                }
                render_value(item, out);
            }
            out.push(']');
        }
        Value::Map(map) => {
            out.push('{');
            for (i_ent, (key, item)) in map.iter().enumerate() {
                if i_ent > 0 {
                    out.push_str(", ");
                }
                render_value(key, out);
                out.push_str(": ");
                render_value(item, out);
            }
            out.push('}');
        }
        Value::Bytes(bytes) => out.push_str(&format!("<{} bytes>", bytes.len())),
        other => match as_f64(other) {
            Some(num) => out.push_str(&num.to_string()),
            None => out.push_str(&format!("{other:?}")),
        },
    }
}
