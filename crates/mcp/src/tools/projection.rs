// Allow-list projection of Airbnb page data

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Keep only the parts of `value` named by `schema`.
///
/// A schema leaf of `true` keeps the whole subtree; an object schema
/// recurses into matching keys; arrays are projected element-wise. Nulls
/// and containers left empty are dropped, so `None` means nothing survived.
pub fn pick(value: &Value, schema: &Value) -> Option<Value> {
    match (value, schema) {
        (_, Value::Bool(true)) => clean(value),
        (Value::Array(items), Value::Object(_)) => {
            let picked: Vec<Value> = items.iter().filter_map(|item| pick(item, schema)).collect();
            (!picked.is_empty()).then_some(Value::Array(picked))
        }
        (Value::Object(object), Value::Object(fields)) => {
            let mut picked = Map::new();
            for (key, sub_schema) in fields {
                if let Some(sub_value) = object.get(key).and_then(|v| pick(v, sub_schema)) {
                    picked.insert(key.clone(), sub_value);
                }
            }
            (!picked.is_empty()).then_some(Value::Object(picked))
        }
        _ => None,
    }
}

/// Drop nulls and empty containers recursively.
pub fn clean(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.iter().filter_map(clean).collect();
            (!cleaned.is_empty()).then_some(Value::Array(cleaned))
        }
        Value::Object(object) => {
            let cleaned: Map<String, Value> = object
                .iter()
                .filter_map(|(k, v)| clean(v).map(|v| (k.clone(), v)))
                .collect();
            (!cleaned.is_empty()).then_some(Value::Object(cleaned))
        }
        other => Some(other.clone()),
    }
}

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("static pattern is valid"))
}

/// Reduce listing description HTML to plain text.
pub fn html_to_text(html: &str) -> String {
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

    let text = pattern(&BREAKS, r"(?i)<br\s*/?>|</p>|</li>|</h[1-6]>").replace_all(html, "\n");
    let text = pattern(&TAGS, r"<[^>]+>").replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = pattern(&BLANK_LINES, r"\n\s*\n+").replace_all(&text, "\n\n");

    text.lines().map(str::trim_end).collect::<Vec<_>>().join("\n").trim().to_string()
}
