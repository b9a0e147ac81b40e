//! Document parsing into a JSON tree.
//!
//! Every supported format is lowered to `serde_json::Value` so that path
//! lookup and field conversion are format-independent.

use serde_json::{Map, Number, Value as Json};

use crate::{DocumentFormat, Error, Result};

/// Parse `text`, collecting notes about values that had to be altered.
pub(crate) fn parse(text: &str, format: DocumentFormat, notes: &mut Vec<String>) -> Result<Json> {
    let malformed = |reason: String| Error::MalformedDocument { format, reason };
    match format {
        DocumentFormat::Json => serde_json::from_str(text).map_err(|e| malformed(e.to_string())),
        DocumentFormat::Toml => {
            let table: toml::Table = toml::from_str(text).map_err(|e| malformed(e.to_string()))?;
            Ok(toml_to_json(toml::Value::Table(table), "", notes))
        }
    }
}

/// TOML datetimes become their textual form; they are read back by the
/// timestamp parser like any other string. Non-finite floats have no JSON
/// form and become null.
fn toml_to_json(value: toml::Value, path: &str, notes: &mut Vec<String>) -> Json {
    let child = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };
    match value {
        toml::Value::String(s) => Json::String(s),
        toml::Value::Integer(n) => Json::Number(n.into()),
        toml::Value::Float(x) => Number::from_f64(x).map_or_else(
            || {
                notes.push(format!("non-finite float {x} at '{path}' read as null"));
                Json::Null
            },
            Json::Number,
        ),
        toml::Value::Boolean(b) => Json::Bool(b),
        toml::Value::Datetime(dt) => Json::String(dt.to_string()),
        toml::Value::Array(items) => Json::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| toml_to_json(v, &child(&i.to_string()), notes))
                .collect(),
        ),
        toml::Value::Table(table) => Json::Object(
            table
                .into_iter()
                .map(|(k, v)| {
                    let value = toml_to_json(v, &child(&k), notes);
                    (k, value)
                })
                .collect::<Map<_, _>>(),
        ),
    }
}

/// Resolve a dotted path. The empty path is the value itself.
pub(crate) fn lookup<'a>(value: &'a Json, path: &str) -> Option<&'a Json> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.')
        .try_fold(value, |node, segment| node.as_object()?.get(segment))
}

/// First segment of a dotted path, i.e. the entry key it consumes.
pub(crate) fn root(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

/// Short name of a JSON node's type, for diagnostics.
pub(crate) fn type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_toml_lowering() {
        let mut notes = Vec::new();
        let doc = parse(
            r#"
[[records]]
entity = "odeon"
timestamp = 1979-05-27T07:32:00Z
seats = 120
ratio = 1.85
level = nan
"#,
            DocumentFormat::Toml,
            &mut notes,
        )
        .unwrap();

        assert_eq!(
            doc,
            json!({
                "records": [{
                    "entity": "odeon",
                    "timestamp": "1979-05-27T07:32:00Z",
                    "seats": 120,
                    "ratio": 1.85,
                    "level": null,
                }]
            })
        );
        assert_eq!(notes, vec!["non-finite float NaN at 'records.0.level' read as null"]);
    }

    #[test]
    fn test_malformed_json() {
        let err = parse("{\"records\": [", DocumentFormat::Json, &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedDocument {
                format: DocumentFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_lookup_paths() {
        let doc = json!({"a": {"b": {"c": 3}}, "x": [1]});
        assert_eq!(lookup(&doc, "a.b.c"), Some(&json!(3)));
        assert_eq!(lookup(&doc, ""), Some(&doc));
        assert_eq!(lookup(&doc, "a.missing"), None);
        assert_eq!(lookup(&doc, "x.0"), None);
        assert_eq!(root("a.b.c"), "a");
    }
}
