//! YAML parsing for user-supplied templates.
//!
//! Templates are parsed with yaml-rust2 and converted to `serde_json::Value`
//! so the rest of the workspace manipulates a single document model and
//! submits JSON to the control-plane CLI.

use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

/// Parse a YAML string into a `serde_json::Value`.
///
/// For multi-document input, returns only the first document. Returns
/// `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| Error::Yaml(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| Error::Yaml(e.to_string()))?;
            Ok(Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(Error::Yaml("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(Error::Yaml("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(Error::Yaml("bad YAML value".to_string())),
    }
}
