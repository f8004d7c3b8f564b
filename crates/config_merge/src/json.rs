//! Flat string-keyed JSON objects.

use crate::{MergeError, Merged};
use serde_json::{Map, Number, Value};
use std::path::Path;
use weaver_types::ConfigurationItem;

/// Converts incoming text to the type of the value it replaces, falling
/// back to a string when it does not parse as that type.
fn coerce(existing: Option<&Value>, text: &str) -> Value {
    match existing {
        Some(Value::Bool(_)) => match text.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text.to_string()),
        },
        Some(Value::Number(_)) => {
            let trimmed = text.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(n) = trimmed.parse::<u64>() {
                Value::Number(n.into())
            } else if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(n)
            } else {
                Value::String(text.to_string())
            }
        }
        _ => Value::String(text.to_string()),
    }
}

pub(crate) fn merge(
    path: &Path,
    existing: Option<&str>,
    items: &[ConfigurationItem],
    load_existing: bool,
) -> Result<Merged, MergeError> {
    let mut object = match existing {
        Some(text) if load_existing && !text.trim().is_empty() => {
            match serde_json::from_str::<Value>(text)
                .map_err(|e| MergeError::InvalidJson(path.to_path_buf(), e))?
            {
                Value::Object(map) => map,
                _ => return Err(MergeError::NotAnObject(path.to_path_buf())),
            }
        }
        _ => Map::new(),
    };

    let mut changed = existing.is_none() || !load_existing;
    for item in items {
        let incoming = coerce(object.get(&item.key), &item.value);
        if object.get(&item.key) != Some(&incoming) {
            object.insert(item.key.clone(), incoming);
            changed = true;
        }
    }

    if !changed {
        return Ok(Merged {
            contents: existing.unwrap_or_default().to_string(),
            item_errors: Vec::new(),
        });
    }

    let mut contents = serde_json::to_string_pretty(&Value::Object(object))
        .map_err(|e| MergeError::JsonWrite(path.to_path_buf(), e))?;
    contents.push('\n');

    Ok(Merged {
        contents,
        item_errors: Vec::new(),
    })
}
