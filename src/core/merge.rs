//! Deep merging and dotted selection over JSON contexts.

use serde_json::{Map, Value};

/// Deep-merge `delta` into `target`.
///
/// Objects merge key by key, recursively. Arrays and scalars replace
/// whatever was there.
pub fn merge(target: &mut Value, delta: Value) {
    match (target, delta) {
        (Value::Object(existing), Value::Object(delta)) => {
            for (key, value) in delta {
                match existing.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => merge(slot, value),
                    _ => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (target, delta) => *target = delta,
    }
}

/// Select the value at a dotted path. The empty path selects `value` itself.
///
/// Numeric segments index into arrays.
pub fn select<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Wrap `value` so that it sits at the dotted `path` of an otherwise empty
/// object.
pub fn nest(path: &str, value: Value) -> Value {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .fold(value, |inner, segment| {
            let mut map = Map::new();
            map.insert(segment.to_string(), inner);
            Value::Object(map)
        })
}
