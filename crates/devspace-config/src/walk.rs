//! Recursive traversal of untyped YAML documents.

use serde_yaml::Value;

/// Visit every scalar string in `doc` and replace the ones `matches` accepts.
///
/// `matches` receives the key the scalar sits under (sequence elements use
/// their parent's key, the root uses `""`) and the string itself. Replaced
/// nodes are not visited again. Mapping keys are never touched.
pub fn walk<M, R, E>(doc: &mut Value, mut matches: M, mut replace: R) -> Result<(), E>
where
    M: FnMut(&str, &str) -> bool,
    R: FnMut(&str) -> Result<Value, E>,
{
    walk_node("", doc, &mut matches, &mut replace)
}

fn walk_node<M, R, E>(key: &str, node: &mut Value, matches: &mut M, replace: &mut R) -> Result<(), E>
where
    M: FnMut(&str, &str) -> bool,
    R: FnMut(&str) -> Result<Value, E>,
{
    match node {
        Value::Mapping(map) => {
            for (k, v) in map.iter_mut() {
                let key = key_string(k);
                walk_node(&key, v, matches, replace)?;
            }
        }
        Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                walk_node(key, item, matches, replace)?;
            }
        }
        Value::Tagged(tagged) => walk_node(key, &mut tagged.value, matches, replace)?,
        Value::String(s) => {
            if matches(key, s) {
                let replacement = replace(s)?;
                *node = replacement;
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}
