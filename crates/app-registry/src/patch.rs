use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A patch document is a sequence of typed operations against JSON-pointer
/// paths. Structural problems (bad pointer, bad index, type mismatch, failed
/// test) come back as values, never as panics; the mutation pipeline maps
/// them to its malformed-input outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
    Move,
    Copy,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("invalid pointer: {0:?}")]
    InvalidPointer(String),
    #[error("no value at pointer: {0:?}")]
    Missing(String),
    #[error("operation requires a \"value\" member")]
    MissingValue,
    #[error("operation requires a \"from\" member")]
    MissingFrom,
    #[error("invalid array index in pointer: {0:?}")]
    BadIndex(String),
    #[error("cannot descend into a scalar at: {0:?}")]
    NotAContainer(String),
    #[error("test failed at: {0:?}")]
    TestFailed(String),
}

/// Applies every operation in order; the first structural error aborts the
/// whole patch. Callers apply to a copy and only persist on success.
pub fn apply(ops: &[PatchOp], target: &mut Value) -> Result<(), PatchError> {
    for op in ops {
        apply_one(op, target)?;
    }
    Ok(())
}

fn apply_one(op: &PatchOp, target: &mut Value) -> Result<(), PatchError> {
    match op.op {
        PatchOpKind::Add => {
            let value = op.value.clone().ok_or(PatchError::MissingValue)?;
            add(target, &op.path, value)
        }
        PatchOpKind::Replace => {
            let value = op.value.clone().ok_or(PatchError::MissingValue)?;
            replace(target, &op.path, value)
        }
        PatchOpKind::Remove => {
            remove(target, &op.path).map(|_| ())
        }
        PatchOpKind::Move => {
            let from = op.from.as_deref().ok_or(PatchError::MissingFrom)?;
            let value = remove(target, from)?;
            add(target, &op.path, value)
        }
        PatchOpKind::Copy => {
            let from = op.from.as_deref().ok_or(PatchError::MissingFrom)?;
            let value = target
                .pointer(from)
                .cloned()
                .ok_or_else(|| PatchError::Missing(from.to_string()))?;
            add(target, &op.path, value)
        }
        PatchOpKind::Test => {
            let expected = op.value.as_ref().ok_or(PatchError::MissingValue)?;
            let actual = target
                .pointer(&op.path)
                .ok_or_else(|| PatchError::Missing(op.path.clone()))?;
            if actual == expected {
                Ok(())
            } else {
                Err(PatchError::TestFailed(op.path.clone()))
            }
        }
    }
}

fn add(target: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    let (parent_path, token) = split_pointer(path)?;
    let parent = resolve_mut(target, parent_path)?;
    match parent {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if token == "-" {
                items.len()
            } else {
                parse_index(&token, path)?
            };
            if index > items.len() {
                return Err(PatchError::BadIndex(path.to_string()));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(parent_path.to_string())),
    }
}

fn replace(target: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    if path.is_empty() {
        *target = value;
        return Ok(());
    }
    let slot = target
        .pointer_mut(path)
        .ok_or_else(|| PatchError::Missing(path.to_string()))?;
    *slot = value;
    Ok(())
}

fn remove(target: &mut Value, path: &str) -> Result<Value, PatchError> {
    if path.is_empty() {
        return Err(PatchError::InvalidPointer(path.to_string()));
    }
    let (parent_path, token) = split_pointer(path)?;
    let parent = resolve_mut(target, parent_path)?;
    match parent {
        Value::Object(map) => map
            .remove(&token)
            .ok_or_else(|| PatchError::Missing(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(&token, path)?;
            if index >= items.len() {
                return Err(PatchError::Missing(path.to_string()));
            }
            Ok(items.remove(index))
        }
        _ => Err(PatchError::NotAContainer(parent_path.to_string())),
    }
}

fn resolve_mut<'a>(target: &'a mut Value, pointer: &str) -> Result<&'a mut Value, PatchError> {
    target
        .pointer_mut(pointer)
        .ok_or_else(|| PatchError::Missing(pointer.to_string()))
}

/// Splits a pointer into its parent pointer and final (unescaped) token.
/// Escaped `/` inside a token is `~1`, so splitting on the last raw `/` is
/// always correct.
fn split_pointer(path: &str) -> Result<(&str, String), PatchError> {
    if !path.starts_with('/') {
        return Err(PatchError::InvalidPointer(path.to_string()));
    }
    let split_at = path
        .rfind('/')
        .ok_or_else(|| PatchError::InvalidPointer(path.to_string()))?;
    let token = path[split_at + 1..].replace("~1", "/").replace("~0", "~");
    Ok((&path[..split_at], token))
}

fn parse_index(token: &str, path: &str) -> Result<usize, PatchError> {
    token
        .parse::<usize>()
        .map_err(|_| PatchError::BadIndex(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(kind: PatchOpKind, path: &str, value: Option<Value>) -> PatchOp {
        PatchOp {
            op: kind,
            path: path.to_string(),
            value,
            from: None,
        }
    }

    #[test]
    fn replace_overwrites_an_existing_member() {
        let mut doc = json!({ "layout": "FullWidth", "isOnline": false });
        apply(
            &[op(PatchOpKind::Replace, "/isOnline", Some(json!(true)))],
            &mut doc,
        )
        .unwrap_or_else(|error| panic!("apply: {error}"));
        assert_eq!(doc["isOnline"], json!(true));
    }

    #[test]
    fn add_appends_to_an_array_with_dash() {
        let mut doc = json!({ "locations": ["a"] });
        apply(
            &[op(PatchOpKind::Add, "/locations/-", Some(json!("b")))],
            &mut doc,
        )
        .unwrap_or_else(|error| panic!("apply: {error}"));
        assert_eq!(doc["locations"], json!(["a", "b"]));
    }

    #[test]
    fn remove_missing_member_is_a_structural_error() {
        let mut doc = json!({ "layout": "FullWidth" });
        let result = apply(&[op(PatchOpKind::Remove, "/absent", None)], &mut doc);
        assert_eq!(result, Err(PatchError::Missing("/absent".to_string())));
    }

    #[test]
    fn descending_into_a_scalar_is_a_structural_error() {
        let mut doc = json!({ "layout": "FullWidth" });
        let result = apply(
            &[op(PatchOpKind::Add, "/layout/nested", Some(json!(1)))],
            &mut doc,
        );
        assert_eq!(
            result,
            Err(PatchError::NotAContainer("/layout".to_string()))
        );
    }

    #[test]
    fn move_relocates_a_member() {
        let mut doc = json!({ "old": 7 });
        apply(
            &[PatchOp {
                op: PatchOpKind::Move,
                path: "/new".to_string(),
                value: None,
                from: Some("/old".to_string()),
            }],
            &mut doc,
        )
        .unwrap_or_else(|error| panic!("apply: {error}"));
        assert_eq!(doc, json!({ "new": 7 }));
    }

    #[test]
    fn failed_test_aborts_the_patch() {
        let mut doc = json!({ "isOnline": false });
        let result = apply(
            &[
                op(PatchOpKind::Test, "/isOnline", Some(json!(true))),
                op(PatchOpKind::Replace, "/isOnline", Some(json!(true))),
            ],
            &mut doc,
        );
        assert_eq!(result, Err(PatchError::TestFailed("/isOnline".to_string())));
        assert_eq!(doc["isOnline"], json!(false));
    }

    #[test]
    fn escaped_tokens_resolve() {
        let mut doc = json!({ "a/b": 1 });
        apply(&[op(PatchOpKind::Remove, "/a~1b", None)], &mut doc)
            .unwrap_or_else(|error| panic!("apply: {error}"));
        assert_eq!(doc, json!({}));
    }
}
