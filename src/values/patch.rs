// src/values/patch.rs

//! Structural edits to a values tree, as emitted by hooks.
//!
//! A patch is an ordered list of `add`/`replace`/`remove` operations with
//! slash-separated paths (`/global/discovery/replicas`). Operations apply
//! in order; the first failing operation rejects the whole patch. Hooks
//! write patches as JSON lines or a JSON array; both parse here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
}

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: PatchOpKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// An ordered list of patch operations applied atomically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesPatch {
    pub ops: Vec<PatchOp>,
}

impl ValuesPatch {
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Parse hook patch output: either a JSON array of operations or one
    /// JSON operation object per line
    pub fn from_hook_output(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::PatchInvalid(format!("patch file is not UTF-8: {}", e)))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        if trimmed.starts_with('[') {
            let ops: Vec<PatchOp> = serde_json::from_str(trimmed)
                .map_err(|e| Error::PatchInvalid(format!("cannot parse patch array: {}", e)))?;
            return Ok(Self { ops });
        }
        let mut ops = Vec::new();
        for line in trimmed.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let op: PatchOp = serde_json::from_str(line)
                .map_err(|e| Error::PatchInvalid(format!("cannot parse patch line: {}", e)))?;
            ops.push(op);
        }
        Ok(Self { ops })
    }

    /// Apply all operations to `target` in order. The first failure
    /// aborts with an error; callers apply to a scratch clone to keep
    /// rejection free of side effects.
    pub fn apply(&self, target: &mut Value) -> Result<()> {
        for op in &self.ops {
            apply_op(target, op)?;
        }
        Ok(())
    }

    /// Apply to a copy of `values`, returning the patched tree
    pub fn apply_to(&self, values: &super::Values) -> Result<super::Values> {
        let mut scratch = values.as_value();
        self.apply(&mut scratch)?;
        super::Values::from_value(scratch)
            .map_err(|e| Error::PatchInvalid(format!("patch produced a non-object root: {}", e)))
    }
}

fn apply_op(target: &mut Value, op: &PatchOp) -> Result<()> {
    let segments = parse_path(&op.path)?;
    let (parent_path, last) = segments
        .split_last()
        .map(|(l, p)| (p, l))
        .ok_or_else(|| Error::PatchInvalid("empty patch path".to_string()))?;

    let parent = navigate_mut(target, parent_path)
        .ok_or_else(|| Error::PatchInvalid(format!("path '{}' has no parent", op.path)))?;

    match op.op {
        PatchOpKind::Add => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| Error::PatchInvalid(format!("add '{}' without a value", op.path)))?;
            match parent {
                Value::Object(map) => {
                    map.insert(last.clone(), value);
                }
                Value::Array(items) => {
                    if last == "-" {
                        items.push(value);
                    } else {
                        let idx = parse_index(last, &op.path)?;
                        if idx > items.len() {
                            return Err(Error::PatchInvalid(format!(
                                "add index {} out of bounds at '{}'",
                                idx, op.path
                            )));
                        }
                        items.insert(idx, value);
                    }
                }
                _ => {
                    return Err(Error::PatchInvalid(format!(
                        "cannot add into a scalar at '{}'",
                        op.path
                    )))
                }
            }
        }
        PatchOpKind::Replace => {
            let value = op.value.clone().ok_or_else(|| {
                Error::PatchInvalid(format!("replace '{}' without a value", op.path))
            })?;
            match parent {
                Value::Object(map) => {
                    let slot = map.get_mut(last.as_str()).ok_or_else(|| {
                        Error::PatchInvalid(format!("replace of missing path '{}'", op.path))
                    })?;
                    *slot = value;
                }
                Value::Array(items) => {
                    let idx = parse_index(last, &op.path)?;
                    let slot = items.get_mut(idx).ok_or_else(|| {
                        Error::PatchInvalid(format!("replace index {} out of bounds", idx))
                    })?;
                    *slot = value;
                }
                _ => {
                    return Err(Error::PatchInvalid(format!(
                        "cannot replace inside a scalar at '{}'",
                        op.path
                    )))
                }
            }
        }
        PatchOpKind::Remove => match parent {
            Value::Object(map) => {
                map.remove(last.as_str()).ok_or_else(|| {
                    Error::PatchInvalid(format!("remove of missing path '{}'", op.path))
                })?;
            }
            Value::Array(items) => {
                let idx = parse_index(last, &op.path)?;
                if idx >= items.len() {
                    return Err(Error::PatchInvalid(format!(
                        "remove index {} out of bounds at '{}'",
                        idx, op.path
                    )));
                }
                items.remove(idx);
            }
            _ => {
                return Err(Error::PatchInvalid(format!(
                    "cannot remove from a scalar at '{}'",
                    op.path
                )))
            }
        },
    }

    Ok(())
}

fn parse_path(path: &str) -> Result<Vec<String>> {
    if !path.starts_with('/') {
        return Err(Error::PatchInvalid(format!(
            "patch path '{}' must start with '/'",
            path
        )));
    }
    Ok(path[1..]
        .split('/')
        .map(|seg| seg.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn parse_index(segment: &str, path: &str) -> Result<usize> {
    segment
        .parse::<usize>()
        .map_err(|_| Error::PatchInvalid(format!("'{}' is not an array index in '{}'", segment, path)))
}

fn navigate_mut<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment.as_str())?,
            Value::Array(items) => {
                let idx = segment.parse::<usize>().ok()?;
                items.get_mut(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}
