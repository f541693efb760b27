//! Translation between JSON values and `nodes` rows.
//!
//! A write is first planned as a list of [`Op`]s against rows, outside the
//! database thread, so every validation error surfaces before anything is
//! touched. Reads collect the rows of a subtree and [`assemble`] them back
//! into one value.

use agenda_core::path::DocPath;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// One row-level step of a planned write.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
  /// Delete the row at the path and every row below it.
  DeleteSubtree(DocPath),
  /// Set (or, for `null`, clear) one scalar field of a row.
  SetField { row: DocPath, key: String, value: Value },
  /// Insert a row of scalar fields.
  InsertRow { row: DocPath, fields: Map<String, Value> },
}

/// Plan replacing the subtree at `path` with `value`.
pub fn plan_set(path: &DocPath, value: &Value, ops: &mut Vec<Op>) -> Result<()> {
  ops.push(Op::DeleteSubtree(path.clone()));
  match value {
    Value::Object(map) => {
      clear_in_parent(path, ops);
      flatten(path, map, ops)
    }
    Value::Null => {
      clear_in_parent(path, ops);
      Ok(())
    }
    scalar => {
      let (row, key) = split(path).ok_or(Error::ScalarAtRoot)?;
      ops.push(Op::SetField { row, key, value: scalar.clone() });
      Ok(())
    }
  }
}

/// Plan a merge of `fields` into the object at `path`. Keys may be nested
/// paths (`a/b`).
pub fn plan_update(path: &DocPath, fields: &Map<String, Value>, ops: &mut Vec<Op>) -> Result<()> {
  for (key, value) in fields {
    let child = key
      .split('/')
      .filter(|s| !s.is_empty())
      .try_fold(path.clone(), |p, segment| p.child(segment))?;
    if child == *path {
      return Err(agenda_core::Error::InvalidPathSegment(key.clone()).into());
    }
    plan_set(&child, value, ops)?;
  }
  Ok(())
}

fn clear_in_parent(path: &DocPath, ops: &mut Vec<Op>) {
  if let Some((row, key)) = split(path) {
    ops.push(Op::SetField { row, key, value: Value::Null });
  }
}

fn flatten(path: &DocPath, map: &Map<String, Value>, ops: &mut Vec<Op>) -> Result<()> {
  let mut fields = Map::new();
  for (key, value) in map {
    let child = path.child(key)?;
    match value {
      Value::Null => {}
      Value::Object(inner) => flatten(&child, inner, ops)?,
      scalar => {
        fields.insert(key.clone(), scalar.clone());
      }
    }
  }
  if !fields.is_empty() {
    ops.push(Op::InsertRow { row: path.clone(), fields });
  }
  Ok(())
}

fn split(path: &DocPath) -> Option<(DocPath, String)> {
  Some((path.parent()?, path.key()?.to_owned()))
}

/// Rebuild the value at `root` from the rows at and below it.
///
/// `rows` holds `(path, fields)` pairs; paths outside the subtree are ignored.
/// Returns `None` when the rows hold nothing.
pub fn assemble(root: &DocPath, rows: Vec<(String, Map<String, Value>)>) -> Option<Value> {
  let mut tree = Map::new();
  for (path, fields) in rows {
    let Some(rel) = relative(root, &path) else {
      continue;
    };
    let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
    insert_at(&mut tree, &segments, fields);
  }
  (!tree.is_empty()).then_some(Value::Object(tree))
}

fn relative<'a>(root: &DocPath, path: &'a str) -> Option<&'a str> {
  if root.is_root() {
    return Some(path);
  }
  let rest = path.strip_prefix(root.as_str())?;
  if rest.is_empty() || rest.starts_with('/') { Some(rest) } else { None }
}

fn insert_at(node: &mut Map<String, Value>, segments: &[&str], fields: Map<String, Value>) {
  match segments.split_first() {
    None => {
      // Child rows win over a stale scalar of the same name.
      for (key, value) in fields {
        node.entry(key).or_insert(value);
      }
    }
    Some((head, rest)) => {
      let entry = node
        .entry((*head).to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
      if !entry.is_object() {
        *entry = Value::Object(Map::new());
      }
      if let Value::Object(child) = entry {
        insert_at(child, rest, fields);
      }
    }
  }
}
