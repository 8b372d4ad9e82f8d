use serde_json::{Map, Value};

use crate::config::MODULE;

/// One change to the explorer's flag namespace. Paths are dotted and relative to the
/// namespace, e.g. `gridData.3_4`.
#[derive(Clone, Debug, PartialEq)]
pub enum FlagOp {
    Set { path: String, value: Value },
    Delete { path: String },
}

/// Batched scene update, applied in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScenePatch {
    ops: Vec<FlagOp>,
}

impl ScenePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.push_set(path, value);
        self
    }

    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.push_delete(path);
        self
    }

    pub fn push_set(&mut self, path: impl Into<String>, value: Value) {
        self.ops.push(FlagOp::Set {
            path: path.into(),
            value,
        });
    }

    pub fn push_delete(&mut self, path: impl Into<String>) {
        self.ops.push(FlagOp::Delete { path: path.into() });
    }

    /// Wholesale replacement of a key, deleting first so no stale children survive the merge.
    pub fn replace(self, path: impl Into<String>, value: Value) -> Self {
        let path = path.into();
        self.delete(path.clone()).set(path, value)
    }

    pub fn ops(&self) -> &[FlagOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Document update object in the host's dotted notation, deletions use the `-=key` form.
    pub fn to_update_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        for op in &self.ops {
            match op {
                FlagOp::Set { path, value } => {
                    data.insert(format!("flags.{MODULE}.{path}"), value.clone());
                }
                FlagOp::Delete { path } => {
                    let key = match path.rsplit_once('.') {
                        Some((parent, leaf)) => format!("flags.{MODULE}.{parent}.-={leaf}"),
                        None => format!("flags.{MODULE}.-={path}"),
                    };
                    data.insert(key, Value::Null);
                }
            }
        }
        data
    }

    /// Applies the patch to a flag namespace the way the host merges updates.
    pub fn apply_to(&self, flags: &mut Map<String, Value>) {
        for op in &self.ops {
            match op {
                FlagOp::Set { path, value } => set_path(flags, path, value.clone()),
                FlagOp::Delete { path } => delete_path(flags, path),
            }
        }
    }
}

fn set_path(flags: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => match (flags.get_mut(path), value) {
            // objects merge into existing objects
            (Some(Value::Object(existing)), Value::Object(incoming)) => existing.extend(incoming),
            (_, value) => {
                flags.insert(path.to_string(), value);
            }
        },
        Some((head, rest)) => {
            let child = flags
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}

fn delete_path(flags: &mut Map<String, Value>, path: &str) {
    match path.split_once('.') {
        None => {
            flags.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = flags.get_mut(head) {
                delete_path(child, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_data_uses_dotted_deletion_syntax() {
        let patch = ScenePatch::new()
            .set("gridData.0_0", json!({ "offset": { "i": 0, "j": 0 }, "reveal": true }))
            .delete("gridData.1_0")
            .delete("revealed");
        let data = patch.to_update_data();

        assert!(data.contains_key("flags.world-explorer.gridData.0_0"));
        assert_eq!(data["flags.world-explorer.gridData.-=1_0"], Value::Null);
        assert_eq!(data["flags.world-explorer.-=revealed"], Value::Null);
    }

    #[test]
    fn apply_merges_objects_and_removes_single_entries() {
        let mut flags = json!({ "gridData": { "0_0": 1, "1_0": 2 } })
            .as_object()
            .cloned()
            .unwrap();

        ScenePatch::new()
            .set("gridData", json!({ "2_0": 3 }))
            .delete("gridData.1_0")
            .apply_to(&mut flags);
        assert_eq!(Value::Object(flags.clone()), json!({ "gridData": { "0_0": 1, "2_0": 3 } }));

        ScenePatch::new()
            .replace("gridData", json!({}))
            .apply_to(&mut flags);
        assert_eq!(Value::Object(flags), json!({ "gridData": {} }));
    }
}
