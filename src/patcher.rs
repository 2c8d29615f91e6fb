use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation, TestOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{pointer, Error};

/// A single JSON patch (RFC 6902) operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Test { path: String, value: Value },
}

impl PatchOp {
    /// The pointer the operation targets.
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Test { path, .. } => path,
        }
    }

    /// The same operation, addressed from `base` instead of the value it was recorded against.
    pub fn rebased(&self, base: &str) -> PatchOp {
        let mut op = self.clone();
        match &mut op {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Test { path, .. } => *path = pointer::join(base, path),
        }
        op
    }
}

impl TryFrom<&PatchOp> for PatchOperation {
    type Error = Error;

    fn try_from(op: &PatchOp) -> Result<Self, Error> {
        let path = PointerBuf::parse(op.path())
            .map_err(|_| Error::InvalidPointer(op.path().to_owned()))?;
        Ok(match op {
            PatchOp::Add { value, .. } => PatchOperation::Add(AddOperation {
                path,
                value: value.clone(),
            }),
            PatchOp::Remove { .. } => PatchOperation::Remove(RemoveOperation { path }),
            PatchOp::Replace { value, .. } => PatchOperation::Replace(ReplaceOperation {
                path,
                value: value.clone(),
            }),
            PatchOp::Test { value, .. } => PatchOperation::Test(TestOperation {
                path,
                value: value.clone(),
            }),
        })
    }
}

/// Apply operations to `document` in place. Either all operations apply, or none do.
pub fn apply_operations(document: &mut Value, operations: &[PatchOp]) -> Result<(), Error> {
    let patch = operations
        .iter()
        .map(PatchOperation::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    json_patch::patch(document, &patch)?;
    Ok(())
}

/// Apply operations to a copy of `document`, leaving the original untouched.
pub fn apply_to_copy(document: &Value, operations: &[PatchOp]) -> Result<Value, Error> {
    let mut copy = document.clone();
    apply_operations(&mut copy, operations)?;
    Ok(copy)
}

/// Operations applied together for one reason.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationGroup {
    /// Why the operations were applied.
    pub intent: String,
    /// The operations, in application order.
    pub operations: Vec<PatchOp>,
}

/// An accumulator of patch operations over an owned working copy of a value.
///
/// Every applied operation is recorded relative to the root of the working copy. Forking copies
/// both the working copy and the recorded operations, so branches never observe each other.
#[derive(Debug, Clone)]
pub struct JsonPatcher {
    document: Value,
    groups: Vec<OperationGroup>,
}

impl JsonPatcher {
    /// Start recording against `document`.
    pub fn new(document: Value) -> Self {
        Self {
            document,
            groups: vec![],
        }
    }

    /// An independent branch starting from the current state.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// The working copy, with everything applied so far.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Look up a value in the working copy.
    pub fn get(&self, path: &str) -> Option<&Value> {
        match path {
            "" | "/" => Some(&self.document),
            _ => self.document.pointer(path),
        }
    }

    /// Apply `operations` to the working copy and record them under `intent`.
    ///
    /// Nothing is recorded or changed if any operation fails.
    pub fn apply(
        &mut self,
        intent: impl Into<String>,
        operations: Vec<PatchOp>,
    ) -> Result<(), Error> {
        let intent = intent.into();
        apply_operations(&mut self.document, &operations)?;
        tracing::trace!(%intent, operations = operations.len(), "applied operations");
        self.groups.push(OperationGroup { intent, operations });
        Ok(())
    }

    /// Remove every key of the object at `path` that is not in `allowed`.
    ///
    /// Extension keys (`x-...`) are always kept.
    pub fn remove_keys_not_allowed_at(
        &mut self,
        path: &str,
        allowed: &[&str],
        reason: &str,
    ) -> Result<(), Error> {
        let object = self
            .get(path)
            .and_then(Value::as_object)
            .ok_or_else(|| Error::MissingPointer(path.to_owned()))?;
        let operations: Vec<PatchOp> = object
            .keys()
            .filter(|key| !allowed.contains(&key.as_str()) && !key.starts_with("x-"))
            .map(|key| PatchOp::Remove {
                path: pointer::append(path, &[key]),
            })
            .collect();
        if operations.is_empty() {
            return Ok(());
        }
        self.apply(format!("remove keys not allowed {reason}"), operations)
    }

    /// The recorded groups, in application order.
    pub fn groups(&self) -> &[OperationGroup] {
        &self.groups
    }

    /// All recorded operations, rewritten to be addressed from `base`.
    ///
    /// Use this to place operations recorded against a subtree into a larger document, where
    /// the subtree lives at `base`. The order of operations is kept.
    pub fn current_patches_relative_to(&self, base: &str) -> Vec<PatchOp> {
        self.groups
            .iter()
            .flat_map(|group| group.operations.iter())
            .map(|op| op.rebased(base))
            .collect()
    }
}
