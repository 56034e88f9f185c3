//! Tagged partial-update operations.
//!
//! A [`Patch`] is an ordered list of field-level operations applied to a
//! single document. Every backend applies patches through [`Patch::apply`],
//! so list semantics are identical across stores:
//!
//! - `Push` is add-to-set: an element already present is not appended again,
//!   which keeps retried two-step writes from duplicating ids.
//! - `Pull` removes every element equal to the value.
//! - `Increment` treats an absent field as zero.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::document::{self, Document, ID_FIELD};
use crate::error::{DiveLogResult, StorageError, ValidationError};
use crate::EntityId;

/// One field-level update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum UpdateOp {
    Set { field: String, value: Value },
    Unset { field: String },
    Push { field: String, value: Value },
    Pull { field: String, value: Value },
    Increment { field: String, by: f64 },
}

impl UpdateOp {
    pub fn field(&self) -> &str {
        match self {
            UpdateOp::Set { field, .. }
            | UpdateOp::Unset { field }
            | UpdateOp::Push { field, .. }
            | UpdateOp::Pull { field, .. }
            | UpdateOp::Increment { field, .. } => field,
        }
    }
}

/// An ordered set of updates against one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<UpdateOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset {
            field: field.into(),
        });
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Push {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn pull(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Pull {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn push_id(self, field: impl Into<String>, id: EntityId) -> Self {
        self.push(field, id)
    }

    pub fn pull_id(self, field: impl Into<String>, id: EntityId) -> Self {
        self.pull(field, id)
    }

    pub fn increment(mut self, field: impl Into<String>, by: f64) -> Self {
        self.ops.push(UpdateOp::Increment {
            field: field.into(),
            by,
        });
        self
    }

    /// Append a prebuilt operation.
    pub fn with(mut self, op: UpdateOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Append all operations of `other` after this patch's.
    pub fn merge(mut self, other: Patch) -> Self {
        self.ops.extend(other.ops);
        self
    }

    /// Build `Set` operations from every populated field of a partial entity.
    ///
    /// Entities skip `None` fields when serialized, so only the fields the
    /// caller filled in become updates. The identifier is never patched.
    ///
    /// # Errors
    /// Returns `StorageError::Serialization` if the value does not serialize
    /// to a JSON object.
    pub fn from_partial<T: Serialize>(partial: &T) -> DiveLogResult<Self> {
        let value = serde_json::to_value(partial).map_err(|e| StorageError::Serialization {
            resource: std::any::type_name::<T>().to_string(),
            reason: e.to_string(),
        })?;
        let Value::Object(fields) = value else {
            return Err(StorageError::Serialization {
                resource: std::any::type_name::<T>().to_string(),
                reason: "partial update must serialize to an object".to_string(),
            }
            .into());
        };
        let ops = fields
            .into_iter()
            .filter(|(field, _)| field != ID_FIELD)
            .map(|(field, value)| UpdateOp::Set { field, value })
            .collect();
        Ok(Self { ops })
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The value the patch finally assigns to `field`, if any.
    pub fn set_value(&self, field: &str) -> Option<&Value> {
        self.ops.iter().rev().find_map(|op| match op {
            UpdateOp::Set { field: f, value } if f == field => Some(value),
            _ => None,
        })
    }

    /// Rewrite every `Set` of `field` in place.
    pub fn map_set_values(
        &mut self,
        field: &str,
        mut f: impl FnMut(&Value) -> DiveLogResult<Value>,
    ) -> DiveLogResult<()> {
        for op in &mut self.ops {
            if let UpdateOp::Set { field: name, value } = op {
                if name == field {
                    *value = f(value)?;
                }
            }
        }
        Ok(())
    }

    /// Whether any operation targets `field`.
    pub fn touches(&self, field: &str) -> bool {
        self.ops.iter().any(|op| op.field() == field)
    }

    /// Apply every operation, in order, to `doc`.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidPatch` when an operation targets the
    /// identifier or a field of the wrong shape. The document may be partially
    /// updated in that case; callers apply patches to a copy.
    pub fn apply(&self, doc: &mut Document) -> Result<(), ValidationError> {
        for op in &self.ops {
            apply_op(op, doc)?;
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidPatch {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn apply_op(op: &UpdateOp, doc: &mut Document) -> Result<(), ValidationError> {
    let field = op.field();
    if field == ID_FIELD {
        return Err(invalid(field, "the identifier cannot be modified"));
    }

    match op {
        UpdateOp::Set { value, .. } => {
            let slot = document::get_path_mut_or_insert(doc, field)
                .ok_or_else(|| invalid(field, "parent is not an object"))?;
            *slot = value.clone();
        }
        UpdateOp::Unset { .. } => {
            document::remove_path(doc, field);
        }
        UpdateOp::Push { value, .. } => {
            let slot = document::get_path_mut_or_insert(doc, field)
                .ok_or_else(|| invalid(field, "parent is not an object"))?;
            match slot {
                Value::Null => *slot = Value::Array(vec![value.clone()]),
                Value::Array(items) => {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
                _ => return Err(invalid(field, "not a list")),
            }
        }
        UpdateOp::Pull { value, .. } => {
            let Some(slot) = document::get_path_mut(doc, field) else {
                return Ok(());
            };
            match slot {
                Value::Null => {}
                Value::Array(items) => items.retain(|item| item != value),
                _ => return Err(invalid(field, "not a list")),
            }
        }
        UpdateOp::Increment { by, .. } => {
            let slot = document::get_path_mut_or_insert(doc, field)
                .ok_or_else(|| invalid(field, "parent is not an object"))?;
            let next = match slot {
                Value::Null => number(*by),
                Value::Number(n) => match (n.as_i64(), whole_i64(*by)) {
                    (Some(i), Some(step)) => Some(Value::from(
                        i.checked_add(step)
                            .ok_or_else(|| invalid(field, "integer overflow"))?,
                    )),
                    _ => number(n.as_f64().unwrap_or(0.0) + by),
                },
                _ => return Err(invalid(field, "not a number")),
            };
            *slot = next.ok_or_else(|| invalid(field, "result is not a finite number"))?;
        }
    }
    Ok(())
}

/// `x` as an `i64` when it is a whole number inside the `i64` range.
fn whole_i64(x: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    (x.fract() == 0.0 && (-LIMIT..LIMIT).contains(&x)).then_some(x as i64)
}

fn number(x: f64) -> Option<Value> {
    Number::from_f64(x).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_set_creates_nested_fields() {
        let mut d = doc(json!({ "name": "a" }));
        Patch::new()
            .set("name", "b")
            .set("clubs.manager", json!([]))
            .apply(&mut d)
            .unwrap();
        assert_eq!(d["name"], json!("b"));
        assert_eq!(d["clubs"]["manager"], json!([]));
    }

    #[test]
    fn test_increment_overflow_is_rejected() {
        let mut d = doc(json!({ "count": i64::MAX }));
        let err = Patch::new().increment("count", 1.0).apply(&mut d).unwrap_err();
        assert!(err.to_string().contains("integer overflow"));
        assert_eq!(d["count"], json!(i64::MAX));

        let mut d = doc(json!({ "count": 1 }));
        Patch::new().increment("count", 1e300).apply(&mut d).unwrap();
        assert_eq!(d["count"].as_f64(), Some(1e300));

        let mut d = doc(json!({ "count": 3 }));
        Patch::new().increment("count", -5.0).apply(&mut d).unwrap();
        assert_eq!(d["count"], json!(-2));
    }

    #[test]
    fn test_push_is_add_to_set() {
        let mut d = doc(json!({ "friends": ["a"] }));
        let patch = Patch::new().push("friends", "b").push("friends", "a");
        patch.apply(&mut d).unwrap();
        patch.apply(&mut d).unwrap();
        assert_eq!(d["friends"], json!(["a", "b"]));
    }

    #[test]
    fn test_push_onto_missing_list_creates_it() {
        let mut d = Document::new();
        Patch::new()
            .push("friendRequests.sent", "x")
            .apply(&mut d)
            .unwrap();
        assert_eq!(d["friendRequests"]["sent"], json!(["x"]));
    }

    #[test]
    fn test_pull_removes_all_and_tolerates_absence() {
        let mut d = doc(json!({ "gear": ["a", "b", "a"] }));
        Patch::new()
            .pull("gear", "a")
            .pull("dives", "z")
            .apply(&mut d)
            .unwrap();
        assert_eq!(d["gear"], json!(["b"]));
        assert!(!d.contains_key("dives"));
    }

    #[test]
    fn test_increment_from_absent_and_existing() {
        let mut d = doc(json!({ "count": 2 }));
        Patch::new()
            .increment("count", 3.0)
            .increment("depth", 1.5)
            .apply(&mut d)
            .unwrap();
        assert_eq!(d["count"], json!(5));
        assert_eq!(d["depth"], json!(1.5));
    }

    #[test]
    fn test_push_onto_scalar_is_rejected() {
        let mut d = doc(json!({ "name": "a" }));
        let err = Patch::new().push("name", "b").apply(&mut d).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPatch { .. }));
    }

    #[test]
    fn test_identifier_is_immutable() {
        let mut d = doc(json!({ "id": "x" }));
        assert!(Patch::new().set("id", "y").apply(&mut d).is_err());
    }

    #[test]
    fn test_from_partial_skips_identifier() {
        #[derive(Serialize)]
        struct Partial {
            id: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            name: Option<&'static str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            email: Option<&'static str>,
        }
        let patch = Patch::from_partial(&Partial {
            id: "x",
            name: Some("n"),
            email: None,
        })
        .unwrap();
        assert_eq!(patch.ops().len(), 1);
        assert_eq!(patch.set_value("name"), Some(&json!("n")));
        assert!(!patch.touches("email"));
    }

    #[test]
    fn test_map_set_values_rewrites_assignments() {
        let mut patch = Patch::new().set("password", "plain").push("friends", "a");
        patch
            .map_set_values("password", |v| Ok(json!(format!("hashed:{}", v.as_str().unwrap()))))
            .unwrap();
        assert_eq!(patch.set_value("password"), Some(&json!("hashed:plain")));
    }
}
