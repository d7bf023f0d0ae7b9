//! Optional fields and database binding.
//!
//! RM optional attributes are plain `Option<T>` fields declared with
//! `#[serde(default, skip_serializing_if = "Option::is_none")]`: an absent value is omitted on
//! encode, a missing member or a literal `null` decodes as `None`, and a present value is
//! encoded exactly as `T` would be. An explicitly empty value (`""`, `[]`) stays `Some`.
//!
//! [`ToBind`] is the storage-facing hook: it turns a field into a driver-neutral
//! [`BindValue`] so any SQL layer can bind it without knowing RM types.

use serde::{Deserialize, Serialize};

/// A driver-neutral bind parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BindValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    /// Structured values are bound as their JSON encoding.
    Json(serde_json::Value),
}

/// Conversion of a field into a bind parameter.
pub trait ToBind {
    fn to_bind(&self) -> BindValue;
}

impl<T: ToBind> ToBind for Option<T> {
    fn to_bind(&self) -> BindValue {
        match self {
            Some(value) => value.to_bind(),
            None => BindValue::Null,
        }
    }
}

impl ToBind for String {
    fn to_bind(&self) -> BindValue {
        BindValue::Text(self.clone())
    }
}

impl ToBind for str {
    fn to_bind(&self) -> BindValue {
        BindValue::Text(self.to_owned())
    }
}

impl ToBind for bool {
    fn to_bind(&self) -> BindValue {
        BindValue::Bool(*self)
    }
}

impl ToBind for i64 {
    fn to_bind(&self) -> BindValue {
        BindValue::Integer(*self)
    }
}

impl ToBind for i32 {
    fn to_bind(&self) -> BindValue {
        BindValue::Integer(i64::from(*self))
    }
}

impl ToBind for f64 {
    fn to_bind(&self) -> BindValue {
        BindValue::Real(*self)
    }
}

impl ToBind for serde_json::Value {
    fn to_bind(&self) -> BindValue {
        match self {
            serde_json::Value::Null => BindValue::Null,
            other => BindValue::Json(other.clone()),
        }
    }
}

/// Bind any serialisable RM node as its JSON encoding.
///
/// Falls back to `Null` if the node cannot be encoded (for example an unrecognised family
/// member).
pub fn bind_json<T: Serialize>(value: &T) -> BindValue {
    match serde_json::to_value(value) {
        Ok(json) => json.to_bind(),
        Err(err) => {
            tracing::warn!(error = %err, "value could not be encoded for binding");
            BindValue::Null
        }
    }
}
