//! Variant registries.
//!
//! Each family owns one immutable [`Registry`] mapping a discriminator to the decode functions
//! of the member it names. Registries are built lazily on first use and never mutated
//! afterwards, so concurrent readers need no locking.

use crate::config::ROOT_PATH;
use crate::node::RmType;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// A member decode failure, located relative to the member's own root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberError {
    pub path: String,
    pub message: String,
}

impl MemberError {
    fn from_path_error<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> Self {
        let path = member_path(&err.path().to_string());
        Self {
            path,
            message: err.into_inner().to_string(),
        }
    }
}

/// Convert a `serde_path_to_error` path (`.` for the root, `items[0].value` otherwise) into
/// the `$`-rooted form used throughout the crate.
pub(crate) fn member_path(raw: &str) -> String {
    if raw.is_empty() || raw == "." {
        ROOT_PATH.to_owned()
    } else {
        format!("{ROOT_PATH}.{raw}")
    }
}

type FromValue<F> = fn(Value) -> Result<F, MemberError>;
type FromSlice<F> = fn(&[u8]) -> Result<F, MemberError>;

/// Decode functions for one family member.
pub struct Variant<F> {
    name: &'static str,
    from_value: FromValue<F>,
    from_slice: FromSlice<F>,
}

impl<F> Variant<F> {
    /// Descriptor for member `M` of family `F`.
    pub fn of<M>() -> Self
    where
        M: RmType + DeserializeOwned + Into<F>,
    {
        Self {
            name: M::TYPE_NAME,
            from_value: member_from_value::<M, F>,
            from_slice: member_from_slice::<M, F>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fully decode an in-memory value into this member.
    pub fn decode_value(&self, value: Value) -> Result<F, MemberError> {
        (self.from_value)(value)
    }

    /// Fully decode serialised bytes into this member.
    pub fn decode_slice(&self, bytes: &[u8]) -> Result<F, MemberError> {
        (self.from_slice)(bytes)
    }
}

fn member_from_value<M, F>(value: Value) -> Result<F, MemberError>
where
    M: DeserializeOwned + Into<F>,
{
    serde_path_to_error::deserialize::<_, M>(value)
        .map(Into::into)
        .map_err(MemberError::from_path_error)
}

fn member_from_slice<M, F>(bytes: &[u8]) -> Result<F, MemberError>
where
    M: DeserializeOwned + Into<F>,
{
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let member: M = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(MemberError::from_path_error)?;
    deserializer.end().map_err(|err| MemberError {
        path: ROOT_PATH.to_owned(),
        message: err.to_string(),
    })?;
    Ok(member.into())
}

/// Discriminator => member table for one family.
pub struct Registry<F: 'static> {
    family: &'static str,
    default: &'static str,
    variants: Vec<Variant<F>>,
    index: HashMap<&'static str, usize>,
}

impl<F> Registry<F> {
    /// Build a registry. `default` names the member applied when `_type` is absent and must be
    /// one of `variants`.
    pub fn new(family: &'static str, default: &'static str, variants: Vec<Variant<F>>) -> Self {
        let index = variants
            .iter()
            .enumerate()
            .map(|(position, variant)| (variant.name, position))
            .collect::<HashMap<_, _>>();
        debug_assert!(
            index.contains_key(default),
            "default member {default} is not registered in {family}"
        );
        Self {
            family,
            default,
            variants,
            index,
        }
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Member applied when `_type` is absent.
    pub fn default_member(&self) -> &'static str {
        self.default
    }

    /// Resolve a discriminator (or its absence) to a member; `None` if unrecognised.
    pub fn resolve(&self, type_tag: Option<&str>) -> Option<&Variant<F>> {
        let name = type_tag.unwrap_or(self.default);
        self.index
            .get(name)
            .and_then(|position| self.variants.get(*position))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Member names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.variants.iter().map(|variant| variant.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_paths_are_rooted() {
        assert_eq!(member_path("."), "$");
        assert_eq!(member_path(""), "$");
        assert_eq!(member_path("items[0].value"), "$.items[0].value");
    }
}
