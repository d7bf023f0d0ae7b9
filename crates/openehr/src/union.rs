//! Tagged union codec.
//!
//! A family (DATA_VALUE, ITEM, OBJECT_ID, ...) is a closed enum with one variant per concrete
//! member plus `Unknown`, declared once with [`rm_union!`]. Decoding peeks `_type`, resolves it
//! in the family's [`Registry`], and only then decodes the payload into the resolved member.
//! An unrecognised discriminator is not an error: it decodes to `Unknown(tag)` so newer data
//! survives older readers, and the validator reports it. Encoding delegates to the active
//! member and refuses `Unknown`.

use crate::discriminator::{extract_discriminator, peek_discriminator};
use crate::error::DecodeError;
use crate::node::{Node, RmType};
use crate::registry::Registry;
use serde_json::Value;

/// Stack kept free before a family member is decoded. Decoding recurses once per JSON level
/// and buffers every member, so deep documents continue on a fresh segment rather than
/// overflowing the caller's stack.
const STACK_RED_ZONE: usize = 1024 * 1024;
const STACK_SEGMENT: usize = 8 * 1024 * 1024;

/// Run `f` with at least [`STACK_RED_ZONE`] bytes of stack available.
pub(crate) fn with_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, f)
}

/// A closed family of RM members.
pub trait Family: Node + RmType + Sized + 'static {
    /// The family's immutable member registry.
    fn registry() -> &'static Registry<Self>;

    /// An unrecognised member carrying only its discriminator.
    fn unknown(type_tag: String) -> Self;

    /// Discriminator of the active member; `None` if unrecognised.
    fn kind(&self) -> Option<&'static str>;
}

/// Implemented by every member type for each family it belongs to.
pub trait Member<F>: Sized {
    fn from_family(family: &F) -> Option<&Self>;
    fn from_family_mut(family: &mut F) -> Option<&mut Self>;
}

/// Decode an in-memory value into family `F`; the error is a display message because this runs
/// inside serde `Deserialize` impls of nested slots.
pub(crate) fn from_value<F: Family>(value: Value) -> Result<F, String> {
    let registry = F::registry();
    let tag = peek_discriminator(&value)?.map(str::to_owned);

    match registry.resolve(tag.as_deref()) {
        Some(variant) => {
            if tag.is_none() {
                tracing::debug!(
                    family = F::TYPE_NAME,
                    member = variant.name(),
                    "`_type` absent; applying family default"
                );
            }
            variant.decode_value(value).map_err(|err| {
                format!(
                    "{} member {} (at {}): {}",
                    F::TYPE_NAME,
                    variant.name(),
                    err.path,
                    err.message
                )
            })
        }
        None => Ok(unknown_member::<F>(tag.unwrap_or_default())),
    }
}

/// Decode serialised JSON bytes directly into family `F`.
pub(crate) fn from_slice<F: Family>(bytes: &[u8]) -> Result<F, DecodeError> {
    let tag = extract_discriminator(bytes)?;
    match F::registry().resolve(tag.as_deref()) {
        Some(variant) => variant
            .decode_slice(bytes)
            .map_err(|err| DecodeError::Variant {
                family: F::TYPE_NAME,
                type_tag: variant.name(),
                path: err.path,
                message: err.message,
            }),
        None => Ok(unknown_member::<F>(tag.unwrap_or_default())),
    }
}

/// Decode a parsed JSON value into family `F`, reporting failures as [`DecodeError`]s.
pub(crate) fn from_json_value<F: Family>(value: Value) -> Result<F, DecodeError> {
    let tag = peek_discriminator(&value)
        .map_err(DecodeError::Discriminator)?
        .map(str::to_owned);
    match F::registry().resolve(tag.as_deref()) {
        Some(variant) => variant
            .decode_value(value)
            .map_err(|err| DecodeError::Variant {
                family: F::TYPE_NAME,
                type_tag: variant.name(),
                path: err.path,
                message: err.message,
            }),
        None => Ok(unknown_member::<F>(tag.unwrap_or_default())),
    }
}

fn unknown_member<F: Family>(tag: String) -> F {
    tracing::debug!(family = F::TYPE_NAME, type_tag = %tag, "unrecognised family member");
    F::unknown(tag)
}

/// Declares a family enum together with its registry, serde impls and node descriptor.
macro_rules! rm_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $family:ident => $name:literal, default $default:ident {
            $($variant:ident($member:ident)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        $vis enum $family {
            $($variant($member),)+
            /// A member this version of the model does not recognise; only its `_type` is kept.
            Unknown(String),
        }

        impl $family {
            /// Wire name of this family.
            pub const FAMILY: &'static str = $name;

            /// Discriminator of the active member; `None` if unrecognised.
            pub fn kind(&self) -> Option<&'static str> {
                match self {
                    $(Self::$variant(_) => Some($member::TYPE_NAME),)+
                    Self::Unknown(_) => None,
                }
            }

            pub fn is_unknown(&self) -> bool {
                matches!(self, Self::Unknown(_))
            }

            /// The active member if it is an `M`.
            pub fn get<M: $crate::union::Member<Self>>(&self) -> Option<&M> {
                M::from_family(self)
            }

            /// The active member if it is an `M`, mutably.
            pub fn get_mut<M: $crate::union::Member<Self>>(&mut self) -> Option<&mut M> {
                M::from_family_mut(self)
            }
        }

        $(
            impl From<$member> for $family {
                fn from(member: $member) -> Self {
                    Self::$variant(member)
                }
            }

            impl $crate::union::Member<$family> for $member {
                fn from_family(family: &$family) -> Option<&Self> {
                    match family {
                        $family::$variant(member) => Some(member),
                        _ => None,
                    }
                }

                fn from_family_mut(family: &mut $family) -> Option<&mut Self> {
                    match family {
                        $family::$variant(member) => Some(member),
                        _ => None,
                    }
                }
            }
        )+

        impl $crate::node::RmType for $family {
            const TYPE_NAME: &'static str = $name;
        }

        impl $crate::union::Family for $family {
            fn registry() -> &'static $crate::registry::Registry<Self> {
                static REGISTRY: ::once_cell::sync::Lazy<$crate::registry::Registry<$family>> =
                    ::once_cell::sync::Lazy::new(|| {
                        $crate::registry::Registry::new(
                            $name,
                            $default::TYPE_NAME,
                            vec![$($crate::registry::Variant::of::<$member>(),)+],
                        )
                    });
                &REGISTRY
            }

            fn unknown(type_tag: String) -> Self {
                Self::Unknown(type_tag)
            }

            fn kind(&self) -> Option<&'static str> {
                $family::kind(self)
            }
        }

        impl $crate::node::Node for $family {
            fn type_name(&self) -> &'static str {
                match self {
                    $(Self::$variant(member) => $crate::node::Node::type_name(member),)+
                    Self::Unknown(_) => $name,
                }
            }

            fn type_tag(&self) -> Option<&str> {
                match self {
                    $(Self::$variant(member) => $crate::node::Node::type_tag(member),)+
                    Self::Unknown(tag) => Some(tag.as_str()),
                }
            }

            fn stamp(&mut self) {
                match self {
                    $(Self::$variant(member) => $crate::node::Node::stamp(member),)+
                    Self::Unknown(_) => {}
                }
            }

            fn visit_children(&self, visitor: &mut dyn $crate::node::Visitor) {
                match self {
                    $(Self::$variant(member) => {
                        $crate::node::Node::visit_children(member, visitor)
                    })+
                    Self::Unknown(_) => {}
                }
            }

            fn visit_children_mut(&mut self, visitor: &mut dyn $crate::node::VisitorMut) {
                match self {
                    $(Self::$variant(member) => {
                        $crate::node::Node::visit_children_mut(member, visitor)
                    })+
                    Self::Unknown(_) => {}
                }
            }

            fn check(&self, checks: &mut $crate::validation::Checks<'_>) {
                match self {
                    $(Self::$variant(member) => $crate::node::Node::check(member, checks),)+
                    Self::Unknown(_) => {}
                }
            }

            fn unknown_member(&self) -> Option<(&'static str, &str)> {
                match self {
                    Self::Unknown(tag) => Some(($name, tag.as_str())),
                    _ => None,
                }
            }

            fn wire_discriminator(&self) -> Option<(&'static str, &str)> {
                match self {
                    $(Self::$variant(member) => Some((
                        $name,
                        $crate::node::Node::type_tag(member).unwrap_or($default::TYPE_NAME),
                    )),)+
                    Self::Unknown(tag) => Some(($name, tag.as_str())),
                }
            }
        }

        impl $crate::node::Walk for $family {
            fn walk(&self, step: $crate::node::Step, visitor: &mut dyn $crate::node::Visitor) {
                visitor.visit(step, self);
            }

            fn walk_mut(
                &mut self,
                step: $crate::node::Step,
                visitor: &mut dyn $crate::node::VisitorMut,
            ) {
                visitor.visit_mut(step, self);
            }
        }

        impl ::serde::Serialize for $family {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self {
                    $(Self::$variant(member) => ::serde::Serialize::serialize(member, serializer),)+
                    Self::Unknown(tag) => Err(<S::Error as ::serde::ser::Error>::custom(format!(
                        "cannot serialize unrecognized subtype `{tag}` of {}",
                        $name
                    ))),
                }
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $family {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                $crate::union::with_stack(move || {
                    let value =
                        <::serde_json::Value as ::serde::Deserialize>::deserialize(deserializer)?;
                    $crate::union::from_value::<Self>(value)
                        .map_err(<D::Error as ::serde::de::Error>::custom)
                })
            }
        }
    };
}

pub(crate) use rm_union;
