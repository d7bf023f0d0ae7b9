//! Per-type node descriptors and the generic tree walk.
//!
//! Every RM type is a plain serde struct plus one [`rm_node!`] declaration. The declaration
//! names the type's authoritative `_type`, the fields that hold child nodes, and the field
//! rules the validator applies. The canonicaliser, the validator and the encode guard are
//! all written once against the [`Node`] / [`Walk`] traits this macro implements.
//!
//! Depth is counted the way the JSON form nests: the root object is level 1, a field that
//! holds an object adds one level, a collection element adds two (the array and the
//! element).

use crate::validation::Checks;
use std::fmt::Write as _;

/// Compile-time RM type name.
pub trait RmType {
    /// Authoritative `_type` (for a family enum: the family name).
    const TYPE_NAME: &'static str;
}

/// A node in an RM tree.
pub trait Node {
    /// Authoritative RM type name, for example `DV_TEXT`.
    fn type_name(&self) -> &'static str;

    /// `_type` as currently stored on the node.
    fn type_tag(&self) -> Option<&str>;

    /// Overwrite the stored `_type` with [`Node::type_name`].
    fn stamp(&mut self);

    /// Visit every child node.
    fn visit_children(&self, _visitor: &mut dyn Visitor) {}

    /// Visit every child node mutably.
    fn visit_children_mut(&mut self, _visitor: &mut dyn VisitorMut) {}

    /// Apply this type's field rules.
    fn check(&self, _checks: &mut Checks<'_>) {}

    /// Family name and discriminator if this node is an unrecognised family member.
    fn unknown_member(&self) -> Option<(&'static str, &str)> {
        None
    }

    /// For a family slot: the family name and the `_type` its wire form would carry (the stored
    /// tag, or the family default when none is stored).
    fn wire_discriminator(&self) -> Option<(&'static str, &str)> {
        None
    }
}

/// Read-only tree visitor.
pub trait Visitor {
    fn visit(&mut self, step: Step, node: &dyn Node);
}

/// Mutable tree visitor.
pub trait VisitorMut {
    fn visit_mut(&mut self, step: Step, node: &mut dyn Node);
}

/// One descent from a parent into a child: a field name and, for collections, an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    field: &'static str,
    index: Option<usize>,
}

impl Step {
    pub const fn field(field: &'static str) -> Self {
        Self { field, index: None }
    }

    pub const fn at(self, index: usize) -> Self {
        Self {
            field: self.field,
            index: Some(index),
        }
    }

    pub fn name(&self) -> &'static str {
        self.field
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// JSON nesting levels this step descends.
    pub fn levels(&self) -> usize {
        if self.index.is_some() {
            2
        } else {
            1
        }
    }

    fn push_onto(&self, path: &mut String) {
        path.push('.');
        path.push_str(self.field);
        if let Some(index) = self.index {
            // Writing to a String cannot fail.
            let _ = write!(path, "[{index}]");
        }
    }
}

/// Values that may hold child nodes: nodes themselves, and `Option`/`Vec`/`Box` of them.
pub trait Walk {
    fn walk(&self, step: Step, visitor: &mut dyn Visitor);
    fn walk_mut(&mut self, step: Step, visitor: &mut dyn VisitorMut);
}

impl<T: Walk> Walk for Option<T> {
    fn walk(&self, step: Step, visitor: &mut dyn Visitor) {
        if let Some(value) = self {
            value.walk(step, visitor);
        }
    }

    fn walk_mut(&mut self, step: Step, visitor: &mut dyn VisitorMut) {
        if let Some(value) = self {
            value.walk_mut(step, visitor);
        }
    }
}

impl<T: Walk> Walk for Vec<T> {
    fn walk(&self, step: Step, visitor: &mut dyn Visitor) {
        for (index, item) in self.iter().enumerate() {
            item.walk(step.at(index), visitor);
        }
    }

    fn walk_mut(&mut self, step: Step, visitor: &mut dyn VisitorMut) {
        for (index, item) in self.iter_mut().enumerate() {
            item.walk_mut(step.at(index), visitor);
        }
    }
}

impl<T: Walk> Walk for Box<T> {
    fn walk(&self, step: Step, visitor: &mut dyn Visitor) {
        (**self).walk(step, visitor);
    }

    fn walk_mut(&mut self, step: Step, visitor: &mut dyn VisitorMut) {
        (**self).walk_mut(step, visitor);
    }
}

/// A group of fields flattened into several RM types (for example the LOCATABLE
/// attributes). Its children and rules are reported at the owning node's level.
pub trait Fields {
    fn visit_fields(&self, visitor: &mut dyn Visitor);
    fn visit_fields_mut(&mut self, visitor: &mut dyn VisitorMut);
    fn check_fields(&self, checks: &mut Checks<'_>);
}

/// Current location of a walk: the violation-style path and the nesting depth.
#[derive(Debug)]
pub(crate) struct Trail {
    path: String,
    depth: usize,
}

impl Trail {
    pub(crate) fn new(root: &str) -> Self {
        Self {
            path: root.to_owned(),
            depth: 1,
        }
    }

    /// Descend one step; returns the mark to pass back to [`Trail::leave`].
    pub(crate) fn enter(&mut self, step: Step) -> usize {
        let mark = self.path.len();
        step.push_onto(&mut self.path);
        self.depth += step.levels();
        mark
    }

    pub(crate) fn leave(&mut self, step: Step, mark: usize) {
        self.path.truncate(mark);
        self.depth -= step.levels();
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }
}

/// Declares the node descriptor of a concrete RM type.
///
/// ```ignore
/// rm_node! {
///     DvText => "DV_TEXT";
///     children [hyperlink, mappings, language, encoding];
///     check |node, c| {
///         c.required("value", &node.value);
///     }
/// }
/// ```
///
/// The struct must carry a `type_tag: Option<String>` field (the `_type` member). Groups named
/// in `flatten` implement [`Fields`]; fields named in `children` implement [`Walk`], and their
/// Rust names are used as path segments unless renamed with `field as "wire"`.
macro_rules! rm_node {
    (
        $ty:ident => $name:literal;
        $(flatten [$($group:ident),* $(,)?];)?
        $(children [$($child:ident $(as $wire:literal)?),* $(,)?];)?
        $(check |$node:ident, $checks:ident| $body:block)?
    ) => {
        impl $ty {
            /// Authoritative `_type` of this RM type.
            pub const TYPE_NAME: &'static str = $name;
        }

        impl $crate::node::RmType for $ty {
            const TYPE_NAME: &'static str = $name;
        }

        impl $crate::node::Node for $ty {
            fn type_name(&self) -> &'static str {
                $name
            }

            fn type_tag(&self) -> Option<&str> {
                self.type_tag.as_deref()
            }

            fn stamp(&mut self) {
                self.type_tag = Some($name.to_owned());
            }

            #[allow(unused_variables)]
            fn visit_children(&self, visitor: &mut dyn $crate::node::Visitor) {
                $($($crate::node::Fields::visit_fields(&self.$group, visitor);)*)?
                $($($crate::node::Walk::walk(
                    &self.$child,
                    $crate::node::Step::field($crate::node::wire_name!($child $($wire)?)),
                    visitor,
                );)*)?
            }

            #[allow(unused_variables)]
            fn visit_children_mut(&mut self, visitor: &mut dyn $crate::node::VisitorMut) {
                $($($crate::node::Fields::visit_fields_mut(&mut self.$group, visitor);)*)?
                $($($crate::node::Walk::walk_mut(
                    &mut self.$child,
                    $crate::node::Step::field($crate::node::wire_name!($child $($wire)?)),
                    visitor,
                );)*)?
            }

            #[allow(unused_variables)]
            fn check(&self, checks: &mut $crate::validation::Checks<'_>) {
                $($($crate::node::Fields::check_fields(&self.$group, checks);)*)?
                $(
                    let $node = self;
                    let $checks = checks;
                    $body
                )?
            }
        }

        impl $crate::node::Walk for $ty {
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
    };
}

/// Declares a [`Fields`] group (attributes shared by several RM types via `#[serde(flatten)]`).
macro_rules! rm_fields {
    (
        $ty:ident;
        $(flatten [$($group:ident),* $(,)?];)?
        $(children [$($child:ident $(as $wire:literal)?),* $(,)?];)?
        $(check |$node:ident, $checks:ident| $body:block)?
    ) => {
        impl $crate::node::Fields for $ty {
            #[allow(unused_variables)]
            fn visit_fields(&self, visitor: &mut dyn $crate::node::Visitor) {
                $($($crate::node::Fields::visit_fields(&self.$group, visitor);)*)?
                $($($crate::node::Walk::walk(
                    &self.$child,
                    $crate::node::Step::field($crate::node::wire_name!($child $($wire)?)),
                    visitor,
                );)*)?
            }

            #[allow(unused_variables)]
            fn visit_fields_mut(&mut self, visitor: &mut dyn $crate::node::VisitorMut) {
                $($($crate::node::Fields::visit_fields_mut(&mut self.$group, visitor);)*)?
                $($($crate::node::Walk::walk_mut(
                    &mut self.$child,
                    $crate::node::Step::field($crate::node::wire_name!($child $($wire)?)),
                    visitor,
                );)*)?
            }

            #[allow(unused_variables)]
            fn check_fields(&self, checks: &mut $crate::validation::Checks<'_>) {
                $($($crate::node::Fields::check_fields(&self.$group, checks);)*)?
                $(
                    let $node = self;
                    let $checks = checks;
                    $body
                )?
            }
        }
    };
}

/// Path segment of a child field: its Rust name, or the wire name given with `as`.
macro_rules! wire_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident $wire:literal) => {
        $wire
    };
}

pub(crate) use rm_fields;
pub(crate) use rm_node;
pub(crate) use wire_name;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_tracks_path_and_depth() {
        let mut trail = Trail::new("$");
        assert_eq!((trail.path(), trail.depth()), ("$", 1));

        let items = Step::field("items").at(0);
        let outer = trail.enter(items);
        assert_eq!((trail.path(), trail.depth()), ("$.items[0]", 3));

        let value = Step::field("value");
        let inner = trail.enter(value);
        assert_eq!((trail.path(), trail.depth()), ("$.items[0].value", 4));

        trail.leave(value, inner);
        trail.leave(items, outer);
        assert_eq!((trail.path(), trail.depth()), ("$", 1));
    }

    #[test]
    fn step_levels_follow_json_nesting() {
        assert_eq!(Step::field("name").levels(), 1);
        assert_eq!(Step::field("items").at(3).levels(), 2);
        assert_eq!(Step::field("items").at(3).index(), Some(3));
        assert_eq!(Step::field("items").name(), "items");
    }
}
