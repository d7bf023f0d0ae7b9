//! Canonicalisation: stamping `_type` on every reachable node.

use crate::config::ROOT_PATH;
use crate::error::CanonicalizeError;
use crate::node::{Node, Step, Trail, VisitorMut};

/// Stamp `node` and every node reachable from it with its authoritative `_type`.
///
/// Idempotent. Fixed children, every element of node collections and every populated family
/// slot (through its active member) are stamped.
///
/// # Errors
///
/// Returns [`CanonicalizeError::MaxDepthExceeded`] if the tree nests deeper than `max_depth`.
/// Nodes above the limit are stamped; nothing below it is touched.
pub fn canonicalize_node(node: &mut dyn Node, max_depth: usize) -> Result<(), CanonicalizeError> {
    let mut stamper = Stamper {
        trail: Trail::new(ROOT_PATH),
        max_depth,
        error: None,
    };
    node.stamp();
    node.visit_children_mut(&mut stamper);

    match stamper.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct Stamper {
    trail: Trail,
    max_depth: usize,
    error: Option<CanonicalizeError>,
}

impl VisitorMut for Stamper {
    fn visit_mut(&mut self, step: Step, node: &mut dyn Node) {
        if self.error.is_some() {
            return;
        }

        let mark = self.trail.enter(step);
        if self.trail.depth() > self.max_depth {
            tracing::warn!(
                path = self.trail.path(),
                limit = self.max_depth,
                "canonicalisation stopped: maximum depth exceeded"
            );
            self.error = Some(CanonicalizeError::MaxDepthExceeded {
                limit: self.max_depth,
                path: self.trail.path().to_owned(),
            });
        } else {
            node.stamp();
            node.visit_children_mut(self);
        }
        self.trail.leave(step, mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rm_1_1_0::data_types::{DataValue, DvCodedText, DvText};
    use crate::rm_1_1_0::structures::{Cluster, Element, Item};

    fn tree() -> Cluster {
        let mut element = Element::new("at0002", "Systolic");
        element.value = Some(DataValue::from(DvCodedText::new(
            "present",
            "local",
            "at0010",
        )));
        Cluster::new("at0001", "Blood pressure", vec![Item::from(element)])
    }

    #[test]
    fn stamps_nested_members() {
        let mut cluster = tree();
        canonicalize_node(&mut cluster, 64).expect("canonicalize");

        assert_eq!(cluster.type_tag(), Some("CLUSTER"));
        let element = cluster.items[0].get::<Element>().expect("element");
        assert_eq!(element.type_tag(), Some("ELEMENT"));
        assert_eq!(element.locatable.name.type_tag(), Some("DV_TEXT"));
        let value = element.value.as_ref().expect("value");
        assert_eq!(value.type_tag(), Some("DV_CODED_TEXT"));
        let coded = value.get::<DvCodedText>().expect("coded");
        assert_eq!(coded.defining_code.type_tag(), Some("CODE_PHRASE"));
        assert_eq!(
            coded.defining_code.terminology_id.type_tag(),
            Some("TERMINOLOGY_ID")
        );
    }

    #[test]
    fn overwrites_wrong_tags_and_is_idempotent() {
        let mut text = DvText::new("hello");
        text.type_tag = Some("DV_CODED_TEXT".into());
        canonicalize_node(&mut text, 64).expect("canonicalize");
        assert_eq!(text.type_tag(), Some("DV_TEXT"));

        let mut once = tree();
        canonicalize_node(&mut once, 64).expect("first");
        let mut twice = once.clone();
        canonicalize_node(&mut twice, 64).expect("second");
        assert_eq!(once, twice);
    }

    #[test]
    fn depth_bound_fails_closed() {
        let mut cluster = tree();
        let err = canonicalize_node(&mut cluster, 3).expect_err("too deep");
        let CanonicalizeError::MaxDepthExceeded { limit, path } = err;
        assert_eq!(limit, 3);
        assert_eq!(path, "$.items[0].name");
        assert_eq!(cluster.type_tag(), Some("CLUSTER"));
    }
}
