//! Structural and lexical validation.
//!
//! The validator walks a tree depth-first and collects every violation it finds; it never
//! stops at the first one and never fails. Each violation carries the RM type that raised it,
//! a `$`-rooted path (`.field` per fixed field, `.field[n]` per collection element), a message
//! and a remediation hint.
//!
//! Per-type rules live next to the types (see the `check` sections of the `rm_node!`
//! declarations) and are written against the primitives of [`Checks`]. The walker adds the
//! rules every node shares: tag consistency, unknown family members and the depth bound.

use crate::config::{CodecConfig, ROOT_PATH};
use crate::lexical::Grammar;
use crate::node::{Node, Step, Trail, Visitor};
use openehr_terminology::Terminology;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// One structural or lexical constraint failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// RM type that raised the violation.
    pub model: String,
    /// `$`-rooted location of the offending value.
    pub path: String,
    pub message: String,
    pub recommendation: String,
}

/// The full result of a validation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    /// Violations raised at exactly `path`.
    pub fn at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.path == path)
    }
}

impl From<Vec<Violation>> for ValidationReport {
    fn from(violations: Vec<Violation>) -> Self {
        Self::new(violations)
    }
}

/// Rule primitives available to a node while it is being validated.
///
/// Field names passed to the primitives are appended to the node's path, so a failed
/// `required("value", ..)` on the node at `$.items[0]` reports `$.items[0].value`.
pub struct Checks<'a> {
    model: &'static str,
    path: &'a str,
    terminology: &'a dyn Terminology,
    out: &'a mut Vec<Violation>,
}

impl<'a> Checks<'a> {
    pub(crate) fn new(
        model: &'static str,
        path: &'a str,
        terminology: &'a dyn Terminology,
        out: &'a mut Vec<Violation>,
    ) -> Self {
        Self {
            model,
            path,
            terminology,
            out,
        }
    }

    /// RM type of the node under validation.
    pub fn model(&self) -> &'static str {
        self.model
    }

    pub fn path(&self) -> &str {
        self.path
    }

    pub fn terminology(&self) -> &dyn Terminology {
        self.terminology
    }

    /// Record a violation on `field` (or on the node itself if `field` is empty).
    pub fn fail(
        &mut self,
        field: &str,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) {
        let path = if field.is_empty() {
            self.path.to_owned()
        } else {
            format!("{}.{field}", self.path)
        };
        self.out.push(Violation {
            model: self.model.to_owned(),
            path,
            message: message.into(),
            recommendation: recommendation.into(),
        });
    }

    /// Mandatory string: must not be blank.
    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.fail(
                field,
                format!("{field} is required"),
                format!("Provide a non-empty {field}"),
            );
        }
    }

    /// Mandatory field modelled as `Option` (its requiredness depends on context).
    pub fn present<T>(&mut self, field: &str, value: &Option<T>) {
        if value.is_none() {
            self.fail(
                field,
                format!("{field} is required"),
                format!("Provide {field}"),
            );
        }
    }

    /// Mandatory collection: must hold at least one element.
    pub fn non_empty<T>(&mut self, field: &str, items: &[T]) {
        if items.is_empty() {
            self.fail(
                field,
                format!("{field} must not be empty"),
                format!("Add at least one entry to {field}"),
            );
        }
    }

    /// Optional collection that must not be empty when present.
    pub fn non_empty_when_present<T>(&mut self, field: &str, items: &Option<Vec<T>>) {
        if let Some(items) = items {
            self.non_empty(field, items);
        }
    }

    /// Enumerated-set membership.
    pub fn one_of<T: PartialEq + Display>(&mut self, field: &str, value: &T, allowed: &[T]) {
        if !allowed.contains(value) {
            let listed = allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            self.fail(
                field,
                format!("{field} '{value}' is not an allowed value"),
                format!("Use one of: {listed}"),
            );
        }
    }

    /// Lower numeric bound (inclusive).
    pub fn at_least<T: PartialOrd + Display>(&mut self, field: &str, value: T, min: T) {
        if value < min {
            self.fail(
                field,
                format!("{field} must be at least {min}, got {value}"),
                format!("Use a {field} of {min} or more"),
            );
        }
    }

    /// Real number that JSON can carry: not NaN and not infinite.
    pub fn finite(&mut self, field: &str, value: f64) {
        if !value.is_finite() {
            self.fail(
                field,
                format!("{field} must be a finite number, got {value}"),
                format!("Use a finite {field}"),
            );
        }
    }

    pub fn finite_if_present(&mut self, field: &str, value: Option<f64>) {
        if let Some(value) = value {
            self.finite(field, value);
        }
    }

    /// Regular-grammar check on a structured string.
    pub fn grammar(&mut self, field: &str, value: &str, grammar: Grammar) {
        if !grammar.matches(value) {
            self.fail(
                field,
                format!("{field} '{value}' is not a valid {}", grammar.name()),
                grammar.hint(),
            );
        }
    }

    /// Mandatory structured string: reported as missing when blank, otherwise checked against
    /// `grammar`.
    pub fn formatted(&mut self, field: &str, value: &str, grammar: Grammar) {
        if value.trim().is_empty() {
            self.required(field, value);
        } else {
            self.grammar(field, value, grammar);
        }
    }

    /// Grammar check that only applies when the value is present.
    pub fn grammar_if_present(&mut self, field: &str, value: Option<&str>, grammar: Grammar) {
        if let Some(value) = value {
            self.grammar(field, value, grammar);
        }
    }

    /// Code phrase drawn from a fixed terminology and looked up through the terminology
    /// service.
    pub fn terminology_code(
        &mut self,
        field: &str,
        expected_terminology: &str,
        terminology_id: &str,
        code: &str,
        known: impl Fn(&dyn Terminology, &str) -> bool,
    ) {
        if terminology_id != expected_terminology {
            self.fail(
                field,
                format!(
                    "{field} must be drawn from {expected_terminology}, got '{terminology_id}'"
                ),
                format!("Set {field}.terminology_id to {expected_terminology}"),
            );
        } else if !known(self.terminology, code) {
            self.fail(
                field,
                format!("{field} code '{code}' is not a known {expected_terminology} code"),
                format!("Use a code from {expected_terminology}"),
            );
        }
    }

    /// Code phrase drawn from one of the small openEHR code sets.
    pub fn openehr_code(
        &mut self,
        field: &str,
        terminology_id: &str,
        code: &str,
        allowed: &[&str],
    ) {
        if terminology_id != openehr_terminology::ids::OPENEHR {
            self.fail(
                field,
                format!("{field} must be drawn from the openehr terminology, got '{terminology_id}'"),
                format!("Set {field}.terminology_id to openehr"),
            );
        } else {
            self.one_of(field, &code, allowed);
        }
    }
}

/// Recursive, path-tracking validator.
pub struct Validator<'t> {
    terminology: &'t dyn Terminology,
    max_depth: usize,
}

impl<'t> Validator<'t> {
    pub fn new(terminology: &'t dyn Terminology, config: &CodecConfig) -> Self {
        Self {
            terminology,
            max_depth: config.max_depth(),
        }
    }

    /// Validate `node` with the path rooted at `$`.
    pub fn validate(&self, node: &dyn Node) -> Vec<Violation> {
        self.validate_at(node, ROOT_PATH)
    }

    /// Validate `node` with the path rooted at `root`.
    ///
    /// Total: always returns, and reports every violation in depth-first order.
    pub fn validate_at(&self, node: &dyn Node, root: &str) -> Vec<Violation> {
        let mut run = Run {
            trail: Trail::new(root),
            terminology: self.terminology,
            max_depth: self.max_depth,
            out: Vec::new(),
        };
        run.node(node);

        tracing::debug!(
            model = node.type_name(),
            violations = run.out.len(),
            "validation finished"
        );
        run.out
    }
}

struct Run<'t> {
    trail: Trail,
    terminology: &'t dyn Terminology,
    max_depth: usize,
    out: Vec<Violation>,
}

impl Run<'_> {
    fn push(&mut self, model: &str, message: String, recommendation: String) {
        self.out.push(Violation {
            model: model.to_owned(),
            path: self.trail.path().to_owned(),
            message,
            recommendation,
        });
    }

    fn node(&mut self, node: &dyn Node) {
        if self.trail.depth() > self.max_depth {
            tracing::warn!(
                path = self.trail.path(),
                limit = self.max_depth,
                "validation stopped descending: maximum depth exceeded"
            );
            self.push(
                node.type_name(),
                format!("maximum depth exceeded (limit is {})", self.max_depth),
                "Reduce the nesting of this structure".into(),
            );
            return;
        }

        if let Some((family, tag)) = node.unknown_member() {
            self.push(
                family,
                format!("value is not a known member of family {family}"),
                format!("`_type` '{tag}' is not recognised; use a {family} member"),
            );
            return;
        }

        if let Some(tag) = node.type_tag() {
            if tag != node.type_name() {
                let expected = node.type_name();
                self.push(
                    expected,
                    format!("_type '{tag}' does not match {expected}"),
                    format!("Set _type to {expected} or omit it"),
                );
            }
        }

        let mut checks = Checks::new(
            node.type_name(),
            self.trail.path(),
            self.terminology,
            &mut self.out,
        );
        node.check(&mut checks);

        node.visit_children(self);
    }
}

impl Visitor for Run<'_> {
    fn visit(&mut self, step: Step, node: &dyn Node) {
        let mark = self.trail.enter(step);
        self.node(node);
        self.trail.leave(step, mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rm_1_1_0::data_types::{DataValue, DvCodedText, DvQuantity, DvText};
    use crate::rm_1_1_0::structures::{Cluster, Element, Item};
    use openehr_terminology::CodeTables;

    fn validator() -> Validator<'static> {
        Validator::new(CodeTables::builtin(), &CodecConfig::default())
    }

    #[test]
    fn valid_tree_has_no_violations() {
        let mut element = Element::new("at0002", "Comment");
        element.value = Some(DataValue::from(DvText::new("stable")));
        let cluster = Cluster::new("at0001", "Findings", vec![Item::from(element)]);
        assert_eq!(validator().validate(&cluster), Vec::new());
    }

    #[test]
    fn collects_every_violation_with_paths() {
        let mut element = Element::new("at0002", "");
        element.value = Some(DataValue::from(DvQuantity::new(120.0, "")));
        let cluster = Cluster::new("", "Findings", vec![Item::from(element)]);

        let paths = validator()
            .validate(&cluster)
            .into_iter()
            .map(|v| v.path)
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "$.archetype_node_id",
                "$.items[0].name.value",
                "$.items[0].value.units",
            ]
        );
    }

    #[test]
    fn mismatched_tag_is_reported() {
        let mut text = DvText::new("x");
        text.type_tag = Some("DV_CODED_TEXT".into());
        let violations = validator().validate(&text);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].model, "DV_TEXT");
        assert_eq!(violations[0].path, "$");
    }

    #[test]
    fn unknown_member_yields_exactly_one_violation() {
        let mut element = Element::new("at0002", "Thing");
        element.value = Some(DataValue::Unknown("DV_FUTURE".into()));
        let violations = validator().validate(&element);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.value");
        assert_eq!(violations[0].model, "DATA_VALUE");
        assert_eq!(
            violations[0].message,
            "value is not a known member of family DATA_VALUE"
        );
    }

    #[test]
    fn custom_root_prefixes_paths() {
        let coded = DvCodedText::new("", "local", "at1");
        let violations = Validator::new(CodeTables::builtin(), &CodecConfig::default())
            .validate_at(&coded, "$.data");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.data.value");
    }

    #[test]
    fn depth_bound_reports_once_per_truncated_node() {
        let mut element = Element::new("at0002", "Comment");
        element.value = Some(DataValue::from(DvText::new("x")));
        let cluster = Cluster::new("at0001", "Findings", vec![Item::from(element)]);

        let config = CodecConfig::new(3).expect("config");
        let violations = Validator::new(CodeTables::builtin(), &config).validate(&cluster);
        let depth = violations
            .iter()
            .filter(|v| v.message.starts_with("maximum depth exceeded"))
            .map(|v| v.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(depth, vec!["$.items[0].name", "$.items[0].value"]);
    }

    #[test]
    fn report_serialises_violation_records() {
        let report = ValidationReport::new(vec![Violation {
            model: "DV_TEXT".into(),
            path: "$.value".into(),
            message: "value is required".into(),
            recommendation: "Provide a non-empty value".into(),
        }]);
        assert!(!report.is_valid());
        assert_eq!(report.at("$.value").count(), 1);
        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(json["violations"][0]["model"], "DV_TEXT");
        assert_eq!(json["violations"][0]["recommendation"], "Provide a non-empty value");
    }
}
