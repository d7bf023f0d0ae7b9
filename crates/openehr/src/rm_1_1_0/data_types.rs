//! RM 1.1.0 data values (`DATA_VALUE` and its supporting types).
//!
//! Every member of the `DATA_VALUE` family lives here together with the `DV_TEXT` family
//! (plain or coded text, used wherever the RM types a slot as `DV_TEXT`). Supporting types
//! (`CODE_PHRASE`, `TERM_MAPPING`, `REFERENCE_RANGE`) are nodes in their own right so they are
//! stamped and validated like any other.

use crate::lexical::Grammar;
use crate::node::{rm_fields, rm_node};
use crate::rm_1_1_0::constants::{
    ENCAPSULATED_KINDS, MAGNITUDE_STATUS, NORMAL_STATUS_CODES, NORMAL_STATUS_TERMINOLOGY,
    ORDERED_KINDS, PROPORTION_KINDS, TERM_MAPPING_MATCH,
};
use crate::rm_1_1_0::identifiers::TerminologyId;
use crate::union::rm_union;
use crate::validation::Checks;
use openehr_terminology::ids;
use serde::{Deserialize, Serialize};

/// RM `CODE_PHRASE`: a code drawn from a named terminology.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodePhrase {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub terminology_id: TerminologyId,
    pub code_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_term: Option<String>,
}

impl CodePhrase {
    pub fn new(terminology: &str, code: &str) -> Self {
        Self {
            type_tag: None,
            terminology_id: TerminologyId::new(terminology),
            code_string: code.to_owned(),
            preferred_term: None,
        }
    }

    /// Returns `true` if this code is drawn from `terminology`.
    pub fn is_from(&self, terminology: &str) -> bool {
        self.terminology_id.value == terminology
    }

    pub(crate) fn check_openehr(&self, checks: &mut Checks<'_>, field: &str, allowed: &[&str]) {
        checks.openehr_code(
            field,
            &self.terminology_id.value,
            &self.code_string,
            allowed,
        );
    }

    pub(crate) fn check_language(&self, checks: &mut Checks<'_>, field: &str) {
        checks.terminology_code(
            field,
            ids::ISO_639_1,
            &self.terminology_id.value,
            &self.code_string,
            |terminology, code| terminology.has_language(code),
        );
    }

    pub(crate) fn check_charset(&self, checks: &mut Checks<'_>, field: &str) {
        checks.terminology_code(
            field,
            ids::IANA_CHARACTER_SETS,
            &self.terminology_id.value,
            &self.code_string,
            |terminology, code| terminology.has_charset(code),
        );
    }

    pub(crate) fn check_media_type(&self, checks: &mut Checks<'_>, field: &str) {
        checks.terminology_code(
            field,
            ids::IANA_MEDIA_TYPES,
            &self.terminology_id.value,
            &self.code_string,
            |terminology, code| terminology.has_media_type(code),
        );
    }

    pub(crate) fn check_territory(&self, checks: &mut Checks<'_>, field: &str) {
        checks.terminology_code(
            field,
            ids::ISO_3166_1,
            &self.terminology_id.value,
            &self.code_string,
            |terminology, code| terminology.has_territory(code),
        );
    }
}

rm_node! {
    CodePhrase => "CODE_PHRASE";
    children [terminology_id];
    check |node, c| {
        c.required("code_string", &node.code_string);
    }
}

/// RM `TERM_MAPPING`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermMapping {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    /// One of `>`, `=`, `<`, `?`: how the target relates to the mapped text.
    #[serde(rename = "match")]
    pub match_: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<DvCodedText>,
    pub target: CodePhrase,
}

rm_node! {
    TermMapping => "TERM_MAPPING";
    children [purpose, target];
    check |node, c| {
        c.one_of("match", &node.match_, TERM_MAPPING_MATCH);
    }
}

/// RM `DV_TEXT`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvText {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<DvUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Vec<TermMapping>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<CodePhrase>,
}

impl DvText {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
            hyperlink: None,
            formatting: None,
            mappings: None,
            language: None,
            encoding: None,
        }
    }
}

fn text_rules(
    c: &mut Checks<'_>,
    value: &str,
    mappings: &Option<Vec<TermMapping>>,
    language: &Option<CodePhrase>,
    encoding: &Option<CodePhrase>,
) {
    c.required("value", value);
    c.non_empty_when_present("mappings", mappings);
    if let Some(language) = language {
        language.check_language(c, "language");
    }
    if let Some(encoding) = encoding {
        encoding.check_charset(c, "encoding");
    }
}

rm_node! {
    DvText => "DV_TEXT";
    children [hyperlink, mappings, language, encoding];
    check |node, c| {
        text_rules(c, &node.value, &node.mappings, &node.language, &node.encoding);
    }
}

/// RM `DV_CODED_TEXT`: text whose meaning is fixed by `defining_code`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvCodedText {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlink: Option<DvUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<Vec<TermMapping>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<CodePhrase>,
    pub defining_code: CodePhrase,
}

impl DvCodedText {
    pub fn new(value: &str, terminology: &str, code: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
            hyperlink: None,
            formatting: None,
            mappings: None,
            language: None,
            encoding: None,
            defining_code: CodePhrase::new(terminology, code),
        }
    }

    /// Coded text from the `openehr` terminology.
    pub fn openehr(value: &str, code: &str) -> Self {
        Self::new(value, ids::OPENEHR, code)
    }

    pub fn code(&self) -> &str {
        &self.defining_code.code_string
    }

    pub(crate) fn check_openehr(&self, checks: &mut Checks<'_>, field: &str, allowed: &[&str]) {
        self.defining_code.check_openehr(checks, field, allowed);
    }
}

rm_node! {
    DvCodedText => "DV_CODED_TEXT";
    children [hyperlink, mappings, language, encoding, defining_code];
    check |node, c| {
        text_rules(c, &node.value, &node.mappings, &node.language, &node.encoding);
    }
}

/// RM `DV_PARAGRAPH`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvParagraph {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub items: Vec<TextValue>,
}

rm_node! {
    DvParagraph => "DV_PARAGRAPH";
    children [items];
    check |node, c| {
        c.non_empty("items", &node.items);
    }
}

/// RM `DV_BOOLEAN`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvBoolean {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: bool,
}

impl DvBoolean {
    pub fn new(value: bool) -> Self {
        Self {
            type_tag: None,
            value,
        }
    }
}

rm_node! {
    DvBoolean => "DV_BOOLEAN";
}

/// RM `DV_STATE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvState {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: DvCodedText,
    pub is_terminal: bool,
}

rm_node! {
    DvState => "DV_STATE";
    children [value];
}

/// RM `DV_IDENTIFIER`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvIdentifier {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigner: Option<String>,
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

impl DvIdentifier {
    pub fn new(id: &str) -> Self {
        Self {
            type_tag: None,
            issuer: None,
            assigner: None,
            id: id.to_owned(),
            type_: None,
        }
    }
}

rm_node! {
    DvIdentifier => "DV_IDENTIFIER";
    check |node, c| {
        c.required("id", &node.id);
    }
}

/// RM `DV_URI`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvUri {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl DvUri {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }
}

rm_node! {
    DvUri => "DV_URI";
    check |node, c| {
        c.formatted("value", &node.value, Grammar::Uri);
    }
}

/// RM `DV_EHR_URI`: a URI pointing into an EHR.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvEhrUri {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl DvEhrUri {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }
}

rm_node! {
    DvEhrUri => "DV_EHR_URI";
    check |node, c| {
        c.formatted("value", &node.value, Grammar::EhrUri);
    }
}

/// `DV_ORDERED` attributes shared by every ordered value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ordered {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_status: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<Box<DvInterval>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_reference_ranges: Option<Vec<ReferenceRange>>,
}

rm_fields! {
    Ordered;
    children [normal_status, normal_range, other_reference_ranges];
    check |node, c| {
        if let Some(status) = &node.normal_status {
            if status.is_from(NORMAL_STATUS_TERMINOLOGY) {
                c.one_of("normal_status", &status.code_string.as_str(), NORMAL_STATUS_CODES);
            } else {
                c.fail(
                    "normal_status",
                    format!("normal_status must be drawn from {NORMAL_STATUS_TERMINOLOGY}"),
                    format!("Set normal_status.terminology_id to {NORMAL_STATUS_TERMINOLOGY}"),
                );
            }
        }
        c.non_empty_when_present("other_reference_ranges", &node.other_reference_ranges);
    }
}

fn magnitude_status_rule(c: &mut Checks<'_>, status: &Option<String>) {
    if let Some(status) = status {
        c.one_of("magnitude_status", &status.as_str(), MAGNITUDE_STATUS);
    }
}

/// Serialisers refusing reals JSON cannot carry (NaN and the infinities).
mod real {
    use serde::ser::Error;
    use serde::Serializer;

    pub(super) fn finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            Err(S::Error::custom(format!("cannot serialize non-finite number {value}")))
        }
    }

    pub(super) fn finite_opt<S: Serializer>(
        value: &Option<f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => finite(value, serializer),
            None => serializer.serialize_none(),
        }
    }
}

/// RM `REFERENCE_RANGE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub meaning: TextValue,
    pub range: DvInterval,
}

rm_node! {
    ReferenceRange => "REFERENCE_RANGE";
    children [meaning, range];
}

/// RM `DV_COUNT`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvCount {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub magnitude: i64,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "real::finite_opt"
    )]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_is_percent: Option<bool>,
}

impl DvCount {
    pub fn new(magnitude: i64) -> Self {
        Self {
            type_tag: None,
            magnitude,
            ordered: Ordered::default(),
            magnitude_status: None,
            accuracy: None,
            accuracy_is_percent: None,
        }
    }
}

rm_node! {
    DvCount => "DV_COUNT";
    flatten [ordered];
    check |node, c| {
        magnitude_status_rule(c, &node.magnitude_status);
        c.finite_if_present("accuracy", node.accuracy);
    }
}

/// RM `DV_QUANTITY`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvQuantity {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(serialize_with = "real::finite")]
    pub magnitude: f64,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<CodePhrase>,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "real::finite_opt"
    )]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_is_percent: Option<bool>,
}

impl DvQuantity {
    pub fn new(magnitude: f64, units: &str) -> Self {
        Self {
            type_tag: None,
            magnitude,
            units: units.to_owned(),
            precision: None,
            units_system: None,
            units_display_name: None,
            property: None,
            ordered: Ordered::default(),
            magnitude_status: None,
            accuracy: None,
            accuracy_is_percent: None,
        }
    }
}

rm_node! {
    DvQuantity => "DV_QUANTITY";
    flatten [ordered];
    children [property];
    check |node, c| {
        c.finite("magnitude", node.magnitude);
        c.required("units", &node.units);
        if let Some(precision) = node.precision {
            c.at_least("precision", precision, -1);
        }
        magnitude_status_rule(c, &node.magnitude_status);
        c.finite_if_present("accuracy", node.accuracy);
    }
}

/// RM `DV_PROPORTION`. `type_` selects ratio (0), unitary (1), percent (2), fraction (3) or
/// integer fraction (4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvProportion {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(serialize_with = "real::finite")]
    pub numerator: f64,
    #[serde(serialize_with = "real::finite")]
    pub denominator: f64,
    #[serde(rename = "type")]
    pub type_: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "real::finite_opt"
    )]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_is_percent: Option<bool>,
}

impl DvProportion {
    pub fn new(numerator: f64, denominator: f64, kind: i64) -> Self {
        Self {
            type_tag: None,
            numerator,
            denominator,
            type_: kind,
            precision: None,
            ordered: Ordered::default(),
            magnitude_status: None,
            accuracy: None,
            accuracy_is_percent: None,
        }
    }
}

fn proportion_rules(node: &DvProportion, c: &mut Checks<'_>) {
    c.finite("numerator", node.numerator);
    c.finite("denominator", node.denominator);
    c.finite_if_present("accuracy", node.accuracy);
    if !PROPORTION_KINDS.contains(&node.type_) {
        c.fail(
            "type",
            format!("type {} is not a proportion kind", node.type_),
            "Use 0 (ratio), 1 (unitary), 2 (percent), 3 (fraction) or 4 (integer fraction)",
        );
        return;
    }

    if node.denominator == 0.0 {
        c.fail(
            "denominator",
            "denominator must not be zero",
            "Use a non-zero denominator",
        );
    }
    match node.type_ {
        1 if node.denominator != 1.0 => c.fail(
            "denominator",
            "a unitary proportion must have denominator 1",
            "Set denominator to 1",
        ),
        2 if node.denominator != 100.0 => c.fail(
            "denominator",
            "a percent proportion must have denominator 100",
            "Set denominator to 100",
        ),
        3 | 4 if node.numerator.fract() != 0.0 || node.denominator.fract() != 0.0 => c.fail(
            "",
            "a fraction must have integral numerator and denominator",
            "Use whole numbers or a ratio proportion",
        ),
        _ => {}
    }
    if let Some(precision) = node.precision {
        c.at_least("precision", precision, -1);
    }
}

rm_node! {
    DvProportion => "DV_PROPORTION";
    flatten [ordered];
    check |node, c| {
        proportion_rules(node, c);
        magnitude_status_rule(c, &node.magnitude_status);
    }
}

/// RM `DV_ORDINAL`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvOrdinal {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: i64,
    pub symbol: DvCodedText,
    #[serde(flatten)]
    pub ordered: Ordered,
}

rm_node! {
    DvOrdinal => "DV_ORDINAL";
    flatten [ordered];
    children [symbol];
}

/// RM `DV_SCALE`: an ordinal with a real-valued score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvScale {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(serialize_with = "real::finite")]
    pub value: f64,
    pub symbol: DvCodedText,
    #[serde(flatten)]
    pub ordered: Ordered,
}

rm_node! {
    DvScale => "DV_SCALE";
    flatten [ordered];
    children [symbol];
    check |node, c| {
        c.finite("value", node.value);
    }
}

/// RM `DV_INTERVAL`. Bounds are any ordered data value; both bounds must be of the same kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvInterval {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Box<DataValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Box<DataValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_included: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_included: Option<bool>,
    pub lower_unbounded: bool,
    pub upper_unbounded: bool,
}

impl DvInterval {
    /// Closed interval `[lower, upper]`.
    pub fn between(lower: impl Into<DataValue>, upper: impl Into<DataValue>) -> Self {
        Self {
            type_tag: None,
            lower: Some(Box::new(lower.into())),
            upper: Some(Box::new(upper.into())),
            lower_included: Some(true),
            upper_included: Some(true),
            lower_unbounded: false,
            upper_unbounded: false,
        }
    }
}

fn bound_rules(
    c: &mut Checks<'_>,
    field: &str,
    bound: Option<&DataValue>,
    unbounded: bool,
    included: Option<bool>,
) {
    match (bound, unbounded) {
        (Some(_), true) => c.fail(
            field,
            format!("{field} is set but {field}_unbounded is true"),
            format!("Remove {field} or set {field}_unbounded to false"),
        ),
        (None, false) => c.fail(
            field,
            format!("{field} is required unless {field}_unbounded is true"),
            format!("Provide {field} or set {field}_unbounded to true"),
        ),
        _ => {}
    }

    if unbounded && included == Some(true) {
        c.fail(
            &format!("{field}_included"),
            format!("an unbounded {field} cannot be included"),
            format!("Set {field}_included to false or omit it"),
        );
    }

    if let Some(kind) = bound.and_then(DataValue::kind) {
        if !ORDERED_KINDS.contains(&kind) {
            c.fail(
                field,
                format!("{kind} is not an ordered value"),
                format!("Bound the interval with one of: {}", ORDERED_KINDS.join(", ")),
            );
        }
    }
}

fn interval_rules(node: &DvInterval, c: &mut Checks<'_>) {
    bound_rules(
        c,
        "lower",
        node.lower.as_deref(),
        node.lower_unbounded,
        node.lower_included,
    );
    bound_rules(
        c,
        "upper",
        node.upper.as_deref(),
        node.upper_unbounded,
        node.upper_included,
    );

    let (Some(lower), Some(upper)) = (node.lower.as_deref(), node.upper.as_deref()) else {
        return;
    };
    match (lower.kind(), upper.kind()) {
        (Some(low), Some(high)) if low != high => c.fail(
            "upper",
            format!("upper is a {high} but lower is a {low}"),
            "Bound both ends with the same data value type",
        ),
        _ => {
            if let (Some(low), Some(high)) = (lower.magnitude(), upper.magnitude()) {
                if low > high {
                    c.fail(
                        "",
                        format!("lower ({low}) is greater than upper ({high})"),
                        "Swap the bounds",
                    );
                }
            }
        }
    }
}

rm_node! {
    DvInterval => "DV_INTERVAL";
    children [lower, upper];
    check |node, c| {
        interval_rules(node, c);
    }
}

/// RM `DV_DATE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvDate {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<DvDuration>,
}

rm_node! {
    DvDate => "DV_DATE";
    flatten [ordered];
    children [accuracy];
    check |node, c| {
        c.formatted("value", &node.value, Grammar::Date);
        magnitude_status_rule(c, &node.magnitude_status);
    }
}

/// RM `DV_TIME`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvTime {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<DvDuration>,
}

rm_node! {
    DvTime => "DV_TIME";
    flatten [ordered];
    children [accuracy];
    check |node, c| {
        c.formatted("value", &node.value, Grammar::Time);
        magnitude_status_rule(c, &node.magnitude_status);
    }
}

/// RM `DV_DATE_TIME`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvDateTime {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<DvDuration>,
}

impl DvDateTime {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
            ordered: Ordered::default(),
            magnitude_status: None,
            accuracy: None,
        }
    }

    /// The current instant in extended ISO 8601 form.
    pub fn now() -> Self {
        Self::new(
            &chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        )
    }
}

rm_node! {
    DvDateTime => "DV_DATE_TIME";
    flatten [ordered];
    children [accuracy];
    check |node, c| {
        c.formatted("value", &node.value, Grammar::DateTime);
        magnitude_status_rule(c, &node.magnitude_status);
    }
}

/// RM `DV_DURATION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvDuration {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    #[serde(flatten)]
    pub ordered: Ordered,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude_status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "real::finite_opt"
    )]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_is_percent: Option<bool>,
}

impl DvDuration {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
            ordered: Ordered::default(),
            magnitude_status: None,
            accuracy: None,
            accuracy_is_percent: None,
        }
    }
}

rm_node! {
    DvDuration => "DV_DURATION";
    flatten [ordered];
    check |node, c| {
        c.formatted("value", &node.value, Grammar::Duration);
        magnitude_status_rule(c, &node.magnitude_status);
        c.finite_if_present("accuracy", node.accuracy);
    }
}

/// RM `DV_MULTIMEDIA`. Content is either referenced (`uri`) or inline (`data`, base64).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvMultimedia {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<DvUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub media_type: CodePhrase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_algorithm: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_check_algorithm: Option<CodePhrase>,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Box<DvMultimedia>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<CodePhrase>,
}

impl DvMultimedia {
    /// Externally referenced content.
    pub fn referenced(uri: &str, media_type: &str, size: i64) -> Self {
        Self {
            type_tag: None,
            alternate_text: None,
            uri: Some(DvUri::new(uri)),
            data: None,
            media_type: CodePhrase::new(ids::IANA_MEDIA_TYPES, media_type),
            compression_algorithm: None,
            integrity_check: None,
            integrity_check_algorithm: None,
            size,
            thumbnail: None,
            charset: None,
            language: None,
        }
    }
}

fn encapsulated_rules(
    c: &mut Checks<'_>,
    charset: &Option<CodePhrase>,
    language: &Option<CodePhrase>,
) {
    if let Some(charset) = charset {
        charset.check_charset(c, "charset");
    }
    if let Some(language) = language {
        language.check_language(c, "language");
    }
}

rm_node! {
    DvMultimedia => "DV_MULTIMEDIA";
    children [
        uri,
        media_type,
        compression_algorithm,
        integrity_check_algorithm,
        thumbnail,
        charset,
        language,
    ];
    check |node, c| {
        c.at_least("size", node.size, 0);
        if node.uri.is_none() && node.data.is_none() {
            c.fail(
                "",
                "either uri or data is required",
                "Reference the content with uri or embed it in data",
            );
        }
        node.media_type.check_media_type(c, "media_type");
        if node.integrity_check.is_some() && node.integrity_check_algorithm.is_none() {
            c.fail(
                "integrity_check_algorithm",
                "integrity_check_algorithm is required when integrity_check is set",
                "Name the algorithm used to compute integrity_check",
            );
        }
        encapsulated_rules(c, &node.charset, &node.language);
    }
}

/// RM `DV_PARSABLE`: text in a named formalism.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DvParsable {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    pub formalism: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<CodePhrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<CodePhrase>,
}

impl DvParsable {
    pub fn new(value: &str, formalism: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
            formalism: formalism.to_owned(),
            charset: None,
            language: None,
        }
    }
}

rm_node! {
    DvParsable => "DV_PARSABLE";
    children [charset, language];
    check |node, c| {
        c.required("formalism", &node.formalism);
        encapsulated_rules(c, &node.charset, &node.language);
    }
}

rm_union! {
    /// RM `DATA_VALUE`: any data value.
    pub enum DataValue => "DATA_VALUE", default DvText {
        DvBoolean(DvBoolean),
        DvState(DvState),
        DvIdentifier(DvIdentifier),
        DvText(DvText),
        DvCodedText(DvCodedText),
        DvParagraph(DvParagraph),
        DvCount(DvCount),
        DvQuantity(DvQuantity),
        DvProportion(DvProportion),
        DvOrdinal(DvOrdinal),
        DvScale(DvScale),
        DvInterval(DvInterval),
        DvDate(DvDate),
        DvTime(DvTime),
        DvDateTime(DvDateTime),
        DvDuration(DvDuration),
        DvMultimedia(DvMultimedia),
        DvParsable(DvParsable),
        DvUri(DvUri),
        DvEhrUri(DvEhrUri),
    }
}

impl DataValue {
    /// Numeric magnitude of ordered values that have one.
    pub fn magnitude(&self) -> Option<f64> {
        match self {
            Self::DvCount(count) => Some(count.magnitude as f64),
            Self::DvQuantity(quantity) => Some(quantity.magnitude),
            Self::DvOrdinal(ordinal) => Some(ordinal.value as f64),
            Self::DvScale(scale) => Some(scale.value),
            _ => None,
        }
    }

    /// Returns `true` if this value may stand where the RM expects a `DV_ENCAPSULATED`.
    pub fn is_encapsulated(&self) -> bool {
        self.kind().is_some_and(|kind| ENCAPSULATED_KINDS.contains(&kind))
    }
}

rm_union! {
    /// Slots typed `DV_TEXT` in the RM: plain or coded text.
    pub enum TextValue => "DV_TEXT", default DvText {
        Text(DvText),
        Coded(DvCodedText),
    }
}

impl TextValue {
    /// The text itself, whichever member is active.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(&text.value),
            Self::Coded(coded) => Some(&coded.value),
            Self::Unknown(_) => None,
        }
    }
}

impl From<&str> for TextValue {
    fn from(value: &str) -> Self {
        Self::Text(DvText::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate;
    use serde_json::json;

    #[test]
    fn missing_tag_defaults_to_plain_text() {
        let value: DataValue = serde_json::from_value(json!({"value": "free text"})).expect("decode");
        assert_eq!(value.kind(), Some("DV_TEXT"));

        let text: TextValue = serde_json::from_value(json!({"value": "free text"})).expect("decode");
        assert_eq!(text.value(), Some("free text"));
    }

    #[test]
    fn decodes_quantity_by_discriminator() {
        let value: DataValue = serde_json::from_value(json!({
            "_type": "DV_QUANTITY",
            "magnitude": 120,
            "units": "mm[Hg]",
            "normal_status": {
                "terminology_id": {"value": "openehr_normal_statuses"},
                "code_string": "N"
            }
        }))
        .expect("decode");

        let quantity = value.get::<DvQuantity>().expect("quantity");
        assert_eq!(quantity.magnitude, 120.0);
        assert!(quantity.ordered.normal_status.is_some());
        assert!(validate(&value).is_empty());
    }

    #[test]
    fn unknown_tag_keeps_only_discriminator() {
        let value: DataValue =
            serde_json::from_value(json!({"_type": "DV_GENOME", "sequence": "GATTACA"}))
                .expect("decode");
        assert_eq!(value, DataValue::Unknown("DV_GENOME".into()));
        assert_eq!(value.kind(), None);

        let err = serde_json::to_string(&value).expect_err("encode refused");
        assert!(err.to_string().contains("cannot serialize unrecognized subtype"));
    }

    #[test]
    fn malformed_member_names_family_and_member() {
        let err = serde_json::from_value::<DataValue>(json!({"_type": "DV_COUNT", "magnitude": "many"}))
            .expect_err("bad magnitude");
        let message = err.to_string();
        assert!(message.contains("DATA_VALUE member DV_COUNT"), "{message}");
        assert!(message.contains("invalid type"), "{message}");
    }

    #[test]
    fn term_mapping_match_is_enumerated() {
        let mut text = DvText::new("BP");
        text.mappings = Some(vec![TermMapping {
            type_tag: None,
            match_: '!',
            purpose: None,
            target: CodePhrase::new("SNOMED-CT", "75367002"),
        }]);
        let violations = validate(&text);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.mappings[0].match");
    }

    #[test]
    fn text_language_and_encoding_use_terminology() {
        let mut text = DvText::new("hello");
        text.language = Some(CodePhrase::new(ids::ISO_639_1, "en"));
        text.encoding = Some(CodePhrase::new(ids::IANA_CHARACTER_SETS, "UTF-8"));
        assert!(validate(&text).is_empty());

        text.language = Some(CodePhrase::new(ids::ISO_639_1, "xx"));
        text.encoding = Some(CodePhrase::new("local", "UTF-8"));
        let paths = validate(&text)
            .into_iter()
            .map(|v| v.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["$.language", "$.encoding"]);
    }

    #[test]
    fn interval_bounds_and_flags_must_agree() {
        assert!(validate(&DvInterval::between(DvCount::new(1), DvCount::new(5))).is_empty());

        let mixed = DvInterval::between(DvCount::new(1), DvQuantity::new(5.0, "kg"));
        let violations = validate(&mixed);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.upper");

        let reversed = DvInterval::between(DvCount::new(9), DvCount::new(5));
        assert_eq!(validate(&reversed).len(), 1);

        let mut open = DvInterval::between(DvCount::new(1), DvCount::new(5));
        open.upper = None;
        open.upper_unbounded = true;
        let violations = validate(&open);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.upper_included");

        let text = DvInterval::between(DvText::new("a"), DvText::new("b"));
        assert_eq!(validate(&text).len(), 2);
    }

    #[test]
    fn proportion_kind_constrains_denominator() {
        assert!(validate(&DvProportion::new(50.0, 100.0, 2)).is_empty());
        assert!(validate(&DvProportion::new(1.0, 3.0, 3)).is_empty());

        let percent = validate(&DvProportion::new(50.0, 10.0, 2));
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].path, "$.denominator");

        let fraction = validate(&DvProportion::new(1.5, 3.0, 4));
        assert_eq!(fraction.len(), 1);
        assert_eq!(fraction[0].path, "$");

        assert_eq!(validate(&DvProportion::new(1.0, 0.0, 0)).len(), 1);
        assert_eq!(validate(&DvProportion::new(1.0, 2.0, 7))[0].path, "$.type");
    }

    #[test]
    fn multimedia_needs_content_and_known_media_type() {
        let image = DvMultimedia::referenced("https://example.org/scan.png", "image/png", 2048);
        assert!(validate(&image).is_empty());

        let mut detached = image.clone();
        detached.uri = None;
        detached.size = -1;
        detached.media_type = CodePhrase::new(ids::IANA_MEDIA_TYPES, "image/unheard-of");
        let paths = validate(&detached)
            .into_iter()
            .map(|v| v.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["$.size", "$", "$.media_type"]);
    }

    #[test]
    fn temporal_values_are_checked_lexically() {
        let mut date_time = DvDateTime::new("2024-03-01T10:30:00Z");
        assert!(validate(&date_time).is_empty());
        date_time.value = "01/03/2024".into();
        assert_eq!(validate(&date_time)[0].path, "$.value");

        assert!(validate(&DvDuration::new("PT30M")).is_empty());
        assert_eq!(validate(&DvDuration::new("P")).len(), 1);
        assert!(validate(&DvDateTime::now()).is_empty());
    }

    #[test]
    fn non_finite_reals_are_reported_and_refused_on_encode() {
        let quantity = DvQuantity::new(f64::NAN, "kg");
        let violations = validate(&quantity);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.magnitude");
        assert!(matches!(
            crate::encode(&quantity),
            Err(crate::EncodeError::Json(_))
        ));

        let mut proportion = DvProportion::new(1.0, f64::INFINITY, 0);
        proportion.accuracy = Some(f64::NEG_INFINITY);
        let paths = validate(&proportion)
            .into_iter()
            .map(|v| v.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["$.denominator", "$.accuracy"]);
        assert!(serde_json::to_string(&proportion).is_err());

        let mut count = DvCount::new(3);
        count.accuracy = Some(f64::NAN);
        assert_eq!(validate(&count)[0].path, "$.accuracy");
        count.accuracy = Some(0.5);
        assert!(validate(&count).is_empty());
        assert_eq!(
            serde_json::to_value(&count).expect("encode"),
            json!({"magnitude": 3, "accuracy": 0.5})
        );
    }

    #[test]
    fn real_magnitudes_survive_the_wire_exactly() {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut checked = 0;
        while checked < 5_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let magnitude = f64::from_bits(state);
            if !magnitude.is_finite() {
                continue;
            }
            let bytes = crate::encode(&DvQuantity::new(magnitude, "kg")).expect("encode");
            let decoded: DvQuantity = crate::decode(&bytes).expect("decode");
            assert_eq!(decoded.magnitude.to_bits(), magnitude.to_bits(), "{magnitude}");
            checked += 1;
        }

        let bytes = crate::encode(&DvQuantity::new(92152.59085883149, "kg")).expect("encode");
        let decoded: DvQuantity = crate::decode(&bytes).expect("decode");
        assert_eq!(decoded.magnitude, 92152.59085883149);
    }
}
