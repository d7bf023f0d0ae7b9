//! RM 1.1.0 identifiers and references.
//!
//! Identifier values are plain strings on the wire; their grammar is checked by the
//! validator, not at decode time. References (`OBJECT_REF`, `PARTY_REF`, `LOCATABLE_REF`)
//! additionally tie the identifier variant to the kind of entity referenced: root-level
//! targets carry a `HIER_OBJECT_ID`, versioned content carries an `OBJECT_VERSION_ID`.

use crate::lexical::{ArchetypeIdParts, Grammar};
use crate::node::rm_node;
use crate::rm_1_1_0::constants::{HIERARCHICAL_TARGETS, PARTY_TYPES, VERSIONED_TARGETS};
use crate::union::rm_union;
use crate::validation::Checks;
use serde::{Deserialize, Serialize};

/// RM `TERMINOLOGY_ID`: `name` or `name(version)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminologyId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl TerminologyId {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }

    /// Terminology name without the version suffix.
    pub fn name(&self) -> &str {
        self.value
            .split_once('(')
            .map_or(self.value.as_str(), |(name, _)| name)
    }

    /// Version in parentheses, if any.
    pub fn version_id(&self) -> Option<&str> {
        let (_, rest) = self.value.split_once('(')?;
        rest.strip_suffix(')')
    }
}

rm_node! {
    TerminologyId => "TERMINOLOGY_ID";
    check |node, c| {
        c.formatted("value", &node.value, Grammar::TerminologyId);
    }
}

/// RM `HIER_OBJECT_ID`: `root` or `root::extension`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierObjectId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl HierObjectId {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }

    /// A fresh identifier rooted in a random UUID.
    pub fn generate() -> Self {
        Self::new(&uuid::Uuid::new_v4().to_string())
    }

    pub fn root(&self) -> &str {
        self.value
            .split_once("::")
            .map_or(self.value.as_str(), |(root, _)| root)
    }

    pub fn extension(&self) -> Option<&str> {
        self.value.split_once("::").map(|(_, extension)| extension)
    }
}

rm_node! {
    HierObjectId => "HIER_OBJECT_ID";
    check |node, c| {
        c.formatted("value", &node.value, Grammar::HierObjectId);
    }
}

/// RM `OBJECT_VERSION_ID`: `object_id::creating_system_id::version_tree_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectVersionId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl ObjectVersionId {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }

    fn part(&self, index: usize) -> Option<&str> {
        self.value.split("::").nth(index)
    }

    pub fn object_id(&self) -> Option<&str> {
        self.part(0)
    }

    pub fn creating_system_id(&self) -> Option<&str> {
        self.part(1)
    }

    pub fn version_tree_id(&self) -> Option<&str> {
        self.part(2)
    }

    /// Returns `true` if the version sits on a branch (`1.2.1`) rather than the trunk.
    pub fn is_branch(&self) -> bool {
        self.version_tree_id().is_some_and(|id| id.contains('.'))
    }
}

rm_node! {
    ObjectVersionId => "OBJECT_VERSION_ID";
    check |node, c| {
        c.formatted("value", &node.value, Grammar::ObjectVersionId);
    }
}

/// RM `ARCHETYPE_ID`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl ArchetypeId {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }

    /// Split the identifier into its components; `None` if it is malformed.
    pub fn parts(&self) -> Option<ArchetypeIdParts> {
        ArchetypeIdParts::parse(&self.value)
    }
}

rm_node! {
    ArchetypeId => "ARCHETYPE_ID";
    check |node, c| {
        c.formatted("value", &node.value, Grammar::ArchetypeId);
    }
}

/// RM `TEMPLATE_ID`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
}

impl TemplateId {
    pub fn new(value: &str) -> Self {
        Self {
            type_tag: None,
            value: value.to_owned(),
        }
    }
}

rm_node! {
    TemplateId => "TEMPLATE_ID";
    check |node, c| {
        c.required("value", &node.value);
    }
}

/// RM `GENERIC_ID`: an identifier in a named external scheme.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericId {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub value: String,
    pub scheme: String,
}

rm_node! {
    GenericId => "GENERIC_ID";
    check |node, c| {
        c.required("value", &node.value);
        c.required("scheme", &node.scheme);
    }
}

rm_union! {
    /// RM `OBJECT_ID`.
    ///
    /// Six members: every concrete identifier class of RM 1.1.0. Five-member lists leave out
    /// TERMINOLOGY_ID, which is kept because it is concrete and can be the `id` of a reference.
    pub enum ObjectId => "OBJECT_ID", default HierObjectId {
        HierObjectId(HierObjectId),
        ObjectVersionId(ObjectVersionId),
        ArchetypeId(ArchetypeId),
        TemplateId(TemplateId),
        TerminologyId(TerminologyId),
        GenericId(GenericId),
    }
}

rm_union! {
    /// RM `UID_BASED_ID`.
    pub enum UidBasedId => "UID_BASED_ID", default HierObjectId {
        HierObjectId(HierObjectId),
        ObjectVersionId(ObjectVersionId),
    }
}

/// Enforce the target-type / identifier-variant relationship of a reference.
fn target_rules(c: &mut Checks<'_>, target: &str, id_kind: Option<&str>) {
    // Unknown identifier members are reported on the identifier itself.
    let Some(id_kind) = id_kind else {
        return;
    };

    let expected = if HIERARCHICAL_TARGETS.contains(&target) {
        HierObjectId::TYPE_NAME
    } else if VERSIONED_TARGETS.contains(&target) {
        ObjectVersionId::TYPE_NAME
    } else {
        return;
    };

    if id_kind != expected {
        c.fail(
            "id",
            format!("id must be a {expected} when type is {target}, got {id_kind}"),
            format!("Reference {target} with a {expected}"),
        );
    }
}

/// RM `OBJECT_REF`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub id: ObjectId,
}

impl ObjectRef {
    pub fn new(namespace: &str, type_: &str, id: impl Into<ObjectId>) -> Self {
        Self {
            type_tag: None,
            namespace: namespace.to_owned(),
            type_: type_.to_owned(),
            id: id.into(),
        }
    }
}

rm_node! {
    ObjectRef => "OBJECT_REF";
    children [id];
    check |node, c| {
        c.formatted("namespace", &node.namespace, Grammar::Namespace);
        c.required("type", &node.type_);
        target_rules(c, &node.type_, node.id.kind());
    }
}

/// RM `PARTY_REF`: a reference to a demographic party.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyRef {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub id: ObjectId,
}

impl PartyRef {
    pub fn new(namespace: &str, type_: &str, id: impl Into<ObjectId>) -> Self {
        Self {
            type_tag: None,
            namespace: namespace.to_owned(),
            type_: type_.to_owned(),
            id: id.into(),
        }
    }
}

rm_node! {
    PartyRef => "PARTY_REF";
    children [id];
    check |node, c| {
        c.formatted("namespace", &node.namespace, Grammar::Namespace);
        c.one_of("type", &node.type_.as_str(), PARTY_TYPES);
    }
}

/// RM `LOCATABLE_REF`: a reference to a node inside a versioned object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocatableRef {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub namespace: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub id: UidBasedId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl LocatableRef {
    pub fn new(namespace: &str, type_: &str, id: impl Into<UidBasedId>) -> Self {
        Self {
            type_tag: None,
            namespace: namespace.to_owned(),
            type_: type_.to_owned(),
            id: id.into(),
            path: None,
        }
    }

    /// `ehr:` URI form of this reference: `ehr:<id>/<path>`.
    pub fn as_uri(&self) -> Option<String> {
        let id = match &self.id {
            UidBasedId::HierObjectId(id) => &id.value,
            UidBasedId::ObjectVersionId(id) => &id.value,
            UidBasedId::Unknown(_) => return None,
        };
        Some(match &self.path {
            Some(path) => format!("ehr:{id}/{path}"),
            None => format!("ehr:{id}"),
        })
    }
}

rm_node! {
    LocatableRef => "LOCATABLE_REF";
    children [id];
    check |node, c| {
        c.formatted("namespace", &node.namespace, Grammar::Namespace);
        c.required("type", &node.type_);
        target_rules(c, &node.type_, node.id.kind());
        if let Some(path) = &node.path {
            c.required("path", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate;
    use serde_json::json;

    const OVI: &str = "8849182c-82ad-4088-a07f-48ead4180515::example.org::1";

    #[test]
    fn ehr_reference_with_version_id_is_one_violation() {
        let reference = ObjectRef::new("local", "EHR", ObjectVersionId::new(OVI));
        let violations = validate(&reference);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].model, "OBJECT_REF");
        assert_eq!(violations[0].path, "$.id");
        assert!(violations[0].message.contains("HIER_OBJECT_ID"));
    }

    #[test]
    fn versioned_targets_need_version_ids() {
        let ok = ObjectRef::new("local", "COMPOSITION", ObjectVersionId::new(OVI));
        assert!(validate(&ok).is_empty());

        let wrong = ObjectRef::new("local", "COMPOSITION", HierObjectId::generate());
        assert_eq!(validate(&wrong)[0].path, "$.id");

        let free = ObjectRef::new("local", "ANY", GenericId {
            type_tag: None,
            value: "42".into(),
            scheme: "local-scheme".into(),
        });
        assert!(validate(&free).is_empty());
    }

    #[test]
    fn locatable_refs_follow_the_same_rule() {
        let mut reference = LocatableRef::new("local", "EHR", ObjectVersionId::new(OVI));
        reference.path = Some("content[openEHR-EHR-SECTION.vital_signs.v1]".into());
        assert_eq!(validate(&reference).len(), 1);
        assert_eq!(
            reference.as_uri().as_deref(),
            Some(format!("ehr:{OVI}/content[openEHR-EHR-SECTION.vital_signs.v1]").as_str())
        );
    }

    #[test]
    fn party_ref_type_must_name_a_party_class() {
        let reference = PartyRef::new("demographic", "PATIENT", HierObjectId::generate());
        let violations = validate(&reference);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.type");
    }

    #[test]
    fn identifier_components() {
        let id = ObjectVersionId::new("8849182c-82ad-4088-a07f-48ead4180515::example.org::2.1.3");
        assert_eq!(id.creating_system_id(), Some("example.org"));
        assert_eq!(id.version_tree_id(), Some("2.1.3"));
        assert!(id.is_branch());

        let hier = HierObjectId::new("1.2.840.113619::lab-7");
        assert_eq!(hier.root(), "1.2.840.113619");
        assert_eq!(hier.extension(), Some("lab-7"));

        let terminology = TerminologyId::new("SNOMED-CT(2003)");
        assert_eq!(terminology.name(), "SNOMED-CT");
        assert_eq!(terminology.version_id(), Some("2003"));

        let archetype = ArchetypeId::new("openEHR-EHR-OBSERVATION.blood_pressure.v2");
        assert_eq!(archetype.parts().map(|p| p.version), Some("2".to_string()));
    }

    #[test]
    fn object_id_defaults_to_hier_object_id() {
        let id: ObjectId = serde_json::from_value(json!({"value": "local.system"})).expect("decode");
        assert_eq!(id.kind(), Some("HIER_OBJECT_ID"));

        let id: UidBasedId = serde_json::from_value(json!({"_type": "OBJECT_VERSION_ID", "value": OVI}))
            .expect("decode");
        assert!(id.get::<ObjectVersionId>().is_some());
    }

    #[test]
    fn malformed_identifiers_are_reported() {
        let violations = validate(&HierObjectId::new("not valid"));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.value");

        let violations = validate(&ObjectVersionId::new(""));
        assert_eq!(violations[0].message, "value is required");
    }
}
