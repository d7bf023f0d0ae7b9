//! RM 1.1.0 common package: LOCATABLE attributes, archetyping, feeder audit and party proxies.

use crate::lexical::Grammar;
use crate::node::{rm_fields, rm_node};
use crate::rm_1_1_0::constants::{ENCAPSULATED_KINDS, RM_VERSION};
use crate::rm_1_1_0::data_types::{DataValue, DvCodedText, DvDateTime, DvEhrUri, DvIdentifier, DvInterval, TextValue};
use crate::rm_1_1_0::identifiers::{ArchetypeId, PartyRef, TemplateId, UidBasedId};
use crate::rm_1_1_0::structures::ItemStructure;
use crate::union::rm_union;
use crate::validation::Checks;
use serde::{Deserialize, Serialize};

/// LOCATABLE attributes, flattened into every archetypable RM type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Locatable {
    pub name: TextValue,
    pub archetype_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UidBasedId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_details: Option<Archetyped>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeder_audit: Option<FeederAudit>,
}

impl Locatable {
    pub fn new(archetype_node_id: &str, name: impl Into<TextValue>) -> Self {
        Self {
            name: name.into(),
            archetype_node_id: archetype_node_id.to_owned(),
            uid: None,
            links: None,
            archetype_details: None,
            feeder_audit: None,
        }
    }

    /// An archetype root: the node id is the archetype id and the archetyping details are
    /// filled in.
    pub fn archetype_root(archetype_id: &str, name: impl Into<TextValue>) -> Self {
        let mut locatable = Self::new(archetype_id, name);
        locatable.archetype_details = Some(Archetyped::new(archetype_id));
        locatable
    }

    /// Returns `true` if this node is the root of an archetype.
    pub fn is_archetype_root(&self) -> bool {
        self.archetype_details.is_some()
    }
}

rm_fields! {
    Locatable;
    children [name, uid, links, archetype_details, feeder_audit];
    check |node, c| {
        c.formatted("archetype_node_id", &node.archetype_node_id, Grammar::ArchetypeNodeId);
        c.non_empty_when_present("links", &node.links);
        if let Some(details) = &node.archetype_details {
            if !details.archetype_id.value.is_empty()
                && details.archetype_id.value != node.archetype_node_id
            {
                c.fail(
                    "archetype_node_id",
                    "archetype_node_id of an archetype root must equal archetype_details.archetype_id",
                    format!("Set archetype_node_id to {}", details.archetype_id.value),
                );
            }
        }
    }
}

/// RM `ARCHETYPED`: archetyping details of an archetype root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Archetyped {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub archetype_id: ArchetypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    pub rm_version: String,
}

impl Archetyped {
    pub fn new(archetype_id: &str) -> Self {
        Self {
            type_tag: None,
            archetype_id: ArchetypeId::new(archetype_id),
            template_id: None,
            rm_version: RM_VERSION.to_owned(),
        }
    }
}

rm_node! {
    Archetyped => "ARCHETYPED";
    children [archetype_id, template_id];
    check |node, c| {
        c.formatted("rm_version", &node.rm_version, Grammar::RmVersion);
    }
}

/// RM `LINK`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub meaning: TextValue,
    #[serde(rename = "type")]
    pub type_: TextValue,
    pub target: DvEhrUri,
}

rm_node! {
    Link => "LINK";
    children [meaning, type_ as "type", target];
}

/// RM `FEEDER_AUDIT_DETAILS`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeederAuditDetails {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PartyIdentified>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<PartyIdentified>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<PartyProxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DvDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_details: Option<Box<ItemStructure>>,
}

rm_node! {
    FeederAuditDetails => "FEEDER_AUDIT_DETAILS";
    children [location, provider, subject, time, other_details];
    check |node, c| {
        c.required("system_id", &node.system_id);
    }
}

/// RM `FEEDER_AUDIT`: provenance of data imported from a feeder system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeederAudit {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating_system_item_ids: Option<Vec<DvIdentifier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeder_system_item_ids: Option<Vec<DvIdentifier>>,
    /// A `DV_ENCAPSULATED` (multimedia or parsable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<DataValue>,
    pub originating_system_audit: FeederAuditDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeder_system_audit: Option<FeederAuditDetails>,
}

rm_node! {
    FeederAudit => "FEEDER_AUDIT";
    children [
        originating_system_item_ids,
        feeder_system_item_ids,
        original_content,
        originating_system_audit,
        feeder_system_audit,
    ];
    check |node, c| {
        if let Some(kind) = node.original_content.as_ref().and_then(DataValue::kind) {
            if !ENCAPSULATED_KINDS.contains(&kind) {
                c.fail(
                    "original_content",
                    format!("original_content must be encapsulated data, got {kind}"),
                    "Use a DV_MULTIMEDIA or DV_PARSABLE",
                );
            }
        }
    }
}

/// RM `PARTY_SELF`: the subject of the record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartySelf {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<PartyRef>,
}

impl PartySelf {
    pub fn new(external_ref: Option<PartyRef>) -> Self {
        Self {
            type_tag: None,
            external_ref,
        }
    }
}

rm_node! {
    PartySelf => "PARTY_SELF";
    children [external_ref];
}

fn identified_rules(
    c: &mut Checks<'_>,
    external_ref: &Option<PartyRef>,
    name: &Option<String>,
    identifiers: &Option<Vec<DvIdentifier>>,
) {
    if external_ref.is_none() && name.is_none() && identifiers.is_none() {
        c.fail(
            "",
            "at least one of name, identifiers or external_ref is required",
            "Identify the party by name, identifiers or an external reference",
        );
    }
    if let Some(name) = name {
        c.required("name", name);
    }
    c.non_empty_when_present("identifiers", identifiers);
}

/// RM `PARTY_IDENTIFIED`: a party identified by name, identifiers or a demographic reference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyIdentified {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<PartyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<DvIdentifier>>,
}

impl PartyIdentified {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            ..Self::default()
        }
    }
}

rm_node! {
    PartyIdentified => "PARTY_IDENTIFIED";
    children [external_ref, identifiers];
    check |node, c| {
        identified_rules(c, &node.external_ref, &node.name, &node.identifiers);
    }
}

/// RM `PARTY_RELATED`: an identified party plus its relationship to the subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyRelated {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<PartyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<DvIdentifier>>,
    pub relationship: DvCodedText,
}

rm_node! {
    PartyRelated => "PARTY_RELATED";
    children [external_ref, identifiers, relationship];
    check |node, c| {
        identified_rules(c, &node.external_ref, &node.name, &node.identifiers);
    }
}

rm_union! {
    /// RM `PARTY_PROXY`.
    pub enum PartyProxy => "PARTY_PROXY", default PartySelf {
        PartySelf(PartySelf),
        PartyIdentified(PartyIdentified),
        PartyRelated(PartyRelated),
    }
}

/// RM `PARTICIPATION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub function: TextValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DvInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DvCodedText>,
    pub performer: PartyProxy,
}

rm_node! {
    Participation => "PARTICIPATION";
    children [function, time, mode, performer];
    check |node, c| {
        if let Some(time) = &node.time {
            let bounds = [time.lower.as_deref(), time.upper.as_deref()];
            if bounds.iter().flatten().any(|bound| bound.kind() != Some(DvDateTime::TYPE_NAME)) {
                c.fail(
                    "time",
                    "time must be an interval of DV_DATE_TIME",
                    "Bound the participation time with date-times",
                );
            }
        }
    }
}
