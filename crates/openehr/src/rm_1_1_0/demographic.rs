//! RM 1.1.0 demographic package.

use crate::node::{rm_fields, rm_node};
use crate::rm_1_1_0::common::Locatable;
use crate::rm_1_1_0::data_types::{DvInterval, DvText};
use crate::rm_1_1_0::identifiers::{LocatableRef, ObjectRef, PartyRef};
use crate::rm_1_1_0::structures::ItemStructure;
use serde::{Deserialize, Serialize};

/// `PARTY` attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<PartyIdentity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<PartyRelationship>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_relationships: Option<Vec<LocatableRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ItemStructure>,
}

impl PartyFields {
    pub fn new(identities: Vec<PartyIdentity>) -> Self {
        Self {
            identities: Some(identities),
            ..Self::default()
        }
    }
}

rm_fields! {
    PartyFields;
    children [identities, contacts, relationships, reverse_relationships, details];
    check |node, c| {
        c.present("identities", &node.identities);
        c.non_empty_when_present("identities", &node.identities);
        c.non_empty_when_present("contacts", &node.contacts);
    }
}

/// `ACTOR` attributes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<PartyRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<DvText>>,
}

rm_fields! {
    ActorFields;
    children [roles, languages];
    check |node, c| {
        c.non_empty_when_present("roles", &node.roles);
        c.non_empty_when_present("languages", &node.languages);
        if let Some(roles) = &node.roles {
            for (index, role) in roles.iter().enumerate() {
                if role.type_ != "ROLE" {
                    c.fail(
                        &format!("roles[{index}]"),
                        format!("roles must reference ROLE parties, got {}", role.type_),
                        "Set the reference type to ROLE",
                    );
                }
            }
        }
    }
}

macro_rules! actor {
    ($(#[$meta:meta])* $ty:ident => $name:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        pub struct $ty {
            #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
            pub type_tag: Option<String>,
            #[serde(flatten)]
            pub locatable: Locatable,
            #[serde(flatten)]
            pub party: PartyFields,
            #[serde(flatten)]
            pub actor: ActorFields,
        }

        impl $ty {
            pub fn new(archetype_id: &str, identities: Vec<PartyIdentity>) -> Self {
                Self {
                    type_tag: None,
                    locatable: Locatable::archetype_root(archetype_id, $name.to_lowercase().as_str()),
                    party: PartyFields::new(identities),
                    actor: ActorFields::default(),
                }
            }
        }

        rm_node! {
            $ty => $name;
            flatten [locatable, party, actor];
        }
    };
}

actor!(
    /// RM `PERSON`.
    Person => "PERSON"
);
actor!(
    /// RM `ORGANISATION`.
    Organisation => "ORGANISATION"
);
actor!(
    /// RM `GROUP`.
    Group => "GROUP"
);
actor!(
    /// RM `AGENT`: a device or software acting as a party.
    Agent => "AGENT"
);

/// RM `ROLE`: a function an actor performs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub party: PartyFields,
    pub performer: PartyRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_validity: Option<DvInterval>,
}

rm_node! {
    Role => "ROLE";
    flatten [locatable, party];
    children [performer, capabilities, time_validity];
    check |node, c| {
        c.non_empty_when_present("capabilities", &node.capabilities);
        if node.performer.type_ == "ROLE" {
            c.fail(
                "performer",
                "the performer of a role must be an actor, not another role",
                "Reference a PERSON, ORGANISATION, GROUP or AGENT",
            );
        }
    }
}

/// RM `PARTY_IDENTITY`: a name of a party, structured by its archetype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyIdentity {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub details: ItemStructure,
}

impl PartyIdentity {
    pub fn new(archetype_node_id: &str, name: &str, details: impl Into<ItemStructure>) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::new(archetype_node_id, name),
            details: details.into(),
        }
    }
}

rm_node! {
    PartyIdentity => "PARTY_IDENTITY";
    flatten [locatable];
    children [details];
}

/// RM `CONTACT`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_validity: Option<DvInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
}

rm_node! {
    Contact => "CONTACT";
    flatten [locatable];
    children [time_validity, addresses];
    check |node, c| {
        c.non_empty_when_present("addresses", &node.addresses);
    }
}

/// RM `ADDRESS`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub details: ItemStructure,
}

rm_node! {
    Address => "ADDRESS";
    flatten [locatable];
    children [details];
}

/// RM `PARTY_RELATIONSHIP`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyRelationship {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ItemStructure>,
    pub source: ObjectRef,
    pub target: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_validity: Option<DvInterval>,
}

rm_node! {
    PartyRelationship => "PARTY_RELATIONSHIP";
    flatten [locatable];
    children [details, source, target, time_validity];
}

/// RM `CAPABILITY`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub credentials: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_validity: Option<DvInterval>,
}

rm_node! {
    Capability => "CAPABILITY";
    flatten [locatable];
    children [credentials, time_validity];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rm_1_1_0::change_control::VersionContent;
    use crate::rm_1_1_0::identifiers::HierObjectId;
    use crate::rm_1_1_0::structures::{Element, Item, ItemTree};
    use crate::validate;

    fn legal_name() -> PartyIdentity {
        let details = ItemTree::new(
            "at0002",
            "Details",
            vec![Item::from(Element::with_value("at0003", "Family name", DvText::new("Smith")))],
        );
        PartyIdentity::new("at0001", "Legal name", details)
    }

    #[test]
    fn person_needs_identities() {
        let person = Person::new("openEHR-DEMOGRAPHIC-PERSON.person.v1", vec![legal_name()]);
        assert!(validate(&person).is_empty());

        let mut anonymous = person.clone();
        anonymous.party.identities = None;
        let violations = validate(&anonymous);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "identities is required");

        anonymous.party.identities = Some(Vec::new());
        let violations = validate(&anonymous);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "identities must not be empty");
    }

    #[test]
    fn actor_roles_reference_roles() {
        let mut agent = Agent::new("openEHR-DEMOGRAPHIC-AGENT.device.v1", vec![legal_name()]);
        agent.actor.roles = Some(vec![PartyRef::new(
            "demographic",
            "PERSON",
            HierObjectId::generate(),
        )]);
        let violations = validate(&agent);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.roles[0]");
    }

    #[test]
    fn role_performer_is_an_actor() {
        let role = Role {
            type_tag: None,
            locatable: Locatable::archetype_root("openEHR-DEMOGRAPHIC-ROLE.clinician.v1", "GP"),
            party: PartyFields::new(vec![legal_name()]),
            performer: PartyRef::new("demographic", "ROLE", HierObjectId::generate()),
            capabilities: None,
            time_validity: None,
        };
        let violations = validate(&role);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.performer");
    }

    #[test]
    fn version_content_decodes_demographic_members() {
        let mut wire = serde_json::to_value(Organisation::new(
            "openEHR-DEMOGRAPHIC-ORGANISATION.organisation.v1",
            vec![legal_name()],
        ))
        .expect("encode");
        wire["_type"] = "ORGANISATION".into();

        let content: VersionContent = serde_json::from_value(wire).expect("decode");
        assert_eq!(content.kind(), Some("ORGANISATION"));
        assert!(validate(&content).is_empty());
    }
}
