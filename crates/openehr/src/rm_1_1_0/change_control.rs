//! RM 1.1.0 change control: audits, contributions, versions and versioned containers.

use crate::node::{rm_fields, rm_node};
use crate::rm_1_1_0::common::PartyProxy;
use crate::rm_1_1_0::constants::{
    AUDIT_CHANGE_TYPE_CODES, DELETED_LIFECYCLE_STATE, VERSION_LIFECYCLE_STATE_CODES,
};
use crate::rm_1_1_0::data_types::{DvCodedText, DvDateTime, DvEhrUri, DvMultimedia, TextValue};
use crate::rm_1_1_0::demographic::{Agent, Group, Organisation, Person, Role};
use crate::rm_1_1_0::ehr::{Composition, EhrAccess, EhrStatus, Folder};
use crate::rm_1_1_0::identifiers::{HierObjectId, ObjectRef, ObjectVersionId};
use crate::union::rm_union;
use serde::{Deserialize, Serialize};

/// `AUDIT_DETAILS` attributes, shared with `ATTESTATION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditFields {
    pub system_id: String,
    pub time_committed: DvDateTime,
    pub change_type: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<TextValue>,
    pub committer: PartyProxy,
}

impl AuditFields {
    pub fn new(system_id: &str, change_type: DvCodedText, committer: impl Into<PartyProxy>) -> Self {
        Self {
            system_id: system_id.to_owned(),
            time_committed: DvDateTime::now(),
            change_type,
            description: None,
            committer: committer.into(),
        }
    }
}

rm_fields! {
    AuditFields;
    children [time_committed, change_type, description, committer];
    check |node, c| {
        c.required("system_id", &node.system_id);
        node.change_type
            .check_openehr(c, "change_type", AUDIT_CHANGE_TYPE_CODES);
    }
}

/// RM `AUDIT_DETAILS`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub audit: AuditFields,
}

impl AuditDetails {
    /// Audit of a change committed now.
    pub fn new(system_id: &str, change_type: DvCodedText, committer: impl Into<PartyProxy>) -> Self {
        Self {
            type_tag: None,
            audit: AuditFields::new(system_id, change_type, committer),
        }
    }
}

rm_node! {
    AuditDetails => "AUDIT_DETAILS";
    flatten [audit];
}

/// RM `ATTESTATION`: an audit recording that content was attested.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub audit: AuditFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attested_view: Option<DvMultimedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<DvEhrUri>>,
    pub reason: TextValue,
    pub is_pending: bool,
}

rm_node! {
    Attestation => "ATTESTATION";
    flatten [audit];
    children [attested_view, items, reason];
    check |node, c| {
        c.non_empty_when_present("items", &node.items);
    }
}

/// RM `REVISION_HISTORY_ITEM`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionHistoryItem {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub version_id: ObjectVersionId,
    pub audits: Vec<AuditDetails>,
}

rm_node! {
    RevisionHistoryItem => "REVISION_HISTORY_ITEM";
    children [version_id, audits];
    check |node, c| {
        c.non_empty("audits", &node.audits);
    }
}

/// RM `REVISION_HISTORY`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevisionHistory {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub items: Vec<RevisionHistoryItem>,
}

impl RevisionHistory {
    /// Most recent revision.
    pub fn most_recent_version(&self) -> Option<&ObjectVersionId> {
        self.items.last().map(|item| &item.version_id)
    }
}

rm_node! {
    RevisionHistory => "REVISION_HISTORY";
    children [items];
    check |node, c| {
        c.non_empty("items", &node.items);
    }
}

/// RM `CONTRIBUTION`: the set of versions committed in one change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub uid: HierObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<ObjectRef>>,
    pub audit: AuditDetails,
}

rm_node! {
    Contribution => "CONTRIBUTION";
    children [uid, versions, audit];
    check |node, c| {
        c.present("versions", &node.versions);
        c.non_empty_when_present("versions", &node.versions);
    }
}

/// `VERSION` attributes shared by original and imported versions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionFields {
    pub contribution: ObjectRef,
    pub commit_audit: AuditDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

rm_fields! {
    VersionFields;
    children [contribution, commit_audit];
    check |node, c| {
        if node.contribution.type_ != Contribution::TYPE_NAME {
            c.fail(
                "contribution",
                format!(
                    "contribution must reference a CONTRIBUTION, got {}",
                    node.contribution.type_
                ),
                "Set contribution.type to CONTRIBUTION",
            );
        }
    }
}

/// RM `ORIGINAL_VERSION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OriginalVersion {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub version: VersionFields,
    pub uid: ObjectVersionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preceding_version_uid: Option<ObjectVersionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_input_version_uids: Option<Vec<ObjectVersionId>>,
    pub lifecycle_state: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestations: Option<Vec<Attestation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<VersionContent>,
}

impl OriginalVersion {
    /// Returns `true` if this version records a deletion.
    pub fn is_deleted(&self) -> bool {
        self.lifecycle_state.code() == DELETED_LIFECYCLE_STATE
    }

    /// Returns `true` if this is the first version of its versioned object.
    pub fn is_first(&self) -> bool {
        self.uid.version_tree_id() == Some("1")
    }
}

rm_node! {
    OriginalVersion => "ORIGINAL_VERSION";
    flatten [version];
    children [uid, preceding_version_uid, other_input_version_uids, lifecycle_state, attestations, data];
    check |node, c| {
        node.lifecycle_state
            .check_openehr(c, "lifecycle_state", VERSION_LIFECYCLE_STATE_CODES);
        if node.data.is_none() && !node.is_deleted() {
            c.fail(
                "data",
                "data is required unless the version is deleted",
                "Provide the versioned content",
            );
        }
        if node.uid.version_tree_id().is_some() && node.is_first() != node.preceding_version_uid.is_none() {
            c.fail(
                "preceding_version_uid",
                "preceding_version_uid must be given for, and only for, versions after the first",
                "Point preceding_version_uid at the version this one replaces",
            );
        }
        c.non_empty_when_present("other_input_version_uids", &node.other_input_version_uids);
        c.non_empty_when_present("attestations", &node.attestations);
    }
}

/// RM `IMPORTED_VERSION`: an original version committed again in another system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportedVersion {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub version: VersionFields,
    pub item: OriginalVersion,
}

rm_node! {
    ImportedVersion => "IMPORTED_VERSION";
    flatten [version];
    children [item];
}

rm_union! {
    /// RM `VERSION`.
    pub enum Version => "VERSION", default OriginalVersion {
        Original(OriginalVersion),
        Imported(ImportedVersion),
    }
}

rm_union! {
    /// Payload of a version: the top-level objects kept under version control.
    pub enum VersionContent => "VERSION_CONTENT", default Composition {
        Composition(Composition),
        EhrStatus(EhrStatus),
        EhrAccess(EhrAccess),
        Folder(Folder),
        Person(Person),
        Agent(Agent),
        Group(Group),
        Organisation(Organisation),
        Role(Role),
    }
}

/// `VERSIONED_OBJECT` attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionedFields {
    pub uid: HierObjectId,
    pub owner_id: ObjectRef,
    pub time_created: DvDateTime,
}

rm_fields! {
    VersionedFields;
    children [uid, owner_id, time_created];
}

macro_rules! versioned {
    ($(#[$meta:meta])* $ty:ident => $name:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        pub struct $ty {
            #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
            pub type_tag: Option<String>,
            #[serde(flatten)]
            pub versioned: VersionedFields,
        }

        rm_node! {
            $ty => $name;
            flatten [versioned];
        }
    };
}

versioned!(
    /// RM `VERSIONED_COMPOSITION`.
    VersionedComposition => "VERSIONED_COMPOSITION"
);
versioned!(
    /// RM `VERSIONED_EHR_STATUS`.
    VersionedEhrStatus => "VERSIONED_EHR_STATUS"
);
versioned!(
    /// RM `VERSIONED_EHR_ACCESS`.
    VersionedEhrAccess => "VERSIONED_EHR_ACCESS"
);
versioned!(
    /// RM `VERSIONED_FOLDER`.
    VersionedFolder => "VERSIONED_FOLDER"
);
versioned!(
    /// RM `VERSIONED_PARTY`.
    VersionedParty => "VERSIONED_PARTY"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rm_1_1_0::common::PartySelf;
    use crate::validate;
    use serde_json::json;

    const OVI: &str = "8849182c-82ad-4088-a07f-48ead4180515::example.org::1";

    fn audit() -> AuditDetails {
        AuditDetails::new("example.org", DvCodedText::openehr("creation", "249"), PartySelf::default())
    }

    fn contribution_ref() -> ObjectRef {
        ObjectRef::new("local", "CONTRIBUTION", HierObjectId::generate())
    }

    fn deleted_version() -> OriginalVersion {
        OriginalVersion {
            type_tag: None,
            version: VersionFields {
                contribution: contribution_ref(),
                commit_audit: audit(),
                signature: None,
            },
            uid: ObjectVersionId::new(OVI),
            preceding_version_uid: None,
            other_input_version_uids: None,
            lifecycle_state: DvCodedText::openehr("deleted", DELETED_LIFECYCLE_STATE),
            attestations: None,
            data: None,
        }
    }

    #[test]
    fn audit_change_type_is_coded() {
        assert!(validate(&audit()).is_empty());

        let mut bad = audit();
        bad.audit.change_type = DvCodedText::new("creation", "local", "249");
        bad.audit.system_id = String::new();
        let paths = validate(&bad)
            .into_iter()
            .map(|v| v.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["$.system_id", "$.change_type"]);
    }

    #[test]
    fn contribution_versions_must_be_present_and_non_empty() {
        let mut contribution = Contribution {
            type_tag: None,
            uid: HierObjectId::generate(),
            versions: None,
            audit: audit(),
        };
        let violations = validate(&contribution);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "versions is required");

        contribution.versions = Some(Vec::new());
        let violations = validate(&contribution);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.versions");
        assert_eq!(violations[0].message, "versions must not be empty");

        contribution.versions = Some(vec![ObjectRef::new(
            "local",
            "COMPOSITION",
            ObjectVersionId::new(OVI),
        )]);
        assert!(validate(&contribution).is_empty());
    }

    #[test]
    fn deleted_version_needs_no_data() {
        let version = deleted_version();
        assert!(version.is_deleted());
        assert!(version.is_first());
        assert!(validate(&version).is_empty());

        let mut complete = version.clone();
        complete.lifecycle_state = DvCodedText::openehr("complete", "532");
        let violations = validate(&complete);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.data");
    }

    #[test]
    fn later_versions_name_their_predecessor() {
        let mut version = deleted_version();
        version.uid = ObjectVersionId::new("8849182c-82ad-4088-a07f-48ead4180515::example.org::2");
        assert_eq!(validate(&version)[0].path, "$.preceding_version_uid");

        version.preceding_version_uid = Some(ObjectVersionId::new(OVI));
        assert!(validate(&version).is_empty());
    }

    #[test]
    fn contribution_reference_names_a_contribution() {
        let mut version = deleted_version();
        version.version.contribution = ObjectRef::new("local", "EHR", HierObjectId::generate());
        let violations = validate(&version);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.contribution");
    }

    #[test]
    fn version_family_decodes_imported_versions() {
        let original = serde_json::to_value(deleted_version()).expect("encode");
        let version: Version = serde_json::from_value(json!({
            "_type": "IMPORTED_VERSION",
            "contribution": serde_json::to_value(contribution_ref()).expect("encode"),
            "commit_audit": serde_json::to_value(audit()).expect("encode"),
            "item": original,
        }))
        .expect("decode");
        let imported = version.get::<ImportedVersion>().expect("imported");
        assert!(imported.item.is_deleted());
        assert!(validate(&version).is_empty());
    }

    #[test]
    fn versioned_object_owner_is_checked() {
        let versioned = VersionedComposition {
            type_tag: None,
            versioned: VersionedFields {
                uid: HierObjectId::generate(),
                owner_id: ObjectRef::new("local", "EHR", ObjectVersionId::new(OVI)),
                time_created: DvDateTime::new("2024-03-01T10:30:00Z"),
            },
        };
        let violations = validate(&versioned);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "$.owner_id.id");
    }
}
