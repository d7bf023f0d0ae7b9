//! RM 1.1.0 EHR package: the EHR root, its status and access objects, compositions and their
//! content, and the folder directory.

use crate::node::{rm_fields, rm_node};
use crate::rm_1_1_0::common::{Locatable, Participation, PartyIdentified, PartyProxy, PartySelf};
use crate::rm_1_1_0::constants::{
    COMPOSITION_CATEGORY_CODES, DEFAULT_ARCHETYPE_NODE_ID, DEFAULT_EXTERNAL_REF_TYPE,
    DEFAULT_NAME, ISM_STATE_CODES, PERSISTENT_CATEGORY, SETTING_CODES,
};
use crate::rm_1_1_0::data_types::{CodePhrase, DvCodedText, DvDateTime, DvParsable, TextValue};
use crate::rm_1_1_0::identifiers::{HierObjectId, LocatableRef, ObjectRef, PartyRef};
use crate::rm_1_1_0::structures::{History, ItemStructure, ItemTree};
use crate::union::rm_union;
use crate::validation::Checks;
use openehr_terminology::ids;
use serde::{Deserialize, Serialize};

fn reference_type(c: &mut Checks<'_>, field: &str, reference: &ObjectRef, expected: &str) {
    if reference.type_ != expected {
        c.fail(
            field,
            format!("{field} must reference a {expected}, got {}", reference.type_),
            format!("Set {field}.type to {expected}"),
        );
    }
}

fn reference_types(c: &mut Checks<'_>, field: &str, references: &[ObjectRef], expected: &str) {
    for (index, reference) in references.iter().enumerate() {
        reference_type(c, &format!("{field}[{index}]"), reference, expected);
    }
}

/// RM `EHR`: the root object of one subject's record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ehr {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub system_id: HierObjectId,
    pub ehr_id: HierObjectId,
    pub contributions: Vec<ObjectRef>,
    pub ehr_status: ObjectRef,
    pub ehr_access: ObjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compositions: Option<Vec<ObjectRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<ObjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<ObjectRef>>,
    pub time_created: DvDateTime,
}

impl Ehr {
    /// A new EHR created now on `system_id`, with freshly generated ids for the EHR and its
    /// versioned status and access objects.
    pub fn new(system_id: &str, namespace: &str) -> Self {
        Self {
            type_tag: None,
            system_id: HierObjectId::new(system_id),
            ehr_id: HierObjectId::generate(),
            contributions: Vec::new(),
            ehr_status: ObjectRef::new(namespace, "VERSIONED_EHR_STATUS", HierObjectId::generate()),
            ehr_access: ObjectRef::new(namespace, "VERSIONED_EHR_ACCESS", HierObjectId::generate()),
            compositions: None,
            directory: None,
            folders: None,
            time_created: DvDateTime::now(),
        }
    }
}

rm_node! {
    Ehr => "EHR";
    children [
        system_id,
        ehr_id,
        contributions,
        ehr_status,
        ehr_access,
        compositions,
        directory,
        folders,
        time_created,
    ];
    check |node, c| {
        reference_types(c, "contributions", &node.contributions, "CONTRIBUTION");
        reference_type(c, "ehr_status", &node.ehr_status, "VERSIONED_EHR_STATUS");
        reference_type(c, "ehr_access", &node.ehr_access, "VERSIONED_EHR_ACCESS");
        if let Some(compositions) = &node.compositions {
            reference_types(c, "compositions", compositions, "VERSIONED_COMPOSITION");
        }
        if let Some(directory) = &node.directory {
            reference_type(c, "directory", directory, "VERSIONED_FOLDER");
        }
        if let Some(folders) = &node.folders {
            c.non_empty("folders", folders);
            reference_types(c, "folders", folders, "VERSIONED_FOLDER");
        }
    }
}

/// Demographic identity of an EHR subject, as held outside the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectReference {
    pub namespace: String,
    pub id: uuid::Uuid,
}

impl SubjectReference {
    fn to_party_ref(&self) -> PartyRef {
        PartyRef::new(
            &self.namespace,
            DEFAULT_EXTERNAL_REF_TYPE,
            HierObjectId::new(&self.id.to_string()),
        )
    }
}

/// RM `EHR_STATUS`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EhrStatus {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub subject: PartySelf,
    pub is_queryable: bool,
    pub is_modifiable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_details: Option<ItemStructure>,
}

impl EhrStatus {
    /// A queryable, modifiable status using the default archetype and name, optionally
    /// linked to the subject's demographic record.
    pub fn init(subject: Option<&SubjectReference>) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::archetype_root(DEFAULT_ARCHETYPE_NODE_ID, DEFAULT_NAME),
            subject: PartySelf::new(subject.map(SubjectReference::to_party_ref)),
            is_queryable: true,
            is_modifiable: true,
            other_details: None,
        }
    }

    /// Point the subject at a (new) demographic record, replacing any previous reference.
    pub fn link_subject(&mut self, subject: &SubjectReference) {
        self.subject.external_ref = Some(subject.to_party_ref());
    }
}

rm_node! {
    EhrStatus => "EHR_STATUS";
    flatten [locatable];
    children [subject, other_details];
    check |node, c| {
        archetype_root_rule(c, &node.locatable, EhrStatus::TYPE_NAME);
    }
}

/// RM `EHR_ACCESS`. Access control settings have no concrete RM type and are not modelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EhrAccess {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
}

rm_node! {
    EhrAccess => "EHR_ACCESS";
    flatten [locatable];
}

/// Top-level versioned objects must be archetype roots.
fn archetype_root_rule(c: &mut Checks<'_>, locatable: &Locatable, model: &str) {
    if !locatable.is_archetype_root() {
        c.fail(
            "archetype_details",
            format!("{model} must be an archetype root"),
            "Provide archetype_details naming the archetype",
        );
    }
}

/// RM `COMPOSITION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub language: CodePhrase,
    pub territory: CodePhrase,
    pub category: DvCodedText,
    pub composer: PartyProxy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<EventContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentItem>>,
}

impl Composition {
    /// An empty composition rooted at `archetype_id`.
    pub fn new(
        archetype_id: &str,
        name: impl Into<TextValue>,
        language: &str,
        territory: &str,
        category: DvCodedText,
        composer: impl Into<PartyProxy>,
    ) -> Self {
        Self {
            type_tag: None,
            locatable: Locatable::archetype_root(archetype_id, name),
            language: CodePhrase::new(ids::ISO_639_1, language),
            territory: CodePhrase::new(ids::ISO_3166_1, territory),
            category,
            composer: composer.into(),
            context: None,
            content: None,
        }
    }

    /// Returns `true` for persistent (not event) compositions.
    pub fn is_persistent(&self) -> bool {
        self.category.code() == PERSISTENT_CATEGORY
    }
}

rm_node! {
    Composition => "COMPOSITION";
    flatten [locatable];
    children [language, territory, category, composer, context, content];
    check |node, c| {
        archetype_root_rule(c, &node.locatable, Composition::TYPE_NAME);
        node.language.check_language(c, "language");
        node.territory.check_territory(c, "territory");
        node.category
            .check_openehr(c, "category", COMPOSITION_CATEGORY_CODES);
        if node.is_persistent() && node.context.is_some() {
            c.fail(
                "context",
                "a persistent composition must not have a context",
                "Remove context or use an event category",
            );
        }
        c.non_empty_when_present("content", &node.content);
    }
}

/// RM `EVENT_CONTEXT`: the clinical session a composition was recorded in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_care_facility: Option<PartyIdentified>,
    pub start_time: DvDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DvDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub setting: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_context: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participations: Option<Vec<Participation>>,
}

impl EventContext {
    pub fn new(start_time: DvDateTime, setting: DvCodedText) -> Self {
        Self {
            type_tag: None,
            health_care_facility: None,
            start_time,
            end_time: None,
            location: None,
            setting,
            other_context: None,
            participations: None,
        }
    }
}

rm_node! {
    EventContext => "EVENT_CONTEXT";
    children [
        health_care_facility,
        start_time,
        end_time,
        setting,
        other_context,
        participations,
    ];
    check |node, c| {
        node.setting.check_openehr(c, "setting", SETTING_CODES);
        if let Some(location) = &node.location {
            c.required("location", location);
        }
        c.non_empty_when_present("participations", &node.participations);
    }
}

/// RM `SECTION`: a heading grouping content items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ContentItem>>,
}

rm_node! {
    Section => "SECTION";
    flatten [locatable];
    children [items];
    check |node, c| {
        c.non_empty_when_present("items", &node.items);
    }
}

/// `ENTRY` attributes shared by every entry type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryFields {
    pub language: CodePhrase,
    pub encoding: CodePhrase,
    pub subject: PartyProxy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<PartyProxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_participations: Option<Vec<Participation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<ObjectRef>,
}

impl EntryFields {
    /// Entry about the record subject in `language`, UTF-8 encoded.
    pub fn new(language: &str) -> Self {
        Self {
            language: CodePhrase::new(ids::ISO_639_1, language),
            encoding: CodePhrase::new(ids::IANA_CHARACTER_SETS, "UTF-8"),
            subject: PartySelf::default().into(),
            provider: None,
            other_participations: None,
            workflow_id: None,
        }
    }
}

rm_fields! {
    EntryFields;
    children [language, encoding, subject, provider, other_participations, workflow_id];
    check |node, c| {
        node.language.check_language(c, "language");
        node.encoding.check_charset(c, "encoding");
        c.non_empty_when_present("other_participations", &node.other_participations);
    }
}

/// RM `ADMIN_ENTRY`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdminEntry {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryFields,
    pub data: ItemStructure,
}

rm_node! {
    AdminEntry => "ADMIN_ENTRY";
    flatten [locatable, entry];
    children [data];
}

/// RM `OBSERVATION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline_id: Option<ObjectRef>,
    pub data: History,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<History>,
}

rm_node! {
    Observation => "OBSERVATION";
    flatten [locatable, entry];
    children [protocol, guideline_id, data, state];
}

/// RM `EVALUATION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline_id: Option<ObjectRef>,
    pub data: ItemStructure,
}

rm_node! {
    Evaluation => "EVALUATION";
    flatten [locatable, entry];
    children [protocol, guideline_id, data];
}

/// RM `INSTRUCTION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline_id: Option<ObjectRef>,
    pub narrative: TextValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_time: Option<DvDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_definition: Option<DvParsable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activities: Option<Vec<Activity>>,
}

rm_node! {
    Instruction => "INSTRUCTION";
    flatten [locatable, entry];
    children [protocol, guideline_id, narrative, expiry_time, wf_definition, activities];
    check |node, c| {
        c.non_empty_when_present("activities", &node.activities);
    }
}

/// RM `ACTIVITY`: one activity an instruction asks for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub description: ItemStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<DvParsable>,
    /// Regex over archetype ids of the actions that may fulfil this activity.
    pub action_archetype_id: String,
}

rm_node! {
    Activity => "ACTIVITY";
    flatten [locatable];
    children [description, timing];
    check |node, c| {
        c.required("action_archetype_id", &node.action_archetype_id);
    }
}

/// RM `ACTION`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(flatten)]
    pub entry: EntryFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ItemStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guideline_id: Option<ObjectRef>,
    pub time: DvDateTime,
    pub description: ItemStructure,
    pub ism_transition: IsmTransition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_details: Option<InstructionDetails>,
}

rm_node! {
    Action => "ACTION";
    flatten [locatable, entry];
    children [protocol, guideline_id, time, description, ism_transition, instruction_details];
}

/// RM `ISM_TRANSITION`: the instruction state machine step an action performed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsmTransition {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub current_state: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<DvCodedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub careflow_step: Option<DvCodedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Vec<TextValue>>,
}

impl IsmTransition {
    pub fn new(current_state: DvCodedText) -> Self {
        Self {
            type_tag: None,
            current_state,
            transition: None,
            careflow_step: None,
            reason: None,
        }
    }
}

rm_node! {
    IsmTransition => "ISM_TRANSITION";
    children [current_state, transition, careflow_step, reason];
    check |node, c| {
        node.current_state
            .check_openehr(c, "current_state", ISM_STATE_CODES);
        c.non_empty_when_present("reason", &node.reason);
    }
}

/// RM `INSTRUCTION_DETAILS`: links an action back to the instruction activity it fulfils.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstructionDetails {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    pub instruction_id: LocatableRef,
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_details: Option<ItemStructure>,
}

rm_node! {
    InstructionDetails => "INSTRUCTION_DETAILS";
    children [instruction_id, wf_details];
    check |node, c| {
        c.required("activity_id", &node.activity_id);
    }
}

/// RM `GENERIC_ENTRY`: data imported from a non-openEHR source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenericEntry {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    pub data: ItemTree,
}

rm_node! {
    GenericEntry => "GENERIC_ENTRY";
    flatten [locatable];
    children [data];
}

rm_union! {
    /// RM `CONTENT_ITEM`.
    ///
    /// Seven members: SECTION plus the six concrete entry classes of RM 1.1.0, GENERIC_ENTRY
    /// included. The abstract ENTRY and CARE_ENTRY never appear as a `_type`, so a count of
    /// eight that includes one of them has no eighth member here.
    pub enum ContentItem => "CONTENT_ITEM", default Section {
        Section(Section),
        AdminEntry(AdminEntry),
        Observation(Observation),
        Evaluation(Evaluation),
        Instruction(Instruction),
        Action(Action),
        GenericEntry(GenericEntry),
    }
}

/// RM `FOLDER`: a directory node referencing versioned objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,
    #[serde(flatten)]
    pub locatable: Locatable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ObjectRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folders: Option<Vec<Folder>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ItemStructure>,
}

rm_node! {
    Folder => "FOLDER";
    flatten [locatable];
    children [items, folders, details];
    check |node, c| {
        c.non_empty_when_present("folders", &node.folders);
    }
}
