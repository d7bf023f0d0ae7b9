//! Constants for RM 1.1.0 structures.

/// RM release implemented by this module.
pub const RM_VERSION: &str = "1.1.0";

/// Default archetype node ID for EHR_STATUS.
pub const DEFAULT_ARCHETYPE_NODE_ID: &str = "openEHR-EHR-STATUS.generic.v1";

/// Default name for EHR_STATUS.
pub const DEFAULT_NAME: &str = "EHR Status";

/// Default external reference type.
pub const DEFAULT_EXTERNAL_REF_TYPE: &str = "PERSON";

/// Terminology carrying `DV_ORDERED.normal_status` codes.
pub const NORMAL_STATUS_TERMINOLOGY: &str = "openehr_normal_statuses";

/// openEHR "composition category" group.
pub const COMPOSITION_CATEGORY_CODES: &[&str] = &["431", "433", "451"];

/// openEHR "audit change type" group.
pub const AUDIT_CHANGE_TYPE_CODES: &[&str] = &["249", "250", "251", "252", "253", "523", "666"];

/// openEHR "version lifecycle state" group.
pub const VERSION_LIFECYCLE_STATE_CODES: &[&str] = &["523", "532", "553", "800", "801"];

/// openEHR "null flavours" group.
pub const NULL_FLAVOUR_CODES: &[&str] = &["253", "271", "272", "273"];

/// openEHR "instruction states" group (ISM current states).
pub const ISM_STATE_CODES: &[&str] = &[
    "524", "526", "527", "528", "529", "530", "531", "532", "533", "534",
];

/// `openehr_normal_statuses` codes.
pub const NORMAL_STATUS_CODES: &[&str] = &["HHH", "HH", "H", "N", "L", "LL", "LLL"];

/// `TERM_MAPPING.match` symbols.
pub const TERM_MAPPING_MATCH: &[char] = &['>', '=', '<', '?'];

/// `DV_QUANTIFIED.magnitude_status` symbols.
pub const MAGNITUDE_STATUS: &[&str] = &["=", "<", ">", "<=", ">=", "~"];

/// Members a `DV_INTERVAL` may bound (the `DV_ORDERED` descendants).
pub const ORDERED_KINDS: &[&str] = &[
    "DV_COUNT",
    "DV_QUANTITY",
    "DV_PROPORTION",
    "DV_ORDINAL",
    "DV_SCALE",
    "DV_DATE",
    "DV_TIME",
    "DV_DATE_TIME",
    "DV_DURATION",
];

/// Members allowed where the RM expects a `DV_ENCAPSULATED`.
pub const ENCAPSULATED_KINDS: &[&str] = &["DV_MULTIMEDIA", "DV_PARSABLE"];

/// openEHR "composition category" code for persistent compositions.
pub const PERSISTENT_CATEGORY: &str = "431";

/// openEHR "version lifecycle state" code for deleted versions.
pub const DELETED_LIFECYCLE_STATE: &str = "523";

/// `DV_PROPORTION.type` values: ratio, unitary, percent, fraction, integer_fraction.
pub const PROPORTION_KINDS: std::ops::RangeInclusive<i64> = 0..=4;

/// Classes a `PARTY_REF.type` may name.
pub const PARTY_TYPES: &[&str] = &[
    "PARTY",
    "ACTOR",
    "PERSON",
    "ORGANISATION",
    "GROUP",
    "AGENT",
    "ROLE",
];

/// Reference targets whose identifier must be a `HIER_OBJECT_ID`.
pub const HIERARCHICAL_TARGETS: &[&str] = &[
    "EHR",
    "CONTRIBUTION",
    "VERSIONED_OBJECT",
    "VERSIONED_COMPOSITION",
    "VERSIONED_EHR_STATUS",
    "VERSIONED_EHR_ACCESS",
    "VERSIONED_FOLDER",
    "VERSIONED_PARTY",
];

/// Reference targets whose identifier must be an `OBJECT_VERSION_ID`.
pub const VERSIONED_TARGETS: &[&str] = &[
    "VERSION",
    "ORIGINAL_VERSION",
    "IMPORTED_VERSION",
    "COMPOSITION",
    "EHR_STATUS",
    "EHR_ACCESS",
    "FOLDER",
];

/// openEHR "event math function" group.
pub const EVENT_MATH_FUNCTION_CODES: &[&str] = &[
    "144", "145", "146", "147", "148", "149", "267", "268", "521", "522", "640",
];

/// openEHR "setting" group.
pub const SETTING_CODES: &[&str] = &[
    "225", "227", "228", "229", "230", "231", "232", "233", "234", "235", "236", "237", "238",
];
