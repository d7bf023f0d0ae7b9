//! Lexical grammars for structured RM strings.
//!
//! Identifiers, version-tree ids, ISO 8601 temporal values and URIs are plain strings on the
//! wire. The validator checks them against the grammars here. Regexes are compiled once on
//! first use.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time constants covered by the tests below.
    #[allow(clippy::expect_used)]
    Regex::new(pattern).expect("lexical grammar regex must compile")
}

const OID: &str = r"[0-9]+(?:\.[0-9]+)*";
const INTERNET_ID: &str = r"[A-Za-z][A-Za-z0-9-]*(?:\.[A-Za-z][A-Za-z0-9-]*)*";
const UUID: &str = r"[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}";
const VERSION_TREE_ID: &str = r"[1-9][0-9]*(?:\.[1-9][0-9]*\.[1-9][0-9]*)?";
const NAME_PART: &str = r"[A-Za-z][A-Za-z0-9_]*";

static UUID_RE: Lazy<Regex> = Lazy::new(|| compile(&format!("^{UUID}$")));
static OID_RE: Lazy<Regex> = Lazy::new(|| compile(&format!("^{OID}$")));
static INTERNET_ID_RE: Lazy<Regex> = Lazy::new(|| compile(&format!("^{INTERNET_ID}$")));
static VERSION_TREE_ID_RE: Lazy<Regex> =
    Lazy::new(|| compile(&format!("^{VERSION_TREE_ID}$")));

static ARCHETYPE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"^(?:{NAME_PART}::)?{NAME_PART}-{NAME_PART}-{NAME_PART}\.{NAME_PART}(?:-[A-Za-z0-9_]+)*\.v[0-9]+(?:\.[0-9]+){{0,2}}(?:-(?:rc|alpha)(?:\.?[0-9]+)?)?$"
    ))
});

static TERMINOLOGY_ID_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"^[A-Za-z][A-Za-z0-9_./+-]*(?:\([^()\s][^()]*\))?$"));

static NAMESPACE_RE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z][A-Za-z0-9_.:/&?=+-]*$"));

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"^(?P<y>[0-9]{4})(?:-(?P<m>[0-9]{2})(?:-(?P<d>[0-9]{2}))?|(?P<bm>[0-9]{2})(?P<bd>[0-9]{2}))?$")
});

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^(?P<h>[0-9]{2})(?::?(?P<mi>[0-9]{2})(?::?(?P<s>[0-9]{2})(?:[.,][0-9]+)?)?)?(?:Z|[+-](?P<zh>[0-9]{2})(?::?(?P<zm>[0-9]{2}))?)?$",
    )
});

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^-?P(?:[0-9]+Y)?(?:[0-9]+M)?(?:[0-9]+W)?(?:[0-9]+D)?(?:T(?:[0-9]+H)?(?:[0-9]+M)?(?:[0-9]+(?:[.,][0-9]+)?S)?)?$",
    )
});

static URI_RE: Lazy<Regex> = Lazy::new(|| compile(r"^[A-Za-z][A-Za-z0-9+.-]*:[^\s]*$"));
static RM_VERSION_RE: Lazy<Regex> = Lazy::new(|| compile(r"^[0-9]+\.[0-9]+\.[0-9]+$"));
static NODE_CODE_RE: Lazy<Regex> = Lazy::new(|| compile(r"^(?:at|id)[0-9]+(?:\.[0-9]+)*$"));

/// Structured string forms checked by the validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grammar {
    /// `uid ( '::' extension )?`.
    HierObjectId,
    /// `object_id '::' creating_system_id '::' version_tree_id`.
    ObjectVersionId,
    /// `trunk ( '.' branch '.' version )?`.
    VersionTreeId,
    ArchetypeId,
    /// `name ( '(' version ')' )?`.
    TerminologyId,
    /// Namespace of an OBJECT_REF.
    Namespace,
    /// `archetype_node_id` of a LOCATABLE: an at/id code or an archetype id.
    ArchetypeNodeId,
    /// ISO 8601 date, possibly partial (`2024`, `2024-03`, `2024-03-01`).
    Date,
    /// ISO 8601 time, possibly partial, with optional zone.
    Time,
    /// ISO 8601 date, optionally followed by `T` and a time.
    DateTime,
    /// ISO 8601 duration.
    Duration,
    Uri,
    /// URI with the `ehr` scheme.
    EhrUri,
    /// Three-part RM release number.
    RmVersion,
}

impl Grammar {
    /// Human readable name used in violation messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::HierObjectId => "HIER_OBJECT_ID",
            Self::ObjectVersionId => "OBJECT_VERSION_ID",
            Self::VersionTreeId => "version tree id",
            Self::ArchetypeId => "archetype id",
            Self::TerminologyId => "terminology id",
            Self::Namespace => "namespace",
            Self::ArchetypeNodeId => "archetype node id",
            Self::Date => "ISO 8601 date",
            Self::Time => "ISO 8601 time",
            Self::DateTime => "ISO 8601 date-time",
            Self::Duration => "ISO 8601 duration",
            Self::Uri => "URI",
            Self::EhrUri => "ehr URI",
            Self::RmVersion => "RM version",
        }
    }

    /// Remediation hint used in violation messages.
    pub fn hint(self) -> &'static str {
        match self {
            Self::HierObjectId => "Use a UUID, ISO OID or reverse domain name, optionally followed by '::' and an extension",
            Self::ObjectVersionId => "Use the form object_id::creating_system_id::version_tree_id, for example 8849182c-82ad-4088-a07f-48ead4180515::example.org::1",
            Self::VersionTreeId => "Use a trunk version such as '1' or a branch such as '1.2.1'",
            Self::ArchetypeId => "Use the form originator-package-CLASS.concept.vN, for example openEHR-EHR-OBSERVATION.blood_pressure.v1",
            Self::TerminologyId => "Use a terminology name, optionally followed by a version in parentheses, for example SNOMED-CT(2003)",
            Self::Namespace => "Start with a letter and use only letters, digits and _.:/&?=+-",
            Self::ArchetypeNodeId => "Use an at/id code such as at0001 or an archetype id",
            Self::Date => "Use YYYY, YYYY-MM or YYYY-MM-DD with a real calendar date",
            Self::Time => "Use hh, hh:mm or hh:mm:ss[.fff] with an optional Z or +hh:mm zone",
            Self::DateTime => "Use an ISO 8601 date optionally followed by 'T' and a time",
            Self::Duration => "Use the form PnYnMnWnDTnHnMnS with at least one component, for example P1DT2H",
            Self::Uri => "Use an absolute URI with a scheme, for example https://example.org/doc",
            Self::EhrUri => "Use an ehr: URI, for example ehr://system/ehr_id",
            Self::RmVersion => "Use a release number such as 1.1.0",
        }
    }

    /// Returns `true` if `value` belongs to this grammar.
    pub fn matches(self, value: &str) -> bool {
        match self {
            Self::HierObjectId => is_hier_object_id(value),
            Self::ObjectVersionId => is_object_version_id(value),
            Self::VersionTreeId => VERSION_TREE_ID_RE.is_match(value),
            Self::ArchetypeId => ARCHETYPE_ID_RE.is_match(value),
            Self::TerminologyId => TERMINOLOGY_ID_RE.is_match(value),
            Self::Namespace => NAMESPACE_RE.is_match(value),
            Self::ArchetypeNodeId => {
                NODE_CODE_RE.is_match(value) || ARCHETYPE_ID_RE.is_match(value)
            }
            Self::Date => is_date(value),
            Self::Time => is_time(value),
            Self::DateTime => is_date_time(value),
            Self::Duration => is_duration(value),
            Self::Uri => URI_RE.is_match(value),
            Self::EhrUri => value.starts_with("ehr:") && URI_RE.is_match(value),
            Self::RmVersion => RM_VERSION_RE.is_match(value),
        }
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// UUID, ISO OID or reverse internet domain name.
pub fn is_uid(value: &str) -> bool {
    is_uuid(value) || OID_RE.is_match(value) || INTERNET_ID_RE.is_match(value)
}

/// Hyphenated UUID in the 8-4-4-4-12 form.
pub fn is_uuid(value: &str) -> bool {
    UUID_RE.is_match(value) && uuid::Uuid::try_parse(value).is_ok()
}

fn is_hier_object_id(value: &str) -> bool {
    match value.split_once("::") {
        None => is_uid(value),
        Some((root, extension)) => is_uid(root) && !extension.trim().is_empty(),
    }
}

fn is_object_version_id(value: &str) -> bool {
    let mut parts = value.split("::");
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(object_id), Some(system_id), Some(version), None) => {
            is_uid(object_id) && is_uid(system_id) && VERSION_TREE_ID_RE.is_match(version)
        }
        _ => false,
    }
}

fn is_date(value: &str) -> bool {
    let Some(caps) = DATE_RE.captures(value) else {
        return false;
    };
    let field = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = field("y").map(|y| y as i32);
    let month = field("m").or_else(|| field("bm"));
    let day = field("d").or_else(|| field("bd"));

    match (year, month, day) {
        (Some(_), None, None) => true,
        (Some(_), Some(month), None) => (1..=12).contains(&month),
        (Some(year), Some(month), Some(day)) => NaiveDate::from_ymd_opt(year, month, day).is_some(),
        _ => false,
    }
}

fn is_time(value: &str) -> bool {
    let Some(caps) = TIME_RE.captures(value) else {
        return false;
    };
    let field = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());
    let hour = field("h").unwrap_or(0);
    let minute = field("mi").unwrap_or(0);
    let second = field("s").unwrap_or(0);

    let midnight = hour == 24 && minute == 0 && second == 0;
    let clock = (hour < 24 || midnight) && minute < 60 && second < 60;
    let zone = field("zh").unwrap_or(0) <= 14 && field("zm").unwrap_or(0) < 60;
    clock && zone
}

fn is_date_time(value: &str) -> bool {
    match value.split_once('T') {
        None => is_date(value),
        Some((date, time)) => is_date(date) && is_time(time),
    }
}

fn is_duration(value: &str) -> bool {
    // The regex allows every component to be absent; at least one must be present and a
    // time designator must be followed by a time component.
    DURATION_RE.is_match(value) && !value.ends_with('P') && !value.ends_with('T')
}

/// Components of an archetype identifier string.
///
/// `openEHR-EHR-OBSERVATION.blood_pressure.v1` splits into originator `openEHR`, package
/// `EHR`, class `OBSERVATION`, concept `blood_pressure` and version `1`. Specialised concepts
/// (`blood_pressure-ambulatory`) and dotted versions (`v1.0.2`) are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchetypeIdParts {
    pub namespace: Option<String>,
    pub rm_originator: String,
    pub rm_name: String,
    pub rm_entity: String,
    pub concept: String,
    pub version: String,
}

impl ArchetypeIdParts {
    /// Parse an archetype identifier.
    ///
    /// Returns `None` if `raw` is not a well-formed archetype id.
    pub fn parse(raw: &str) -> Option<Self> {
        if !ARCHETYPE_ID_RE.is_match(raw) {
            return None;
        }

        let (namespace, qualified) = match raw.split_once("::") {
            Some((namespace, rest)) => (Some(namespace.to_owned()), rest),
            None => (None, raw),
        };

        // Split originator and remainder
        let (rm_originator, rest) = qualified.split_once('-')?;
        let (rm_name, rest) = rest.split_once('-')?;
        let (rm_entity, rest) = rest.split_once('.')?;
        let (concept, version) = rest.rsplit_once(".v")?;

        Some(Self {
            namespace,
            rm_originator: rm_originator.to_owned(),
            rm_name: rm_name.to_owned(),
            rm_entity: rm_entity.to_owned(),
            concept: concept.to_owned(),
            version: version.to_owned(),
        })
    }

    /// Returns `true` if this archetype constrains `rm_type` (for example `COMPOSITION`).
    pub fn targets(&self, rm_type: &str) -> bool {
        self.rm_entity == rm_type
    }
}

impl fmt::Display for ArchetypeIdParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}::")?;
        }
        write!(
            f,
            "{}-{}-{}.{}.v{}",
            self.rm_originator, self.rm_name, self.rm_entity, self.concept, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(Grammar::HierObjectId.matches("8849182c-82ad-4088-a07f-48ead4180515"));
        assert!(Grammar::HierObjectId.matches("1.2.840.113619::local-7"));
        assert!(Grammar::HierObjectId.matches("org.example.system"));
        assert!(!Grammar::HierObjectId.matches("1.2.840::"));
        assert!(!Grammar::HierObjectId.matches("has spaces"));

        assert!(Grammar::ObjectVersionId
            .matches("8849182c-82ad-4088-a07f-48ead4180515::example.org::1"));
        assert!(Grammar::ObjectVersionId
            .matches("8849182c-82ad-4088-a07f-48ead4180515::example.org::2.1.4"));
        assert!(!Grammar::ObjectVersionId.matches("8849182c-82ad-4088-a07f-48ead4180515"));
        assert!(!Grammar::ObjectVersionId
            .matches("8849182c-82ad-4088-a07f-48ead4180515::example.org::0"));
        assert!(!Grammar::ObjectVersionId
            .matches("8849182c-82ad-4088-a07f-48ead4180515::example.org::1.2"));

        assert!(Grammar::TerminologyId.matches("SNOMED-CT"));
        assert!(Grammar::TerminologyId.matches("SNOMED-CT(2003)"));
        assert!(Grammar::TerminologyId.matches("ISO_639-1"));
        assert!(!Grammar::TerminologyId.matches("(2003)"));

        assert!(Grammar::Namespace.matches("local"));
        assert!(Grammar::Namespace.matches("ehr://example.org/mpi"));
        assert!(!Grammar::Namespace.matches("1local"));
    }

    #[test]
    fn archetype_ids() {
        assert!(Grammar::ArchetypeId.matches("openEHR-EHR-OBSERVATION.blood_pressure.v1"));
        assert!(Grammar::ArchetypeId.matches("openEHR-EHR-CLUSTER.device-ambulatory.v1.0.2"));
        assert!(!Grammar::ArchetypeId.matches("openEHR-EHR-OBSERVATION.blood_pressure"));
        assert!(Grammar::ArchetypeNodeId.matches("at0001"));
        assert!(Grammar::ArchetypeNodeId.matches("id1.1"));
        assert!(!Grammar::ArchetypeNodeId.matches("node"));

        let parts =
            ArchetypeIdParts::parse("openEHR-EHR-COMPOSITION.encounter.v1").expect("parse");
        assert_eq!(parts.rm_originator, "openEHR");
        assert_eq!(parts.rm_name, "EHR");
        assert!(parts.targets("COMPOSITION"));
        assert_eq!(parts.concept, "encounter");
        assert_eq!(parts.version, "1");
        assert_eq!(parts.to_string(), "openEHR-EHR-COMPOSITION.encounter.v1");
        assert_eq!(ArchetypeIdParts::parse("openEHR-EHR.encounter"), None);
    }

    #[test]
    fn temporal_values() {
        assert!(Grammar::Date.matches("2024"));
        assert!(Grammar::Date.matches("2024-02"));
        assert!(Grammar::Date.matches("2024-02-29"));
        assert!(Grammar::Date.matches("20240229"));
        assert!(!Grammar::Date.matches("2023-02-29"));
        assert!(!Grammar::Date.matches("2024-13"));

        assert!(Grammar::Time.matches("10:30"));
        assert!(Grammar::Time.matches("10:30:15.250+01:00"));
        assert!(Grammar::Time.matches("24:00:00"));
        assert!(!Grammar::Time.matches("24:30"));
        assert!(!Grammar::Time.matches("10:61"));

        assert!(Grammar::DateTime.matches("2024-03-01T10:30:00Z"));
        assert!(Grammar::DateTime.matches("2024-03-01"));
        assert!(!Grammar::DateTime.matches("2024-03-01T"));

        assert!(Grammar::Duration.matches("P1DT2H"));
        assert!(Grammar::Duration.matches("PT0.5S"));
        assert!(Grammar::Duration.matches("-P2W"));
        assert!(!Grammar::Duration.matches("P"));
        assert!(!Grammar::Duration.matches("P1DT"));
        assert!(!Grammar::Duration.matches("1D"));
    }

    #[test]
    fn uris() {
        assert!(Grammar::Uri.matches("https://example.org/doc?id=1"));
        assert!(!Grammar::Uri.matches("not a uri"));
        assert!(Grammar::EhrUri.matches("ehr://system/7d44b88c"));
        assert!(!Grammar::EhrUri.matches("https://system/7d44b88c"));
        assert!(Grammar::RmVersion.matches("1.1.0"));
        assert!(!Grammar::RmVersion.matches("1.1"));
    }
}
