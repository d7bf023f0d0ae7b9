//! Terminology lookups consulted by the openEHR validator.
//!
//! The validator only ever asks yes/no questions of a terminology: "is this a known
//! language code", "is this a known character set". This crate defines that query
//! interface ([`Terminology`]) and ships a small built-in table set ([`CodeTables`]) that
//! covers the codes seen in everyday openEHR data.
//!
//! Deployments with access to the full ISO 639-1 / IANA registries should load them into a
//! [`CodeTables`] (it deserialises from any serde format) or provide their own implementation
//! of the trait.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Terminology identifiers the validator knows how to consult.
pub mod ids {
    /// ISO 639-1 two letter language codes.
    pub const ISO_639_1: &str = "ISO_639-1";
    /// IANA registered character sets.
    pub const IANA_CHARACTER_SETS: &str = "IANA_character-sets";
    /// IANA registered media types.
    pub const IANA_MEDIA_TYPES: &str = "IANA_media-types";
    /// ISO 3166-1 two letter country codes.
    pub const ISO_3166_1: &str = "ISO_3166-1";
    /// The openEHR terminology.
    pub const OPENEHR: &str = "openehr";
}

/// Errors raised while assembling code tables.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TerminologyError {
    /// A code was empty or whitespace only.
    #[error("code cannot be empty (table: {0})")]
    EmptyCode(&'static str),
}

/// Read-only terminology queries.
///
/// Implementations must be pure: the same question always gets the same answer and no state
/// is shared with the caller.
pub trait Terminology: Send + Sync {
    /// Returns `true` if `code` is a known ISO 639-1 language (optionally region-qualified,
    /// for example `en-GB`).
    fn has_language(&self, code: &str) -> bool;

    /// Returns `true` if `code` is a known IANA character set (case-insensitive).
    fn has_charset(&self, code: &str) -> bool;

    /// Returns `true` if `code` is a known IANA media type (case-insensitive).
    fn has_media_type(&self, code: &str) -> bool;

    /// Returns `true` if `code` is a known ISO 3166-1 territory.
    fn has_territory(&self, code: &str) -> bool;
}

/// In-memory code tables.
///
/// Loaded tables go through the same normalisation as the `add_*` methods: codes are trimmed,
/// character sets and media types are folded to lower case, and blank codes are rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCodeTables")]
pub struct CodeTables {
    languages: BTreeSet<String>,
    charsets: BTreeSet<String>,
    media_types: BTreeSet<String>,
    territories: BTreeSet<String>,
}

/// Code tables as written in a data file, before normalisation.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCodeTables {
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default)]
    charsets: Vec<String>,
    #[serde(default)]
    media_types: Vec<String>,
    #[serde(default)]
    territories: Vec<String>,
}

impl TryFrom<RawCodeTables> for CodeTables {
    type Error = TerminologyError;

    fn try_from(raw: RawCodeTables) -> Result<Self, Self::Error> {
        let mut tables = CodeTables::default();
        for code in &raw.languages {
            tables.add_language(code)?;
        }
        for code in &raw.charsets {
            tables.add_charset(code)?;
        }
        for code in &raw.media_types {
            tables.add_media_type(code)?;
        }
        for code in &raw.territories {
            tables.add_territory(code)?;
        }
        Ok(tables)
    }
}

const BUILTIN_LANGUAGES: &[&str] = &[
    "ar", "bg", "bn", "ca", "cs", "cy", "da", "de", "el", "en", "es", "et", "fa", "fi", "fr",
    "ga", "gd", "he", "hi", "hr", "hu", "id", "is", "it", "ja", "ko", "lt", "lv", "ms", "mt",
    "nb", "nl", "nn", "no", "pl", "pt", "ro", "ru", "sk", "sl", "sq", "sr", "sv", "sw", "ta",
    "th", "tr", "uk", "ur", "vi", "zh",
];

const BUILTIN_CHARSETS: &[&str] = &[
    "utf-8", "utf-16", "utf-16be", "utf-16le", "us-ascii", "iso-8859-1", "iso-8859-2",
    "iso-8859-15", "windows-1250", "windows-1252", "shift_jis", "euc-jp", "gb2312", "big5",
];

const BUILTIN_MEDIA_TYPES: &[&str] = &[
    "application/dicom",
    "application/json",
    "application/msword",
    "application/pdf",
    "application/rtf",
    "application/xml",
    "audio/mpeg",
    "audio/ogg",
    "audio/wav",
    "image/bmp",
    "image/gif",
    "image/jpeg",
    "image/png",
    "image/svg+xml",
    "image/tiff",
    "text/html",
    "text/markdown",
    "text/plain",
    "text/rtf",
    "text/xml",
    "video/mp4",
    "video/mpeg",
    "video/quicktime",
];

const BUILTIN_TERRITORIES: &[&str] = &[
    "AR", "AT", "AU", "BE", "BR", "CA", "CH", "CN", "CZ", "DE", "DK", "ES", "FI", "FR", "GB",
    "GR", "IE", "IN", "IT", "JP", "KR", "MX", "NL", "NO", "NZ", "PL", "PT", "RU", "SE", "SG",
    "SI", "TR", "US", "ZA",
];

static BUILTIN: Lazy<CodeTables> = Lazy::new(|| CodeTables {
    languages: BUILTIN_LANGUAGES.iter().map(|c| (*c).to_owned()).collect(),
    charsets: BUILTIN_CHARSETS.iter().map(|c| (*c).to_owned()).collect(),
    media_types: BUILTIN_MEDIA_TYPES.iter().map(|c| (*c).to_owned()).collect(),
    territories: BUILTIN_TERRITORIES.iter().map(|c| (*c).to_owned()).collect(),
});

impl CodeTables {
    /// Returns the built-in tables shipped with this crate.
    pub fn builtin() -> &'static CodeTables {
        &BUILTIN
    }

    /// Adds a language code.
    pub fn add_language(&mut self, code: &str) -> Result<(), TerminologyError> {
        insert(&mut self.languages, "languages", code, false)
    }

    /// Adds a character set (stored lower-case).
    pub fn add_charset(&mut self, code: &str) -> Result<(), TerminologyError> {
        insert(&mut self.charsets, "charsets", code, true)
    }

    /// Adds a media type (stored lower-case).
    pub fn add_media_type(&mut self, code: &str) -> Result<(), TerminologyError> {
        insert(&mut self.media_types, "media_types", code, true)
    }

    /// Adds a territory code.
    pub fn add_territory(&mut self, code: &str) -> Result<(), TerminologyError> {
        insert(&mut self.territories, "territories", code, false)
    }
}

fn insert(
    table: &mut BTreeSet<String>,
    name: &'static str,
    code: &str,
    fold_case: bool,
) -> Result<(), TerminologyError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(TerminologyError::EmptyCode(name));
    }
    let code = if fold_case {
        code.to_ascii_lowercase()
    } else {
        code.to_owned()
    };
    table.insert(code);
    Ok(())
}

impl Terminology for CodeTables {
    fn has_language(&self, code: &str) -> bool {
        // `en-GB` is accepted when the primary subtag is known.
        let primary = code.split(['-', '_']).next().unwrap_or(code);
        self.languages.contains(primary)
    }

    fn has_charset(&self, code: &str) -> bool {
        self.charsets.contains(&code.to_ascii_lowercase())
    }

    fn has_media_type(&self, code: &str) -> bool {
        // Parameters such as `; charset=utf-8` are not part of the registered name.
        let essence = code.split(';').next().unwrap_or(code).trim();
        self.media_types.contains(&essence.to_ascii_lowercase())
    }

    fn has_territory(&self, code: &str) -> bool {
        self.territories.contains(code)
    }
}

impl<T: Terminology + ?Sized> Terminology for &T {
    fn has_language(&self, code: &str) -> bool {
        (**self).has_language(code)
    }

    fn has_charset(&self, code: &str) -> bool {
        (**self).has_charset(code)
    }

    fn has_media_type(&self, code: &str) -> bool {
        (**self).has_media_type(code)
    }

    fn has_territory(&self, code: &str) -> bool {
        (**self).has_territory(code)
    }
}
