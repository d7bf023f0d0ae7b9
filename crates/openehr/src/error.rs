//! Error types for the codec.
//!
//! Decode, encode and canonicalise failures are errors. Validation findings are not: they are
//! returned as [`crate::validation::Violation`] data and never abort a run.

/// Errors returned while decoding bytes into RM nodes.
///
/// Any decode error is fatal to the call: no partial tree is returned.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid `_type` discriminator: {0}")]
    Discriminator(String),

    #[error("maximum depth exceeded: input nests {depth} levels, limit is {limit}")]
    MaxDepthExceeded { limit: usize, depth: usize },

    #[error("{family} member {type_tag} could not be decoded at {path}: {message}")]
    Variant {
        family: &'static str,
        type_tag: &'static str,
        path: String,
        message: String,
    },

    #[error("{model} schema mismatch at {path}: {message}")]
    Schema {
        model: &'static str,
        path: String,
        message: String,
    },
}

/// Errors returned while encoding RM nodes.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot serialize unrecognized subtype `{type_tag}` of {family} at {path}")]
    UnknownVariant {
        family: &'static str,
        type_tag: String,
        path: String,
    },

    /// The `_type` a family member would carry on the wire (its stored tag, or none and thus
    /// the family default) names a different member.
    #[error("{type_name} at {path} would be read back as {wire_tag} in a {family} slot; canonicalize before encoding")]
    Mistagged {
        family: &'static str,
        type_name: &'static str,
        wire_tag: String,
        path: String,
    },

    #[error("maximum depth exceeded at {path} (limit is {limit})")]
    MaxDepthExceeded { limit: usize, path: String },

    #[error("JSON serialisation failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialisation failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors returned by the canonicaliser.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanonicalizeError {
    #[error("maximum depth exceeded at {path} (limit is {limit})")]
    MaxDepthExceeded { limit: usize, path: String },
}

/// Errors returned while building a [`crate::config::CodecConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_depth must be between {min} and {max}, got {value}")]
    InvalidMaxDepth {
        value: usize,
        min: usize,
        max: usize,
    },

    #[error("max_depth is not a number: {0}")]
    InvalidEnvValue(String),
}

/// Errors returned by the `openehr` crate.
#[derive(Debug, thiserror::Error)]
pub enum OpenEhrError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Canonicalize(#[from] CanonicalizeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Type alias for Results that can fail with an [`OpenEhrError`].
pub type OpenEhrResult<T> = Result<T, OpenEhrError>;
