//! Codec configuration.
//!
//! Configuration is resolved once at process startup and then passed into a
//! [`crate::Codec`]. The crate never reads environment variables itself; callers that want an
//! environment override read the variable and hand the raw value to
//! [`max_depth_from_env_value`].

use crate::error::ConfigError;

/// Root marker used for violation paths.
pub const ROOT_PATH: &str = "$";

/// Default maximum nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest accepted maximum depth.
///
/// Kept below `serde_json`'s own recursion limit so the codec's depth error is the one callers
/// see.
pub const MAX_SUPPORTED_DEPTH: usize = 100;

/// Name of the environment variable conventionally used for the depth override.
pub const MAX_DEPTH_ENV: &str = "OPENEHR_MAX_DEPTH";

/// Codec configuration resolved at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    max_depth: usize,
}

impl CodecConfig {
    /// Create a new `CodecConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMaxDepth`] if `max_depth` is zero or above
    /// [`MAX_SUPPORTED_DEPTH`].
    pub fn new(max_depth: usize) -> Result<Self, ConfigError> {
        if !(1..=MAX_SUPPORTED_DEPTH).contains(&max_depth) {
            return Err(ConfigError::InvalidMaxDepth {
                value: max_depth,
                min: 1,
                max: MAX_SUPPORTED_DEPTH,
            });
        }
        Ok(Self { max_depth })
    }

    /// Maximum nesting depth enforced by decode, encode, canonicalise and validate.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Parse the maximum depth from an optional environment value.
///
/// If `value` is `None` or empty/whitespace, returns the default configuration.
pub fn max_depth_from_env_value(value: Option<String>) -> Result<CodecConfig, ConfigError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(CodecConfig::default()),
        Some(raw) => {
            let depth = raw
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidEnvValue(raw.clone()))?;
            CodecConfig::new(depth)
        }
    }
}
