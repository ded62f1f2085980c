use std::path::Path;

use serde::{Deserialize, Serialize};

use folio_registry::ReusePolicy;
use folio_types::FormatVersion;
use folio_xref::{SaveMode, WriteOptions};

use crate::error::{SessionError, SessionResult};

/// Settings for a persistence session.
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// What `remove` does to generations and whether free entries are
    /// linked on write.
    pub reuse_policy: ReusePolicy,
    /// Mode used by callers that do not pick one explicitly.
    pub default_mode: SaveMode,
    /// Stamped into the Info dictionary as `/Producer` on every save.
    pub producer: Option<String>,
    /// Stamp `/ModDate` into the Info dictionary on every save.
    pub update_info_dates: bool,
    /// fsync the temporary file before a save reports success.
    pub sync_on_save: bool,
    /// Header version for documents created in this session. Opened
    /// documents keep their own.
    pub format_version: FormatVersion,
    /// Check every written cross-reference entry against the output.
    pub verify_writes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reuse_policy: ReusePolicy::NeverRecycle,
            default_mode: SaveMode::Standard,
            producer: None,
            update_info_dates: false,
            sync_on_save: true,
            format_version: FormatVersion::V1_7,
            verify_writes: true,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SessionResult<String> {
        toml::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    /// Writer settings for a document whose header carries `version`.
    pub fn write_options(&self, version: FormatVersion) -> WriteOptions {
        WriteOptions {
            version,
            policy: self.reuse_policy,
            verify: self.verify_writes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = SessionConfig::default();
        assert_eq!(c.reuse_policy, ReusePolicy::NeverRecycle);
        assert_eq!(c.default_mode, SaveMode::Standard);
        assert!(c.producer.is_none());
        assert!(!c.update_info_dates);
        assert!(c.sync_on_save);
        assert_eq!(c.format_version, FormatVersion::V1_7);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = SessionConfig::from_toml_str(
            r#"
            reuse_policy = "legacy-free-list"
            default_mode = "incremental"
            producer = "folio test"
            format_version = "1.4"
            "#,
        )
        .unwrap();
        assert_eq!(c.reuse_policy, ReusePolicy::LegacyFreeList);
        assert_eq!(c.default_mode, SaveMode::Incremental);
        assert_eq!(c.producer.as_deref(), Some("folio test"));
        assert_eq!(c.format_version, FormatVersion::V1_4);
        assert!(c.verify_writes);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SessionConfig::from_toml_str("colour = true").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(SessionConfig::from_toml_str(r#"default_mode = "fast""#).is_err());
        assert!(SessionConfig::from_toml_str(r#"format_version = "seven""#).is_err());
    }

    #[test]
    fn toml_round_trip() {
        let c = SessionConfig {
            producer: Some("folio".into()),
            update_info_dates: true,
            ..SessionConfig::default()
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "sync_on_save = false\n").unwrap();
        let c = SessionConfig::load(&path).unwrap();
        assert!(!c.sync_on_save);
        assert!(matches!(
            SessionConfig::load(&dir.path().join("missing.toml")),
            Err(SessionError::Io(_))
        ));
    }
}
