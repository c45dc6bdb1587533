//! Configuration Management
//!
//! This module loads and saves named connection profiles.
//!
//! # Configuration Locations
//! - Local: `.sqlmend/profiles.json` (team-shareable, per-project)
//! - Global: `~/.config/sqlmend/profiles.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Local profiles (`.sqlmend/profiles.json`)
//! 2. Global profiles (`~/.config/sqlmend/profiles.json`)
//!
//! A local profile replaces a global profile with the same name, and a local
//! default replaces the global default.
//!
//! # File Format
//! ```json
//! {
//!   "profiles": {
//!     "local": { "driver": "mysql", "host": "localhost", "username": "app",
//!                "password_env": "APP_DB_PASSWORD", "database": "shop" },
//!     "scratch": { "driver": "sqlite", "database": "/tmp/scratch.db", "retry_attempts": 1 }
//!   },
//!   "default": "local"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::driver::ConnectionProfile;
use crate::error::{Result, SqlmendError};
use crate::executor::RetryPolicy;

const DIR_NAME: &str = "sqlmend";
const LOCAL_DIR_NAME: &str = ".sqlmend";
const FILE_NAME: &str = "profiles.json";

/// Profiles stored in one configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRegistry {
    /// Named profiles
    #[serde(default)]
    pub profiles: BTreeMap<String, StoredProfile>,

    /// Name of the default profile (must exist in `profiles`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ProfileRegistry {
    /// Overlay `local` on top of `self`; local entries win
    #[must_use]
    pub fn merge(mut self, local: Self) -> Self {
        self.profiles.extend(local.profiles);
        if local.default.is_some() {
            self.default = local.default;
        }
        self
    }

    /// Look up a profile by name, or the default profile when `name` is `None`
    pub fn get(&self, name: Option<&str>) -> Result<&StoredProfile> {
        let name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                SqlmendError::config_error(format!(
                    "No default profile set. Available profiles: {:?}",
                    self.profiles.keys().collect::<Vec<_>>()
                ))
            })?,
        };

        self.profiles.get(name).ok_or_else(|| {
            SqlmendError::config_error(format!(
                "Profile '{name}' not found. Available profiles: {:?}",
                self.profiles.keys().collect::<Vec<_>>()
            ))
        })
    }

    /// Add or replace a profile; the first profile becomes the default
    pub fn insert(&mut self, name: impl Into<String>, stored: StoredProfile) {
        let name = name.into();
        if self.profiles.is_empty() {
            self.default = Some(name.clone());
        }
        self.profiles.insert(name, stored);
    }
}

/// Stored profile
///
/// A `ConnectionProfile` plus settings that only make sense at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProfile {
    #[serde(flatten)]
    pub profile: ConnectionProfile,

    /// Environment variable holding the password (instead of storing it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Attempt budget override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
}

impl From<ConnectionProfile> for StoredProfile {
    fn from(profile: ConnectionProfile) -> Self {
        Self { profile, password_env: None, retry_attempts: None }
    }
}

impl StoredProfile {
    /// Resolve environment variables and return the profile and retry policy
    pub fn resolve(&self) -> Result<(ConnectionProfile, RetryPolicy)> {
        let mut profile = self.profile.clone();

        if let Some(env_var) = &self.password_env {
            profile.password = std::env::var(env_var).map_err(|_| {
                SqlmendError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?;
        }

        let retry = self.retry_attempts.map_or_else(RetryPolicy::default, RetryPolicy::new);
        Ok((profile, retry))
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// `.sqlmend/profiles.json` in the current directory
    Local,
    /// `~/.config/sqlmend/profiles.json`
    Global,
}

impl ConfigLocation {
    pub fn path(self) -> Result<PathBuf> {
        match self {
            Self::Local => local_config_path(),
            Self::Global => global_config_path(),
        }
    }
}

/// Get path to local config file (`.sqlmend/profiles.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        SqlmendError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(LOCAL_DIR_NAME).join(FILE_NAME))
}

/// Get path to global config file (`~/.config/sqlmend/profiles.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| SqlmendError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join(DIR_NAME).join(FILE_NAME))
}

/// Load a registry from `path`; a missing file is an empty registry
pub fn load_registry(path: &Path) -> Result<ProfileRegistry> {
    if !path.exists() {
        return Ok(ProfileRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| SqlmendError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        SqlmendError::config_error(format!("Invalid config file {}: {e}", path.display()))
    })
}

/// Save a registry to `path`, creating parent directories
pub fn save_registry(path: &Path, registry: &ProfileRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SqlmendError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| SqlmendError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| SqlmendError::config_error(format!("Could not write config file: {e}")))?;

    debug!(path = %path.display(), "saved profile registry");
    Ok(())
}

/// Load the merged view of the global and local registries
pub fn load_with_precedence() -> Result<ProfileRegistry> {
    load_merged(&local_config_path()?, &global_config_path()?)
}

fn load_merged(local: &Path, global: &Path) -> Result<ProfileRegistry> {
    let global = load_registry(global)?;
    let local = load_registry(local)?;
    Ok(global.merge(local))
}

/// Resolve a profile by name, or the default profile when `name` is `None`
pub fn resolve_profile(name: Option<&str>) -> Result<(ConnectionProfile, RetryPolicy)> {
    load_with_precedence()?.get(name)?.resolve()
}

/// Save a profile to the local or global config file
///
/// The first profile saved to a file becomes its default.
pub fn save_profile(name: &str, profile: ConnectionProfile, location: ConfigLocation) -> Result<()> {
    let path = location.path()?;
    let mut registry = load_registry(&path)?;
    registry.insert(name, StoredProfile::from(profile));
    save_registry(&path, &registry)
}

/// List all resolvable profiles in the merged view
///
/// Profiles that fail to resolve (missing env vars) are skipped.
pub fn list_profiles() -> Result<Vec<(String, ConnectionProfile)>> {
    let registry = load_with_precedence()?;

    let mut profiles = Vec::new();
    for (name, stored) in registry.profiles {
        match stored.resolve() {
            Ok((profile, _retry)) => profiles.push((name, profile)),
            // Error details omitted so no credential ends up in logs
            Err(_) => warn!(profile = %name, "could not resolve profile"),
        }
    }

    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverKind;
    use pretty_assertions::assert_eq;

    fn mysql(host: &str) -> StoredProfile {
        ConnectionProfile::mysql(host, "user", "pass", "db").into()
    }

    #[test]
    fn test_registry_serialization() {
        let mut registry = ProfileRegistry::default();
        registry.insert("test", mysql("localhost"));

        let json = serde_json::to_string_pretty(&registry).unwrap();
        assert!(json.contains(r#""default": "test""#));
        assert!(json.contains(r#""host": "localhost""#));
        assert!(!json.contains("password_env"));
        assert!(!json.contains("retry_attempts"));
    }

    #[test]
    fn test_registry_file_format() {
        let registry: ProfileRegistry = serde_json::from_str(
            r#"{
                "profiles": {
                    "scratch": { "driver": "sqlite", "database": "/tmp/scratch.db", "retry_attempts": 1 }
                },
                "default": "scratch"
            }"#,
        )
        .unwrap();

        let (profile, retry) = registry.get(None).unwrap().resolve().unwrap();
        assert_eq!(profile.driver, DriverKind::Sqlite);
        assert_eq!(profile.database, "/tmp/scratch.db");
        assert_eq!(retry, RetryPolicy::new(1));
    }

    #[test]
    fn test_first_profile_becomes_default() {
        let mut registry = ProfileRegistry::default();
        registry.insert("first", mysql("a"));
        registry.insert("second", mysql("b"));
        assert_eq!(registry.default.as_deref(), Some("first"));
        assert_eq!(registry.get(None).unwrap().profile.host, "a");
    }

    #[test]
    fn test_resolve_direct_password() {
        let (profile, retry) = mysql("localhost").resolve().unwrap();
        assert_eq!(profile.password, "pass");
        assert_eq!(retry, RetryPolicy::default());
    }

    #[test]
    fn test_resolve_env_var() {
        std::env::set_var("SQLMEND_TEST_PASSWORD", "secret");

        let stored = StoredProfile {
            password_env: Some("SQLMEND_TEST_PASSWORD".to_string()),
            ..mysql("localhost")
        };
        let (profile, _) = stored.resolve().unwrap();
        assert_eq!(profile.password, "secret");

        std::env::remove_var("SQLMEND_TEST_PASSWORD");
    }

    #[test]
    fn test_resolve_missing_env_var() {
        let stored = StoredProfile {
            password_env: Some("SQLMEND_NONEXISTENT_VAR".to_string()),
            ..mysql("localhost")
        };

        let err = stored.resolve().unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("Environment variable SQLMEND_NONEXISTENT_VAR not found"));
    }

    #[test]
    fn test_unknown_profile() {
        let registry = ProfileRegistry::default();
        assert!(registry.get(None).is_err());
        let err = registry.get(Some("prod")).unwrap_err();
        assert!(err.to_string().contains("Profile 'prod' not found"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = load_registry(&dir.path().join("nope.json")).unwrap();
        assert_eq!(registry, ProfileRegistry::default());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        fs::write(&path, "{ not json").unwrap();

        let err = load_registry(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_DIR_NAME).join(FILE_NAME);

        let mut registry = ProfileRegistry::default();
        registry.insert("dev", mysql("dev-host"));
        save_registry(&path, &registry).unwrap();

        assert_eq!(load_registry(&path).unwrap(), registry);
    }

    #[test]
    fn test_local_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let local_path = dir.path().join("local.json");
        let global_path = dir.path().join("global.json");

        let mut global = ProfileRegistry::default();
        global.insert("shared", mysql("global-host"));
        global.insert("global-only", mysql("other-host"));
        save_registry(&global_path, &global).unwrap();

        let mut local = ProfileRegistry::default();
        local.insert("shared", mysql("local-host"));
        save_registry(&local_path, &local).unwrap();

        let merged = load_merged(&local_path, &global_path).unwrap();
        assert_eq!(merged.profiles.len(), 2);
        assert_eq!(merged.get(Some("shared")).unwrap().profile.host, "local-host");
        assert_eq!(merged.get(Some("global-only")).unwrap().profile.host, "other-host");
    }

    #[test]
    fn test_global_default_kept_without_local_default() {
        let mut global = ProfileRegistry::default();
        global.insert("main", mysql("global-host"));

        let local = ProfileRegistry {
            profiles: BTreeMap::from([("extra".to_string(), mysql("local-host"))]),
            default: None,
        };

        let merged = global.merge(local);
        assert_eq!(merged.default.as_deref(), Some("main"));
        assert_eq!(merged.profiles.len(), 2);
    }
}
