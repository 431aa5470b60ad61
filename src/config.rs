//! Connection profiles.
//!
//! Profiles live in `profiles.toml`, looked up in the working directory and
//! then under `~/.config/taskview/`. Passwords never appear in the file;
//! the password authenticator reads `SNOWFLAKE_PASSWORD` from the
//! environment at connect time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::warehouse::AuthMethod;

pub const PROFILES_FILE: &str = "profiles.toml";

/// One named connection profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub account: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Credential strategy: "sso", "password" (default), or "key-pair".
    #[serde(default)]
    pub authenticator: AuthMethod,
    /// PEM private key for key-pair auth (default: ~/.ssh/id_rsa_snowflake).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// SHA256 public-key fingerprint registered with the warehouse, e.g.
    /// "SHA256:abc...". Appended to the JWT issuer when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_fp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: BTreeMap<String, Profile>,
}

impl Config {
    /// Load profiles from an explicit path, or search the default locations.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_path() {
                Some(p) => p,
                None => bail!(
                    "No {} found in the working directory or ~/.config/taskview/",
                    PROFILES_FILE
                ),
            },
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profiles file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse profiles file {:?}", path))
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Result<&Profile> {
        self.profile
            .get(name)
            .with_context(|| format!("No profile named '{}' in {}", name, PROFILES_FILE))
    }
}

fn default_path() -> Option<PathBuf> {
    let local = PathBuf::from(PROFILES_FILE);
    if local.exists() {
        return Some(local);
    }
    let home = dirs::config_dir()?.join("taskview").join(PROFILES_FILE);
    if home.exists() {
        return Some(home);
    }
    None
}
