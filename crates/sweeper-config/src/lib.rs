use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sweeper_core::{Collection, Filters, Settings};
use tracing::warn;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    NoBlocklist,
    BlocklistedAccount(String),
    UnconfiguredAccount(String),
    UnknownPreset(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBlocklist => write!(f, "no blocklist defined"),
            Self::BlocklistedAccount(_) => write!(f, "account is in blocklist"),
            Self::UnconfiguredAccount(_) => write!(f, "account is not configured"),
            Self::UnknownPreset(name) => write!(f, "unknown preset: {name}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Kind selectors for a sweep. `targets` and `cloud-control` are the
/// deprecated spellings of `includes` and `alternatives`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTypes {
    pub includes: Collection,
    pub excludes: Collection,
    pub alternatives: Collection,
    #[serde(skip_serializing_if = "Collection::is_empty")]
    targets: Collection,
    #[serde(rename = "cloud-control", skip_serializing_if = "Collection::is_empty")]
    cloud_control: Collection,
}

impl ResourceTypes {
    pub fn get_includes(&self) -> Collection {
        if !self.targets.is_empty() {
            warn!("deprecated configuration key 'targets' in use, use 'includes' instead");
        }
        self.includes.union(&self.targets)
    }

    pub fn get_alternatives(&self) -> Collection {
        if !self.cloud_control.is_empty() {
            warn!("deprecated configuration key 'cloud-control' in use, use 'alternatives' instead");
        }
        self.alternatives.union(&self.cloud_control)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub filters: Filters,
    #[serde(rename = "resource-types")]
    pub resource_types: ResourceTypes,
    pub presets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub filters: Filters,
}

/// The embedder-facing configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub blocklist: Vec<String>,
    pub regions: Vec<String>,
    pub accounts: BTreeMap<String, Account>,
    #[serde(rename = "resource-types")]
    pub resource_types: ResourceTypes,
    pub presets: BTreeMap<String, Preset>,
    pub settings: Settings,
    #[serde(rename = "account-blocklist", skip_serializing_if = "Vec::is_empty")]
    account_blocklist: Vec<String>,
    #[serde(rename = "account-blacklist", skip_serializing_if = "Vec::is_empty")]
    account_blacklist: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config at {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.fold_deprecated_keys();
        Ok(config)
    }

    fn fold_deprecated_keys(&mut self) {
        for (key, entries) in [
            ("account-blocklist", std::mem::take(&mut self.account_blocklist)),
            ("account-blacklist", std::mem::take(&mut self.account_blacklist)),
        ] {
            if entries.is_empty() {
                continue;
            }
            warn!("deprecated configuration key '{key}' in use, use 'blocklist' instead");
            for entry in entries {
                if !self.blocklist.contains(&entry) {
                    self.blocklist.push(entry);
                }
            }
        }
    }

    /// Guardrail before anything destructive: the account must be known,
    /// and a blocklist must exist that does not contain it.
    pub fn validate_account(&self, id: &str) -> Result<(), ConfigError> {
        if self.blocklist.is_empty() {
            return Err(ConfigError::NoBlocklist);
        }
        if self.blocklist.iter().any(|b| b == id) {
            return Err(ConfigError::BlocklistedAccount(id.to_string()));
        }
        if !self.accounts.contains_key(id) {
            return Err(ConfigError::UnconfiguredAccount(id.to_string()));
        }
        Ok(())
    }

    /// The account's filters with every referenced preset folded in.
    pub fn filters(&self, account_id: &str) -> Result<Filters, ConfigError> {
        let account = self
            .accounts
            .get(account_id)
            .ok_or_else(|| ConfigError::UnconfiguredAccount(account_id.to_string()))?;

        let mut filters = account.filters.clone();
        for name in &account.presets {
            let preset = self.presets.get(name).ok_or_else(|| ConfigError::UnknownPreset(name.clone()))?;
            filters.merge(preset.filters.clone());
        }
        Ok(filters)
    }

    /// Move per-account filter keys from deprecated kind names to their
    /// replacements (old name → new name). Having both spellings present is
    /// an error.
    pub fn resolve_deprecations(&mut self, deprecations: &HashMap<String, String>) -> anyhow::Result<()> {
        for (id, account) in self.accounts.iter_mut() {
            account
                .filters
                .resolve_deprecations(deprecations)
                .with_context(|| format!("resolving filters for account '{id}'"))?;
        }
        Ok(())
    }
}
