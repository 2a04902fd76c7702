// Copyright (c) 2024 PostFinance AG
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, VaultError};
use crate::files::{create_private_dir, write_private};
use crate::names::sanitize;
use crate::vault::{SecretPurpose, SecretVault};

/// Per-account tracking settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub worker_url: String,
    /// When set, the keys live in the secret store and never in the file.
    #[serde(default)]
    pub secrets_in_keyring: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tracking_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub admin_key: String,
}

impl Config {
    pub fn secret(&self, purpose: SecretPurpose) -> &str {
        match purpose {
            SecretPurpose::TrackingKey => &self.tracking_key,
            SecretPurpose::AdminKey => &self.admin_key,
        }
    }

    fn secret_mut(&mut self, purpose: SecretPurpose) -> &mut String {
        match purpose {
            SecretPurpose::TrackingKey => &mut self.tracking_key,
            SecretPurpose::AdminKey => &mut self.admin_key,
        }
    }

    /// An enabled config needs an absolute worker URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        let invalid = |reason: &str| ConfigError::InvalidWorkerUrl {
            url: self.worker_url.clone(),
            reason: reason.to_string(),
        };

        let url = Url::parse(&self.worker_url).map_err(|e| invalid(&e.to_string()))?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(invalid("not an absolute url"));
        }

        Ok(())
    }
}

/// Where the keys of a [`Config`] are kept.
trait SecretPlacement {
    fn before_save(&self, account: &str, config: &mut Config) -> Result<(), ConfigError>;
    fn after_load(&self, account: &str, config: &mut Config) -> Result<(), ConfigError>;
}

/// Keys stay in the record and are written to the file as they are.
struct PlaintextInRecord;

impl SecretPlacement for PlaintextInRecord {
    fn before_save(&self, _account: &str, _config: &mut Config) -> Result<(), ConfigError> {
        Ok(())
    }

    fn after_load(&self, _account: &str, _config: &mut Config) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Keys move to the secret store on save and come back from it on load.
struct VaultDelegated<'a, V: SecretVault>(&'a V);

impl<V: SecretVault> SecretPlacement for VaultDelegated<'_, V> {
    fn before_save(&self, account: &str, config: &mut Config) -> Result<(), ConfigError> {
        for purpose in SecretPurpose::ALL {
            let value = std::mem::take(config.secret_mut(purpose));
            if !value.is_empty() {
                self.0.put(account, purpose, &value)?;
            }
        }
        Ok(())
    }

    fn after_load(&self, account: &str, config: &mut Config) -> Result<(), ConfigError> {
        for purpose in SecretPurpose::ALL {
            match self.0.get(account, purpose) {
                Ok(value) => *config.secret_mut(purpose) = value,
                Err(VaultError::SecretNotFound { .. }) => {
                    warn!("No {purpose} stored for '{account}'")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Reads and writes per-account config files below one base directory.
pub struct ConfigStore<V: SecretVault> {
    base_dir: PathBuf,
    vault: V,
}

impl<V: SecretVault> ConfigStore<V> {
    /// Store below the platform's per-user configuration directory.
    pub fn new(vault: V) -> Result<ConfigStore<V>, ConfigError> {
        let base_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(ConfigStore::with_base_dir(base_dir.join("beacon"), vault))
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>, vault: V) -> ConfigStore<V> {
        ConfigStore {
            base_dir: base_dir.into(),
            vault,
        }
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn config_path(&self, account: &str) -> PathBuf {
        self.base_dir
            .join("tracking")
            .join(format!("{}.json", file_stem(account)))
    }

    /// Location used by earlier releases, still read as a fallback.
    pub fn legacy_config_path(&self, account: &str) -> PathBuf {
        self.base_dir
            .join(format!("tracking-{}.json", file_stem(account)))
    }

    /// Loads the account's config. An account without any config file yields
    /// a disabled default.
    pub fn load(&self, account: &str) -> Result<Config, ConfigError> {
        let path = self.config_path(account);
        if path.is_file() {
            let mut config = read_config(&path)?;
            self.placement(&config).after_load(account, &mut config)?;
            return Ok(config);
        }

        let legacy = self.legacy_config_path(account);
        if legacy.is_file() {
            info!("Using legacy tracking config at: {}", legacy.display());
            return read_config(&legacy);
        }

        debug!("No tracking config for '{account}'");
        Ok(Config::default())
    }

    pub fn save(&self, account: &str, config: &Config) -> Result<(), ConfigError> {
        if account.is_empty() {
            return Err(ConfigError::MissingAccount);
        }
        config.validate()?;

        let mut persisted = config.clone();
        self.placement(config).before_save(account, &mut persisted)?;

        let path = self.config_path(account);
        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        let mut contents = serde_json::to_vec_pretty(&persisted)?;
        contents.push(b'\n');
        write_private(&path, &contents)?;

        info!("Saved tracking config for '{account}' to: {}", path.display());
        Ok(())
    }

    /// Stores new keys in the secret store without touching the config file.
    pub fn save_secrets(
        &self,
        account: &str,
        tracking_key: &str,
        admin_key: &str,
    ) -> Result<(), ConfigError> {
        if account.is_empty() {
            return Err(ConfigError::MissingAccount);
        }

        self.vault
            .put(account, SecretPurpose::TrackingKey, tracking_key)?;
        self.vault.put(account, SecretPurpose::AdminKey, admin_key)?;

        Ok(())
    }

    fn placement(&self, config: &Config) -> Box<dyn SecretPlacement + '_> {
        if config.secrets_in_keyring {
            Box::new(VaultDelegated(&self.vault))
        } else {
            Box::new(PlaintextInRecord)
        }
    }
}

fn file_stem(account: &str) -> String {
    match sanitize(account) {
        stem if stem.is_empty() => "default".to_string(),
        stem => stem,
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    debug!("Reading config at: {}", path.display());

    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
