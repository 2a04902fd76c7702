use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fmt::Write;
use std::sync::Mutex;

use log::{debug, info};
use tokio::runtime::{Builder, Runtime};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::error::VaultError;

const VAULT_ADDR: &str = "VAULT_ADDR";
const VAULT_TOKEN: &str = "VAULT_TOKEN";
const VAULT_MOUNT: &str = "BEACON_VAULT_MOUNT";
const VAULT_PATH: &str = "BEACON_VAULT_PATH";

/// The two credentials the tracking worker is configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecretPurpose {
    TrackingKey,
    AdminKey,
}

impl SecretPurpose {
    pub const ALL: [SecretPurpose; 2] = [SecretPurpose::TrackingKey, SecretPurpose::AdminKey];

    /// Field name inside the stored secret.
    pub fn key(self) -> &'static str {
        match self {
            SecretPurpose::TrackingKey => "tracking_key",
            SecretPurpose::AdminKey => "admin_key",
        }
    }
}

impl fmt::Display for SecretPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Storage key of an account. Lowercase letters and digits are kept, every
/// other byte is written as `_xx`, so distinct accounts never share a key.
pub fn account_key(account: &str) -> String {
    if account.is_empty() {
        return "_".to_string();
    }

    let mut key = String::with_capacity(account.len());
    for byte in account.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' => key.push(byte as char),
            _ => {
                let _ = write!(key, "_{byte:02x}");
            }
        }
    }
    key
}

/// Keyed secret storage, one value per account and purpose.
pub trait SecretVault {
    fn put(&self, account: &str, purpose: SecretPurpose, value: &str) -> Result<(), VaultError>;
    fn get(&self, account: &str, purpose: SecretPurpose) -> Result<String, VaultError>;
}

/// KV v2 backed store. Secrets of one account share a single path, one
/// field per purpose.
pub struct HashicorpVault {
    address: Option<String>,
    token: Option<String>,
    mount: String,
    path: String,
    rt: Runtime,
}

impl HashicorpVault {
    /// Reads the connection settings from the environment. Nothing is
    /// contacted until the first secret is accessed.
    pub fn from_env() -> Result<HashicorpVault, VaultError> {
        Ok(HashicorpVault {
            address: env::var(VAULT_ADDR).ok(),
            token: env::var(VAULT_TOKEN).ok(),
            mount: env::var(VAULT_MOUNT).unwrap_or_else(|_| "secret".to_string()),
            path: env::var(VAULT_PATH).unwrap_or_else(|_| "beacon".to_string()),
            rt: Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| VaultError::Client(format!("failed to build runtime: {e}")))?,
        })
    }

    fn client(&self) -> Result<VaultClient, VaultError> {
        let address = self
            .address
            .as_deref()
            .ok_or(VaultError::NotConfigured(VAULT_ADDR))?;
        let token = self
            .token
            .as_deref()
            .ok_or(VaultError::NotConfigured(VAULT_TOKEN))?;

        debug!("Connecting to Vault at: {address}");

        let settings = VaultClientSettingsBuilder::default()
            .address(address)
            .token(token)
            .build()
            .map_err(|e| VaultError::Client(e.to_string()))?;

        VaultClient::new(settings).map_err(|e| VaultError::Client(e.to_string()))
    }

    /// Fails when the environment lacks the address or token, without
    /// contacting the server.
    pub fn check(&self) -> Result<(), VaultError> {
        self.client().map(|_| ())
    }

    fn secret_path(&self, account: &str) -> String {
        format!("{}/{}", self.path, account_key(account))
    }

    fn read_existing_secret(
        &self,
        client: &VaultClient,
        secret_path: &str,
    ) -> Result<HashMap<String, String>, VaultError> {
        match self
            .rt
            .block_on(kv2::read::<HashMap<String, String>>(client, &self.mount, secret_path))
        {
            Ok(secret) => Ok(secret),
            Err(ClientError::APIError { code: 404, .. }) => Ok(HashMap::new()),
            Err(e) => Err(VaultError::Client(format!(
                "failed to read '{secret_path}': {e}"
            ))),
        }
    }
}

impl SecretVault for HashicorpVault {
    fn put(&self, account: &str, purpose: SecretPurpose, value: &str) -> Result<(), VaultError> {
        let client = self.client()?;
        let secret_path = self.secret_path(account);

        // kv2 replaces the whole map, keep whatever else is stored there
        let mut secret = self.read_existing_secret(&client, &secret_path)?;
        secret.insert(purpose.key().to_string(), value.to_string());

        self.rt
            .block_on(kv2::set(&client, &self.mount, &secret_path, &secret))
            .map_err(|e| VaultError::Client(format!("failed to write '{secret_path}': {e}")))?;

        info!("Stored {purpose} for '{account}' in Vault path '{secret_path}'");
        Ok(())
    }

    fn get(&self, account: &str, purpose: SecretPurpose) -> Result<String, VaultError> {
        let client = self.client()?;
        let secret_path = self.secret_path(account);

        self.read_existing_secret(&client, &secret_path)?
            .remove(purpose.key())
            .ok_or_else(|| VaultError::SecretNotFound {
                account: account.to_string(),
                purpose,
            })
    }
}

/// Process-local store with the same contract, used where no external
/// secret store is wanted.
#[derive(Default)]
pub struct MemoryVault {
    secrets: Mutex<HashMap<(String, SecretPurpose), String>>,
}

impl MemoryVault {
    pub fn new() -> MemoryVault {
        MemoryVault::default()
    }
}

impl SecretVault for MemoryVault {
    fn put(&self, account: &str, purpose: SecretPurpose, value: &str) -> Result<(), VaultError> {
        self.secrets
            .lock()
            .map_err(|_| VaultError::Client("secret map poisoned".to_string()))?
            .insert((account_key(account), purpose), value.to_string());
        Ok(())
    }

    fn get(&self, account: &str, purpose: SecretPurpose) -> Result<String, VaultError> {
        self.secrets
            .lock()
            .map_err(|_| VaultError::Client("secret map poisoned".to_string()))?
            .get(&(account_key(account), purpose))
            .cloned()
            .ok_or_else(|| VaultError::SecretNotFound {
                account: account.to_string(),
                purpose,
            })
    }
}

impl<V: SecretVault + ?Sized> SecretVault for &V {
    fn put(&self, account: &str, purpose: SecretPurpose, value: &str) -> Result<(), VaultError> {
        (**self).put(account, purpose, value)
    }

    fn get(&self, account: &str, purpose: SecretPurpose) -> Result<String, VaultError> {
        (**self).get(account, purpose)
    }
}
