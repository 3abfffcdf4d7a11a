use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "evcharge";

/// Application secrets in the OS keychain, one entry per client id.
///
/// Used when the secret is not supplied through the config file or the
/// environment.
pub struct SecretStore;

impl SecretStore {
    fn entry(client_id: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, client_id)
            .with_context(|| format!("Failed to open keyring entry for {}", client_id))
    }

    pub fn store(client_id: &str, secret: &str) -> Result<()> {
        Self::entry(client_id)?
            .set_password(secret)
            .context("Failed to store client secret in keychain")
    }

    pub fn get_secret(client_id: &str) -> Result<String> {
        Self::entry(client_id)?
            .get_password()
            .context("Failed to retrieve client secret from keychain")
    }

    pub fn delete(client_id: &str) -> Result<()> {
        Self::entry(client_id)?
            .delete_credential()
            .context("Failed to delete client secret from keychain")
    }

    pub fn has_secret(client_id: &str) -> bool {
        Self::get_secret(client_id).is_ok()
    }
}
