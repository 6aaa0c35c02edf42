use crate::domain::models::OAuthToken;
use crate::infrastructure::error::InfraError;
use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

pub const KEYRING_SERVICE: &str = "notion-calendar-sync";
pub const KEYRING_ACCOUNT: &str = "google-calendar";

/// Persistence for the single Google token set this process acts with.
pub trait CredentialStore: Send + Sync {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError>;
    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError>;
    fn delete_token(&self) -> Result<(), InfraError>;
}

fn credential_error(error: impl Display) -> InfraError {
    InfraError::Credential(error.to_string())
}

/// Token set serialized as JSON into one OS keyring entry.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn open(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service, &self.account).map_err(credential_error)
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        let serialized = serde_json::to_string(token).map_err(credential_error)?;
        self.open()?.set_password(&serialized).map_err(credential_error)
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        match self.open()?.get_password() {
            Ok(serialized) => serde_json::from_str(&serialized)
                .map(Some)
                .map_err(credential_error),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(other) => Err(credential_error(other)),
        }
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        match self.open()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(other) => Err(credential_error(other)),
        }
    }
}

/// Process-local store for tests and keyring-less environments.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    slot: Mutex<Option<OAuthToken>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn save_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(token.clone());
        Ok(())
    }

    fn load_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        Ok(self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn delete_token(&self) -> Result<(), InfraError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}
