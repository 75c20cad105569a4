//! Signing credentials for ledger writes.
//!
//! Wallet key management itself lives outside this service. The keystore
//! only hands back a usable [`Credential`] for a directory profile, and only
//! once a transaction is about to be submitted.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::directory::UserProfile;
use crate::errors::KeystoreError;

/// An unlocked signing key bound to the ledger address it signs for.
#[derive(Clone)]
pub struct Credential {
    address: String,
    secret: Vec<u8>,
}

impl Credential {
    pub fn new(address: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            address: address.into(),
            secret,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait Keystore: Send + Sync {
    async fn unlock(&self, profile: &UserProfile) -> Result<Credential, KeystoreError>;
}

/// Reads `{dir}/{username}.key`, a hex-encoded signing key.
pub struct FileKeystore {
    dir: PathBuf,
}

impl FileKeystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn key_path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{username}.key"))
    }
}

#[async_trait]
impl Keystore for FileKeystore {
    async fn unlock(&self, profile: &UserProfile) -> Result<Credential, KeystoreError> {
        if profile.username.is_empty()
            || profile.username.contains(['/', '\\'])
            || profile.username.starts_with('.')
        {
            return Err(KeystoreError::Missing(profile.username.clone()));
        }

        let path = self.key_path(&profile.username);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeystoreError::Missing(profile.username.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let secret = hex::decode(raw.trim().trim_start_matches("0x"))?;
        Ok(Credential::new(profile.address.clone(), secret))
    }
}
