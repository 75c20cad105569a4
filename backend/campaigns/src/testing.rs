//! Fixtures shared by unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::directory::{UserDirectory, UserProfile};
use crate::errors::{KeystoreError, Result, ServiceError};
use crate::keystore::{Credential, Keystore};
use crate::ledger::Campaign;
use crate::units::from_display_whole;

pub fn display(whole: u64) -> u128 {
    from_display_whole(whole)
}

pub fn profile(username: &str, address: &str) -> UserProfile {
    UserProfile {
        username: username.into(),
        email: format!("{username}@example.org"),
        address: address.into(),
        avatar: format!("img://{username}"),
    }
}

/// A category-1 campaign whose deadline is `deadline_in` seconds from now.
pub fn campaign(id: u64, owner: &str, title: &str, deadline_in: i64) -> Campaign {
    Campaign {
        id,
        owner: owner.into(),
        title: title.into(),
        description: format!("{title} description"),
        category_id: 1,
        campaign_type: "community".into(),
        goal: display(1_000),
        deadline: Utc::now().timestamp() + deadline_in,
        total_funds: 0,
        image: format!("img://campaign/{id}"),
    }
}

pub struct StaticDirectory {
    by_username: HashMap<String, UserProfile>,
}

impl StaticDirectory {
    pub fn new(profiles: Vec<UserProfile>) -> Self {
        Self {
            by_username: profiles
                .into_iter()
                .map(|p| (p.username.clone(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn get_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        Ok(self.by_username.get(username).cloned())
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .by_username
            .values()
            .find(|p| p.address == address)
            .cloned())
    }
}

/// A directory whose every lookup fails.
pub struct BrokenDirectory;

#[async_trait]
impl UserDirectory for BrokenDirectory {
    async fn get_by_username(&self, _: &str) -> Result<Option<UserProfile>> {
        Err(ServiceError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn get_by_address(&self, _: &str) -> Result<Option<UserProfile>> {
        Err(ServiceError::Database(sqlx::Error::PoolTimedOut))
    }
}

/// Hands every profile a throwaway key for its own address.
pub struct StaticKeystore;

#[async_trait]
impl Keystore for StaticKeystore {
    async fn unlock(&self, profile: &UserProfile) -> std::result::Result<Credential, KeystoreError> {
        Ok(Credential::new(profile.address.clone(), vec![0x42]))
    }
}
