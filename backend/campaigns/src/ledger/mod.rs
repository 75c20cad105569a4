//! Ledger-owned records and the contract the service consumes from the ledger.
//!
//! Campaigns and donations live on the ledger. The service only reads them,
//! and submits donate / withdraw / create transactions through the same
//! [`Ledger`] handle. Amounts are always in the smallest unit here; conversion
//! to the display unit happens when views are assembled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;
use crate::keystore::Credential;

pub mod memory;
pub mod rpc;

pub use memory::MemoryLedger;
pub use rpc::RpcLedger;

/// A campaign as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: u64,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub category_id: u64,
    #[serde(default)]
    pub campaign_type: String,
    #[serde(with = "crate::units::amount")]
    pub goal: u128,
    /// Unix timestamp (seconds).
    pub deadline: i64,
    #[serde(with = "crate::units::amount")]
    pub total_funds: u128,
    #[serde(default)]
    pub image: String,
}

impl Campaign {
    pub fn deadline_at(&self) -> DateTime<Utc> {
        unix_to_time(self.deadline)
    }

    /// A campaign is expired strictly after its deadline.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline_at()
    }

    pub fn goal_reached(&self) -> bool {
        self.total_funds >= self.goal
    }
}

/// Convert a unix timestamp, clamping values chrono cannot represent.
pub fn unix_to_time(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(if secs > 0 {
        DateTime::<Utc>::MAX_UTC
    } else {
        DateTime::<Utc>::MIN_UTC
    })
}

/// One recorded donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Donation {
    pub donor: String,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub pair: String,
    pub price: f64,
}

/// Acknowledgement of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: String,
}

/// Parameters for a campaign-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub title: String,
    pub description: String,
    pub category_id: u64,
    #[serde(with = "crate::units::amount")]
    pub goal: u128,
    pub deadline: i64,
    pub image: String,
}

/// Read and write operations against the ledger.
///
/// Implementations must not retry: a failed call surfaces immediately.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All campaigns, optionally restricted to one owner address.
    async fn list_campaigns(&self, owner: Option<&str>) -> Result<Vec<Campaign>, LedgerError>;

    async fn get_campaign(&self, id: u64) -> Result<Campaign, LedgerError>;

    async fn campaigns_by_category(&self, category_id: u64)
        -> Result<Vec<Campaign>, LedgerError>;

    /// Number of donations recorded for a campaign.
    async fn total_donations(&self, id: u64) -> Result<u64, LedgerError>;

    /// Donor addresses paired with their amounts, in ledger order.
    async fn donors(&self, id: u64) -> Result<Vec<Donation>, LedgerError>;

    async fn categories(&self) -> Result<Vec<Category>, LedgerError>;

    async fn price(&self) -> Result<PriceQuote, LedgerError>;

    /// Account balance in smallest units, as the ledger reports it.
    async fn balance(&self, address: &str) -> Result<String, LedgerError>;

    async fn donate(
        &self,
        amount: u128,
        id: u64,
        credential: &Credential,
    ) -> Result<Receipt, LedgerError>;

    async fn withdraw(&self, id: u64, credential: &Credential) -> Result<Receipt, LedgerError>;

    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
        credential: &Credential,
    ) -> Result<Campaign, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn campaign(deadline: i64) -> Campaign {
        Campaign {
            id: 0,
            owner: "0xowner".into(),
            title: "Wells".into(),
            description: String::new(),
            category_id: 1,
            campaign_type: "water".into(),
            goal: 100,
            deadline,
            total_funds: 0,
            image: String::new(),
        }
    }

    #[test]
    fn expiry_is_strictly_after_deadline() {
        let now = Utc::now();
        let c = campaign(now.timestamp());
        let at_deadline = c.deadline_at();
        assert!(!c.is_expired(at_deadline));
        assert!(c.is_expired(at_deadline + Duration::seconds(1)));
    }

    #[test]
    fn unix_to_time_clamps() {
        assert_eq!(unix_to_time(i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(unix_to_time(i64::MIN), DateTime::<Utc>::MIN_UTC);
        assert_eq!(unix_to_time(0).timestamp(), 0);
    }

    #[test]
    fn campaign_decodes_gateway_shape() {
        let raw = serde_json::json!({
            "id": 7,
            "owner": "0xabc",
            "title": "School roof",
            "description": "Fix it",
            "categoryId": 2,
            "campaignType": "education",
            "goal": "5000000000000000000",
            "deadline": 1_900_000_000,
            "totalFunds": 0,
            "image": "img://roof"
        });
        let c: Campaign = serde_json::from_value(raw).unwrap();
        assert_eq!(c.goal, 5 * crate::units::UNITS_PER_DISPLAY);
        assert_eq!(c.total_funds, 0);
        assert_eq!(c.category_id, 2);
        assert!(!c.goal_reached());
    }
}
