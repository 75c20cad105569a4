//! Campaign views: ledger campaigns joined with directory profiles.
//!
//! Per campaign the aggregator resolves the owner profile, the donation count
//! and the donor list, labels each donor from the directory and converts every
//! amount through [`crate::units::to_display`]. Directory trouble never fails
//! a view: a missing or unreachable profile becomes an address-only profile.
//! Ledger failures do fail the request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::coordinator::CacheKey;
use crate::directory::{UserDirectory, UserProfile};
use crate::errors::Result;
use crate::ledger::{Campaign, Donation, Ledger};
use crate::units::to_display;

/// One donor's contribution, labelled from the directory when possible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorDetail {
    pub donor: String,
    pub amount: f64,
    pub username: String,
    pub avatar: String,
}

/// The read-optimised campaign representation served to clients and cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    pub id: u64,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub category_id: u64,
    pub campaign_type: String,
    pub goal: f64,
    pub total_funds: f64,
    pub deadline: DateTime<Utc>,
    pub image: String,
    /// Donations recorded by the ledger.
    pub donation_count: u64,
    /// Length of `donations`.
    pub donor_count: usize,
    /// Campaign owner, or the caller for single-campaign reads.
    pub user: UserProfile,
    pub donations: Vec<DonorDetail>,
}

impl CampaignView {
    fn assemble(
        campaign: Campaign,
        user: UserProfile,
        donation_count: u64,
        donations: Vec<DonorDetail>,
    ) -> Self {
        Self {
            deadline: campaign.deadline_at(),
            goal: to_display(campaign.goal),
            total_funds: to_display(campaign.total_funds),
            id: campaign.id,
            owner: campaign.owner,
            title: campaign.title,
            description: campaign.description,
            category_id: campaign.category_id,
            campaign_type: campaign.campaign_type,
            image: campaign.image,
            donation_count,
            donor_count: donations.len(),
            user,
            donations,
        }
    }
}

/// List-shaped queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignQuery {
    /// Everything, expired campaigns included.
    All,
    /// Unexpired campaigns, newest first.
    LatestActive,
    ByCategory(u64),
    ByOwner(String),
    /// Case-insensitive title match. Not cached.
    Search(String),
}

impl CampaignQuery {
    pub fn filters_expired(&self) -> bool {
        !matches!(self, Self::All)
    }

    pub fn cache_key(&self) -> Option<CacheKey> {
        match self {
            Self::All => Some(CacheKey::All),
            Self::LatestActive => Some(CacheKey::LatestActive),
            Self::ByCategory(id) => Some(CacheKey::Category(*id)),
            Self::ByOwner(address) => Some(CacheKey::Owner(address.clone())),
            Self::Search(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct ViewAggregator {
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn UserDirectory>,
}

impl ViewAggregator {
    pub fn new(ledger: Arc<dyn Ledger>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { ledger, directory }
    }

    /// Build the views for a list-shaped query. Each view embeds its owner.
    pub async fn campaigns(&self, query: &CampaignQuery) -> Result<Vec<CampaignView>> {
        let mut campaigns = match query {
            CampaignQuery::All | CampaignQuery::LatestActive => {
                self.ledger.list_campaigns(None).await?
            }
            CampaignQuery::ByCategory(id) => self.ledger.campaigns_by_category(*id).await?,
            CampaignQuery::ByOwner(address) => {
                self.ledger.list_campaigns(Some(address.as_str())).await?
            }
            CampaignQuery::Search(name) => {
                let needle = name.trim().to_lowercase();
                let mut all = self.ledger.list_campaigns(None).await?;
                all.retain(|c| c.title.to_lowercase().contains(&needle));
                all
            }
        };

        if query.filters_expired() {
            let now = Utc::now();
            campaigns.retain(|c| !c.is_expired(now));
        }
        if *query == CampaignQuery::LatestActive {
            campaigns.sort_by(|a, b| b.id.cmp(&a.id));
        }

        let mut views = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            let owner = self.profile_for(&campaign.owner).await;
            views.push(self.enrich(campaign, owner).await?);
        }
        Ok(views)
    }

    /// Build the view of one campaign, embedding the caller rather than the
    /// owner. Expired campaigns are still returned.
    pub async fn campaign(&self, id: u64, viewer: &UserProfile) -> Result<CampaignView> {
        let campaign = self.ledger.get_campaign(id).await?;
        self.enrich(campaign, viewer.clone()).await
    }

    /// The labelled donor list of one campaign.
    pub async fn donor_details(&self, id: u64) -> Result<Vec<DonorDetail>> {
        let donations = self.ledger.donors(id).await?;
        Ok(self.label_donors(donations).await)
    }

    async fn enrich(&self, campaign: Campaign, user: UserProfile) -> Result<CampaignView> {
        let (donation_count, donations) = tokio::try_join!(
            self.ledger.total_donations(campaign.id),
            self.ledger.donors(campaign.id),
        )?;
        let donors = self.label_donors(donations).await;
        Ok(CampaignView::assemble(campaign, user, donation_count, donors))
    }

    async fn label_donors(&self, donations: Vec<Donation>) -> Vec<DonorDetail> {
        let mut details = Vec::with_capacity(donations.len());
        for Donation { donor, amount } in donations {
            let profile = self.profile_for(&donor).await;
            details.push(DonorDetail {
                amount: to_display(amount),
                username: profile.username,
                avatar: profile.avatar,
                donor,
            });
        }
        details
    }

    async fn profile_for(&self, address: &str) -> UserProfile {
        match self.directory.get_by_address(address).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::unresolved(address),
            Err(e) => {
                warn!(address, "Directory lookup failed, leaving profile empty: {e}");
                UserProfile::unresolved(address)
            }
        }
    }
}
