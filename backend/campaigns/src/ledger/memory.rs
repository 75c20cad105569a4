//! In-memory ledger.
//!
//! Used for local development (`LEDGER_BACKEND=memory`) and tests. It keeps
//! the same bookkeeping a real ledger would: donations move balance from the
//! donor into the campaign, withdrawal pays the owner and closes the campaign.
//! State is lost on restart.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Campaign, Category, Donation, Ledger, NewCampaign, PriceQuote, Receipt};
use crate::errors::LedgerError;
use crate::keystore::Credential;

#[derive(Default)]
struct State {
    campaigns: Vec<Campaign>,
    donations: HashMap<u64, Vec<Donation>>,
    balances: HashMap<String, u128>,
    categories: Vec<Category>,
    withdrawn: HashSet<u64>,
    price: Option<PriceQuote>,
    tx_count: u64,
}

impl State {
    fn campaign_mut(&mut self, id: u64) -> Result<&mut Campaign, LedgerError> {
        self.campaigns
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LedgerError::CampaignNotFound(id))
    }

    fn next_receipt(&mut self) -> Receipt {
        self.tx_count += 1;
        Receipt {
            tx_hash: format!("0x{:064x}", self.tx_count),
        }
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<State>,
    campaign_reads: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a campaign as-is, keeping its id.
    pub async fn insert_campaign(&self, campaign: Campaign) {
        let mut state = self.state.write().await;
        state.campaigns.retain(|c| c.id != campaign.id);
        state.campaigns.push(campaign);
        state.campaigns.sort_by_key(|c| c.id);
    }

    pub async fn insert_category(&self, category: Category) {
        self.state.write().await.categories.push(category);
    }

    pub async fn set_balance(&self, address: &str, amount: u128) {
        self.state
            .write()
            .await
            .balances
            .insert(address.to_string(), amount);
    }

    pub async fn set_price(&self, quote: PriceQuote) {
        self.state.write().await.price = Some(quote);
    }

    /// Number of calls that read campaign records.
    pub fn campaign_reads(&self) -> usize {
        self.campaign_reads.load(Ordering::SeqCst)
    }

    fn count_read(&self) {
        self.campaign_reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn list_campaigns(&self, owner: Option<&str>) -> Result<Vec<Campaign>, LedgerError> {
        self.count_read();
        let state = self.state.read().await;
        Ok(state
            .campaigns
            .iter()
            .filter(|c| owner.map_or(true, |o| c.owner == o))
            .cloned()
            .collect())
    }

    async fn get_campaign(&self, id: u64) -> Result<Campaign, LedgerError> {
        self.count_read();
        let state = self.state.read().await;
        state
            .campaigns
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(LedgerError::CampaignNotFound(id))
    }

    async fn campaigns_by_category(
        &self,
        category_id: u64,
    ) -> Result<Vec<Campaign>, LedgerError> {
        self.count_read();
        let state = self.state.read().await;
        Ok(state
            .campaigns
            .iter()
            .filter(|c| c.category_id == category_id)
            .cloned()
            .collect())
    }

    async fn total_donations(&self, id: u64) -> Result<u64, LedgerError> {
        let state = self.state.read().await;
        Ok(state.donations.get(&id).map_or(0, |d| d.len() as u64))
    }

    async fn donors(&self, id: u64) -> Result<Vec<Donation>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.donations.get(&id).cloned().unwrap_or_default())
    }

    async fn categories(&self) -> Result<Vec<Category>, LedgerError> {
        Ok(self.state.read().await.categories.clone())
    }

    async fn price(&self) -> Result<PriceQuote, LedgerError> {
        self.state
            .read()
            .await
            .price
            .clone()
            .ok_or_else(|| LedgerError::Malformed("no price feed configured".into()))
    }

    async fn balance(&self, address: &str) -> Result<String, LedgerError> {
        let state = self.state.read().await;
        Ok(state.balances.get(address).copied().unwrap_or(0).to_string())
    }

    async fn donate(
        &self,
        amount: u128,
        id: u64,
        credential: &Credential,
    ) -> Result<Receipt, LedgerError> {
        let mut state = self.state.write().await;
        if state.withdrawn.contains(&id) {
            return Err(LedgerError::Rejected(format!("campaign {id} is closed")));
        }
        state.campaign_mut(id)?;

        let donor = credential.address().to_string();
        let balance = state.balances.get(&donor).copied().unwrap_or(0);
        let remaining = balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::Rejected("insufficient funds".into()))?;
        state.balances.insert(donor.clone(), remaining);

        let campaign = state.campaign_mut(id)?;
        campaign.total_funds = campaign
            .total_funds
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Rejected("amount overflow".into()))?;
        state
            .donations
            .entry(id)
            .or_default()
            .push(Donation { donor, amount });

        Ok(state.next_receipt())
    }

    async fn withdraw(&self, id: u64, credential: &Credential) -> Result<Receipt, LedgerError> {
        let mut state = self.state.write().await;
        if state.withdrawn.contains(&id) {
            return Err(LedgerError::Rejected(format!(
                "campaign {id} was already withdrawn"
            )));
        }
        let campaign = state.campaign_mut(id)?;
        if campaign.owner != credential.address() {
            return Err(LedgerError::Rejected(
                "only the campaign owner can withdraw".into(),
            ));
        }
        let owner = campaign.owner.clone();
        let payout = campaign.total_funds;

        *state.balances.entry(owner).or_default() += payout;
        state.withdrawn.insert(id);
        Ok(state.next_receipt())
    }

    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
        credential: &Credential,
    ) -> Result<Campaign, LedgerError> {
        let mut state = self.state.write().await;
        let id = state.campaigns.iter().map(|c| c.id + 1).max().unwrap_or(0);
        let campaign_type = state
            .categories
            .iter()
            .find(|c| c.id == campaign.category_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();

        let created = Campaign {
            id,
            owner: credential.address().to_string(),
            title: campaign.title.clone(),
            description: campaign.description.clone(),
            category_id: campaign.category_id,
            campaign_type,
            goal: campaign.goal,
            deadline: campaign.deadline,
            total_funds: 0,
            image: campaign.image.clone(),
        };
        state.campaigns.push(created.clone());
        state.next_receipt();
        Ok(created)
    }
}
