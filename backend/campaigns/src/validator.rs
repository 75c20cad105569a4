//! Ledger writes (donate, withdraw, create) and their preconditions.
//!
//! A donation walks a fixed sequence of stages:
//!
//! ```text
//! Received ─► Parsed ─► PriceChecked ─► BalanceChecked ─► CampaignChecked ─► Submitted ─► Invalidated
//! ```
//!
//! Any failing stage ends the flow with its specific error. Nothing is written
//! anywhere before `Submitted`, and the cache is invalidated only after the
//! ledger accepted the transaction.
//!
//! Checks are read-then-act against live ledger state; concurrent donations
//! from one account can both pass the balance check. The ledger is the final
//! arbiter.
//!
//! A donation is compared against the full goal, not against the room left
//! under it, so one donation may carry `total_funds` past `goal`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::coordinator::CacheCoordinator;
use crate::directory::UserProfile;
use crate::errors::{Result, ServiceError, ValidationError};
use crate::keystore::Keystore;
use crate::ledger::{Campaign, Ledger, NewCampaign, Receipt};
use crate::units::parse_display;

/// Deadline layout accepted besides RFC 3339, interpreted as UTC.
const DEADLINE_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// A request field clients may send as a JSON string or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Text(String),
    Number(serde_json::Number),
}

impl Field {
    fn text(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        }
    }

    fn parse_id(&self, what: &str) -> Result<u64> {
        self.text()
            .parse()
            .map_err(|_| ServiceError::input(format!("invalid {what}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRequest {
    pub campaign_id: Field,
    /// Display units.
    pub amount: Field,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub campaign_id: Field,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Field,
    /// Display units.
    pub goal: Field,
    pub deadline: String,
    /// Reference returned by the image upload service.
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationStage {
    Received,
    Parsed,
    PriceChecked,
    BalanceChecked,
    CampaignChecked,
    Submitted,
    Invalidated,
}

impl fmt::Display for DonationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::PriceChecked => "price_checked",
            Self::BalanceChecked => "balance_checked",
            Self::CampaignChecked => "campaign_checked",
            Self::Submitted => "submitted",
            Self::Invalidated => "invalidated",
        };
        f.write_str(name)
    }
}

struct DonationFlow {
    stage: DonationStage,
}

impl DonationFlow {
    fn new() -> Self {
        Self {
            stage: DonationStage::Received,
        }
    }

    fn advance(&mut self, next: DonationStage) {
        debug!(from = %self.stage, to = %next, "Donation stage");
        self.stage = next;
    }
}

/// A donation whose fields parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDonation {
    pub campaign_id: u64,
    /// Smallest units.
    pub amount: u128,
}

pub fn parse_donation(request: &DonationRequest) -> Result<ParsedDonation> {
    let campaign_id = request.campaign_id.parse_id("campaign id")?;
    let amount = parse_display(&request.amount.text())
        .map_err(|e| ServiceError::input(format!("invalid amount: {e}")))?;
    Ok(ParsedDonation {
        campaign_id,
        amount,
    })
}

/// Parse the ledger's textual balance (smallest units).
pub fn parse_balance(text: &str) -> Result<u128> {
    text.trim()
        .parse()
        .map_err(|_| ServiceError::input(format!("unreadable balance {text:?}")))
}

/// Campaign-relative donation checks, in the order they are enforced.
pub fn check_campaign(
    amount: u128,
    balance: u128,
    campaign: &Campaign,
    now: DateTime<Utc>,
) -> std::result::Result<(), ValidationError> {
    if campaign.is_expired(now) {
        return Err(ValidationError::DeadlinePassed);
    }
    if amount > balance {
        return Err(ValidationError::InsufficientBalance);
    }
    if amount > campaign.goal {
        return Err(ValidationError::ExceedsGoal);
    }
    if campaign.goal_reached() {
        return Err(ValidationError::GoalReached);
    }
    Ok(())
}

fn parse_deadline(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, DEADLINE_LAYOUT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ServiceError::input(format!("invalid deadline {raw:?}")))
}

/// Validated campaign-creation parameters.
pub fn parse_new_campaign(request: &CreateCampaignRequest, now: DateTime<Utc>) -> Result<NewCampaign> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ServiceError::input("title is required"));
    }
    let category_id = request.category.parse_id("category")?;
    let goal = parse_display(&request.goal.text())
        .map_err(|e| ServiceError::input(format!("invalid goal: {e}")))?;
    let deadline = parse_deadline(&request.deadline)?;

    if goal == 0 {
        return Err(ValidationError::NonPositiveGoal.into());
    }
    if now > deadline {
        return Err(ValidationError::DeadlineInPast.into());
    }

    Ok(NewCampaign {
        title: title.to_string(),
        description: request.description.clone(),
        category_id,
        goal,
        deadline: deadline.timestamp(),
        image: request.image.clone(),
    })
}

/// Submits ledger writes after their preconditions pass, then invalidates
/// every cached campaign view.
#[derive(Clone)]
pub struct Transactions {
    ledger: Arc<dyn Ledger>,
    keystore: Arc<dyn Keystore>,
    cache: CacheCoordinator,
}

impl Transactions {
    pub fn new(ledger: Arc<dyn Ledger>, keystore: Arc<dyn Keystore>, cache: CacheCoordinator) -> Self {
        Self {
            ledger,
            keystore,
            cache,
        }
    }

    pub async fn donate(&self, caller: &UserProfile, request: &DonationRequest) -> Result<Receipt> {
        let mut flow = DonationFlow::new();
        let result = self.run_donation(caller, request, &mut flow).await;
        match &result {
            Err(e @ ServiceError::Validation(_)) => {
                info!(stage = %flow.stage, user = %caller.username, "Donation rejected: {e}");
            }
            Err(e) => debug!(stage = %flow.stage, user = %caller.username, "Donation stopped: {e}"),
            Ok(_) => {}
        }
        result
    }

    async fn run_donation(
        &self,
        caller: &UserProfile,
        request: &DonationRequest,
        flow: &mut DonationFlow,
    ) -> Result<Receipt> {
        let donation = parse_donation(request)?;
        flow.advance(DonationStage::Parsed);

        if donation.amount == 0 {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        flow.advance(DonationStage::PriceChecked);

        let balance = parse_balance(&self.ledger.balance(&caller.address).await?)?;
        flow.advance(DonationStage::BalanceChecked);

        let campaign = self.ledger.get_campaign(donation.campaign_id).await?;
        check_campaign(donation.amount, balance, &campaign, Utc::now())?;
        flow.advance(DonationStage::CampaignChecked);

        let credential = self.keystore.unlock(caller).await?;
        let receipt = self
            .ledger
            .donate(donation.amount, donation.campaign_id, &credential)
            .await?;
        flow.advance(DonationStage::Submitted);
        info!(
            campaign_id = donation.campaign_id,
            tx = %receipt.tx_hash,
            "Donation submitted"
        );

        self.cache.invalidate_all().await;
        flow.advance(DonationStage::Invalidated);
        Ok(receipt)
    }

    /// Withdrawal carries no client-side balance or goal checks; the ledger
    /// enforces ownership and availability.
    pub async fn withdraw(&self, caller: &UserProfile, request: &WithdrawRequest) -> Result<Receipt> {
        let campaign_id = request.campaign_id.parse_id("campaign id")?;
        let credential = self.keystore.unlock(caller).await?;
        let receipt = self.ledger.withdraw(campaign_id, &credential).await?;
        info!(campaign_id, tx = %receipt.tx_hash, "Withdrawal submitted");

        self.cache.invalidate_all().await;
        Ok(receipt)
    }

    pub async fn create_campaign(
        &self,
        caller: &UserProfile,
        request: &CreateCampaignRequest,
    ) -> Result<Campaign> {
        let campaign = parse_new_campaign(request, Utc::now())?;
        let credential = self.keystore.unlock(caller).await?;
        let created = self.ledger.create_campaign(&campaign, &credential).await?;
        info!(campaign_id = created.id, owner = %created.owner, "Campaign created");

        self.cache.invalidate_all().await;
        Ok(created)
    }
}
