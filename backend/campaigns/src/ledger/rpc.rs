//! JSON-RPC ledger client.
//!
//! Talks to a ledger gateway over HTTP using JSON-RPC 2.0 envelopes.
//!
//! ## Failure policy
//!
//! Calls are not retried. A transport failure, a non-success status or a
//! JSON-RPC error object surfaces as a [`LedgerError`] on the first attempt;
//! timeouts come from the shared [`Client`] the caller configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{Campaign, Category, Donation, Ledger, NewCampaign, PriceQuote, Receipt};
use crate::errors::LedgerError;
use crate::keystore::Credential;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct DonorsResult {
    donors: Vec<String>,
    amounts: Vec<WireAmount>,
}

#[derive(Debug, Deserialize)]
struct WireAmount(#[serde(with = "crate::units::amount")] u128);

#[derive(Debug, Deserialize)]
struct TotalResult {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    balance: Value,
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

pub struct RpcLedger {
    client: Client,
    rpc_url: String,
}

impl RpcLedger {
    pub fn new(client: Client, rpc_url: impl Into<String>) -> Self {
        Self {
            client,
            rpc_url: rpc_url.into(),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&envelope(method, params))
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<T> = response.json().await?;
        debug!(method, "Ledger call completed");
        into_result(method, body)
    }
}

/// Wrap a method call in a JSON-RPC 2.0 request envelope.
fn envelope(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

fn into_result<T>(method: &str, body: RpcResponse<T>) -> Result<T, LedgerError> {
    if let Some(err) = body.error {
        return Err(LedgerError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    body.result
        .ok_or_else(|| LedgerError::Malformed(format!("empty result from {method}")))
}

fn signer_params(credential: &Credential) -> Value {
    json!({
        "from": credential.address(),
        "signingKey": hex::encode(credential.secret()),
    })
}

fn pair_donors(raw: DonorsResult) -> Result<Vec<Donation>, LedgerError> {
    if raw.donors.len() != raw.amounts.len() {
        return Err(LedgerError::Malformed(format!(
            "{} donors but {} amounts",
            raw.donors.len(),
            raw.amounts.len()
        )));
    }
    Ok(raw
        .donors
        .into_iter()
        .zip(raw.amounts)
        .map(|(donor, WireAmount(amount))| Donation { donor, amount })
        .collect())
}

/// The gateway may report a balance as a JSON string or a bare number; keep
/// its textual form so parsing stays with the caller.
fn balance_text(value: Value) -> Result<String, LedgerError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(LedgerError::Malformed(format!("unexpected balance {other}"))),
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn list_campaigns(&self, owner: Option<&str>) -> Result<Vec<Campaign>, LedgerError> {
        self.call("campaigns_list", json!({ "owner": owner })).await
    }

    async fn get_campaign(&self, id: u64) -> Result<Campaign, LedgerError> {
        self.call("campaigns_get", json!({ "id": id })).await
    }

    async fn campaigns_by_category(
        &self,
        category_id: u64,
    ) -> Result<Vec<Campaign>, LedgerError> {
        self.call("campaigns_byCategory", json!({ "id": category_id }))
            .await
    }

    async fn total_donations(&self, id: u64) -> Result<u64, LedgerError> {
        let res: TotalResult = self.call("donations_total", json!({ "id": id })).await?;
        Ok(res.total)
    }

    async fn donors(&self, id: u64) -> Result<Vec<Donation>, LedgerError> {
        let raw: DonorsResult = self.call("donations_donors", json!({ "id": id })).await?;
        pair_donors(raw)
    }

    async fn categories(&self) -> Result<Vec<Category>, LedgerError> {
        self.call("categories_list", json!({})).await
    }

    async fn price(&self) -> Result<PriceQuote, LedgerError> {
        self.call("price_current", json!({})).await
    }

    async fn balance(&self, address: &str) -> Result<String, LedgerError> {
        let res: BalanceResult = self
            .call("account_balance", json!({ "address": address }))
            .await?;
        balance_text(res.balance)
    }

    async fn donate(
        &self,
        amount: u128,
        id: u64,
        credential: &Credential,
    ) -> Result<Receipt, LedgerError> {
        let mut params = signer_params(credential);
        params["id"] = json!(id);
        params["amount"] = json!(amount.to_string());
        self.call("campaigns_donate", params).await
    }

    async fn withdraw(&self, id: u64, credential: &Credential) -> Result<Receipt, LedgerError> {
        let mut params = signer_params(credential);
        params["id"] = json!(id);
        self.call("campaigns_withdraw", params).await
    }

    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
        credential: &Credential,
    ) -> Result<Campaign, LedgerError> {
        let mut params = signer_params(credential);
        params["campaign"] = serde_json::to_value(campaign)?;
        self.call("campaigns_create", params).await
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
