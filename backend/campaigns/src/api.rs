//! Axum REST API handlers.
//!
//! Every route except `/health` and `/current-price` acts for a resolved
//! caller, taken from the `x-auth-username` header set by the authentication
//! layer in front of this service.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::request::Parts,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::CacheStore;
use crate::coordinator::{CacheCoordinator, CacheKey};
use crate::directory::{UserDirectory, UserProfile};
use crate::errors::{Result, ServiceError};
use crate::keystore::Keystore;
use crate::ledger::{Campaign, Category, Ledger, PriceQuote};
use crate::validator::{CreateCampaignRequest, DonationRequest, Transactions, WithdrawRequest};
use crate::views::{CampaignQuery, CampaignView, DonorDetail, ViewAggregator};

/// Header carrying the authenticated username.
pub const AUTH_USERNAME_HEADER: &str = "x-auth-username";

pub struct ApiState {
    pub aggregator: ViewAggregator,
    pub cache: CacheCoordinator,
    pub transactions: Transactions,
    pub ledger: Arc<dyn Ledger>,
    pub directory: Arc<dyn UserDirectory>,
}

impl ApiState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn UserDirectory>,
        keystore: Arc<dyn Keystore>,
        cache_store: Arc<dyn CacheStore>,
        cache_ttl: Duration,
    ) -> Self {
        let cache = CacheCoordinator::new(cache_store, cache_ttl);
        Self {
            aggregator: ViewAggregator::new(ledger.clone(), directory.clone()),
            transactions: Transactions::new(ledger.clone(), keystore, cache.clone()),
            cache,
            ledger,
            directory,
        }
    }

    /// Directory profile of the caller, or an identity error.
    async fn resolve(&self, caller: &Caller) -> Result<UserProfile> {
        let Some(username) = caller.0.as_deref() else {
            return Err(ServiceError::Identity);
        };
        self.directory
            .get_by_username(username)
            .await?
            .ok_or(ServiceError::Identity)
    }

    /// Serve a list-shaped query through the cache.
    async fn query(&self, query: CampaignQuery) -> Result<Vec<CampaignView>> {
        self.cache
            .read(query.cache_key().as_ref(), || self.aggregator.campaigns(&query))
            .await
    }
}

/// Username asserted by the authentication layer, if any.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(AUTH_USERNAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(Caller(username))
    }
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::input(format!("invalid id {raw:?}")))
}

fn body<T: DeserializeOwned>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(t)| t)
        .map_err(|e| ServiceError::input(e.body_text()))
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize, Deserialize)]
pub struct CampaignsResponse {
    pub count: usize,
    pub campaigns: Vec<CampaignView>,
}

impl From<Vec<CampaignView>> for CampaignsResponse {
    fn from(campaigns: Vec<CampaignView>) -> Self {
        Self {
            count: campaigns.len(),
            campaigns,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorsResponse {
    pub campaign_id: u64,
    pub count: usize,
    pub donors: Vec<DonorDetail>,
}

#[derive(Serialize, Deserialize)]
pub struct CategoriesResponse {
    pub count: usize,
    pub categories: Vec<Category>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub message: String,
    pub tx_hash: String,
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub message: &'static str,
    pub campaign: Campaign,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub name: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /campaigns`
///
/// Every campaign, expired ones included.
pub async fn list_campaigns(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<CampaignsResponse>> {
    state.resolve(&caller).await?;
    let views = state.query(CampaignQuery::All).await?;
    Ok(Json(views.into()))
}

/// `GET /campaigns/latest`
pub async fn latest_campaigns(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<CampaignsResponse>> {
    state.resolve(&caller).await?;
    let views = state.query(CampaignQuery::LatestActive).await?;
    Ok(Json(views.into()))
}

/// `GET /campaigns/categories/:id`
pub async fn campaigns_by_category(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(category): Path<String>,
) -> Result<Json<CampaignsResponse>> {
    state.resolve(&caller).await?;
    let category = parse_id(&category)?;
    let views = state.query(CampaignQuery::ByCategory(category)).await?;
    Ok(Json(views.into()))
}

/// `GET /campaigns/owner`
///
/// Unexpired campaigns owned by the caller's ledger address.
pub async fn my_campaigns(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<CampaignsResponse>> {
    let profile = state.resolve(&caller).await?;
    let views = state.query(CampaignQuery::ByOwner(profile.address)).await?;
    Ok(Json(views.into()))
}

/// `GET /campaigns/:id`
///
/// The embedded user is the caller, so the cache key carries the viewer.
pub async fn get_campaign(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CampaignView>> {
    let viewer = state.resolve(&caller).await?;
    let id = parse_id(&id)?;
    let key = CacheKey::Single {
        id,
        viewer: viewer.username.clone(),
    };
    let view = state
        .cache
        .read(Some(&key), || state.aggregator.campaign(id, &viewer))
        .await?;
    Ok(Json(view))
}

/// `GET /campaigns/:id/donors`
pub async fn campaign_donors(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DonorsResponse>> {
    state.resolve(&caller).await?;
    let campaign_id = parse_id(&id)?;
    let donors = state.aggregator.donor_details(campaign_id).await?;
    Ok(Json(DonorsResponse {
        campaign_id,
        count: donors.len(),
        donors,
    }))
}

/// `POST /search`
pub async fn search_campaigns(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<CampaignsResponse>> {
    state.resolve(&caller).await?;
    let SearchRequest { name } = body(payload)?;
    if name.trim().is_empty() {
        return Err(ServiceError::input("search name is required"));
    }
    let views = state.query(CampaignQuery::Search(name)).await?;
    Ok(Json(views.into()))
}

/// `GET /categories`
pub async fn categories(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
) -> Result<Json<CategoriesResponse>> {
    state.resolve(&caller).await?;
    let categories = state.ledger.categories().await?;
    Ok(Json(CategoriesResponse {
        count: categories.len(),
        categories,
    }))
}

/// `GET /current-price`
pub async fn current_price(State(state): State<Arc<ApiState>>) -> Result<Json<PriceQuote>> {
    Ok(Json(state.ledger.price().await?))
}

/// `POST /campaigns`
pub async fn create_campaign(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: std::result::Result<Json<CreateCampaignRequest>, JsonRejection>,
) -> Result<Json<CreatedResponse>> {
    let profile = state.resolve(&caller).await?;
    let request = body(payload)?;
    let campaign = state.transactions.create_campaign(&profile, &request).await?;
    Ok(Json(CreatedResponse {
        message: "Campaign created",
        campaign,
    }))
}

/// `POST /campaigns/donate`
pub async fn donate(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: std::result::Result<Json<DonationRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>> {
    let profile = state.resolve(&caller).await?;
    let request = body(payload)?;
    let receipt = state.transactions.donate(&profile, &request).await?;
    Ok(Json(TransactionResponse {
        message: "Donation successful".into(),
        tx_hash: receipt.tx_hash,
    }))
}

/// `POST /campaigns/withdraw`
pub async fn withdraw(
    State(state): State<Arc<ApiState>>,
    caller: Caller,
    payload: std::result::Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>> {
    let profile = state.resolve(&caller).await?;
    let request = body(payload)?;
    let receipt = state.transactions.withdraw(&profile, &request).await?;
    Ok(Json(TransactionResponse {
        message: "Withdrawal successful".into(),
        tx_hash: receipt.tx_hash,
    }))
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/latest", get(latest_campaigns))
        .route("/campaigns/owner", get(my_campaigns))
        .route("/campaigns/categories/:id", get(campaigns_by_category))
        .route("/campaigns/donate", post(donate))
        .route("/campaigns/withdraw", post(withdraw))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/:id/donors", get(campaign_donors))
        .route("/search", post(search_campaigns))
        .route("/categories", get(categories))
        .route("/current-price", get(current_price))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Request};

    use super::*;

    async fn caller_of(header: Option<&str>) -> Caller {
        let mut request = Request::builder().uri("/campaigns");
        if let Some(value) = header {
            request = request.header(AUTH_USERNAME_HEADER, HeaderValue::from_str(value).unwrap());
        }
        let (mut parts, ()) = request.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn caller_header_is_optional() {
        assert_eq!(caller_of(Some("alice")).await.0.as_deref(), Some("alice"));
        assert_eq!(caller_of(Some("  ")).await.0, None);
        assert_eq!(caller_of(None).await.0, None);
    }

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id(" 12 ").unwrap(), 12);
        assert!(matches!(parse_id("twelve"), Err(ServiceError::Input(_))));
        assert!(matches!(parse_id("-1"), Err(ServiceError::Input(_))));
    }
}
