//! # REST API
//!
//! Builds the axum router that exposes the vault's ledger and vault
//! operations over HTTP. All endpoints share application state through
//! axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                          |
//! |--------|-----------------------------|--------------------------------------|
//! | GET    | `/health`                   | Liveness probe                       |
//! | GET    | `/metadata`                 | Share token and vault metadata       |
//! | GET    | `/accounts/:owner/balance`  | Share balance (`?subaccount=<hex>`)  |
//! | GET    | `/allowances`               | Allowance of a spender over an owner |
//! | GET    | `/transactions`             | Transaction log window               |
//! | GET    | `/pool`                     | Custodied assets and TVL             |
//! | GET    | `/quote`                    | Shares a deposit would mint now      |
//! | POST   | `/transfer`                 | Share transfer                       |
//! | POST   | `/approve`                  | Set an allowance                     |
//! | POST   | `/transfer_from`            | Delegated transfer                   |
//! | POST   | `/deposit`                  | Deposit assets for shares            |
//! | POST   | `/redeem`                   | Redeem shares for assets             |
//! | POST   | `/chain_address/:chain`     | The vault's bitcoin/ethereum address |
//! | POST   | `/dev/faucet`               | Mint test assets (only with faucet)  |
//!
//! The caller of a ledger operation is named in the request body. This is a
//! development node: nothing authenticates it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use vault_ledger::ledger::{
    Allowance, ApproveArgs, GetTransactionsResponse, TransferArgs, TransferFromArgs, TxIndex,
};
use vault_ledger::vault::{
    AssetRouter, ChainKind, CollaboratorError, InMemoryAddressDeriver, InMemoryAssetLedger,
    PoolEntry, VaultMetadata,
};
use vault_ledger::{
    Account, AssetKind, Clock, Principal, Subaccount, Vault, VaultConfig, VaultError,
};

use crate::metrics::SharedMetrics;

/// Default window for `GET /transactions` when `length` is omitted.
const DEFAULT_PAGE_LENGTH: u64 = 100;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    /// The in-memory asset ledgers the vault is wired to, by kind.
    pub ledgers: Arc<BTreeMap<AssetKind, Arc<InMemoryAssetLedger>>>,
    /// Whether `POST /dev/faucet` is routed.
    pub faucet_enabled: bool,
    pub metrics: SharedMetrics,
    /// The node's reported version string.
    pub version: String,
}

impl AppState {
    /// Builds a vault over fresh in-memory ledgers for every native asset
    /// kind and an in-memory address deriver.
    pub fn in_memory(
        config: VaultConfig,
        clock: Arc<dyn Clock>,
        metrics: SharedMetrics,
        faucet_enabled: bool,
        version: String,
    ) -> Self {
        let mut router = AssetRouter::new();
        let mut ledgers = BTreeMap::new();
        for kind in AssetKind::NATIVE {
            let ledger = Arc::new(InMemoryAssetLedger::new(kind.clone()));
            router.register(kind.clone(), ledger.clone());
            ledgers.insert(kind, ledger);
        }
        let vault = Vault::new(config, clock, router, Arc::new(InMemoryAddressDeriver::new()));
        metrics.observe(&vault);

        Self {
            vault: Arc::new(vault),
            ledgers: Arc::new(ledgers),
            faucet_enabled,
            metrics,
            version,
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metadata", get(metadata_handler))
        .route("/accounts/:owner/balance", get(balance_handler))
        .route("/allowances", get(allowance_handler))
        .route("/transactions", get(transactions_handler))
        .route("/pool", get(pool_handler))
        .route("/quote", get(quote_handler))
        .route("/transfer", post(transfer_handler))
        .route("/approve", post(approve_handler))
        .route("/transfer_from", post(transfer_from_handler))
        .route("/deposit", post(deposit_handler))
        .route("/redeem", post(redeem_handler))
        .route("/chain_address/:chain", post(chain_address_handler));

    if state.faucet_enabled {
        router = router.route("/dev/faucet", post(faucet_handler));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataResponse {
    #[serde(flatten)]
    pub vault: VaultMetadata,
    pub supported_assets: Vec<AssetKind>,
    /// Why the vault halted, if it has.
    pub halted: Option<String>,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct SubaccountQuery {
    pub subaccount: Option<Subaccount>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account: Account,
    pub balance: u64,
}

#[derive(Debug, Deserialize)]
pub struct AllowanceQuery {
    pub owner: Principal,
    pub owner_subaccount: Option<Subaccount>,
    pub spender: Principal,
    pub spender_subaccount: Option<Subaccount>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub start: TxIndex,
    #[serde(default = "default_page_length")]
    pub length: u64,
}

fn default_page_length() -> u64 {
    DEFAULT_PAGE_LENGTH
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolResponse {
    pub total_value_locked: u64,
    pub entries: Vec<PoolEntry>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub amount: u64,
    pub shares: u64,
}

/// Body of `POST /transfer`, `/approve` and `/transfer_from`.
#[derive(Debug, Deserialize)]
pub struct LedgerCall<A> {
    pub caller: Principal,
    pub args: A,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxIndexResponse {
    pub index: TxIndex,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub from: Account,
    pub asset: AssetKind,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DepositResponse {
    pub shares: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub holder: Account,
    pub shares: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasedAsset {
    pub asset: AssetKind,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub released: Vec<ReleasedAsset>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainAddressResponse {
    pub chain: ChainKind,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub asset: AssetKind,
    pub to: Account,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub asset: AssetKind,
    /// The recipient's balance on the asset ledger after the credit.
    pub balance: u64,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// The typed error, when it has a structured form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

fn error_reply(status: StatusCode, error: String, detail: Option<serde_json::Value>) -> Response {
    (status, Json(ErrorResponse { error, detail })).into_response()
}

fn released_list(pairs: Vec<(AssetKind, u64)>) -> Vec<ReleasedAsset> {
    pairs
        .into_iter()
        .map(|(asset, amount)| ReleasedAsset { asset, amount })
        .collect()
}

/// Ledger operation errors are all the caller's to fix.
fn ledger_reply<E>(result: Result<TxIndex, E>) -> Response
where
    E: std::error::Error + Serialize,
{
    match result {
        Ok(index) => (StatusCode::OK, Json(TxIndexResponse { index })).into_response(),
        Err(e) => error_reply(
            StatusCode::BAD_REQUEST,
            e.to_string(),
            serde_json::to_value(&e).ok(),
        ),
    }
}

fn vault_error_status(e: &VaultError) -> StatusCode {
    match e {
        VaultError::ZeroAmount
        | VaultError::UnsupportedAsset(_)
        | VaultError::DepositTooSmall { .. }
        | VaultError::InsufficientShares { .. }
        | VaultError::NothingToRelease { .. } => StatusCode::BAD_REQUEST,
        VaultError::Busy(_) => StatusCode::CONFLICT,
        VaultError::Collaborator(CollaboratorError::TimedOut) => StatusCode::GATEWAY_TIMEOUT,
        VaultError::Collaborator(_) | VaultError::PartialRedemption { .. } => {
            StatusCode::BAD_GATEWAY
        }
        VaultError::CorruptedState { .. } | VaultError::Halted { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        VaultError::Ledger(_) | VaultError::Pool(_) | VaultError::Arithmetic(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn vault_error_reply(e: VaultError) -> Response {
    let status = vault_error_status(&e);
    let error = e.to_string();
    let detail = match e {
        VaultError::PartialRedemption {
            released,
            shares_burned,
            ..
        } => Some(serde_json::json!({
            "released": released_list(released),
            "shares_burned": shares_burned,
        })),
        _ => None,
    };
    error_reply(status, error, detail)
}

// ---------------------------------------------------------------------------
// Read Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 while the process is up, halted or not.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn metadata_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(MetadataResponse {
        vault: state.vault.get_metadata(),
        supported_assets: state.vault.supported_assets(),
        halted: state.vault.halt_reason(),
        version: state.version.clone(),
    })
}

async fn balance_handler(
    Path(owner): Path<Principal>,
    Query(query): Query<SubaccountQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let account = Account {
        owner,
        subaccount: query.subaccount,
    };
    let balance = state.vault.balance_of(&account);
    Json(BalanceResponse { account, balance })
}

/// `GET /allowances`: an expired allowance reads as zero.
async fn allowance_handler(
    Query(query): Query<AllowanceQuery>,
    State(state): State<AppState>,
) -> Json<Allowance> {
    let owner = Account {
        owner: query.owner,
        subaccount: query.owner_subaccount,
    };
    let spender = Account {
        owner: query.spender,
        subaccount: query.spender_subaccount,
    };
    Json(state.vault.allowance(&owner, &spender))
}

/// `GET /transactions`: at most the ledger's per-query cap is returned,
/// whatever `length` asks for.
async fn transactions_handler(
    Query(query): Query<TransactionsQuery>,
    State(state): State<AppState>,
) -> Json<GetTransactionsResponse> {
    Json(state.vault.get_transactions(query.start, query.length))
}

async fn pool_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(PoolResponse {
        total_value_locked: state.vault.total_value_locked(),
        entries: state.vault.pool_balances(),
    })
}

async fn quote_handler(
    Query(query): Query<QuoteQuery>,
    State(state): State<AppState>,
) -> Response {
    match state.vault.quote_deposit(query.amount) {
        Ok(shares) => Json(QuoteResponse {
            amount: query.amount,
            shares,
        })
        .into_response(),
        Err(e) => vault_error_reply(e),
    }
}

// ---------------------------------------------------------------------------
// Ledger Handlers
// ---------------------------------------------------------------------------

async fn transfer_handler(
    State(state): State<AppState>,
    Json(call): Json<LedgerCall<TransferArgs>>,
) -> Response {
    let started = Instant::now();
    let result = state.vault.transfer(&call.caller, call.args);
    state
        .metrics
        .record("transfer", result.is_ok(), started.elapsed());
    state.metrics.observe(&state.vault);
    ledger_reply(result)
}

async fn approve_handler(
    State(state): State<AppState>,
    Json(call): Json<LedgerCall<ApproveArgs>>,
) -> Response {
    let started = Instant::now();
    let result = state.vault.approve(&call.caller, call.args);
    state
        .metrics
        .record("approve", result.is_ok(), started.elapsed());
    state.metrics.observe(&state.vault);
    ledger_reply(result)
}

async fn transfer_from_handler(
    State(state): State<AppState>,
    Json(call): Json<LedgerCall<TransferFromArgs>>,
) -> Response {
    let started = Instant::now();
    let result = state.vault.transfer_from(&call.caller, call.args);
    state
        .metrics
        .record("transfer_from", result.is_ok(), started.elapsed());
    state.metrics.observe(&state.vault);
    ledger_reply(result)
}

// ---------------------------------------------------------------------------
// Vault Handlers
// ---------------------------------------------------------------------------
//
// Deposits and redemptions run on their own task: a client that hangs up
// must not cancel one between a confirmed asset movement and its commit.

/// `POST /deposit`: moves `amount` of `asset` from `from` into custody and
/// mints shares.
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Response {
    let started = Instant::now();
    let vault = Arc::clone(&state.vault);
    let task = tokio::spawn(async move { vault.deposit(&req.from, req.asset, req.amount).await });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("deposit task failed: {}", e);
            return error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "deposit task failed".into(),
                None,
            );
        }
    };

    state
        .metrics
        .record("deposit", result.is_ok(), started.elapsed());
    state.metrics.observe(&state.vault);
    match result {
        Ok(shares) => Json(DepositResponse { shares }).into_response(),
        Err(e) => vault_error_reply(e),
    }
}

/// `POST /redeem`: burns shares for a proportional slice of every pooled
/// asset. A partial release answers 502 with what was released in `detail`.
async fn redeem_handler(
    State(state): State<AppState>,
    Json(req): Json<RedeemRequest>,
) -> Response {
    let started = Instant::now();
    let vault = Arc::clone(&state.vault);
    let task = tokio::spawn(async move { vault.redeem(&req.holder, req.shares).await });

    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("redeem task failed: {}", e);
            return error_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "redeem task failed".into(),
                None,
            );
        }
    };

    state
        .metrics
        .record("redeem", result.is_ok(), started.elapsed());
    state.metrics.observe(&state.vault);
    match result {
        Ok(released) => Json(RedeemResponse {
            released: released_list(released),
        })
        .into_response(),
        Err(e) => vault_error_reply(e),
    }
}

async fn chain_address_handler(
    Path(chain): Path<ChainKind>,
    State(state): State<AppState>,
) -> Response {
    let started = Instant::now();
    let result = state.vault.generate_chain_address(chain).await;
    state
        .metrics
        .record("chain_address", result.is_ok(), started.elapsed());
    match result {
        Ok(address) => Json(ChainAddressResponse { chain, address }).into_response(),
        Err(e) => vault_error_reply(e),
    }
}

/// `POST /dev/faucet`: credits test units on an in-memory asset ledger.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Response {
    match state.ledgers.get(&req.asset) {
        Some(ledger) => {
            let balance = ledger.credit(&req.to, req.amount);
            tracing::info!(asset = %req.asset, to = %req.to, amount = req.amount, "faucet credit");
            Json(FaucetResponse {
                asset: req.asset,
                balance,
            })
            .into_response()
        }
        None => vault_error_reply(VaultError::UnsupportedAsset(req.asset)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use vault_ledger::{LedgerConfig, ManualClock};

    const FEE: u64 = 10;

    fn test_app_state(faucet: bool) -> AppState {
        let mut config = VaultConfig::new(
            Principal::new("vault-test").unwrap(),
            Principal::new("creator").unwrap(),
        );
        config.ledger = LedgerConfig::new("Test Share", "TST").with_fee(FEE);
        let metrics = Arc::new(crate::metrics::NodeMetrics::new().unwrap());
        AppState::in_memory(
            config,
            Arc::new(ManualClock::new(1_000_000_000)),
            metrics,
            faucet,
            "0.1.0-test".into(),
        )
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Faucets `amount` ICP to `owner` and deposits all of it.
    async fn fund_and_deposit(router: &Router, owner: &str, amount: u64) -> u64 {
        let (status, _) = post_json(
            router,
            "/dev/faucet",
            serde_json::json!({ "asset": "ICP", "to": { "owner": owner }, "amount": amount }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = post_json(
            router,
            "/deposit",
            serde_json::json!({ "from": { "owner": owner }, "asset": "ICP", "amount": amount }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
        let resp: DepositResponse = serde_json::from_slice(&body).unwrap();
        resp.shares
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state(false));
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn metadata_describes_an_empty_vault() {
        let router = create_router(test_app_state(false));
        let (status, body) = get(&router, "/metadata").await;

        assert_eq!(status, StatusCode::OK);
        let resp: MetadataResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.vault.symbol, "TST");
        assert_eq!(resp.vault.fee, FEE);
        assert_eq!(resp.vault.total_supply, 0);
        assert_eq!(resp.supported_assets.len(), 3);
        assert!(resp.halted.is_none());
    }

    #[tokio::test]
    async fn deposit_mints_shares_and_updates_pool() {
        let state = test_app_state(true);
        let router = create_router(state.clone());

        assert_eq!(fund_and_deposit(&router, "alice", 1_000).await, 1_000);

        let (status, body) = get(&router, "/accounts/alice/balance").await;
        assert_eq!(status, StatusCode::OK);
        let resp: BalanceResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.balance, 1_000);

        let (_, body) = get(&router, "/pool").await;
        let pool: PoolResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(pool.total_value_locked, 1_000);
        assert_eq!(pool.entries.len(), 1);

        let (_, body) = get(&router, "/quote?amount=500").await;
        let quote: QuoteResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(quote.shares, 500);

        assert_eq!(state.metrics.total_supply.get(), 1_000);
    }

    #[tokio::test]
    async fn transfer_errors_carry_typed_detail() {
        let router = create_router(test_app_state(true));
        fund_and_deposit(&router, "alice", 100).await;

        let (status, body) = post_json(
            &router,
            "/transfer",
            serde_json::json!({
                "caller": "alice",
                "args": { "to": { "owner": "bob" }, "amount": 500 }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        let detail = err.detail.unwrap();
        assert_eq!(detail["InsufficientFunds"]["balance"], 100);

        let (status, body) = post_json(
            &router,
            "/transfer",
            serde_json::json!({
                "caller": "alice",
                "args": { "to": { "owner": "bob" }, "amount": 40 }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: TxIndexResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.index, 1);

        let (_, body) = get(&router, "/accounts/alice/balance").await;
        let resp: BalanceResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.balance, 100 - 40 - FEE);
    }

    #[tokio::test]
    async fn approve_then_transfer_from_spends_allowance() {
        let router = create_router(test_app_state(true));
        fund_and_deposit(&router, "alice", 1_000).await;

        let (status, _) = post_json(
            &router,
            "/approve",
            serde_json::json!({
                "caller": "alice",
                "args": { "spender": { "owner": "carol" }, "amount": 200 }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = post_json(
            &router,
            "/transfer_from",
            serde_json::json!({
                "caller": "carol",
                "args": {
                    "from": { "owner": "alice" },
                    "to": { "owner": "bob" },
                    "amount": 90
                }
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(&router, "/allowances?owner=alice&spender=carol").await;
        assert_eq!(status, StatusCode::OK);
        let allowance: Allowance = serde_json::from_slice(&body).unwrap();
        assert_eq!(allowance.amount, 200 - 90 - FEE);

        let (_, body) = get(&router, "/transactions?start=0&length=10").await;
        let log: GetTransactionsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(log.log_length, 3);
        assert_eq!(log.transactions[2].operation.name(), "transfer");
    }

    #[tokio::test]
    async fn redeem_releases_assets() {
        let state = test_app_state(true);
        let router = create_router(state.clone());
        fund_and_deposit(&router, "alice", 1_000).await;

        let (status, body) = post_json(
            &router,
            "/redeem",
            serde_json::json!({ "holder": { "owner": "alice" }, "shares": 400 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let resp: RedeemResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            resp.released,
            vec![ReleasedAsset {
                asset: AssetKind::Icp,
                amount: 400
            }]
        );

        let alice = Account::new(Principal::new("alice").unwrap());
        assert_eq!(state.ledgers[&AssetKind::Icp].balance_of(&alice), 400);
        assert_eq!(state.vault.total_value_locked(), 600);
    }

    #[tokio::test]
    async fn vault_errors_map_to_status_codes() {
        let state = test_app_state(true);
        let router = create_router(state.clone());

        let (status, _) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": { "owner": "alice" }, "asset": "token:other", "amount": 5 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        state.ledgers[&AssetKind::CkBtc]
            .fail_next_move_in(CollaboratorError::Unavailable("ledger down".into()));
        let (status, body) = post_json(
            &router,
            "/deposit",
            serde_json::json!({ "from": { "owner": "alice" }, "asset": "ckBTC", "amount": 5 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(err.error.contains("ledger down"));

        let (status, _) = post_json(
            &router,
            "/redeem",
            serde_json::json!({ "holder": { "owner": "alice" }, "shares": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chain_address_is_stable() {
        let router = create_router(test_app_state(false));

        let (status, body) = post_json(&router, "/chain_address/bitcoin", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let first: ChainAddressResponse = serde_json::from_slice(&body).unwrap();
        assert!(first.address.starts_with("bc1q"));

        let (_, body) = post_json(&router, "/chain_address/bitcoin", serde_json::json!({})).await;
        let second: ChainAddressResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(first.address, second.address);

        let (status, _) = post_json(&router, "/chain_address/solana", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn faucet_is_not_routed_unless_enabled() {
        let router = create_router(test_app_state(false));
        let (status, _) = post_json(
            &router,
            "/dev/faucet",
            serde_json::json!({ "asset": "ICP", "to": { "owner": "alice" }, "amount": 1 }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
