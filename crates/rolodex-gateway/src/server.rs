//! Gateway server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, header::AUTHORIZATION},
    routing::{get, post},
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use rolodex_core::types::{CompanyId, UserId};

use crate::GatewayError;
use crate::auth::{
    AuthConfig, AuthError, AuthState, Identity, JwtManager, PublicUser, SignupDraft, User,
};
use crate::companies::{
    Company, CompanyDraft, CompanyStore, CompanyUpdate, OwnerAction, authorize_owner,
};
use crate::middleware::GatewayRateLimiter;
use crate::rpc::{self, RpcRequest, RpcResponse};

/// Request timeout for the API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable CORS.
    pub cors: bool,
    /// Data directory for persistent storage.
    pub data_dir: PathBuf,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Per-client request quota per minute.
    pub requests_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rolodex")
            .join("gateway");

        Self {
            port: 18790,
            bind_address: "127.0.0.1".to_string(),
            cors: true,
            data_dir,
            auth: AuthConfig::default(),
            requests_per_minute: 300,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `ROLODEX_PORT`, `ROLODEX_BIND`, and `ROLODEX_DATA_DIR`;
    /// anything unset falls back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = std::env::var("ROLODEX_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            config.port = port;
        }

        if let Ok(bind) = std::env::var("ROLODEX_BIND") {
            config.bind_address = bind;
        }

        if let Ok(dir) = std::env::var("ROLODEX_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config
    }
}

/// Gateway server state shared across handlers.
pub struct GatewayState {
    /// Authentication state.
    pub auth: AuthState,
    /// Company store.
    pub companies: CompanyStore,
    /// Per-client rate limiter.
    pub limiter: GatewayRateLimiter,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a new gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be created or a store
    /// fails to open.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let state = build_state(config.clone())?;

        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    /// Shared server state.
    #[must_use]
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Run the gateway server.
    ///
    /// # Errors
    ///
    /// Returns error if binding or serving fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let mut app = Router::new()
            .route("/health", get(health_handler))
            .route("/rpc", post(rpc_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

        if self.config.cors {
            app = app.layer(CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        tracing::info!("Gateway API listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| GatewayError::Server(e.to_string()))?;

        Ok(())
    }
}

fn build_state(config: GatewayConfig) -> Result<GatewayState, GatewayError> {
    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;

    let auth_config = config.auth.clone().with_env_overrides();
    let auth = AuthState::initialize(auth_config, &config.data_dir)
        .map_err(|e| GatewayError::Config(format!("Auth init failed: {e}")))?;

    let companies = CompanyStore::open(&config.data_dir)
        .map_err(|e| GatewayError::Server(format!("Failed to open company store: {e}")))?;

    let limiter = GatewayRateLimiter::new(config.requests_per_minute);

    Ok(GatewayState {
        auth,
        companies,
        limiter,
        config,
    })
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn rpc_handler(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    let id = request.id.clone();

    if !state.limiter.check(&addr.ip().to_string()) {
        return Json(RpcResponse::error(
            id,
            rpc::RATE_LIMITED,
            "Rate limit exceeded",
        ));
    }

    // Extract auth token from header
    let auth_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(JwtManager::extract_from_header);

    let result = dispatch_rpc(&state, &request.method, &request.params, auth_token);

    Json(match result {
        Ok(value) => RpcResponse::success(id, value),
        Err((code, message)) => RpcResponse::error(id, code, message),
    })
}

type RpcResult = Result<serde_json::Value, (i32, String)>;

/// Map an auth error onto its JSON-RPC error code.
fn auth_error(err: AuthError) -> (i32, String) {
    let code = match &err {
        AuthError::DuplicateEmail | AuthError::DuplicateNickname | AuthError::Conflict(_) => {
            rpc::CONFLICT
        }
        AuthError::InvalidCredentials => rpc::INVALID_CREDENTIALS,
        AuthError::Unauthorized(_) => rpc::UNAUTHORIZED,
        AuthError::Forbidden(_) => rpc::FORBIDDEN,
        AuthError::NotFound(_) => rpc::NOT_FOUND,
        AuthError::Validation(_) => rpc::INVALID_PARAMS,
        AuthError::Token(_) | AuthError::Storage(_) | AuthError::Config(_) => rpc::INTERNAL_ERROR,
    };

    (code, err.to_string())
}

/// Dispatch an RPC request to the appropriate handler.
///
/// Public methods skip authentication. Every other method resolves a live
/// identity from the bearer token and passes the declared role gate before
/// its handler runs; handlers receive that identity as the only trusted
/// caller reference.
fn dispatch_rpc(
    state: &GatewayState,
    method: &str,
    params: &serde_json::Value,
    auth_token: Option<&str>,
) -> RpcResult {
    let now = Utc::now();

    if state.auth.config.is_public_method(method) {
        return match method {
            "auth.signup" => handle_auth_signup(state, params),
            "auth.login" => handle_auth_login(state, params, now),
            "system.health" => handle_system_health(),
            _ => Err((rpc::METHOD_NOT_FOUND, format!("Method not found: {method}"))),
        };
    }

    let identity = state.auth.authenticate(auth_token, now).map_err(auth_error)?;
    state
        .auth
        .authorize_method(method, &identity)
        .map_err(auth_error)?;

    match method {
        // Auth methods
        "auth.me" => handle_auth_me(state, &identity),

        // User management (role-gated via the requirements table)
        "users.list" => handle_users_list(state),
        "users.delete" => handle_users_delete(state, params),

        // Company methods
        "companies.create" => handle_companies_create(state, params, &identity),
        "companies.get" => handle_companies_get(state, params, &identity),
        "companies.list" => handle_companies_list(state, &identity),
        "companies.update" => handle_companies_update(state, params, &identity),
        "companies.delete" => handle_companies_delete(state, params, &identity),

        _ => Err((rpc::METHOD_NOT_FOUND, format!("Method not found: {method}"))),
    }
}

// ============================================================================
// Auth RPC Handlers
// ============================================================================

fn handle_auth_signup(state: &GatewayState, params: &serde_json::Value) -> RpcResult {
    let draft: SignupDraft = serde_json::from_value(params.clone())
        .map_err(|e| (rpc::INVALID_PARAMS, format!("Invalid signup draft: {e}")))?;

    let user = state.auth.signup(draft).map_err(auth_error)?;

    Ok(serde_json::json!({ "user": user }))
}

fn handle_auth_login(
    state: &GatewayState,
    params: &serde_json::Value,
    now: chrono::DateTime<Utc>,
) -> RpcResult {
    let email = params["email"]
        .as_str()
        .ok_or((rpc::INVALID_PARAMS, "Missing email".to_string()))?;
    let password = params["password"]
        .as_str()
        .ok_or((rpc::INVALID_PARAMS, "Missing password".to_string()))?;

    let session = state
        .auth
        .signin(email, password, now)
        .map_err(auth_error)?;

    Ok(serde_json::json!({
        "token": session.token,
        "expires_at": session.expires_at.to_rfc3339(),
    }))
}

fn handle_auth_me(state: &GatewayState, identity: &Identity) -> RpcResult {
    let user = state
        .auth
        .users
        .find_by_id(&identity.id)
        .map_err(auth_error)?
        .ok_or((rpc::NOT_FOUND, "User not found".to_string()))?;

    Ok(serde_json::json!({ "user": user.to_public() }))
}

fn handle_system_health() -> RpcResult {
    Ok(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// User Management RPC Handlers
// ============================================================================

fn handle_users_list(state: &GatewayState) -> RpcResult {
    let users = state.auth.users.list().map_err(auth_error)?;

    let public_users: Vec<PublicUser> = users.iter().map(User::to_public).collect();

    Ok(serde_json::json!({
        "users": public_users,
        "total": public_users.len(),
    }))
}

fn handle_users_delete(state: &GatewayState, params: &serde_json::Value) -> RpcResult {
    let id = params["id"]
        .as_str()
        .ok_or((rpc::INVALID_PARAMS, "Missing id".to_string()))?;

    let removed = state
        .auth
        .users
        .delete(&UserId::new(id))
        .map_err(auth_error)?;

    if !removed {
        return Err((rpc::NOT_FOUND, format!("User {id} not found")));
    }

    Ok(serde_json::json!({ "success": true }))
}

// ============================================================================
// Company RPC Handlers
// ============================================================================

fn handle_companies_create(
    state: &GatewayState,
    params: &serde_json::Value,
    identity: &Identity,
) -> RpcResult {
    let draft: CompanyDraft = serde_json::from_value(params.clone())
        .map_err(|e| (rpc::INVALID_PARAMS, format!("Invalid company draft: {e}")))?;

    // Owner comes from the resolved identity, never from the body.
    let company = state
        .companies
        .create(&identity.id, draft)
        .map_err(auth_error)?;

    Ok(serde_json::json!({ "company": company }))
}

fn handle_companies_get(
    state: &GatewayState,
    params: &serde_json::Value,
    identity: &Identity,
) -> RpcResult {
    let company = fetch_company(state, params)?;
    authorize_owner(&company, identity, OwnerAction::Get).map_err(auth_error)?;

    Ok(serde_json::json!({ "company": company }))
}

fn handle_companies_list(state: &GatewayState, identity: &Identity) -> RpcResult {
    let companies = state
        .companies
        .find_all_by_owner(&identity.id)
        .map_err(auth_error)?;

    Ok(serde_json::json!({
        "companies": companies,
        "total": companies.len(),
    }))
}

fn handle_companies_update(
    state: &GatewayState,
    params: &serde_json::Value,
    identity: &Identity,
) -> RpcResult {
    let company = fetch_company(state, params)?;
    authorize_owner(&company, identity, OwnerAction::Update).map_err(auth_error)?;

    let update: CompanyUpdate = serde_json::from_value(params.clone())
        .map_err(|e| (rpc::INVALID_PARAMS, format!("Invalid company update: {e}")))?;

    let updated = state
        .companies
        .update(&company.id, update)
        .map_err(auth_error)?;

    Ok(serde_json::json!({ "company": updated }))
}

fn handle_companies_delete(
    state: &GatewayState,
    params: &serde_json::Value,
    identity: &Identity,
) -> RpcResult {
    let company = fetch_company(state, params)?;
    authorize_owner(&company, identity, OwnerAction::Delete).map_err(auth_error)?;

    state.companies.delete(&company.id).map_err(auth_error)?;

    Ok(serde_json::json!({ "success": true }))
}

fn fetch_company(
    state: &GatewayState,
    params: &serde_json::Value,
) -> Result<Company, (i32, String)> {
    let id = params["id"]
        .as_str()
        .ok_or((rpc::INVALID_PARAMS, "Missing id".to_string()))?;

    state
        .companies
        .find_by_id(&CompanyId::new(id))
        .map_err(auth_error)?
        .ok_or_else(|| (rpc::NOT_FOUND, format!("Company {id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_state(dir: &TempDir) -> GatewayState {
        let config = GatewayConfig {
            port: 0,
            bind_address: "127.0.0.1".to_string(),
            cors: false,
            data_dir: dir.path().to_path_buf(),
            auth: AuthConfig::builder()
                .jwt_secret(JwtManager::generate_hex_secret())
                .build(),
            requests_per_minute: 10_000,
        };
        build_state(config).unwrap()
    }

    fn signup(state: &GatewayState, email: &str, nickname: &str, password: &str) {
        dispatch_rpc(
            state,
            "auth.signup",
            &json!({ "email": email, "nickname": nickname, "password": password }),
            None,
        )
        .unwrap();
    }

    fn login(state: &GatewayState, email: &str, password: &str) -> String {
        let result = dispatch_rpc(
            state,
            "auth.login",
            &json!({ "email": email, "password": password }),
            None,
        )
        .unwrap();
        result["token"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_signup_login_me_flow() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");
        let token = login(&state, "a@x.com", "P@ss1");

        let me = dispatch_rpc(&state, "auth.me", &json!({}), Some(&token)).unwrap();
        assert_eq!(me["user"]["email"], "a@x.com");
        assert_eq!(me["user"]["nickname"], "alice");
        assert!(me["user"].get("password_hash").is_none());
    }

    #[test]
    fn test_duplicate_signup_is_conflict() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");

        let (code, _) = dispatch_rpc(
            &state,
            "auth.signup",
            &json!({ "email": "a@x.com", "nickname": "bob", "password": "Q@ss2" }),
            None,
        )
        .unwrap_err();
        assert_eq!(code, rpc::CONFLICT);
    }

    #[test]
    fn test_login_failures_share_one_shape() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");

        let wrong = dispatch_rpc(
            &state,
            "auth.login",
            &json!({ "email": "a@x.com", "password": "wrong" }),
            None,
        )
        .unwrap_err();
        let unknown = dispatch_rpc(
            &state,
            "auth.login",
            &json!({ "email": "ghost@x.com", "password": "P@ss1" }),
            None,
        )
        .unwrap_err();

        assert_eq!(wrong.0, rpc::INVALID_CREDENTIALS);
        assert_eq!(wrong, unknown);
    }

    #[test]
    fn test_protected_method_requires_token() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        let (code, _) = dispatch_rpc(&state, "companies.list", &json!({}), None).unwrap_err();
        assert_eq!(code, rpc::UNAUTHORIZED);

        let (code, _) =
            dispatch_rpc(&state, "companies.list", &json!({}), Some("bogus")).unwrap_err();
        assert_eq!(code, rpc::UNAUTHORIZED);
    }

    #[test]
    fn test_admin_gate_on_user_management() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");
        let token = login(&state, "a@x.com", "P@ss1");

        let (code, _) = dispatch_rpc(&state, "users.list", &json!({}), Some(&token)).unwrap_err();
        assert_eq!(code, rpc::FORBIDDEN);
    }

    #[test]
    fn test_company_lifecycle_with_ownership() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");
        signup(&state, "b@x.com", "bob", "Q@ss2");
        let alice = login(&state, "a@x.com", "P@ss1");
        let bob = login(&state, "b@x.com", "Q@ss2");

        let created = dispatch_rpc(
            &state,
            "companies.create",
            &json!({ "name": "Acme", "description": "Anvils" }),
            Some(&alice),
        )
        .unwrap();
        let company_id = created["company"]["id"].as_str().unwrap().to_string();

        // Listing is owner-scoped
        let alices = dispatch_rpc(&state, "companies.list", &json!({}), Some(&alice)).unwrap();
        assert_eq!(alices["total"], 1);
        let bobs = dispatch_rpc(&state, "companies.list", &json!({}), Some(&bob)).unwrap();
        assert_eq!(bobs["total"], 0);

        // Bob can neither read, update, nor delete Alice's record
        for method in ["companies.get", "companies.update", "companies.delete"] {
            let (code, _) =
                dispatch_rpc(&state, method, &json!({ "id": company_id }), Some(&bob)).unwrap_err();
            assert_eq!(code, rpc::FORBIDDEN, "{method} should be forbidden");
        }

        // Alice deletes her own record
        dispatch_rpc(
            &state,
            "companies.delete",
            &json!({ "id": company_id }),
            Some(&alice),
        )
        .unwrap();

        let (code, _) = dispatch_rpc(
            &state,
            "companies.get",
            &json!({ "id": company_id }),
            Some(&alice),
        )
        .unwrap_err();
        assert_eq!(code, rpc::NOT_FOUND);
    }

    #[test]
    fn test_owner_never_comes_from_request_body() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");
        let alice = login(&state, "a@x.com", "P@ss1");

        // A spoofed owner field in the body is ignored
        let created = dispatch_rpc(
            &state,
            "companies.create",
            &json!({ "name": "Acme", "owner_id": "user_spoofed" }),
            Some(&alice),
        )
        .unwrap();

        let owner = created["company"]["owner_id"].as_str().unwrap();
        assert!(owner.starts_with("user_"));
        assert_ne!(owner, "user_spoofed");
    }

    #[test]
    fn test_unknown_method() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);

        signup(&state, "a@x.com", "alice", "P@ss1");
        let token = login(&state, "a@x.com", "P@ss1");

        let (code, _) = dispatch_rpc(&state, "companies.explode", &json!({}), Some(&token))
            .unwrap_err();
        assert_eq!(code, rpc::METHOD_NOT_FOUND);
    }
}
