//!
//! cake HTTP server
//! ----------------
//! This module defines the Axum-based delivery layer for the remora → cake
//! session bridge.
//!
//! Responsibilities:
//! - Resolve the legacy `AMOv3` session cookie into a request context on
//!   every request; any failure shape degrades to the anonymous context and
//!   empties the presented cookie in the response.
//! - Home page with the welcome banner and global site stats.
//! - Logout endpoint that removes the server-side session row and empties
//!   the cookie.
//! - CSRF hidden-input helper for forms rendered under an authenticated
//!   context.
//! - First-run demo dataset creation and startup inventory logs.

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Context;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{extract::State, routing::get, Json, Router};
use base64::Engine;
use chrono::{Duration, Utc};
use getrandom::getrandom;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::error::AppError;
use crate::identity::{RequestContext, Session, SessionBackend, UserProfile};
use crate::store::{Fixture, SharedStore, SiteStats, StoreResult};

/// Name of the legacy remora session cookie.
const SESSION_COOKIE: &str = "AMOv3";

/// Shared server state injected into all handlers.
///
/// Holds the `SharedStore` handle, the session backend, and the secret mixed
/// into derived CSRF token values.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub backend: SessionBackend,
    pub csrf_secret: Vec<u8>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"status": "error", "code": self.code_str(), "error": self.message()}))).into_response()
    }
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let Some(cookie) = headers.get("cookie").or_else(|| headers.get("Cookie")) else {
        return out;
    };
    let Ok(s) = cookie.to_str() else { return out; };
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            out.insert(k.to_string(), v[1..].to_string());
        }
    }
    out
}

fn clear_session_cookie() -> HeaderValue {
    // Empty value rather than a delete marker: clients checking the cookie
    // after logout must observe ""
    HeaderValue::from_str(&format!("{}=; HttpOnly; SameSite=Lax; Path=/", SESSION_COOKIE)).unwrap()
}

/// Resolve the inbound cookie set into a request context.
///
/// Missing, malformed, stale, and dangling tokens all yield the anonymous
/// context. The second element reports whether a cookie value was presented
/// but failed to authenticate, in which case the response should empty it.
fn resolve_context(state: &AppState, headers: &HeaderMap) -> (RequestContext, bool) {
    let cookies = parse_cookies(headers);
    let presented = cookies.get(SESSION_COOKIE).cloned();
    let mut ctx = RequestContext { cookies, ..RequestContext::anonymous() };
    let Some(token) = presented else {
        return (ctx, false);
    };
    match state.backend.authenticate(&state.store, &token) {
        Ok(Some(user)) => {
            ctx.user = Some(user);
            (ctx, false)
        }
        Ok(None) => (ctx, true),
        Err(e) => {
            // Store trouble reads as a failed login, not a failed request.
            error!("session resolve failed (request_id={}): {e}", ctx.request_id);
            (ctx, true)
        }
    }
}

/// Hidden-input CSRF helper for forms rendered under an authenticated
/// context.
///
/// The value is derived from the server secret and the presented session
/// token, so it is stable across renders of the same session and never empty
/// for an authenticated context. Anonymous contexts get no input at all.
pub fn csrf_token_input(ctx: &RequestContext, secret: &[u8]) -> String {
    if ctx.is_anonymous() {
        return String::new();
    }
    let Some(token) = ctx.cookies.get(SESSION_COOKIE) else {
        return String::new();
    };
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(token.as_bytes());
    let value = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize());
    format!("<input type=\"hidden\" name=\"csrf_token\" value=\"{}\">", value)
}

fn render_home(ctx: &RequestContext, stats: &SiteStats, secret: &[u8]) -> String {
    let banner = match &ctx.user {
        Some(u) => format!("Welcome, {}", u.first_name),
        None => "Welcome, guest".to_string(),
    };
    let logout_form = if ctx.is_anonymous() {
        String::new()
    } else {
        format!(
            "<form action=\"/users/logout\" method=\"get\">{}<button type=\"submit\">Log out</button></form>",
            csrf_token_input(ctx, secret)
        )
    };
    format!(
        "<!doctype html>\n<html><body>\n<h1>{}</h1>\n<p>{} add-ons in the gallery, {} downloads served, {} registered users</p>\n{}\n</body></html>\n",
        banner, stats.addon_count, stats.download_count, stats.user_count, logout_form
    )
}

async fn home(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let (ctx, stale_cookie) = resolve_context(&state, &headers);
    let stats = state.store.global_stats()?;
    let body = render_home(&ctx, &stats, &state.csrf_secret);
    let mut h = HeaderMap::new();
    if stale_cookie {
        h.insert("Set-Cookie", clear_session_cookie());
    }
    Ok((StatusCode::OK, h, Html(body)).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let cookies = parse_cookies(&headers);
    if let Some(token) = cookies.get(SESSION_COOKIE) {
        match state.store.delete_session(token) {
            Ok(removed) => info!("logout: session association cleared (row_removed={})", removed),
            Err(e) => error!("logout: failed to remove session row: {e}"),
        }
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Html("<p>You have been logged out.</p>".to_string()))
}

async fn whoami(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let (ctx, stale_cookie) = resolve_context(&state, &headers);
    let mut h = HeaderMap::new();
    if stale_cookie {
        h.insert("Set-Cookie", clear_session_cookie());
    }
    let body = match &ctx.user {
        Some(u) => json!({"status": "ok", "anonymous": false, "user_id": u.id, "username": u.username}),
        None => json!({"status": "ok", "anonymous": true}),
    };
    (StatusCode::OK, h, Json(body))
}

/// Mount all routes onto a router carrying the given state. Exposed so tests
/// can serve the exact production router on an ephemeral port.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/users/logout", get(logout))
        .route("/whoami", get(whoami))
        .with_state(state)
}

/// Read the CSRF secret from the environment, generating a random one for
/// this process when unset.
pub fn csrf_secret_from_env() -> Vec<u8> {
    match std::env::var("CAKE_CSRF_SECRET") {
        Ok(s) if !s.is_empty() => s.into_bytes(),
        _ => {
            let mut bytes = [0u8; 32];
            let _ = getrandom(&mut bytes);
            bytes.to_vec()
        }
    }
}

fn log_startup_folders(db_root: &str) {
    // Gather basic environment and folder info
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let user = whoami::username();
    let db_env = std::env::var("CAKE_DB_FOLDER").ok();
    info!(
        target: "startup",
        "cake starting. Folder configuration: cwd={:?}, exe={:?}, user={:?}, db_root_param={:?}, CAKE_DB_FOLDER_env={:?}",
        cwd, exe, user, db_root, db_env
    );
    let db_exists = std::path::Path::new(db_root).exists();
    info!(target: "startup", "Path existence: db_root_exists={}", db_exists);
}

fn print_store_inventory(store: &SharedStore) {
    match store.table_counts() {
        Ok((sessions, profiles, users)) => info!(
            target: "startup",
            "Store inventory: sessions={}, profiles={}, users={}",
            sessions, profiles, users
        ),
        Err(e) => tracing::warn!("Failed to read store inventory: {}", e),
    }
}

/// Seed a demo profile, a live session for it, and starter site stats so a
/// fresh install renders a logged-in home page out of the box.
fn create_demo_dataset(store: &SharedStore) -> StoreResult<()> {
    use std::fmt::Write as _;
    let mut bytes = [0u8; 16];
    let _ = getrandom(&mut bytes);
    let mut token = String::with_capacity(32);
    for b in &bytes {
        let _ = write!(&mut token, "{:02x}", b);
    }

    let now = Utc::now();
    store.apply_fixture(Fixture {
        sessions: vec![Session {
            token: token.clone(),
            user_id: 1,
            valid: true,
            expires_at: now + Duration::days(30),
        }],
        profiles: vec![UserProfile {
            id: 1,
            firstname: "Demo".into(),
            lastname: "User".into(),
            email: "demo@example.com".into(),
            password: "sha512$demo$unusable".into(),
            created: now,
        }],
        users: Vec::new(),
        stats: Some(SiteStats { addon_count: 1, download_count: 0, user_count: 1 }),
    })?;
    info!("Created demo dataset; try a browser with cookie {}={}", SESSION_COOKIE, token);
    Ok(())
}

/// Start the cake HTTP server bound to the given port, with the store rooted
/// at `db_root`.
pub async fn run_with_ports(http_port: u16, db_root: &str) -> anyhow::Result<()> {
    // Print folder configuration as the very first thing on startup
    log_startup_folders(db_root);

    std::fs::create_dir_all(db_root)
        .with_context(|| format!("Failed to create or access store root: {}", db_root))?;
    let store = SharedStore::new(db_root)
        .with_context(|| format!("While opening store with root: {}", db_root))?;

    // On first startup with an empty store, seed the demo dataset.
    if store.is_empty() {
        if let Err(e) = create_demo_dataset(&store) {
            tracing::warn!("Failed to create demo dataset: {}", e);
        }
    }

    print_store_inventory(&store);

    let state = AppState {
        store,
        backend: SessionBackend::default(),
        csrf_secret: csrf_secret_from_env(),
    };
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    info!("cake HTTP listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding HTTP port {}", http_port))?;
    axum::serve(listener, app).await.context("HTTP server terminated")?;
    Ok(())
}

// Backward-compatible entry that uses defaults
/// Convenience entry point using the default port (7880) and store root "data".
pub async fn run() -> anyhow::Result<()> {
    run_with_ports(7880, "data").await
}
