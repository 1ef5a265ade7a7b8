//! End-to-end HTTP tests for the cookie bridge: a reqwest client with a
//! cookie jar against the production router served on an ephemeral port,
//! stores rooted in tempdirs.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;

use cake::identity::{Session, SessionBackend, UserProfile};
use cake::server::{build_router, AppState};
use cake::store::{Fixture, SharedStore, SiteStats};

const COOKIE_NAME: &str = "AMOv3";
const LIVE_TOKEN: &str = "17f051c99f083244bf653d5798111216";

fn scott() -> UserProfile {
    UserProfile {
        id: 1,
        firstname: "Scott".into(),
        lastname: "Mann".into(),
        email: "scott@addons.example.com".into(),
        password: "sha512$9f2c41bd7a$0b5e2f9c1d8a4e6b".into(),
        created: "2007-03-05T13:09:38Z".parse::<DateTime<Utc>>().unwrap(),
    }
}

fn seeded_store(root: &std::path::Path) -> Result<SharedStore> {
    let store = SharedStore::new(root)?;
    store.apply_fixture(Fixture {
        sessions: vec![Session {
            token: LIVE_TOKEN.into(),
            user_id: 1,
            valid: true,
            expires_at: Utc::now() + Duration::days(1),
        }],
        profiles: vec![scott()],
        users: Vec::new(),
        stats: Some(SiteStats { addon_count: 9173, download_count: 1143924907, user_count: 652403 }),
    })?;
    Ok(store)
}

async fn spawn_server(store: SharedStore) -> Result<SocketAddr> {
    let state = AppState {
        store,
        backend: SessionBackend::default(),
        csrf_secret: b"integration-test-secret".to_vec(),
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

fn client_with_cookie(addr: &SocketAddr, value: &str) -> Result<reqwest::Client> {
    let jar = Arc::new(reqwest::cookie::Jar::default());
    let url: reqwest::Url = format!("http://{}", addr).parse()?;
    jar.add_cookie_str(&format!("{}={}", COOKIE_NAME, value), &url);
    Ok(reqwest::Client::builder().cookie_provider(jar).build()?)
}

#[tokio::test]
async fn home_with_known_cookie_shows_welcome_banner() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = seeded_store(tmp.path())?;
    let addr = spawn_server(store.clone()).await?;
    let client = client_with_cookie(&addr, LIVE_TOKEN)?;

    let body = client.get(format!("http://{}/", addr)).send().await?.text().await?;
    assert!(body.contains("Welcome, Scott"), "expected welcome banner, got: {body}");
    // the unrelated global-stats dataset renders too
    assert!(body.contains("9173"), "expected site stats on the page");
    // and an authenticated page carries the CSRF hidden input
    assert!(body.contains("name=\"csrf_token\""), "expected csrf input in logout form");

    // The cake-side user record was materialized with the legacy fields.
    let profile = scott();
    let user = store.find_user(1)?.expect("user materialized by cookie login");
    assert_eq!(user.first_name, profile.firstname);
    assert_eq!(user.last_name, profile.lastname);
    assert_eq!(user.username, profile.email);
    assert_eq!(user.email, profile.email);
    assert_eq!(user.date_joined, profile.created);
    assert_eq!(user.password, profile.password);
    assert_eq!(user.id, profile.id);
    Ok(())
}

#[tokio::test]
async fn unknown_cookie_yields_anonymous_context_not_an_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = seeded_store(tmp.path())?;
    let addr = spawn_server(store).await?;
    let client = client_with_cookie(&addr, "badcookie")?;

    // The page still renders, anonymously.
    let resp = client.get(format!("http://{}/", addr)).send().await?;
    assert_eq!(resp.status(), 200);
    let set_cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(
        set_cookie.starts_with(&format!("{}=;", COOKIE_NAME)),
        "a failed cookie login should empty the cookie, got: {set_cookie}"
    );
    let body = resp.text().await?;
    assert!(body.contains("Welcome, guest"));

    // Context introspection agrees.
    let who: serde_json::Value =
        client.get(format!("http://{}/whoami", addr)).send().await?.json().await?;
    assert_eq!(who["anonymous"], serde_json::json!(true));
    Ok(())
}

#[tokio::test]
async fn stale_cookie_is_pruned_and_emptied_over_http() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = SharedStore::new(tmp.path())?;
    let stale = "27f051c99f083244bf653d5798111216";
    store.apply_fixture(Fixture {
        sessions: vec![Session {
            token: stale.into(),
            user_id: 1,
            valid: true,
            expires_at: Utc::now() - Duration::hours(1),
        }],
        profiles: vec![scott()],
        ..Default::default()
    })?;
    let addr = spawn_server(store.clone()).await?;
    let client = client_with_cookie(&addr, stale)?;

    let who: serde_json::Value =
        client.get(format!("http://{}/whoami", addr)).send().await?.json().await?;
    assert_eq!(who["anonymous"], serde_json::json!(true));
    // The failed lookup removed the row server-side.
    assert!(store.find_session(stale)?.is_none());
    Ok(())
}

#[tokio::test]
async fn login_then_logout_clears_cookie_and_context() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = seeded_store(tmp.path())?;
    let addr = spawn_server(store.clone()).await?;
    let client = client_with_cookie(&addr, LIVE_TOKEN)?;

    // Logged in via the legacy cookie.
    let body = client.get(format!("http://{}/", addr)).send().await?.text().await?;
    assert!(body.contains("Welcome, Scott"));

    // Logout empties the cookie value and drops the session row.
    let resp = client.get(format!("http://{}/users/logout", addr)).send().await?;
    assert_eq!(resp.status(), 200);
    let set_cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(
        set_cookie.starts_with(&format!("{}=;", COOKIE_NAME)),
        "logout should empty the session cookie, got: {set_cookie}"
    );
    assert!(store.find_session(LIVE_TOKEN)?.is_none());

    // Subsequent requests in the same exchange are anonymous.
    let who: serde_json::Value =
        client.get(format!("http://{}/whoami", addr)).send().await?.json().await?;
    assert_eq!(who["anonymous"], serde_json::json!(true));
    let body = client.get(format!("http://{}/", addr)).send().await?.text().await?;
    assert!(body.contains("Welcome, guest"));
    Ok(())
}

#[tokio::test]
async fn whoami_reports_the_resolved_user() -> Result<()> {
    let tmp = TempDir::new()?;
    let store = seeded_store(tmp.path())?;
    let addr = spawn_server(store).await?;
    let client = client_with_cookie(&addr, LIVE_TOKEN)?;

    let who: serde_json::Value =
        client.get(format!("http://{}/whoami", addr)).send().await?.json().await?;
    assert_eq!(who["anonymous"], serde_json::json!(false));
    assert_eq!(who["user_id"], serde_json::json!(1));
    assert_eq!(who["username"], serde_json::json!("scott@addons.example.com"));
    Ok(())
}
