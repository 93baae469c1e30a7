//! End-to-end flows against a server bound to an ephemeral port.

use std::{sync::Arc, time::Duration};

use connector_auth::oauth::{PkceChallenge, PkceVerifier, hash_client_secret};
use connector_auth::testing::{
    InMemoryAuthorizationCodeStorage, InMemoryClientStorage, InMemoryRefreshTokenStorage,
};
use connector_auth::token::{AccessTokenIssuer, SigningKeyPair};
use connector_auth::types::Client;
use connector_auth_server::{AppConfig, ServerBuilder};
use reqwest::{StatusCode, header};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use url::Url;

const ISSUER: &str = "https://auth.test";
const LOGIN_URL: &str = "https://login.test/connector";
const SECRET: &str = "0123456789abcdef0123456789abcdef";
const REDIRECT: &str = "https://app.example.com/callback";
const SCOPE: &str = "orders:read orders:write";
const CALLBACK_SECRET: &str = "login-surface-hook";

struct TestServer {
    base: String,
    http: reqwest::Client,
    refresh_tokens: Arc<InMemoryRefreshTokenStorage>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn clients() -> Vec<Client> {
    vec![
        Client {
            client_id: "cli_public".to_string(),
            tenant_id: "t0".to_string(),
            secret_hash: None,
            allowed_redirect_uris: vec![REDIRECT.to_string()],
            is_active: true,
        },
        Client {
            client_id: "cli_confidential".to_string(),
            tenant_id: "t0".to_string(),
            secret_hash: Some(hash_client_secret("s3cret")),
            allowed_redirect_uris: vec!["https://*.example.com/callback".to_string()],
            is_active: true,
        },
    ]
}

async fn start() -> TestServer {
    let mut cfg = AppConfig::default();
    cfg.auth.issuer = ISSUER.to_string();
    cfg.auth.login_url = LOGIN_URL.to_string();
    cfg.auth.callback_secret = Some(CALLBACK_SECRET.to_string());
    cfg.auth.signing.algorithm = "HS256".to_string();
    cfg.auth.signing.secret = Some(SECRET.to_string());

    let refresh_tokens = Arc::new(InMemoryRefreshTokenStorage::new());
    let server = ServerBuilder::new()
        .with_config(cfg)
        .build_with_storage(
            Arc::new(InMemoryClientStorage::with_clients(clients())),
            Arc::new(InMemoryAuthorizationCodeStorage::new()),
            refresh_tokens.clone(),
        )
        .expect("build server");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve(listener, async {
        let _ = rx.await;
    }));

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("http client");

    TestServer {
        base: format!("http://{addr}"),
        http,
        refresh_tokens,
        shutdown: Some(tx),
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Runs `/authorize` and the approval callback, returning the issued code.
async fn authorize(srv: &TestServer, client_id: &str, redirect: &str, verifier: &PkceVerifier) -> String {
    let challenge = PkceChallenge::from_verifier(verifier);
    let res = srv
        .http
        .get(srv.url("/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect),
            ("scope", SCOPE),
            ("state", "xyz"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .send()
        .await
        .expect("authorize");
    assert_eq!(res.status(), StatusCode::FOUND);
    let location = res.headers()[header::LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with(LOGIN_URL), "{location}");
    assert_eq!(query_param(&location, "client_id").as_deref(), Some(client_id));
    let auth_code = query_param(&location, "auth_code").expect("auth_code");

    let res = srv
        .http
        .post(srv.url("/authorize"))
        .bearer_auth(CALLBACK_SECRET)
        .json(&json!({
            "auth_code": auth_code,
            "user_id": "user-1",
            "tenant_id": "tenant-1",
            "approved": true,
        }))
        .send()
        .await
        .expect("complete");
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let final_redirect = body["redirect_uri"].as_str().unwrap();
    assert!(final_redirect.starts_with(redirect));
    assert_eq!(query_param(final_redirect, "state").as_deref(), Some("xyz"));
    query_param(final_redirect, "code").expect("code")
}

async fn exchange(srv: &TestServer, code: &str, verifier: &PkceVerifier) -> reqwest::Response {
    srv.http
        .post(srv.url("/token"))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT),
            ("code_verifier", verifier.as_str()),
            ("client_id", "cli_public"),
        ])
        .send()
        .await
        .expect("token")
}

async fn refresh(srv: &TestServer, token: &str, scope: Option<&str>) -> reqwest::Response {
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", token),
        ("client_id", "cli_public"),
    ];
    if let Some(scope) = scope {
        form.push(("scope", scope));
    }
    srv.http
        .post(srv.url("/token"))
        .form(&form)
        .send()
        .await
        .expect("refresh")
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn authorization_code_flow_issues_tokens() {
    let srv = start().await;
    let verifier = PkceVerifier::generate();
    let code = authorize(&srv, "cli_public", REDIRECT, &verifier).await;

    let res = exchange(&srv, &code, &verifier).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(res.headers()[header::PRAGMA], "no-cache");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
    assert_eq!(body["scope"], SCOPE);
    assert!(body["refresh_token"].as_str().is_some());

    let verifier_issuer = AccessTokenIssuer::new(
        SigningKeyPair::from_secret("any", SECRET.as_bytes()).unwrap(),
        ISSUER,
        Duration::from_secs(3600),
    );
    let claims = verifier_issuer
        .verify(body["access_token"].as_str().unwrap())
        .expect("valid access token");
    assert_eq!(claims.sub, "user-1");
    assert_eq!(claims.org_id, "tenant-1");
    assert_eq!(claims.client_id, "cli_public");
    assert_eq!(claims.scope, SCOPE);
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn replayed_code_revokes_issued_refresh_tokens() {
    let srv = start().await;
    let verifier = PkceVerifier::generate();
    let code = authorize(&srv, "cli_public", REDIRECT, &verifier).await;

    let first: Value = exchange(&srv, &code, &verifier).await.json().await.unwrap();
    let refresh_token = first["refresh_token"].as_str().unwrap().to_string();
    assert_eq!(srv.refresh_tokens.active().await.len(), 1);

    let replay = exchange(&srv, &code, &verifier).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(replay).await, "invalid_grant");
    assert!(srv.refresh_tokens.active().await.is_empty());

    let res = refresh(&srv, &refresh_token, None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_grant");
}

#[tokio::test]
async fn wrong_verifier_is_rejected() {
    let srv = start().await;
    let verifier = PkceVerifier::generate();
    let code = authorize(&srv, "cli_public", REDIRECT, &verifier).await;

    let res = exchange(&srv, &code, &PkceVerifier::generate()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_grant");
}

#[tokio::test]
async fn refresh_rotates_and_narrows_scope() {
    let srv = start().await;
    let verifier = PkceVerifier::generate();
    let code = authorize(&srv, "cli_public", REDIRECT, &verifier).await;
    let issued: Value = exchange(&srv, &code, &verifier).await.json().await.unwrap();
    let original = issued["refresh_token"].as_str().unwrap().to_string();

    let wider = refresh(&srv, &original, Some("orders:read admin")).await;
    assert_eq!(wider.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(wider).await, "invalid_scope");

    let res = refresh(&srv, &original, Some("orders:read")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let rotated: Value = res.json().await.unwrap();
    assert_eq!(rotated["scope"], "orders:read");
    let successor = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(successor, original);

    let reused = refresh(&srv, &original, None).await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(reused).await, "invalid_grant");

    let again = refresh(&srv, &successor, None).await;
    assert_eq!(again.status(), StatusCode::OK);
    let body: Value = again.json().await.unwrap();
    assert_eq!(body["scope"], "orders:read");
    assert_eq!(srv.refresh_tokens.active().await.len(), 1);
}

#[tokio::test]
async fn confidential_client_authenticates_with_basic_header() {
    let srv = start().await;
    let redirect = "https://shop.example.com/callback";
    let verifier = PkceVerifier::generate();
    let code = authorize(&srv, "cli_confidential", redirect, &verifier).await;

    let body = json!({
        "grant_type": "authorization_code",
        "code": code,
        "redirect_uri": redirect,
        "code_verifier": verifier.as_str(),
    });

    let res = srv
        .http
        .post(srv.url("/token"))
        .basic_auth("cli_confidential", Some("wrong"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(error_code(res).await, "invalid_client");

    let res = srv
        .http
        .post(srv.url("/token"))
        .basic_auth("cli_confidential", Some("s3cret"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn authorize_rejections() {
    let srv = start().await;
    let challenge = PkceChallenge::from_verifier(&PkceVerifier::generate());

    // Unregistered redirect URIs are never redirected to.
    let res = srv
        .http
        .get(srv.url("/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", "cli_public"),
            ("redirect_uri", "https://evil.example.net/callback"),
            ("state", "xyz"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(!res.headers().contains_key(header::LOCATION));

    // PKCE is mandatory.
    let res = srv
        .http
        .get(srv.url("/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", "cli_public"),
            ("redirect_uri", REDIRECT),
            ("state", "xyz"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(res).await, "invalid_request");

    // Unknown client
    let res = srv
        .http
        .get(srv.url("/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", "nobody"),
            ("redirect_uri", REDIRECT),
            ("state", "xyz"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(error_code(res).await, "invalid_client");
}

#[tokio::test]
async fn denial_redirects_with_access_denied() {
    let srv = start().await;
    let challenge = PkceChallenge::from_verifier(&PkceVerifier::generate());
    let res = srv
        .http
        .get(srv.url("/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", "cli_public"),
            ("redirect_uri", REDIRECT),
            ("state", "xyz"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .send()
        .await
        .unwrap();
    let location = res.headers()[header::LOCATION].to_str().unwrap().to_string();
    let auth_code = query_param(&location, "auth_code").unwrap();

    let res = srv
        .http
        .post(srv.url("/authorize"))
        .bearer_auth(CALLBACK_SECRET)
        .json(&json!({ "auth_code": auth_code, "approved": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let redirect = body["redirect_uri"].as_str().unwrap();
    assert_eq!(query_param(redirect, "error").as_deref(), Some("access_denied"));
    assert_eq!(query_param(redirect, "state").as_deref(), Some("xyz"));
    assert!(query_param(redirect, "code").is_none());

    // The denial is final
    let res = srv
        .http
        .post(srv.url("/authorize"))
        .bearer_auth(CALLBACK_SECRET)
        .json(&json!({
            "auth_code": auth_code,
            "user_id": "user-1",
            "tenant_id": "tenant-1",
            "approved": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn completion_callback_requires_secret() {
    let srv = start().await;
    let challenge = PkceChallenge::from_verifier(&PkceVerifier::generate());
    let res = srv
        .http
        .get(srv.url("/authorize"))
        .query(&[
            ("response_type", "code"),
            ("client_id", "cli_public"),
            ("redirect_uri", REDIRECT),
            ("state", "xyz"),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .send()
        .await
        .unwrap();
    let location = res.headers()[header::LOCATION].to_str().unwrap().to_string();
    let auth_code = query_param(&location, "auth_code").unwrap();
    let approval = json!({
        "auth_code": auth_code,
        "user_id": "user-1",
        "tenant_id": "tenant-1",
        "approved": true,
    });

    let missing = srv
        .http
        .post(srv.url("/authorize"))
        .json(&approval)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "invalid_client");

    let wrong = srv
        .http
        .post(srv.url("/authorize"))
        .bearer_auth("not-the-secret")
        .json(&approval)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    // Rejected callbacks leave the code pending
    let res = srv
        .http
        .post(srv.url("/authorize"))
        .bearer_auth(CALLBACK_SECRET)
        .json(&approval)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(query_param(body["redirect_uri"].as_str().unwrap(), "code").is_some());
}

#[tokio::test]
async fn discovery_endpoints() {
    let srv = start().await;

    let health: Value = srv
        .http
        .get(srv.url("/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let metadata: Value = srv
        .http
        .get(srv.url("/.well-known/oauth-authorization-server"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metadata["issuer"], ISSUER);
    assert_eq!(metadata["code_challenge_methods_supported"], json!(["S256"]));

    // HS256 publishes no keys.
    let jwks: Value = srv
        .http
        .get(srv.url("/.well-known/jwks.json"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jwks["keys"], json!([]));

    let preflight = srv
        .http
        .request(reqwest::Method::OPTIONS, srv.url("/token"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
}
