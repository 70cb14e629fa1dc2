//! Connector tests: keyfile to authorized service, against mocked token and
//! reporting endpoints

use chrono::{Duration, Utc};
use gatable::auth::{forget_cached_token, TokenCache, TokenRecord, ANALYTICS_READONLY_SCOPE};
use gatable::{connect_with, Cell, CredentialProvider, QueryPayload, Settings, ViewId};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERVICE_ACCOUNT: &str = include_str!("fixtures/service_account.json");
const CLIENT_SECRETS: &str = include_str!("fixtures/client_secrets.json");
const CLIENT_ID: &str = "123456789-test.apps.googleusercontent.com";

/// Write a fixture keyfile with its token endpoint pointed at the mock server.
fn write_keyfile(dir: &Path, fixture: &str, token_uri: &str) -> PathBuf {
    let mut keyfile: Value = serde_json::from_str(fixture).unwrap();
    match keyfile.get_mut("installed") {
        Some(installed) => installed["token_uri"] = json!(token_uri),
        None => keyfile["token_uri"] = json!(token_uri),
    }

    let path = dir.join("keyfile.json");
    std::fs::write(&path, keyfile.to_string()).unwrap();
    path
}

fn settings(server: &MockServer, cache_dir: &Path) -> Settings {
    Settings {
        api_base_url: Some(format!("{}/data/ga", server.uri())),
        token_cache_dir: Some(cache_dir.to_path_buf()),
        interactive: Some(false),
        ..Default::default()
    }
}

fn token_response(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": ANALYTICS_READONLY_SCOPE
    })
}

async fn mount_report(server: &MockServer, access_token: &str) {
    Mock::given(method("GET"))
        .and(path("/data/ga"))
        .and(header("authorization", format!("Bearer {}", access_token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalResults": 1,
            "itemsPerPage": 1000,
            "columnHeaders": [
                {"name": "ga:date", "columnType": "DIMENSION", "dataType": "STRING"},
                {"name": "ga:sessions", "columnType": "METRIC", "dataType": "INTEGER"}
            ],
            "rows": [["20200601", "17"]]
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn sessions_by_date() -> QueryPayload {
    QueryPayload::builder("2020-06-01", "2020-06-01")
        .metric("ga:sessions")
        .dimension("ga:date")
        .build()
        .unwrap()
}

fn cached_record(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> TokenRecord {
    TokenRecord {
        client_id: CLIENT_ID.to_string(),
        token_type: "Bearer".to_string(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(String::from),
        expiry: Utc::now() + Duration::seconds(expires_in),
        scopes: vec![ANALYTICS_READONLY_SCOPE.to_string()],
        issued_at: Utc::now(),
    }
}

fn cache_key() -> String {
    format!("{}:{}", CLIENT_ID, ANALYTICS_READONLY_SCOPE)
}

#[tokio::test]
async fn test_service_account_connects_and_queries() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("ya29.service")))
        .expect(1)
        .mount(&server)
        .await;
    mount_report(&server, "ya29.service").await;

    let keyfile = write_keyfile(dir.path(), SERVICE_ACCOUNT, &format!("{}/token", server.uri()));
    let service = connect_with(&keyfile, &settings(&server, dir.path())).await.unwrap();
    assert_eq!(service.credentials().name(), "service_account");

    // Token is reused for the query, no second exchange
    let table = service
        .run_query(&ViewId::from(12345u64), &sessions_by_date())
        .await
        .unwrap();
    assert_eq!(table.row(0).unwrap().get("sessions"), Some(&Cell::Int(17)));
}

#[tokio::test]
async fn test_rejected_exchange_is_authentication_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let keyfile = write_keyfile(dir.path(), SERVICE_ACCOUNT, &format!("{}/token", server.uri()));
    let err = connect_with(&keyfile, &settings(&server, dir.path()))
        .await
        .err()
        .unwrap();

    assert!(err.is_authentication());
    assert!(err.to_string().contains("Invalid JWT Signature."));
}

#[tokio::test]
async fn test_malformed_keyfile_is_authentication_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let keyfile = dir.path().join("keyfile.json");
    std::fs::write(&keyfile, r#"{"type": "authorized_user"}"#).unwrap();

    let err = connect_with(&keyfile, &settings(&server, dir.path()))
        .await
        .err()
        .unwrap();
    assert!(err.is_authentication());

    std::fs::write(&keyfile, "not json").unwrap();
    let err = connect_with(&keyfile, &settings(&server, dir.path()))
        .await
        .err()
        .unwrap();
    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_installed_uses_valid_cached_token() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache = TokenCache::new(dir.path().join("tokens"));
    cache
        .save(&cache_key(), &cached_record("ya29.cached", Some("1//refresh"), 3600))
        .unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    mount_report(&server, "ya29.cached").await;

    let settings = settings(&server, &dir.path().join("tokens"));
    let keyfile = write_keyfile(dir.path(), CLIENT_SECRETS, &format!("{}/token", server.uri()));

    let service = connect_with(&keyfile, &settings).await.unwrap();
    assert_eq!(service.credentials().name(), "installed");

    let table = service
        .run_query(&ViewId::from(12345u64), &sessions_by_date())
        .await
        .unwrap();
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn test_installed_refreshes_expiring_token() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("tokens");
    let cache = TokenCache::new(&cache_dir);
    cache
        .save(&cache_key(), &cached_record("ya29.stale", Some("1//refresh"), 10))
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_response("ya29.fresh")))
        .expect(1)
        .mount(&server)
        .await;

    let keyfile = write_keyfile(dir.path(), CLIENT_SECRETS, &format!("{}/token", server.uri()));
    let service = connect_with(&keyfile, &settings(&server, &cache_dir)).await.unwrap();
    assert_eq!(service.credentials().access_token().await.unwrap(), "ya29.fresh");

    // Refreshed token is written back, keeping the cached refresh token
    let stored = cache.load(&cache_key()).unwrap();
    assert_eq!(stored.access_token, "ya29.fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
}

#[tokio::test]
async fn test_installed_without_cache_needs_consent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let keyfile = write_keyfile(dir.path(), CLIENT_SECRETS, &format!("{}/token", server.uri()));
    let err = connect_with(&keyfile, &settings(&server, &dir.path().join("tokens")))
        .await
        .err()
        .unwrap();

    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_installed_failed_refresh_without_consent_is_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("tokens");
    TokenCache::new(&cache_dir)
        .save(&cache_key(), &cached_record("ya29.stale", Some("1//revoked"), -60))
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let keyfile = write_keyfile(dir.path(), CLIENT_SECRETS, &format!("{}/token", server.uri()));
    let err = connect_with(&keyfile, &settings(&server, &cache_dir))
        .await
        .err()
        .unwrap();

    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_forget_removes_installed_token() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("tokens");
    let cache = TokenCache::new(&cache_dir);
    cache
        .save(&cache_key(), &cached_record("ya29.cached", Some("1//refresh"), 3600))
        .unwrap();

    let keyfile = write_keyfile(dir.path(), CLIENT_SECRETS, &format!("{}/token", server.uri()));
    let removed = forget_cached_token(&keyfile, &settings(&server, &cache_dir)).unwrap();

    assert_eq!(removed, Some(cache.path_for(&cache_key())));
    assert!(cache.load(&cache_key()).is_none());

    // Without a cached token a non-interactive connect now fails
    let err = connect_with(&keyfile, &settings(&server, &cache_dir))
        .await
        .err()
        .unwrap();
    assert!(err.is_authentication());
}
