use chrono::{Duration, Local};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use robotaxi_history::app::App;
use robotaxi_history::config::Config;
use taxy::{Credentials, Endpoints, OAuth, PendingAuth, Token, TokenStore};

fn config_against(server: &MockServer, dir: &std::path::Path) -> Config {
    Config {
        credentials: Credentials::new("ownerapi"),
        oauth: OAuth::new(
            server.uri(),
            "https://auth.tesla.com/void/callback",
            &["openid", "offline_access"],
        ),
        endpoints: Endpoints {
            candidates: vec![format!("{}/mobile-app/ride/history", server.uri())],
        },
        token_path: dir.join("tokens.json"),
        pending_path: dir.join("pending.json"),
        out_dir: dir.join("out"),
        open_browser: false,
    }
}

fn stored_token(dir: &std::path::Path) -> TokenStore {
    let store = TokenStore::new(dir.join("tokens.json"));
    store
        .save(&Token {
            access_token: "old-access".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("old-refresh".to_string()),
            expires: Local::now() - Duration::hours(1),
        })
        .unwrap();
    store
}

fn output_files(dir: &std::path::Path) -> Vec<String> {
    let mut names = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn a_successful_refresh_fetches_once_and_writes_a_matching_file_pair() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    stored_token(dir.path());

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "refresh_token": "fresh-refresh",
            "token_type": "bearer",
            "expires_in": 28800
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mobile-app/ride/history"))
        .and(header("Authorization", "Bearer fresh-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": {"rides": [{"rideId": "ride-1", "totalDue": 12.0}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = App::new(config_against(&server, dir.path()));
    app.run(None).await.unwrap();

    let names = output_files(&dir.path().join("out"));
    assert_eq!(names.len(), 2);
    // Same timestamp stem on both files.
    assert_eq!(
        names[0].trim_end_matches(".csv"),
        names[1].trim_end_matches(".json")
    );

    // The refreshed pair replaced the stored one.
    let persisted = TokenStore::new(dir.path().join("tokens.json")).load().unwrap();
    assert_eq!(persisted.access_token, "fresh-access");
}

#[tokio::test]
async fn a_failed_refresh_exits_with_an_error_and_writes_nothing() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    stored_token(dir.path());

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mobile-app/ride/history"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = App::new(config_against(&server, dir.path()));
    let result = app.run(None).await;

    assert!(result.is_err());
    assert!(output_files(&dir.path().join("out")).is_empty());
}

#[tokio::test]
async fn the_first_run_only_prepares_the_sign_in() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();

    Mock::given(method("GET"))
        .and(path("/mobile-app/ride/history"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = App::new(config_against(&server, dir.path()));
    app.run(None).await.unwrap();

    // The verifier is parked for the follow-up invocation, nothing else.
    assert!(PendingAuth::load(&dir.path().join("pending.json")).is_some());
    assert!(output_files(&dir.path().join("out")).is_empty());
}

#[tokio::test]
async fn a_mid_run_token_rejection_is_retried_exactly_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("out")).unwrap();
    stored_token(dir.path());

    // First refresh hands out a token the history endpoint no longer
    // accepts; the retry's refresh hands out a good one.
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "stale-access",
            "token_type": "bearer",
            "expires_in": 28800
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access",
            "token_type": "bearer",
            "expires_in": 28800
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/mobile-app/ride/history"))
        .and(header("Authorization", "Bearer stale-access"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mobile-app/ride/history"))
        .and(header("Authorization", "Bearer fresh-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": {"rides": [{"rideId": "ride-1"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = App::new(config_against(&server, dir.path()));
    app.run(None).await.unwrap();

    assert_eq!(output_files(&dir.path().join("out")).len(), 2);
}
