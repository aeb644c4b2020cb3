//! End-to-end tests for the OAuth endpoints via axum's Router.

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use chrono::{TimeDelta, Utc};
use tower::ServiceExt;

use pkce_auth_server::config::Config;
use pkce_auth_server::server::oauth::{PkcePair, TokenIssuer};
use pkce_auth_server::server::transport::{create_router, default_api};

const ISSUER: &str = "https://auth.example.com";
const CLIENT_ID: &str = "mcp-sample-client";
const REDIRECT_URI: &str = "https://client.example.com/cb";

fn build_test_router() -> axum::Router {
    create_router(Config::for_testing(ISSUER).oauth, default_api())
}

fn authorize_uri(pairs: &[(&str, &str)]) -> String {
    format!("/oauth/authorize?{}", serde_urlencoded::to_string(pairs).unwrap())
}

fn valid_authorize_uri(pkce: &PkcePair, state: &str) -> String {
    authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("scope", "openid"),
        ("state", state),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ])
}

async fn get(app: &axum::Router, uri: &str) -> Response {
    app.clone().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap()
}

async fn post_token(app: &axum::Router, params: &[(&str, &str)]) -> Response {
    app.clone()
        .oneshot(
            Request::post("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(serde_urlencoded::to_string(params).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn location_pairs(response: &Response) -> HashMap<String, String> {
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    let url = url::Url::parse(location).unwrap();
    url.query_pairs().into_owned().collect()
}

/// Run authorize and return the issued code.
async fn obtain_code(app: &axum::Router, pkce: &PkcePair) -> String {
    let response = get(app, &valid_authorize_uri(pkce, "xyz")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    location_pairs(&response).remove("code").unwrap()
}

fn exchange_params<'a>(code: &'a str, verifier: &'a str) -> [(&'static str, &'a str); 5] {
    [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", REDIRECT_URI),
        ("client_id", CLIENT_ID),
        ("code_verifier", verifier),
    ]
}

#[tokio::test]
async fn test_health() {
    let response = get(&build_test_router(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_authorization_server_metadata() {
    let response = get(&build_test_router(), "/.well-known/oauth-authorization-server").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["issuer"], ISSUER);
    assert_eq!(json["authorization_endpoint"], "https://auth.example.com/oauth/authorize");
    assert_eq!(json["token_endpoint"], "https://auth.example.com/oauth/token");
    assert_eq!(json["code_challenge_methods_supported"], serde_json::json!(["S256"]));
    assert_eq!(json["grant_types_supported"], serde_json::json!(["authorization_code"]));
}

#[tokio::test]
async fn test_protected_resource_metadata() {
    let response = get(&build_test_router(), "/.well-known/oauth-protected-resource").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["resource"], ISSUER);
    assert_eq!(json["authorization_servers"][0], ISSUER);
}

#[tokio::test]
async fn test_authorize_redirects_with_code_and_state() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();

    let response = get(&app, &valid_authorize_uri(&pkce, "xyz123")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");

    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with(REDIRECT_URI));

    let pairs = location_pairs(&response);
    assert_eq!(pairs["state"], "xyz123");
    assert!(!pairs["code"].is_empty());
}

#[tokio::test]
async fn test_authorize_without_state_omits_it() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(!location_pairs(&response).contains_key("state"));
}

#[tokio::test]
async fn test_authorize_rejects_plain_method() {
    let app = build_test_router();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge", "abc"),
        ("code_challenge_method", "plain"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_rejects_absent_method() {
    let app = build_test_router();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge", "abc"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_rejects_missing_challenge() {
    let app = build_test_router();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge_method", "S256"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "invalid_request");
    assert_eq!(json["error_description"], "Missing code_challenge");
}

#[tokio::test]
async fn test_authorize_rejects_unknown_client() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", "someone-else"),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_rejects_response_type_token() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let uri = authorize_uri(&[
        ("response_type", "token"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "unsupported_response_type");
}

#[tokio::test]
async fn test_authorize_rejects_relative_redirect_uri() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", "/callback"),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_full_code_exchange() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let code = obtain_code(&app, &pkce).await;

    let response = post_token(&app, &exchange_params(&code, &pkce.verifier)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
    assert_eq!(response.headers().get(header::PRAGMA).unwrap(), "no-cache");

    let json = json_body(response).await;
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 3600);
    assert_eq!(json["scope"], "openid");
    let access_token = json["access_token"].as_str().unwrap().to_owned();

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let me = json_body(response).await;
    assert_eq!(me["sub"], "demo-user");
    assert_eq!(me["client_id"], CLIENT_ID);
    assert_eq!(me["scope"], "openid");
}

#[tokio::test]
async fn test_code_replay_rejected() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let code = obtain_code(&app, &pkce).await;

    let first = post_token(&app, &exchange_params(&code, &pkce.verifier)).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_token(&app, &exchange_params(&code, &pkce.verifier)).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let json = json_body(second).await;
    assert_eq!(json["error"], "invalid_grant");
    assert!(json.get("error_description").is_none());
}

#[tokio::test]
async fn test_wrong_verifier_burns_code() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let code = obtain_code(&app, &pkce).await;

    let wrong = PkcePair::generate().unwrap();
    let response = post_token(&app, &exchange_params(&code, &wrong.verifier)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");

    // The correct verifier no longer helps
    let response = post_token(&app, &exchange_params(&code, &pkce.verifier)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_redirect_uri_mismatch_rejected() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let code = obtain_code(&app, &pkce).await;

    let response = post_token(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "https://client.example.com/other"),
            ("client_id", CLIENT_ID),
            ("code_verifier", &pkce.verifier),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let app = build_test_router();
    let response = post_token(&app, &[("grant_type", "password"), ("code", "x")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_token_missing_verifier() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let code = obtain_code(&app, &pkce).await;

    let response = post_token(
        &app,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT_URI),
            ("client_id", CLIENT_ID),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = build_test_router();

    let response = get(&app, "/api/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with("Bearer"));
    assert!(challenge.contains("https://auth.example.com/.well-known/oauth-protected-resource"));
}

#[tokio::test]
async fn test_protected_route_rejects_invalid_token() {
    let app = build_test_router();

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/me")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "invalid_token");
}

async fn get_with_authorization(app: &axum::Router, value: &str) -> Response {
    app.clone()
        .oneshot(
            Request::get("/api/me")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_protected_route_rejects_malformed_authorization() {
    let app = build_test_router();

    for value in ["Basic dXNlcjpwYXNz", "Bearer", "Token abc"] {
        let response = get_with_authorization(&app, value).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "header: {value}");

        let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
        assert!(challenge.contains("oauth-protected-resource"), "header: {value}");
        assert_eq!(json_body(response).await["error"], "invalid_token", "header: {value}");
    }
}

#[tokio::test]
async fn test_token_without_content_type_is_invalid_request() {
    let app = build_test_router();
    let body = serde_urlencoded::to_string([("grant_type", "authorization_code"), ("code", "x")]).unwrap();

    let response = app
        .clone()
        .oneshot(Request::post("/oauth/token").body(Body::from(body)).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "invalid_request");
    assert!(json["error_description"].is_string());
}

#[tokio::test]
async fn test_token_duplicate_parameter_is_invalid_request() {
    let app = build_test_router();

    let response = app
        .clone()
        .oneshot(
            Request::post("/oauth/token")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("grant_type=authorization_code&code=a&code=b"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_duplicate_parameter_is_invalid_request() {
    let app = build_test_router();
    let pkce = PkcePair::generate().unwrap();
    let uri = authorize_uri(&[
        ("response_type", "code"),
        ("response_type", "token"),
        ("client_id", CLIENT_ID),
        ("redirect_uri", REDIRECT_URI),
        ("code_challenge", &pkce.challenge),
        ("code_challenge_method", "S256"),
    ]);

    let response = get(&app, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_protected_route_rejects_expired_token() {
    let config = Config::for_testing(ISSUER).oauth;
    let issued = TokenIssuer::new(&config)
        .issue_at("demo-user", CLIENT_ID, "openid", Utc::now() - TimeDelta::hours(2))
        .unwrap();
    let app = create_router(config, default_api());

    let response = app
        .oneshot(
            Request::get("/api/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", issued.access_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
