use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use profile_gateway::config::RateLimitConfiguration;
use async_trait::async_trait;
use profile_gateway::{
    build_avatar_locator, router, Account, AccountStore, AppState, AvatarConfig,
    BasicAuthenticator, InMemoryAccountStore, Profile, ProfileError, ProfileService, RateLimiters,
    RateLimitsConfig,
};
use reqwest::StatusCode;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const VALID_NUMBER: &str = "+14150000000";
const VALID_PASSWORD: &str = "foo";
const VALID_NUMBER_TWO: &str = "+14151111111";
const VALID_PASSWORD_TWO: &str = "baz";
const DISABLED_NUMBER: &str = "+14153333333";
const DISABLED_PASSWORD: &str = "firefox";

fn auth_header(number: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{number}:{password}")))
}

fn accounts_json() -> String {
    serde_json::json!([
        {
            "number": VALID_NUMBER,
            "identityKey": "caller-key",
            "name": "caller",
            "enabled": true,
            "passwordSha256": BasicAuthenticator::digest_password(VALID_PASSWORD)
        },
        {
            "number": VALID_NUMBER_TWO,
            "identityKey": "bar",
            "name": "baz",
            "avatar": "profiles/bang",
            "avatarDigest": "buh",
            "enabled": true,
            "passwordSha256": BasicAuthenticator::digest_password(VALID_PASSWORD_TWO)
        },
        {
            "number": DISABLED_NUMBER,
            "identityKey": "disabled-key",
            "name": "gone",
            "enabled": false,
            "passwordSha256": BasicAuthenticator::digest_password(DISABLED_PASSWORD)
        }
    ])
    .to_string()
}

/// Target lookups that always fail; caller authentication still succeeds
struct FailingTargetStore;

#[async_trait]
impl AccountStore for FailingTargetStore {
    async fn get(&self, _identifier: &str) -> Result<Option<Account>, ProfileError> {
        Err(ProfileError::StorageFailure("backend offline".to_string()))
    }
}

/// Serve the router on an ephemeral port and return its address
async fn spawn_server(bucket_size: u32) -> SocketAddr {
    spawn_server_with_target_store(bucket_size, None).await
}

/// Like `spawn_server`, optionally resolving targets from a different store
async fn spawn_server_with_target_store(
    bucket_size: u32,
    target_store: Option<Arc<dyn AccountStore>>,
) -> SocketAddr {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(accounts_json().as_bytes()).unwrap();

    let records = InMemoryAccountStore::load_records(file.path()).unwrap();
    let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccountStore::from_records(&records));
    let authenticator = Arc::new(BasicAuthenticator::from_records(
        &records,
        accounts.clone(),
        Duration::from_secs(1),
    ));

    let rate_limiters = RateLimiters::from_config(&RateLimitsConfig {
        profile: RateLimitConfiguration {
            bucket_size,
            leak_rate_per_minute: 1,
        },
    });
    let profiles = Arc::new(ProfileService::new(
        rate_limiters,
        target_store.unwrap_or(accounts),
        build_avatar_locator(&AvatarConfig::default()),
        Duration::from_secs(1),
    ));

    let app = router(AppState {
        authenticator,
        profiles,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn profile_url(addr: SocketAddr, identifier: &str) -> String {
    format!("http://{addr}/v1/profile/{identifier}")
}

#[tokio::test]
async fn test_profile_get() {
    let addr = spawn_server(100).await;
    let client = reqwest::Client::new();

    let response = client
        .get(profile_url(addr, VALID_NUMBER_TWO))
        .header("Authorization", auth_header(VALID_NUMBER, VALID_PASSWORD))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let profile: Profile = response.json().await.unwrap();
    assert_eq!(profile.identity_key, "bar");
    assert_eq!(profile.name, "baz");
    assert_eq!(profile.avatar.as_deref(), Some("profiles/bang"));
}

#[tokio::test]
async fn test_profile_get_unauthorized() {
    let addr = spawn_server(100).await;

    let response = reqwest::Client::new()
        .get(profile_url(addr, VALID_NUMBER_TWO))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_get_disabled_caller() {
    let addr = spawn_server(100).await;

    let response = reqwest::Client::new()
        .get(profile_url(addr, VALID_NUMBER_TWO))
        .header(
            "Authorization",
            auth_header(DISABLED_NUMBER, DISABLED_PASSWORD),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unavailable_targets_look_like_bad_credentials() {
    let addr = spawn_server(100).await;
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for (target, header) in [
        (DISABLED_NUMBER, Some(auth_header(VALID_NUMBER, VALID_PASSWORD))),
        ("+19999999999", Some(auth_header(VALID_NUMBER, VALID_PASSWORD))),
        (VALID_NUMBER_TWO, Some(auth_header(VALID_NUMBER, "wrong"))),
        (VALID_NUMBER_TWO, None),
    ] {
        let mut request = client.get(profile_url(addr, target));
        if let Some(header) = header {
            request = request.header("Authorization", header);
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(response.text().await.unwrap());
    }

    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn test_rate_limit_returns_429_with_retry_after() {
    let addr = spawn_server(2).await;
    let client = reqwest::Client::new();
    let header = auth_header(VALID_NUMBER, VALID_PASSWORD);

    // Disabled targets still consume quota
    for target in [VALID_NUMBER_TWO, DISABLED_NUMBER] {
        client
            .get(profile_url(addr, target))
            .header("Authorization", &header)
            .send()
            .await
            .unwrap();
    }

    let response = client
        .get(profile_url(addr, VALID_NUMBER_TWO))
        .header("Authorization", &header)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Another caller has its own quota
    let response = client
        .get(profile_url(addr, VALID_NUMBER))
        .header(
            "Authorization",
            auth_header(VALID_NUMBER_TWO, VALID_PASSWORD_TWO),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unauthenticated_requests_do_not_consume_quota() {
    let addr = spawn_server(1).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let response = client
            .get(profile_url(addr, VALID_NUMBER_TWO))
            .header("Authorization", auth_header(VALID_NUMBER, "wrong"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = client
        .get(profile_url(addr, VALID_NUMBER_TWO))
        .header("Authorization", auth_header(VALID_NUMBER, VALID_PASSWORD))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_concurrent_profile_requests() {
    use futures::future::join_all;

    let addr = spawn_server(100).await;
    let client = reqwest::Client::new();

    let requests = (0..10).map(|_| {
        client
            .get(profile_url(addr, VALID_NUMBER_TWO))
            .header("Authorization", auth_header(VALID_NUMBER, VALID_PASSWORD))
            .send()
    });

    let responses = join_all(requests).await;
    for response in responses {
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_storage_failure_returns_500() {
    let addr = spawn_server_with_target_store(100, Some(Arc::new(FailingTargetStore))).await;

    let response = reqwest::Client::new()
        .get(profile_url(addr, VALID_NUMBER_TWO))
        .header("Authorization", auth_header(VALID_NUMBER, VALID_PASSWORD))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.text().await.unwrap();
    assert!(
        !body.contains("backend offline"),
        "internal detail leaked: {body}"
    );
}

#[tokio::test]
async fn test_health() {
    let addr = spawn_server(100).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "OK");
}
