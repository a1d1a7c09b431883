use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docperm_domain::{
    secret_name, InitStatus, IssuedPermission, PermissionMode, PermissionRequest, ResourcePath,
    TokenPolicy,
};
use docperm_storage::{
    MemoryResourceStore, MemorySecretCache, NewPermission, ResourceStore, SecretCache,
    StoreOperation,
};
use futures::future::join_all;

use super::{CacheLookup, PermissionBroker};
use crate::error::BrokerError;

type TestBroker = PermissionBroker<MemoryResourceStore, MemorySecretCache>;

fn broker() -> (TestBroker, Arc<MemoryResourceStore>, Arc<MemorySecretCache>) {
    let store = MemoryResourceStore::new_shared();
    let secrets = Arc::new(MemorySecretCache::new());
    let broker = PermissionBroker::new(Arc::clone(&store), Arc::clone(&secrets))
        .with_collection_throughput(Some(1000));
    (broker, store, secrets)
}

fn request(mode: PermissionMode) -> PermissionRequest {
    PermissionRequest::new("db1", "google|sid:abc_123", mode)
        .with_collection("items")
        .with_duration_secs(3600)
}

fn store_writes(store: &MemoryResourceStore) -> usize {
    [
        StoreOperation::CreateDatabase,
        StoreOperation::CreateCollection,
        StoreOperation::CreateUser,
        StoreOperation::CreatePermission,
        StoreOperation::DeletePermission,
        StoreOperation::ReadPermission,
    ]
    .into_iter()
    .map(|op| store.calls(op))
    .sum()
}

fn assert_close(actual: chrono::DateTime<Utc>, expected: chrono::DateTime<Utc>) {
    let drift = (actual - expected).num_seconds().abs();
    assert!(drift <= 5, "expected {expected}, got {actual}");
}

// ============================================================
// Section 1: Minting and cache reuse
// ============================================================

#[tokio::test]
async fn test_first_request_creates_resources_and_mints() {
    let (broker, store, secrets) = broker();

    let permission = broker
        .get_permission(&request(PermissionMode::Read))
        .await
        .unwrap();

    assert_eq!(permission.id, "db1-items-google|sid:abc_123-READ");
    assert_eq!(permission.resource_link, "dbs/db1/colls/items");
    assert_eq!(permission.permission_mode, PermissionMode::Read);
    assert!(!permission.token.is_empty());

    assert_eq!(
        store.read_collection("db1", "items").await.unwrap().throughput,
        Some(1000)
    );
    assert!(store.read_user("db1", "google|sid:abc_123").await.is_ok());
    // A freshly created user has no permission to read back.
    assert_eq!(store.calls(StoreOperation::ReadPermission), 0);
    assert_eq!(secrets.writes(), 1);
    assert_eq!(
        broker
            .tracker()
            .status(&ResourcePath::collection("db1", "items")),
        InitStatus::Initialized
    );
}

#[tokio::test]
async fn test_repeated_requests_are_served_from_cache() {
    let (broker, store, secrets) = broker();
    let request = request(PermissionMode::Read);

    let first = broker.get_permission(&request).await.unwrap();
    let writes_after_first = store_writes(&store);

    for _ in 0..5 {
        let again = broker.get_permission(&request).await.unwrap();
        assert_eq!(again, first);
    }

    assert_eq!(store_writes(&store), writes_after_first);
    assert_eq!(secrets.writes(), 1);
}

#[tokio::test]
async fn test_cached_all_serves_read_request() {
    let (broker, store, secrets) = broker();

    let all = broker
        .get_permission(&request(PermissionMode::All))
        .await
        .unwrap();
    let read = broker
        .get_permission(&request(PermissionMode::Read))
        .await
        .unwrap();

    assert_eq!(read, all);
    assert_eq!(read.permission_mode, PermissionMode::All);
    assert_eq!(store.calls(StoreOperation::CreatePermission), 1);
    assert_eq!(secrets.writes(), 1);
}

#[tokio::test]
async fn test_cached_read_does_not_serve_all_request() {
    let (broker, store, secrets) = broker();

    let read = broker
        .get_permission(&request(PermissionMode::Read))
        .await
        .unwrap();
    let all = broker
        .get_permission(&request(PermissionMode::All))
        .await
        .unwrap();

    assert_ne!(all.token, read.token);
    assert_eq!(all.permission_mode, PermissionMode::All);
    assert_eq!(all.id, "db1-items-google|sid:abc_123-ALL");

    // The READ permission was replaced, and the cache now holds ALL.
    let held = store.permissions_of("db1", "google|sid:abc_123");
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].permission_mode, PermissionMode::All);
    assert_eq!(store.calls(StoreOperation::DeletePermission), 1);
    assert_eq!(secrets.writes(), 2);

    let name = secret_name("db1", Some("items"), "google|sid:abc_123");
    let lookup = broker
        .lookup(&name, PermissionMode::All, Utc::now())
        .await
        .unwrap();
    assert_eq!(lookup, CacheLookup::Hit(all));
}

#[tokio::test]
async fn test_secret_name_is_normalized() {
    let (broker, _store, secrets) = broker();

    let permission = broker
        .get_permission(&request(PermissionMode::Read))
        .await
        .unwrap();

    let secret = secrets
        .get_secret("db1-items-google-sid-abc-123")
        .await
        .unwrap();
    assert_eq!(IssuedPermission::from_json(&secret.value).unwrap(), permission);
}

#[tokio::test]
async fn test_distinct_users_get_distinct_permissions() {
    let (broker, store, secrets) = broker();

    let alice = broker
        .get_permission(&PermissionRequest::new("db1", "alice", PermissionMode::Read))
        .await
        .unwrap();
    let bob = broker
        .get_permission(&PermissionRequest::new("db1", "bob", PermissionMode::Read))
        .await
        .unwrap();

    assert_ne!(alice.token, bob.token);
    assert_eq!(alice.resource_link, "dbs/db1");
    assert_eq!(store.calls(StoreOperation::CreateUser), 2);
    assert_eq!(secrets.writes(), 2);
}

#[tokio::test]
async fn test_explicit_resource_link_takes_precedence() {
    let (broker, _store, _secrets) = broker();
    let request = request(PermissionMode::Read).with_resource_link("dbs/db1/colls/items/docs/d1");

    let permission = broker.get_permission(&request).await.unwrap();

    assert_eq!(permission.resource_link, "dbs/db1/colls/items/docs/d1");
}

// ============================================================
// Section 2: Durations and renewal
// ============================================================

#[tokio::test]
async fn test_short_duration_is_raised_to_twice_the_threshold() {
    let (broker, _store, secrets) = broker();
    let request = request(PermissionMode::Read).with_duration_secs(60);

    let before = Utc::now();
    let permission = broker.get_permission(&request).await.unwrap();

    assert_close(permission.expires_at, before + chrono::Duration::seconds(1200));
    let secret = secrets
        .get_secret(&secret_name("db1", Some("items"), &request.user_id))
        .await
        .unwrap();
    assert_close(
        secret.expires_at.unwrap(),
        before + chrono::Duration::seconds(1200),
    );
}

#[tokio::test]
async fn test_long_duration_is_capped_at_max() {
    let (broker, _store, _secrets) = broker();
    let request = request(PermissionMode::Read).with_duration_secs(100_000);

    let before = Utc::now();
    let permission = broker.get_permission(&request).await.unwrap();

    assert_close(permission.expires_at, before + chrono::Duration::seconds(18_000));
}

#[tokio::test]
async fn test_stale_cache_entry_renews_existing_permission() {
    let (broker, store, secrets) = broker();
    let request = request(PermissionMode::Read);

    let first = broker.get_permission(&request).await.unwrap();

    // Re-cache the permission with five minutes left, under the threshold.
    let name = secret_name("db1", Some("items"), &request.user_id);
    secrets
        .set_secret(
            &name,
            first.to_json().unwrap(),
            Utc::now() + chrono::Duration::minutes(5),
        )
        .await
        .unwrap();

    let renewed = broker.get_permission(&request).await.unwrap();

    assert_eq!(renewed.id, first.id);
    assert_ne!(renewed.token, first.token);
    assert_eq!(store.calls(StoreOperation::ReadPermission), 1);
    assert_eq!(store.calls(StoreOperation::CreatePermission), 1);
    assert_eq!(
        broker
            .lookup(&name, PermissionMode::Read, Utc::now())
            .await
            .unwrap(),
        CacheLookup::Hit(renewed)
    );
}

#[tokio::test]
async fn test_undecodable_cache_entry_is_replaced() {
    let (broker, store, secrets) = broker();
    let request = request(PermissionMode::Read);
    let name = secret_name("db1", Some("items"), &request.user_id);
    secrets
        .set_secret(&name, "not json".to_string(), Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(
        broker
            .lookup(&name, PermissionMode::Read, Utc::now())
            .await
            .unwrap(),
        CacheLookup::Unreadable
    );
    broker.get_permission(&request).await.unwrap();

    assert_eq!(store.calls(StoreOperation::CreatePermission), 1);
    assert!(matches!(
        broker
            .lookup(&name, PermissionMode::Read, Utc::now())
            .await
            .unwrap(),
        CacheLookup::Hit(_)
    ));
}

// ============================================================
// Section 3: Conflict recovery
// ============================================================

#[tokio::test]
async fn test_conflict_replaces_opposite_mode_permission() {
    let (broker, store, secrets) = broker();
    store.create_database("db1").await.unwrap();
    store.create_collection("db1", "items", None).await.unwrap();
    let user = store.create_user("db1", "alice").await.unwrap();
    store
        .create_permission(
            &user,
            &NewPermission {
                id: "db1-items-alice-READ".to_string(),
                resource_link: "dbs/db1/colls/items".to_string(),
                mode: PermissionMode::Read,
            },
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let request = PermissionRequest::new("db1", "alice", PermissionMode::All).with_collection("items");
    let permission = broker.get_permission(&request).await.unwrap();

    assert_eq!(permission.id, "db1-items-alice-ALL");
    let held = store.permissions_of("db1", "alice");
    assert_eq!(held, vec![permission.clone()]);
    // Seeded READ, the conflicting ALL create and its retry.
    assert_eq!(store.calls(StoreOperation::CreatePermission), 3);
    assert_eq!(store.calls(StoreOperation::DeletePermission), 1);

    let secret = secrets
        .get_secret(&secret_name("db1", Some("items"), "alice"))
        .await
        .unwrap();
    let cached = IssuedPermission::from_json(&secret.value).unwrap();
    assert_eq!(cached.permission_mode, PermissionMode::All);
}

#[tokio::test]
async fn test_second_conflict_is_propagated() {
    let (broker, store, secrets) = broker();
    store.create_database("db1").await.unwrap();
    let user = store.create_user("db1", "alice").await.unwrap();
    // Same resource, but an id the broker would never derive.
    store
        .create_permission(
            &user,
            &NewPermission {
                id: "legacy".to_string(),
                resource_link: "dbs/db1".to_string(),
                mode: PermissionMode::Read,
            },
            Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let err = broker
        .get_permission(&PermissionRequest::new("db1", "alice", PermissionMode::All))
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::Conflict { ref permission_id } if permission_id == "db1-alice-ALL"));
    assert!(!err.is_client_error());
    assert_eq!(secrets.writes(), 0);
}

// ============================================================
// Section 4: Failures
// ============================================================

#[tokio::test]
async fn test_validation_errors_never_touch_stores() {
    let (broker, store, secrets) = broker();

    let requests = [
        PermissionRequest::new("", "alice", PermissionMode::Read),
        PermissionRequest::new("   ", "alice", PermissionMode::Read),
        PermissionRequest::new("db1", "", PermissionMode::Read),
        PermissionRequest::new("my.db", "alice", PermissionMode::Read),
    ];
    for request in &requests {
        let err = broker.get_permission(request).await.unwrap_err();
        assert!(err.is_client_error(), "{err}");
    }

    assert_eq!(store.calls(StoreOperation::ReadDatabase), 0);
    assert_eq!(store.calls(StoreOperation::ReadUser), 0);
    assert_eq!(secrets.reads(), 0);
}

#[tokio::test]
async fn test_initialization_failure_caches_nothing_and_can_retry() {
    let (broker, store, secrets) = broker();
    store.fail_next(StoreOperation::CreateCollection, 1);

    let err = broker
        .get_permission(&request(PermissionMode::Read))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Initialization { ref path, .. } if path == "db1/items"));
    assert_eq!(store.calls(StoreOperation::ReadUser), 0);
    assert_eq!(secrets.writes(), 0);

    broker
        .get_permission(&request(PermissionMode::Read))
        .await
        .unwrap();
    assert_eq!(secrets.writes(), 1);
}

#[tokio::test]
async fn test_store_failure_is_propagated_with_context() {
    let (broker, store, secrets) = broker();
    store.fail_next(StoreOperation::CreateUser, 1);

    let err = broker
        .get_permission(&PermissionRequest::new("db1", "alice", PermissionMode::Read))
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::Store { .. }));
    assert!(err.to_string().contains("db1/alice"));
    assert_eq!(secrets.writes(), 0);
}

#[tokio::test]
async fn test_duration_past_latest_date_fails_without_caching() {
    let (broker, store, secrets) = broker();
    let policy = TokenPolicy::new(
        Duration::from_secs(600),
        Duration::from_secs(10_000_000_000_000),
    );
    let broker = broker.with_policy(policy);

    let err = broker
        .get_permission(
            &PermissionRequest::new("db1", "alice", PermissionMode::Read)
                .with_duration_secs(i64::MAX),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BrokerError::Store { .. }));
    assert!(!err.is_client_error());
    assert!(store.permissions_of("db1", "alice").is_empty());
    assert_eq!(secrets.writes(), 0);
}

// ============================================================
// Section 5: Data tokens and concurrency
// ============================================================

#[tokio::test]
async fn test_data_token_shares_cache_with_permissions() {
    let (broker, store, secrets) = broker();

    let token = broker
        .get_data_token("db1", Some("items"), "alice")
        .await
        .unwrap();
    let permission = broker
        .get_permission(&PermissionRequest::new("db1", "alice", PermissionMode::Read).with_collection("items"))
        .await
        .unwrap();

    assert_eq!(permission.token, token);
    assert_eq!(permission.permission_mode, PermissionMode::All);
    assert_eq!(store.calls(StoreOperation::CreatePermission), 1);
    assert_eq!(secrets.writes(), 1);
}

#[tokio::test]
async fn test_data_token_uses_max_duration() {
    let (broker, store, _secrets) = broker();

    let before = Utc::now();
    broker.get_data_token("db1", None, "alice").await.unwrap();

    let held = store.permissions_of("db1", "alice");
    assert_eq!(held.len(), 1);
    assert_close(held[0].expires_at, before + chrono::Duration::seconds(18_000));
}

#[tokio::test]
async fn test_concurrent_users_share_one_collection_initialization() {
    let store = Arc::new(MemoryResourceStore::new().with_latency(Duration::from_millis(5)));
    let secrets = Arc::new(MemorySecretCache::new());
    let broker = PermissionBroker::new(Arc::clone(&store), Arc::clone(&secrets));

    let requests: Vec<_> = (0..10)
        .map(|i| PermissionRequest::new("db1", format!("user{i}"), PermissionMode::Read).with_collection("items"))
        .collect();
    let results = join_all(requests.iter().map(|r| broker.get_permission(r))).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(store.calls(StoreOperation::CreateDatabase), 1);
    assert_eq!(store.calls(StoreOperation::CreateCollection), 1);
    assert_eq!(store.calls(StoreOperation::CreateUser), 10);
    assert_eq!(secrets.writes(), 10);
}
