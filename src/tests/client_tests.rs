use super::{create_test_client, create_test_client_with_logging, usd};
use crate::auth::AuthToken;
use crate::config::Config;
use crate::constants::{EXPENSE_COMMITTED, FRIEND_ADDED, SESSION_ENDED, SESSION_STARTED};
use crate::core::errors::BillioError;
use crate::core::models::expense::ExpenseDraft;
use crate::core::models::user::{Registration, UserProfile};
use crate::core::services::BillioClient;
use crate::core::split::SplitMethod;
use crate::infrastructure::api::in_memory::InMemoryApi;
use crate::infrastructure::cache::in_memory::InMemoryCache;
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use crate::infrastructure::session::SessionStore;
use crate::infrastructure::session::file::FileSessionStore;
use crate::infrastructure::session::in_memory::InMemorySessionStore;
use async_trait::async_trait;
use uuid::Uuid;

async fn seeded() -> (InMemoryApi, UserProfile, UserProfile, UserProfile) {
    let api = InMemoryApi::new();
    let alice = api.seed_user("alice", "secret").await;
    let bob = api.seed_user("bob", "hunter2").await;
    let carol = api.seed_user("carol", "pw").await;
    (api, alice, bob, carol)
}

#[tokio::test]
async fn test_login_starts_session() {
    let (api, alice, _, _) = seeded().await;
    let store = InMemorySessionStore::new();
    let logging = InMemoryLogging::new();
    let client = create_test_client_with_logging(api, store.clone(), logging.clone());

    let user = client.login("alice", "secret").await.unwrap();

    assert_eq!(user, alice);
    assert_eq!(client.current_user().await, Some(alice));
    assert!(store.load_token().await.unwrap().is_some());
    let logs = client.activity().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, SESSION_STARTED);
}

#[tokio::test]
async fn test_login_failures() {
    let (api, _, _, _) = seeded().await;
    let store = InMemorySessionStore::new();
    let client = create_test_client(api, store.clone());

    assert_eq!(
        client.login("alice", "wrong").await,
        Err(BillioError::ServerRejected("Invalid credentials".to_string()))
    );
    assert!(matches!(
        client.login("", "secret").await,
        Err(BillioError::InvalidInput(field, _)) if field == "username"
    ));
    assert!(matches!(
        client.login("alice", "").await,
        Err(BillioError::InvalidInput(field, _)) if field == "password"
    ));
    assert!(store.load_token().await.unwrap().is_none());
    assert_eq!(client.current_user().await, None);
}

#[tokio::test]
async fn test_register_starts_session() {
    let (api, _, _, _) = seeded().await;
    let client = create_test_client(api, InMemorySessionStore::new());
    let registration = Registration {
        username: "dave".to_string(),
        password: "pw".to_string(),
        email: "dave@example.org".to_string(),
        first_name: "Dave".to_string(),
        last_name: "Jones".to_string(),
    };

    let user = client.register(&registration).await.unwrap();
    assert_eq!(user.display_name(), "Dave Jones");
    assert_eq!(user.email, "dave@example.org");

    let again = client.register(&registration).await;
    assert_eq!(again, Err(BillioError::ServerRejected("Username already taken".to_string())));
}

#[tokio::test]
async fn test_restore_session() {
    let (api, alice, _, _) = seeded().await;
    let token = api.issue_token(&alice).await.unwrap();
    let client = create_test_client(api, InMemorySessionStore::with_token(token));

    assert_eq!(client.restore_session().await.unwrap(), Some(alice.clone()));
    assert_eq!(client.current_user().await, Some(alice));
}

#[tokio::test]
async fn test_restore_session_discards_expired_token() {
    let (api, _, _, _) = seeded().await;
    let store = InMemorySessionStore::with_token(AuthToken::new("stale").unwrap());
    let client = create_test_client(api, store.clone());

    assert_eq!(client.restore_session().await.unwrap(), None);
    assert!(store.load_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_session_keeps_token_when_offline() {
    let (api, alice, _, _) = seeded().await;
    let token = api.issue_token(&alice).await.unwrap();
    api.set_offline(true).await;
    let store = InMemorySessionStore::with_token(token.clone());
    let client = create_test_client(api, store.clone());

    assert!(matches!(
        client.restore_session().await,
        Err(BillioError::NetworkTransient(_))
    ));
    assert_eq!(store.load_token().await.unwrap(), Some(token));
}

#[tokio::test]
async fn test_auth_failure_ends_session() {
    let (api, _, _, _) = seeded().await;
    let store = InMemorySessionStore::new();
    let client = create_test_client(api.clone(), store.clone());
    client.login("alice", "secret").await.unwrap();
    let token = store.load_token().await.unwrap().unwrap();

    api.revoke_token(&token).await;

    assert_eq!(client.list_groups().await, Err(BillioError::AuthExpired));
    assert_eq!(client.current_user().await, None);
    assert!(store.load_token().await.unwrap().is_none());
    assert_eq!(client.list_groups().await, Err(BillioError::NotAuthenticated));
    let actions: Vec<String> = client.activity().await.unwrap().into_iter().map(|l| l.action).collect();
    assert_eq!(actions, vec![SESSION_STARTED, SESSION_ENDED]);
}

/// Keeps the token but cannot delete it.
#[derive(Clone, Default)]
struct ReadOnlySessionStore {
    inner: InMemorySessionStore,
}

#[async_trait]
impl SessionStore for ReadOnlySessionStore {
    async fn load_token(&self) -> Result<Option<AuthToken>, BillioError> {
        self.inner.load_token().await
    }

    async fn save_token(&self, token: &AuthToken) -> Result<(), BillioError> {
        self.inner.save_token(token).await
    }

    async fn clear(&self) -> Result<(), BillioError> {
        Err(BillioError::SessionStoreError("session file is read-only".to_string()))
    }
}

#[tokio::test]
async fn test_auth_failure_is_reported_when_store_cannot_clear() {
    let (api, alice, bob, _) = seeded().await;
    let group = api.seed_group(&alice, "Trip", &[&bob]).await;
    let store = ReadOnlySessionStore::default();
    let logging = InMemoryLogging::new();
    let client = BillioClient::new(
        api.clone(),
        store.clone(),
        logging.clone(),
        InMemoryCache::new(),
        &Config::default(),
    );
    client.login("alice", "secret").await.unwrap();
    client.refresh_group(group.id).await.unwrap();
    let token = store.load_token().await.unwrap().unwrap();

    api.revoke_token(&token).await;

    let refreshed = client.refresh_group(group.id).await;
    assert!(matches!(refreshed, Err(BillioError::AuthExpired)));
    assert_eq!(client.current_user().await, None);
    assert!(client.ledger().group.is_none());
    let actions: Vec<String> = client.activity().await.unwrap().into_iter().map(|l| l.action).collect();
    assert_eq!(actions.last().map(String::as_str), Some(SESSION_ENDED));
}

#[tokio::test]
async fn test_logout_is_local_when_backend_is_down() {
    let (api, _, _, _) = seeded().await;
    let store = InMemorySessionStore::new();
    let client = create_test_client(api.clone(), store.clone());
    client.login("alice", "secret").await.unwrap();

    api.set_offline(true).await;
    client.logout().await.unwrap();

    assert_eq!(client.current_user().await, None);
    assert!(store.load_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_calls_require_session() {
    let (api, _, _, _) = seeded().await;
    let client = create_test_client(api, InMemorySessionStore::new());

    assert_eq!(client.list_groups().await, Err(BillioError::NotAuthenticated));
    assert!(matches!(client.dashboard().await, Err(BillioError::NotAuthenticated)));
}

#[tokio::test]
async fn test_group_membership() {
    let (api, alice, bob, carol) = seeded().await;
    let client = create_test_client(api.clone(), InMemorySessionStore::new());
    client.login("alice", "secret").await.unwrap();

    let group = client.create_group("Trip", "Lisbon").await.unwrap();
    assert_eq!(group.members(), &[alice.to_participant()]);

    client.add_member(group.id, "bob").await.unwrap();
    client.add_member(group.id, "bob").await.unwrap();
    assert_eq!(
        client.add_member(group.id, "nobody").await,
        Err(BillioError::ServerRejected("User not found".to_string()))
    );
    let details = client.group_details(group.id).await.unwrap();
    assert_eq!(details.members().len(), 2);
    assert!(details.is_member(bob.id));

    let carol_client = create_test_client(api, InMemorySessionStore::new());
    carol_client.login("carol", "pw").await.unwrap();
    let joined = carol_client.join_group(group.id).await.unwrap();
    assert!(joined.is_member(carol.id));
    assert_eq!(carol_client.list_groups().await.unwrap().len(), 1);

    assert!(matches!(
        client.create_group(" ", "").await,
        Err(BillioError::InvalidInput(field, _)) if field == "name"
    ));
    assert!(matches!(
        client.group_details(crate::core::models::group::GroupId(999)).await,
        Err(BillioError::GroupNotFound(_))
    ));
}

#[tokio::test]
async fn test_refresh_serves_stale_snapshot_when_offline() {
    let (api, alice, bob, carol) = seeded().await;
    let group = api.seed_group(&alice, "Trip", &[&bob, &carol]).await;
    let logging = InMemoryLogging::new();
    let client = create_test_client_with_logging(api.clone(), InMemorySessionStore::new(), logging);
    client.login("alice", "secret").await.unwrap();

    let draft = ExpenseDraft::paid_by(
        group.id,
        "Dinner",
        usd(900),
        alice.to_participant(),
        group.members().to_vec(),
        SplitMethod::Equal,
    );
    client.submit_expense(draft).await.unwrap();

    let fresh = client.refresh_group(group.id).await.unwrap();
    assert!(!fresh.stale);
    assert_eq!(fresh.expenses.len(), 1);
    assert_eq!(fresh.balances.len(), 2);
    assert_eq!(fresh.balances_for(bob.id).len(), 1);

    api.set_offline(true).await;
    let cached = client.refresh_group(group.id).await.unwrap();
    assert!(cached.stale);
    assert_eq!(cached.balances, fresh.balances);
    assert_eq!(client.ledger().committed_expenses.len(), 1);
    assert!(client.current_user().await.is_some());

    let actions: Vec<String> = client.activity().await.unwrap().into_iter().map(|l| l.action).collect();
    assert!(actions.iter().any(|a| a == EXPENSE_COMMITTED));
}

#[tokio::test]
async fn test_refresh_without_cache_fails() {
    let (api, alice, bob, _) = seeded().await;
    let group = api.seed_group(&alice, "Trip", &[&bob]).await;
    let client = create_test_client(api.clone(), InMemorySessionStore::new());
    client.login("alice", "secret").await.unwrap();

    api.set_offline(true).await;
    assert!(matches!(
        client.refresh_group(group.id).await,
        Err(BillioError::NetworkTransient(_))
    ));
}

#[tokio::test]
async fn test_rejected_submission_leaves_ledger_clean() {
    let (api, alice, bob, _) = seeded().await;
    let group = api.seed_group(&alice, "Trip", &[&bob]).await;
    let client = create_test_client(api.clone(), InMemorySessionStore::new());
    client.login("alice", "secret").await.unwrap();
    api.fail_next_writes([BillioError::ServerRejected("Group is archived".to_string())])
        .await;

    let draft = ExpenseDraft::paid_by(
        group.id,
        "Dinner",
        usd(500),
        alice.to_participant(),
        group.members().to_vec(),
        SplitMethod::Equal,
    );
    let result = client.submit_expense(draft).await;

    assert_eq!(result, Err(BillioError::ServerRejected("Group is archived".to_string())));
    let ledger = client.ledger();
    assert_eq!(ledger.in_flight().count(), 0);
    assert!(ledger.displayed().unwrap().is_empty());
    assert!(api.expenses_of(group.id).await.is_empty());
}

#[tokio::test]
async fn test_friend_requests() {
    let (api, alice, bob, _) = seeded().await;
    let alice_client = create_test_client(api.clone(), InMemorySessionStore::new());
    let bob_client = create_test_client(api.clone(), InMemorySessionStore::new());
    alice_client.login("alice", "secret").await.unwrap();
    bob_client.login("bob", "hunter2").await.unwrap();

    alice_client.add_friend("bob").await.unwrap();
    assert_eq!(
        alice_client.add_friend("alice").await,
        Err(BillioError::ServerRejected("You cannot add yourself".to_string()))
    );

    let requests = bob_client.list_friend_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].sender, alice);
    bob_client.accept_friend_request(requests[0].id).await.unwrap();

    assert_eq!(bob_client.list_friends().await.unwrap(), vec![alice]);
    assert_eq!(alice_client.list_friends().await.unwrap(), vec![bob]);
    assert!(bob_client.list_friend_requests().await.unwrap().is_empty());
    assert_eq!(
        alice_client.add_friend("bob").await,
        Err(BillioError::ServerRejected("Already friends".to_string()))
    );

    let actions: Vec<String> = alice_client.activity().await.unwrap().into_iter().map(|l| l.action).collect();
    assert_eq!(actions, vec![SESSION_STARTED, FRIEND_ADDED]);
}

#[tokio::test]
async fn test_reject_friend_request() {
    let (api, _, bob, carol) = seeded().await;
    let request = api.send_friend_request(&carol, &bob).await;
    let bob_client = create_test_client(api, InMemorySessionStore::new());
    bob_client.login("bob", "hunter2").await.unwrap();

    bob_client.reject_friend_request(request.id).await.unwrap();

    assert!(bob_client.list_friends().await.unwrap().is_empty());
    assert_eq!(
        bob_client.accept_friend_request(request.id).await,
        Err(BillioError::ServerRejected("Friend request not found".to_string()))
    );
    let dashboard = bob_client.dashboard().await.unwrap();
    assert_eq!(dashboard.user, bob);
    assert!(dashboard.friend_requests.is_empty());
    assert!(dashboard.groups.is_empty());
}

#[tokio::test]
async fn test_file_session_store_round_trip() {
    let path = std::env::temp_dir().join(format!("billio-session-{}.json", Uuid::new_v4()));
    let store = FileSessionStore::new(&path);
    let token = AuthToken::new("abc123").unwrap();

    assert_eq!(store.load_token().await.unwrap(), None);
    store.save_token(&token).await.unwrap();
    assert_eq!(store.load_token().await.unwrap(), Some(token));

    store.clear().await.unwrap();
    assert_eq!(store.load_token().await.unwrap(), None);
    store.clear().await.unwrap();

    tokio::fs::write(&path, b"not json").await.unwrap();
    assert_eq!(store.load_token().await.unwrap(), None);
    store.clear().await.unwrap();
}
