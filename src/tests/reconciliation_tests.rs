use super::usd;
use crate::auth::AuthToken;
use crate::constants::{
    EXPENSE_COMMITTED, EXPENSE_PENDING, EXPENSE_RETRYING, EXPENSE_ROLLED_BACK, MAX_SUBMISSION_HISTORY,
};
use crate::core::errors::BillioError;
use crate::core::models::expense::ExpenseDraft;
use crate::core::models::group::Group;
use crate::core::models::money::Currency;
use crate::core::models::user::UserProfile;
use crate::core::reconciliation::{ReconciliationClient, RetryPolicy, SubmissionState};
use crate::core::split::SplitMethod;
use crate::infrastructure::api::in_memory::InMemoryApi;
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    api: InMemoryApi,
    logging: InMemoryLogging,
    client: ReconciliationClient<InMemoryApi, InMemoryLogging>,
    token: AuthToken,
    alice: UserProfile,
    bob: UserProfile,
    group: Group,
}

async fn setup() -> Fixture {
    let api = InMemoryApi::new();
    let alice = api.seed_user("alice", "secret").await;
    let bob = api.seed_user("bob", "secret").await;
    let carol = api.seed_user("carol", "secret").await;
    let group = api.seed_group(&alice, "Trip", &[&bob, &carol]).await;
    let token = api.issue_token(&alice).await.unwrap();
    let logging = InMemoryLogging::new();
    let client = ReconciliationClient::new(
        Arc::new(api.clone()),
        Arc::new(logging.clone()),
        Currency::USD,
        RetryPolicy::default(),
    );
    client.open_group(&group, Vec::new()).unwrap();
    Fixture {
        api,
        logging,
        client,
        token,
        alice,
        bob,
        group,
    }
}

fn dinner(fixture: &Fixture, payer: &UserProfile, minor: i64) -> ExpenseDraft {
    ExpenseDraft::paid_by(
        fixture.group.id,
        "Dinner",
        usd(minor),
        payer.to_participant(),
        fixture.group.members().to_vec(),
        SplitMethod::Equal,
    )
}

async fn actions(logging: &InMemoryLogging) -> Vec<String> {
    logging.get_logs().await.unwrap().into_iter().map(|log| log.action).collect()
}

#[test]
fn test_retry_policy_backoff() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_after(1), Duration::from_millis(200));
    assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    assert_eq!(policy.delay_after(3), Duration::from_millis(800));
    assert_eq!(policy.delay_after(10), Duration::from_secs(5));
    assert_eq!(policy.delay_after(64), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_then_commit() {
    let f = setup().await;
    f.api
        .fail_next_writes([BillioError::NetworkTransient("connection reset".to_string())])
        .await;
    let mut rx = f.client.subscribe();
    let draft = dinner(&f, &f.alice, 900);

    let (result, optimistic) = tokio::join!(f.client.submit(&f.token, &f.group, draft, Some(f.alice.id)), async {
        rx.wait_for(|state| state.in_flight().count() == 1).await.unwrap().clone()
    });

    let entry = optimistic.in_flight().next().unwrap();
    assert!(entry.state.is_in_flight());
    let shown = optimistic.displayed().unwrap();
    assert_eq!(shown.net(f.bob.id, f.alice.id), usd(300));
    assert!(optimistic.committed.is_empty());

    let expense = result.unwrap();
    let state = f.client.snapshot();
    let entry = state.submission(entry.id).unwrap();
    assert_eq!(entry.state, SubmissionState::Committed);
    assert_eq!(entry.expense_id, Some(expense.id));
    assert_eq!(state.committed_expenses, vec![expense]);
    assert_eq!(state.displayed().unwrap(), shown);
    assert_eq!(f.api.create_expense_calls().await, 2);
    assert_eq!(
        actions(&f.logging).await,
        vec![EXPENSE_PENDING, EXPENSE_RETRYING, EXPENSE_COMMITTED]
    );
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_roll_back_exactly() {
    let f = setup().await;
    f.client
        .submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None)
        .await
        .unwrap();
    let before = f.client.snapshot().displayed().unwrap();

    f.api
        .fail_next_writes((0..3).map(|_| BillioError::NetworkTransient("timed out".to_string())))
        .await;
    let started = tokio::time::Instant::now();
    let result = f
        .client
        .submit(&f.token, &f.group, dinner(&f, &f.bob, 600), None)
        .await;

    assert!(matches!(result, Err(BillioError::NetworkTransient(_))));
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(f.api.create_expense_calls().await, 4);

    let state = f.client.snapshot();
    assert_eq!(state.in_flight().count(), 0);
    assert_eq!(state.displayed().unwrap(), before);
    assert_eq!(state.committed_expenses.len(), 1);
    assert_eq!(state.submissions.last().unwrap().state, SubmissionState::RolledBack);
    assert_eq!(actions(&f.logging).await.last().unwrap(), EXPENSE_ROLLED_BACK);
}

#[tokio::test(start_paused = true)]
async fn test_server_rejection_is_not_retried() {
    let f = setup().await;
    f.api
        .fail_next_writes([BillioError::ServerRejected("Amount too large".to_string())])
        .await;

    let result = f
        .client
        .submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None)
        .await;

    assert_eq!(result, Err(BillioError::ServerRejected("Amount too large".to_string())));
    assert_eq!(f.api.create_expense_calls().await, 1);
    let state = f.client.snapshot();
    assert_eq!(state.submissions[0].state, SubmissionState::RolledBack);
    assert!(state.displayed().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_token_is_not_retried() {
    let f = setup().await;
    f.api.revoke_token(&f.token).await;

    let result = f
        .client
        .submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None)
        .await;

    assert_eq!(result, Err(BillioError::AuthExpired));
    assert_eq!(f.api.create_expense_calls().await, 1);
}

#[tokio::test]
async fn test_local_errors_never_reach_backend() {
    let f = setup().await;

    let mut untitled = dinner(&f, &f.alice, 900);
    untitled.title = "  ".to_string();
    let result = f.client.submit(&f.token, &f.group, untitled, None).await;
    assert!(matches!(result, Err(BillioError::InvalidInput(field, _)) if field == "title"));

    let mut uneven = dinner(&f, &f.alice, 900);
    uneven.split = SplitMethod::exact([(f.alice.id, usd(100))]);
    let result = f.client.submit(&f.token, &f.group, uneven, None).await;
    assert!(matches!(result, Err(BillioError::SplitMismatch(_))));

    let mut outsider = dinner(&f, &f.alice, 900);
    outsider.participants.push(crate::core::models::user::Participant::new(999, "Mallory"));
    let result = f.client.submit(&f.token, &f.group, outsider, None).await;
    assert!(matches!(result, Err(BillioError::InvalidParticipant(_))));

    assert_eq!(f.api.create_expense_calls().await, 0);
    assert!(f.client.snapshot().submissions.is_empty());
}

#[tokio::test]
async fn test_submit_requires_open_view() {
    let f = setup().await;
    f.client.close_group();

    let result = f
        .client
        .submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None)
        .await;

    assert!(matches!(result, Err(BillioError::GroupNotFound(_))));
    assert_eq!(f.api.create_expense_calls().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_completion_does_not_touch_new_view() {
    let f = setup().await;
    let other = f.api.seed_group(&f.bob, "Flat", &[&f.alice]).await;
    f.api.set_write_latency(Duration::from_secs(1)).await;
    let mut rx = f.client.subscribe();

    let (result, _) = tokio::join!(
        f.client.submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None),
        async {
            rx.wait_for(|state| state.in_flight().count() == 1).await.unwrap();
            f.client.close_group();
            f.client.open_group(&other, Vec::new()).unwrap();
        }
    );

    assert!(result.is_ok());
    let state = f.client.snapshot();
    assert_eq!(state.group_id(), Some(other.id));
    assert!(state.submissions.is_empty());
    assert!(state.committed_expenses.is_empty());
    assert!(state.displayed().unwrap().is_empty());
    assert_eq!(f.api.expenses_of(f.group.id).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reopening_same_group_keeps_in_flight_entries() {
    let f = setup().await;
    f.api.set_write_latency(Duration::from_millis(500)).await;
    let mut rx = f.client.subscribe();

    let (result, _) = tokio::join!(
        f.client.submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None),
        async {
            rx.wait_for(|state| state.in_flight().count() == 1).await.unwrap();
            f.client.open_group(&f.group, Vec::new()).unwrap();
        }
    );

    let expense = result.unwrap();
    let state = f.client.snapshot();
    assert_eq!(state.committed_expenses, vec![expense]);
    assert_eq!(state.submissions[0].state, SubmissionState::Committed);
}

#[tokio::test]
async fn test_concurrent_submissions_all_commit() {
    let f = setup().await;

    let (first, second) = tokio::join!(
        f.client.submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None),
        f.client.submit(&f.token, &f.group, dinner(&f, &f.bob, 300), None)
    );
    first.unwrap();
    second.unwrap();

    let state = f.client.snapshot();
    assert_eq!(state.committed_expenses.len(), 2);
    assert_eq!(state.in_flight().count(), 0);
    assert_eq!(state.committed.net(f.bob.id, f.alice.id), usd(200));
}

#[tokio::test]
async fn test_reopening_same_group_drops_settled_entries() {
    let f = setup().await;
    let expense = f
        .client
        .submit(&f.token, &f.group, dinner(&f, &f.alice, 900), None)
        .await
        .unwrap();
    let before = f.client.snapshot();
    assert_eq!(before.submissions.len(), 1);

    f.client.open_group(&f.group, vec![expense]).unwrap();

    let state = f.client.snapshot();
    assert_eq!(state.view, before.view);
    assert!(state.submissions.is_empty());
    assert_eq!(state.displayed().unwrap(), before.displayed().unwrap());
}

#[tokio::test]
async fn test_settled_history_is_capped() {
    let f = setup().await;
    let mut expenses = Vec::new();
    for _ in 0..MAX_SUBMISSION_HISTORY + 5 {
        let expense = f
            .client
            .submit(&f.token, &f.group, dinner(&f, &f.alice, 300), None)
            .await
            .unwrap();
        expenses.push(expense);
    }

    let state = f.client.snapshot();
    assert_eq!(state.submissions.len(), MAX_SUBMISSION_HISTORY);
    assert_eq!(state.submissions[0].expense_id, Some(expenses[5].id));
    assert_eq!(
        state.submissions.last().unwrap().expense_id,
        expenses.last().map(|e| e.id)
    );
    assert_eq!(state.committed_expenses.len(), MAX_SUBMISSION_HISTORY + 5);
}
