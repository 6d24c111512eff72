mod client_tests;
mod reconciliation_tests;

use crate::config::Config;
use crate::core::models::expense::{Expense, ExpenseDraft, ExpenseId};
use crate::core::models::group::{Group, GroupId};
use crate::core::models::money::{Currency, Money};
use crate::core::models::user::Participant;
use crate::core::services::BillioClient;
use crate::core::split::SplitMethod;
use crate::infrastructure::api::in_memory::InMemoryApi;
use crate::infrastructure::cache::in_memory::InMemoryCache;
use crate::infrastructure::logging::in_memory::InMemoryLogging;
use crate::infrastructure::session::in_memory::InMemorySessionStore;

pub type TestClient = BillioClient<InMemoryApi, InMemorySessionStore, InMemoryLogging, InMemoryCache>;

pub fn usd(minor: i64) -> Money {
    Money::from_minor(minor, Currency::USD)
}

pub fn alice() -> Participant {
    Participant::new(1, "Alice")
}

pub fn bob() -> Participant {
    Participant::new(2, "Bob")
}

pub fn carol() -> Participant {
    Participant::new(3, "Carol")
}

pub fn dave() -> Participant {
    Participant::new(4, "Dave")
}

pub fn test_group() -> Group {
    Group::new(
        GroupId(10),
        "Trip".to_string(),
        String::new(),
        alice(),
        vec![alice(), bob(), carol()],
        None,
    )
}

/// A committed expense of the test group.
pub fn test_expense(
    id: u64,
    payer: Participant,
    total_minor: i64,
    participants: Vec<Participant>,
    split: SplitMethod,
) -> Expense {
    let draft = ExpenseDraft::paid_by(GroupId(10), "Expense", usd(total_minor), payer, participants, split);
    Expense::from_draft(ExpenseId(id), chrono::Utc::now(), draft).unwrap()
}

pub fn create_test_client(api: InMemoryApi, store: InMemorySessionStore) -> TestClient {
    create_test_client_with_logging(api, store, InMemoryLogging::new())
}

pub fn create_test_client_with_logging(
    api: InMemoryApi,
    store: InMemorySessionStore,
    logging: InMemoryLogging,
) -> TestClient {
    BillioClient::new(api, store, logging, InMemoryCache::new(), &Config::default())
}
