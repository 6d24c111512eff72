pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod infrastructure;

pub use crate::auth::{AuthToken, Session};
pub use crate::core::balance::{Balance, BalanceAggregator};
pub use crate::core::errors::{BillioError, FieldError};
pub use crate::core::models::money::{Currency, Money};
pub use crate::core::reconciliation::{LedgerState, ReconciliationClient, RetryPolicy, SubmissionState};
pub use crate::core::services::{BillioClient, GroupSnapshot};
pub use crate::core::split::{SplitMethod, SplitStrategy};
pub use crate::infrastructure::api::{ExpenseApi, http::HttpApi, in_memory::InMemoryApi};
pub use crate::infrastructure::cache::in_memory::InMemoryCache;
pub use crate::infrastructure::logging::in_memory::InMemoryLogging;
pub use crate::infrastructure::session::{file::FileSessionStore, in_memory::InMemorySessionStore};

#[cfg(test)]
mod tests;
