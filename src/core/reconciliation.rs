//! Optimistic expense submission.
//!
//! A submitted draft shows up in the displayed ledger at once as a Pending
//! entry, is retried with backoff while the network is flaky, and ends up
//! either Committed (replaced by the backend's expense) or RolledBack
//! (removed, leaving the ledger as it was before the submission).

use crate::auth::AuthToken;
use crate::config::Config;
use crate::constants::{
    EXPENSE_COMMITTED, EXPENSE_PENDING, EXPENSE_RETRYING, EXPENSE_ROLLED_BACK, MAX_SUBMISSION_HISTORY,
};
use crate::core::balance::BalanceAggregator;
use crate::core::errors::BillioError;
use crate::core::models::expense::{Expense, ExpenseDraft, ExpenseId};
use crate::core::models::group::{Group, GroupId};
use crate::core::models::money::Currency;
use crate::core::models::split_result::SplitResult;
use crate::core::models::user::UserId;
use crate::infrastructure::api::ExpenseApi;
use crate::infrastructure::logging::LoggingService;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
        }
    }

    /// Wait after the `attempt`-th failed attempt (1-based): the base delay,
    /// doubled per earlier failure, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionState {
    Pending,
    /// Waiting for, or running, attempt number `attempt`.
    Retrying { attempt: u32 },
    Committed,
    RolledBack,
}

impl SubmissionState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SubmissionState::Pending | SubmissionState::Retrying { .. })
    }
}

/// One submission and where it is in its lifecycle.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    pub id: Uuid,
    pub draft: ExpenseDraft,
    pub split: SplitResult,
    pub state: SubmissionState,
    pub submitted_at: DateTime<Utc>,
    pub expense_id: Option<ExpenseId>,
    pub error: Option<BillioError>,
}

/// What a group view shows: the backend's expenses plus the submissions
/// still in flight.
#[derive(Clone, Debug)]
pub struct LedgerState {
    /// Bumped whenever the view is discarded.
    pub view: u64,
    pub group: Option<Group>,
    pub committed_expenses: Vec<Expense>,
    pub committed: BalanceAggregator,
    /// In-flight entries plus the most recent settled ones.
    pub submissions: Vec<PendingEntry>,
}

impl LedgerState {
    fn empty(currency: Currency) -> Self {
        LedgerState {
            view: 0,
            group: None,
            committed_expenses: Vec::new(),
            committed: BalanceAggregator::new(currency),
            submissions: Vec::new(),
        }
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group.as_ref().map(|group| group.id)
    }

    pub fn submission(&self, id: Uuid) -> Option<&PendingEntry> {
        self.submissions.iter().find(|entry| entry.id == id)
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &PendingEntry> {
        self.submissions.iter().filter(|entry| entry.state.is_in_flight())
    }

    /// Committed balances with every in-flight split applied on top.
    pub fn displayed(&self) -> Result<BalanceAggregator, BillioError> {
        self.in_flight()
            .try_fold(self.committed.clone(), |balances, entry| balances.apply_split(&entry.split))
    }

    fn entry_mut(&mut self, id: Uuid) -> Option<&mut PendingEntry> {
        self.submissions.iter_mut().find(|entry| entry.id == id)
    }

    /// Drops the oldest settled submissions beyond the history limit.
    fn prune_history(&mut self) {
        let settled = self.submissions.iter().filter(|entry| !entry.state.is_in_flight()).count();
        let mut excess = settled.saturating_sub(MAX_SUBMISSION_HISTORY);
        self.submissions.retain(|entry| {
            if excess > 0 && !entry.state.is_in_flight() {
                excess -= 1;
                false
            } else {
                true
            }
        });
    }
}

pub struct ReconciliationClient<A: ExpenseApi, L: LoggingService> {
    api: Arc<A>,
    logging: Arc<L>,
    policy: RetryPolicy,
    ledger: watch::Sender<LedgerState>,
}

impl<A: ExpenseApi, L: LoggingService> ReconciliationClient<A, L> {
    pub fn new(api: Arc<A>, logging: Arc<L>, currency: Currency, policy: RetryPolicy) -> Self {
        let (ledger, _) = watch::channel(LedgerState::empty(currency));
        ReconciliationClient {
            api,
            logging,
            policy,
            ledger,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Every ledger transition is published to subscribers.
    pub fn subscribe(&self) -> watch::Receiver<LedgerState> {
        self.ledger.subscribe()
    }

    pub fn snapshot(&self) -> LedgerState {
        self.ledger.borrow().clone()
    }

    /// Shows `group` with the given committed expenses. Reopening the same
    /// group keeps its in-flight submissions and drops settled ones; any
    /// other group starts a new view and discards them all.
    pub fn open_group(&self, group: &Group, expenses: Vec<Expense>) -> Result<(), BillioError> {
        let currency = self.ledger.borrow().committed.currency();
        let committed = BalanceAggregator::from_expenses(currency, &expenses)?;
        self.ledger.send_modify(|state| {
            if state.group_id() == Some(group.id) {
                state.submissions.retain(|entry| entry.state.is_in_flight());
            } else {
                state.view += 1;
                state.submissions.clear();
            }
            state.group = Some(group.clone());
            state.committed_expenses = expenses;
            state.committed = committed;
        });
        debug!("Opened ledger view for group {}", group.id);
        Ok(())
    }

    /// Discards the view. Submissions still running finish against the
    /// backend but no longer touch the ledger.
    pub fn close_group(&self) {
        self.ledger.send_modify(|state| {
            let currency = state.committed.currency();
            let view = state.view + 1;
            *state = LedgerState::empty(currency);
            state.view = view;
        });
    }

    async fn record(&self, action: &str, details: serde_json::Value, user_id: Option<UserId>) {
        if let Err(e) = self.logging.log_action(action, details, user_id).await {
            warn!("Failed to record {}: {}", action, e);
        }
    }

    /// Submits `draft` to the open view of `group`.
    ///
    /// Local validation happens before anything is shown or sent. Transient
    /// failures are retried per the policy; anything else rolls the entry back
    /// and is returned.
    pub async fn submit(
        &self,
        token: &AuthToken,
        group: &Group,
        draft: ExpenseDraft,
        user_id: Option<UserId>,
    ) -> Result<Expense, BillioError> {
        draft.validate(group)?;
        let split = draft.split_result()?;

        let id = Uuid::new_v4();
        let mut opened = Err(BillioError::GroupNotFound(group.id.to_string()));
        self.ledger.send_modify(|state| {
            if state.group_id() != Some(group.id) {
                return;
            }
            if let Err(e) = state.displayed().and_then(|shown| shown.apply_split(&split)) {
                opened = Err(e);
                return;
            }
            state.submissions.push(PendingEntry {
                id,
                draft: draft.clone(),
                split: split.clone(),
                state: SubmissionState::Pending,
                submitted_at: Utc::now(),
                expense_id: None,
                error: None,
            });
            opened = Ok(state.view);
        });
        let view = opened?;
        self.record(
            EXPENSE_PENDING,
            json!({ "submission_id": id, "group_id": group.id, "title": draft.title, "amount": draft.total.to_decimal() }),
            user_id,
        )
        .await;

        let mut attempt = 1;
        loop {
            match self.api.create_expense(token, &draft).await {
                Ok(expense) => return self.commit(view, id, expense, user_id).await,
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    attempt += 1;
                    warn!(
                        "Submission {} failed ({}), attempt {} in {:?}",
                        id, e, attempt, delay
                    );
                    self.transition(view, id, |entry| {
                        entry.state = SubmissionState::Retrying { attempt };
                        entry.error = Some(e.clone());
                    });
                    self.record(
                        EXPENSE_RETRYING,
                        json!({ "submission_id": id, "attempt": attempt, "error": e.to_string() }),
                        user_id,
                    )
                    .await;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.rollback(view, id, &e, user_id).await;
                    return Err(e);
                }
            }
        }
    }

    fn transition(&self, view: u64, id: Uuid, update: impl FnOnce(&mut PendingEntry)) {
        self.ledger.send_modify(|state| {
            if state.view != view {
                return;
            }
            if let Some(entry) = state.entry_mut(id) {
                update(entry);
            }
            state.prune_history();
        });
    }

    async fn commit(
        &self,
        view: u64,
        id: Uuid,
        expense: Expense,
        user_id: Option<UserId>,
    ) -> Result<Expense, BillioError> {
        let split = match expense.split_result() {
            Ok(split) => split,
            Err(e) => {
                let e = BillioError::InvalidResponse(format!("expense {}: {}", expense.id, e));
                error!("Backend accepted submission {} but returned {}", id, e);
                self.rollback(view, id, &e, user_id).await;
                return Err(e);
            }
        };

        let mut applied = Ok(());
        self.ledger.send_modify(|state| {
            if state.view != view {
                return;
            }
            let known = state.committed_expenses.iter().any(|e| e.id == expense.id);
            if !known {
                match state.committed.apply(&expense, &split) {
                    Ok(updated) => {
                        state.committed = updated;
                        state.committed_expenses.push(expense.clone());
                    }
                    Err(e) => {
                        applied = Err(e);
                        return;
                    }
                }
            }
            if let Some(entry) = state.entry_mut(id) {
                entry.state = SubmissionState::Committed;
                entry.expense_id = Some(expense.id);
                entry.error = None;
            }
            state.prune_history();
        });
        if let Err(e) = applied {
            self.rollback(view, id, &e, user_id).await;
            return Err(e);
        }

        info!("Expense {} committed for submission {}", expense.id, id);
        self.record(
            EXPENSE_COMMITTED,
            json!({ "submission_id": id, "expense_id": expense.id, "group_id": expense.group_id }),
            user_id,
        )
        .await;
        Ok(expense)
    }

    async fn rollback(&self, view: u64, id: Uuid, e: &BillioError, user_id: Option<UserId>) {
        self.transition(view, id, |entry| {
            entry.state = SubmissionState::RolledBack;
            entry.error = Some(e.clone());
        });
        warn!("Submission {} rolled back: {}", id, e);
        self.record(
            EXPENSE_ROLLED_BACK,
            json!({ "submission_id": id, "error": e.to_string() }),
            user_id,
        )
        .await;
    }
}
