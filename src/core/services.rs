use crate::auth::{AuthToken, Session, SessionContext};
use crate::config::Config;
use crate::constants::{
    FRIEND_ADDED, FRIEND_REQUEST_ACCEPTED, FRIEND_REQUEST_REJECTED, GROUP_CREATED, GROUP_JOINED,
    MAX_DESCRIPTION_LENGTH, MAX_GROUP_NAME_LENGTH, MAX_USERNAME_LENGTH, MEMBER_ADDED, SESSION_ENDED,
    SESSION_RESTORED, SESSION_STARTED,
};
use crate::core::balance::{Balance, BalanceAggregator};
use crate::core::errors::BillioError;
use crate::core::models::{
    audit::AppLog,
    expense::{Expense, ExpenseDraft, validate_name},
    friend::{FriendRequest, FriendRequestId},
    group::{Group, GroupId},
    money::Currency,
    user::{Registration, UserId, UserProfile},
};
use crate::core::reconciliation::{LedgerState, ReconciliationClient, RetryPolicy};
use crate::infrastructure::api::ExpenseApi;
use crate::infrastructure::cache::Cache;
use crate::infrastructure::logging::LoggingService;
use crate::infrastructure::session::SessionStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// A group with its expenses and balances as of `fetched_at`.
#[derive(Serialize, Debug, Clone)]
pub struct GroupSnapshot {
    pub group: Group,
    pub expenses: Vec<Expense>,
    pub balances: Vec<Balance>,
    pub settlements: Vec<Balance>,
    pub fetched_at: DateTime<Utc>,
    /// Served from cache because the backend could not be reached.
    pub stale: bool,
}

impl GroupSnapshot {
    pub fn build(group: Group, expenses: Vec<Expense>, currency: Currency) -> Result<Self, BillioError> {
        let aggregator = BalanceAggregator::from_expenses(currency, &expenses)?;
        Ok(GroupSnapshot {
            group,
            expenses,
            balances: aggregator.balances(),
            settlements: aggregator.suggest_settlements(),
            fetched_at: Utc::now(),
            stale: false,
        })
    }

    /// Balances the user is part of.
    pub fn balances_for(&self, user_id: UserId) -> Vec<&Balance> {
        self.balances
            .iter()
            .filter(|b| b.user_id == user_id || b.owes_to == user_id)
            .collect()
    }
}

/// Everything the landing screen shows, loaded in one go.
#[derive(Serialize, Debug, Clone)]
pub struct Dashboard {
    pub user: UserProfile,
    pub groups: Vec<Group>,
    pub friends: Vec<UserProfile>,
    pub friend_requests: Vec<FriendRequest>,
}

pub struct BillioClient<A: ExpenseApi, S: SessionStore, L: LoggingService, C: Cache> {
    api: Arc<A>,
    session: SessionContext<S>,
    logging: Arc<L>,
    cache: C,
    ledger: ReconciliationClient<A, L>,
    currency: Currency,
    cache_ttl: Duration,
}

impl<A: ExpenseApi, S: SessionStore, L: LoggingService, C: Cache> BillioClient<A, S, L, C> {
    pub fn new(api: A, store: S, logging: L, cache: C, config: &Config) -> Self {
        let api = Arc::new(api);
        let logging = Arc::new(logging);
        BillioClient {
            ledger: ReconciliationClient::new(
                api.clone(),
                logging.clone(),
                config.currency,
                RetryPolicy::from_config(config),
            ),
            api,
            session: SessionContext::new(store),
            logging,
            cache,
            currency: config.currency,
            cache_ttl: config.cache_ttl,
        }
    }

    async fn log_action(
        &self,
        action: &str,
        details: serde_json::Value,
        user_id: Option<UserId>,
    ) -> Result<(), BillioError> {
        self.logging.log_action(action, details, user_id).await
    }

    /// Ends the session when the backend no longer accepts its token.
    /// The caller always sees `AuthExpired`, even if the token store or the
    /// activity log fails while tearing down.
    async fn guard<T>(&self, result: Result<T, BillioError>) -> Result<T, BillioError> {
        if matches!(result, Err(BillioError::AuthExpired)) {
            warn!("Backend rejected the session token, logging out");
            self.ledger.close_group();
            if let Err(e) = self.cache.clear().await {
                warn!("Failed to clear cache: {}", e);
            }
            let previous = self.session.current().await;
            if let Err(e) = self.session.end().await {
                warn!("Failed to clear stored session: {}", e);
            }
            if let Some(session) = previous {
                if let Err(e) = self
                    .log_action(SESSION_ENDED, json!({ "reason": "expired" }), Some(session.user.id))
                    .await
                {
                    warn!("Failed to record {}: {}", SESSION_ENDED, e);
                }
            }
        }
        result
    }

    async fn token(&self) -> Result<(AuthToken, UserId), BillioError> {
        let session = self.session.require().await?;
        Ok((session.token, session.user.id))
    }

    // Session

    /// Picks up the token left by a previous run. An expired token is
    /// discarded; any other failure leaves it in place for the next try.
    pub async fn restore_session(&self) -> Result<Option<UserProfile>, BillioError> {
        let Some(token) = self.session.stored_token().await? else {
            return Ok(None);
        };
        match self.api.profile(&token).await {
            Ok(user) => {
                self.session
                    .resume(Session {
                        token,
                        user: user.clone(),
                    })
                    .await;
                self.log_action(SESSION_RESTORED, json!({ "username": user.username }), Some(user.id))
                    .await?;
                Ok(Some(user))
            }
            Err(BillioError::AuthExpired) => {
                info!("Stored session has expired");
                self.session.end().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, BillioError> {
        validate_name("username", username, MAX_USERNAME_LENGTH)?;
        if password.is_empty() {
            return Err(BillioError::invalid_input(
                "password",
                "Invalid password",
                "password cannot be empty",
            ));
        }
        let session = self.api.login(username, password).await?;
        self.start(session).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<UserProfile, BillioError> {
        validate_name("username", &registration.username, MAX_USERNAME_LENGTH)?;
        if registration.password.is_empty() {
            return Err(BillioError::invalid_input(
                "password",
                "Invalid password",
                "password cannot be empty",
            ));
        }
        let session = self.api.register(registration).await?;
        self.start(session).await
    }

    async fn start(&self, session: Session) -> Result<UserProfile, BillioError> {
        let user = session.user.clone();
        self.ledger.close_group();
        self.session.begin(session).await?;
        self.log_action(SESSION_STARTED, json!({ "username": user.username }), Some(user.id))
            .await?;
        Ok(user)
    }

    /// Logs out locally even when the backend cannot be told.
    pub async fn logout(&self) -> Result<(), BillioError> {
        if let Some(session) = self.session.current().await {
            if let Err(e) = self.api.logout(&session.token).await {
                warn!("Backend logout failed, clearing session anyway: {}", e);
            }
        }
        self.ledger.close_group();
        self.cache.clear().await?;
        if let Some(session) = self.session.end().await? {
            self.log_action(SESSION_ENDED, json!({ "reason": "logout" }), Some(session.user.id))
                .await?;
        }
        Ok(())
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.session.current().await.map(|session| session.user)
    }

    pub async fn dashboard(&self) -> Result<Dashboard, BillioError> {
        let session = self.session.require().await?;
        let token = &session.token;
        let loaded = futures::try_join!(
            self.api.list_groups(token),
            self.api.list_friends(token),
            self.api.list_friend_requests(token)
        );
        let (groups, friends, friend_requests) = self.guard(loaded).await?;
        Ok(Dashboard {
            user: session.user,
            groups,
            friends,
            friend_requests,
        })
    }

    // Groups

    pub async fn list_groups(&self) -> Result<Vec<Group>, BillioError> {
        let (token, _) = self.token().await?;
        self.guard(self.api.list_groups(&token).await).await
    }

    pub async fn create_group(&self, name: &str, description: &str) -> Result<Group, BillioError> {
        validate_name("name", name, MAX_GROUP_NAME_LENGTH)?;
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(BillioError::invalid_input(
                "description",
                "description Too Long",
                format!("description cannot exceed {} characters", MAX_DESCRIPTION_LENGTH),
            ));
        }
        let (token, user_id) = self.token().await?;
        let group = self
            .guard(self.api.create_group(&token, name.trim(), description).await)
            .await?;
        self.log_action(
            GROUP_CREATED,
            json!({ "group_id": group.id, "name": group.name }),
            Some(user_id),
        )
        .await?;
        Ok(group)
    }

    pub async fn group_details(&self, group_id: GroupId) -> Result<Group, BillioError> {
        let (token, _) = self.token().await?;
        self.guard(self.api.group_details(&token, group_id).await).await
    }

    pub async fn join_group(&self, group_id: GroupId) -> Result<Group, BillioError> {
        let (token, user_id) = self.token().await?;
        let group = self.guard(self.api.join_group(&token, group_id).await).await?;
        self.invalidate(group_id).await;
        self.log_action(GROUP_JOINED, json!({ "group_id": group_id }), Some(user_id))
            .await?;
        Ok(group)
    }

    pub async fn add_member(&self, group_id: GroupId, username: &str) -> Result<(), BillioError> {
        validate_name("username", username, MAX_USERNAME_LENGTH)?;
        let (token, user_id) = self.token().await?;
        self.guard(self.api.add_member(&token, group_id, username.trim()).await)
            .await?;
        self.invalidate(group_id).await;
        self.log_action(
            MEMBER_ADDED,
            json!({ "group_id": group_id, "username": username.trim() }),
            Some(user_id),
        )
        .await
    }

    async fn invalidate(&self, group_id: GroupId) {
        if let Err(e) = self.cache.invalidate_group(group_id).await {
            warn!("Failed to invalidate cached group {}: {}", group_id, e);
        }
    }

    // Friends

    pub async fn list_friends(&self) -> Result<Vec<UserProfile>, BillioError> {
        let (token, _) = self.token().await?;
        self.guard(self.api.list_friends(&token).await).await
    }

    pub async fn add_friend(&self, username: &str) -> Result<(), BillioError> {
        validate_name("username", username, MAX_USERNAME_LENGTH)?;
        let (token, user_id) = self.token().await?;
        self.guard(self.api.add_friend(&token, username.trim()).await).await?;
        self.log_action(FRIEND_ADDED, json!({ "username": username.trim() }), Some(user_id))
            .await
    }

    pub async fn list_friend_requests(&self) -> Result<Vec<FriendRequest>, BillioError> {
        let (token, _) = self.token().await?;
        self.guard(self.api.list_friend_requests(&token).await).await
    }

    pub async fn accept_friend_request(&self, request_id: FriendRequestId) -> Result<(), BillioError> {
        let (token, user_id) = self.token().await?;
        self.guard(self.api.accept_friend_request(&token, request_id).await)
            .await?;
        self.log_action(FRIEND_REQUEST_ACCEPTED, json!({ "request_id": request_id }), Some(user_id))
            .await
    }

    pub async fn reject_friend_request(&self, request_id: FriendRequestId) -> Result<(), BillioError> {
        let (token, user_id) = self.token().await?;
        self.guard(self.api.reject_friend_request(&token, request_id).await)
            .await?;
        self.log_action(FRIEND_REQUEST_REJECTED, json!({ "request_id": request_id }), Some(user_id))
            .await
    }

    // Ledger

    async fn fetch_group(&self, token: &AuthToken, group_id: GroupId) -> Result<(Group, Vec<Expense>), BillioError> {
        let group = self.api.group_details(token, group_id).await?;
        let expenses = self.api.list_expenses(token, &group).await?;
        Ok((group, expenses))
    }

    /// Reloads a group and opens it in the ledger view. When the backend fails
    /// for any reason but an expired session, the cached snapshot is served
    /// instead, marked stale.
    pub async fn refresh_group(&self, group_id: GroupId) -> Result<GroupSnapshot, BillioError> {
        let (token, _) = self.token().await?;
        let fetched = self.guard(self.fetch_group(&token, group_id).await).await;
        let snapshot = match fetched {
            Ok((group, expenses)) => {
                let snapshot = GroupSnapshot::build(group, expenses, self.currency)?;
                if let Err(e) = self.cache.save_group_snapshot(&snapshot, self.cache_ttl).await {
                    warn!("Failed to cache group {}: {}", group_id, e);
                }
                snapshot
            }
            Err(BillioError::AuthExpired) => return Err(BillioError::AuthExpired),
            Err(e) => match self.cache.get_group_snapshot(group_id).await? {
                Some(mut cached) => {
                    warn!("Refresh of group {} failed ({}), serving cached snapshot", group_id, e);
                    cached.stale = true;
                    cached
                }
                None => return Err(e),
            },
        };
        self.ledger.open_group(&snapshot.group, snapshot.expenses.clone())?;
        Ok(snapshot)
    }

    /// Submits an expense to its group, opening the group first if another
    /// one is on screen.
    pub async fn submit_expense(&self, draft: ExpenseDraft) -> Result<Expense, BillioError> {
        let session = self.session.require().await?;
        let group = match self.ledger.snapshot().group {
            Some(group) if group.id == draft.group_id => group,
            _ => self.refresh_group(draft.group_id).await?.group,
        };
        let submitted = self
            .ledger
            .submit(&session.token, &group, draft, Some(session.user.id))
            .await;
        let expense = self.guard(submitted).await?;

        let state = self.ledger.snapshot();
        if let Some(group) = state.group.filter(|g| g.id == expense.group_id) {
            match GroupSnapshot::build(group, state.committed_expenses, self.currency) {
                Ok(snapshot) => {
                    if let Err(e) = self.cache.save_group_snapshot(&snapshot, self.cache_ttl).await {
                        warn!("Failed to cache group {}: {}", expense.group_id, e);
                    }
                }
                Err(e) => warn!("Failed to rebuild snapshot of group {}: {}", expense.group_id, e),
            }
        }
        Ok(expense)
    }

    pub fn close_group(&self) {
        self.ledger.close_group();
    }

    pub fn ledger(&self) -> LedgerState {
        self.ledger.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<LedgerState> {
        self.ledger.subscribe()
    }

    pub async fn activity(&self) -> Result<Vec<AppLog>, BillioError> {
        self.logging.get_logs().await
    }
}
