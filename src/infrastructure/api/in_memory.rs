use crate::auth::{AuthToken, Session};
use crate::core::errors::BillioError;
use crate::core::models::expense::{Expense, ExpenseDraft, ExpenseId};
use crate::core::models::friend::{FriendRequest, FriendRequestId, FriendRequestStatus};
use crate::core::models::group::{Group, GroupId};
use crate::core::models::user::{Registration, UserId, UserProfile};
use crate::core::split::{SplitMethod, SplitStrategy};
use crate::infrastructure::api::ExpenseApi;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Backend {
    users: BTreeMap<UserId, (UserProfile, String)>,
    tokens: HashMap<String, UserId>,
    groups: BTreeMap<GroupId, Group>,
    expenses: Vec<Expense>,
    friends: BTreeMap<UserId, BTreeSet<UserId>>,
    friend_requests: Vec<FriendRequest>,
    next_id: u64,
    offline: bool,
    failures: VecDeque<BillioError>,
    write_latency: Duration,
    create_expense_calls: usize,
}

impl Backend {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn ensure_online(&self) -> Result<(), BillioError> {
        if self.offline {
            return Err(BillioError::NetworkTransient("connection refused".to_string()));
        }
        Ok(())
    }

    fn user_for(&self, token: &AuthToken) -> Result<UserId, BillioError> {
        self.ensure_online()?;
        self.tokens.get(token.as_str()).copied().ok_or(BillioError::AuthExpired)
    }

    fn profile(&self, user_id: UserId) -> Result<UserProfile, BillioError> {
        self.users
            .get(&user_id)
            .map(|(profile, _)| profile.clone())
            .ok_or_else(|| BillioError::ServerRejected("User not found".to_string()))
    }

    fn find_username(&self, username: &str) -> Option<UserProfile> {
        self.users
            .values()
            .find(|(profile, _)| profile.username == username)
            .map(|(profile, _)| profile.clone())
    }

    fn issue_token(&mut self, user_id: UserId) -> Result<AuthToken, BillioError> {
        let token = AuthToken::new(Uuid::new_v4().simple().to_string())?;
        self.tokens.insert(token.as_str().to_string(), user_id);
        Ok(token)
    }

    fn group_mut(&mut self, group_id: GroupId) -> Result<&mut Group, BillioError> {
        self.groups
            .get_mut(&group_id)
            .ok_or_else(|| BillioError::GroupNotFound(group_id.to_string()))
    }

    fn insert_user(&mut self, username: &str, password: &str, first_name: &str, last_name: &str) -> UserProfile {
        let id = UserId(self.next_id());
        let profile = UserProfile {
            id,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        self.users.insert(id, (profile.clone(), password.to_string()));
        profile
    }
}

/// A backend living in memory, with hooks for injecting failures and latency.
#[derive(Clone, Default)]
pub struct InMemoryApi {
    state: Arc<RwLock<Backend>>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        InMemoryApi::default()
    }

    pub async fn seed_user(&self, username: &str, password: &str) -> UserProfile {
        self.state.write().await.insert_user(username, password, "", "")
    }

    /// Creates a group owned by `owner` with `members`, bypassing auth.
    pub async fn seed_group(&self, owner: &UserProfile, name: &str, members: &[&UserProfile]) -> Group {
        let mut state = self.state.write().await;
        let id = GroupId(state.next_id());
        let group = Group::new(
            id,
            name.to_string(),
            String::new(),
            owner.to_participant(),
            members.iter().map(|m| m.to_participant()).collect(),
            Some(Utc::now()),
        );
        state.groups.insert(id, group.clone());
        group
    }

    /// Issues a token for `user` without going through `login`.
    pub async fn issue_token(&self, user: &UserProfile) -> Result<AuthToken, BillioError> {
        self.state.write().await.issue_token(user.id)
    }

    /// Queues errors returned by the next write calls, one per call.
    pub async fn fail_next_writes(&self, errors: impl IntoIterator<Item = BillioError>) {
        self.state.write().await.failures.extend(errors);
    }

    /// While offline every call fails with a transient network error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }

    pub async fn set_write_latency(&self, latency: Duration) {
        self.state.write().await.write_latency = latency;
    }

    pub async fn revoke_token(&self, token: &AuthToken) {
        self.state.write().await.tokens.remove(token.as_str());
    }

    pub async fn create_expense_calls(&self) -> usize {
        self.state.read().await.create_expense_calls
    }

    pub async fn expenses_of(&self, group_id: GroupId) -> Vec<Expense> {
        let state = self.state.read().await;
        state.expenses.iter().filter(|e| e.group_id == group_id).cloned().collect()
    }

    pub async fn send_friend_request(&self, from: &UserProfile, to: &UserProfile) -> FriendRequest {
        let mut state = self.state.write().await;
        let request = FriendRequest {
            id: FriendRequestId(state.next_id()),
            sender: from.clone(),
            receiver: Some(to.clone()),
            status: FriendRequestStatus::Pending,
            created_at: Some(Utc::now()),
        };
        state.friend_requests.push(request.clone());
        request
    }

    /// Sleeps for the configured latency, then takes the next queued failure.
    async fn begin_write(&self) -> Result<(), BillioError> {
        let latency = self.state.read().await.write_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.write().await;
        state.ensure_online()?;
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn resolve_request(
        &self,
        token: &AuthToken,
        request_id: FriendRequestId,
        status: FriendRequestStatus,
    ) -> Result<(), BillioError> {
        self.begin_write().await?;
        let mut state = self.state.write().await;
        let user_id = state.user_for(token)?;
        let request = state
            .friend_requests
            .iter_mut()
            .find(|r| r.id == request_id && r.is_pending() && r.receiver.as_ref().map(|p| p.id) == Some(user_id))
            .ok_or_else(|| BillioError::ServerRejected("Friend request not found".to_string()))?;
        request.status = status;
        let sender = request.sender.id;
        if status == FriendRequestStatus::Accepted {
            state.friends.entry(user_id).or_default().insert(sender);
            state.friends.entry(sender).or_default().insert(user_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ExpenseApi for InMemoryApi {
    async fn login(&self, username: &str, password: &str) -> Result<Session, BillioError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        let user = state
            .users
            .values()
            .find(|(profile, secret)| profile.username == username && secret == password)
            .map(|(profile, _)| profile.clone())
            .ok_or_else(|| BillioError::ServerRejected("Invalid credentials".to_string()))?;
        let token = state.issue_token(user.id)?;
        Ok(Session { token, user })
    }

    async fn register(&self, registration: &Registration) -> Result<Session, BillioError> {
        let mut state = self.state.write().await;
        state.ensure_online()?;
        if registration.username.trim().is_empty() || registration.password.is_empty() {
            return Err(BillioError::ServerRejected(
                "username and password are required".to_string(),
            ));
        }
        if state.find_username(&registration.username).is_some() {
            return Err(BillioError::ServerRejected("Username already taken".to_string()));
        }
        let mut user = state.insert_user(
            &registration.username,
            &registration.password,
            &registration.first_name,
            &registration.last_name,
        );
        if !registration.email.is_empty() {
            user.email = registration.email.clone();
            if let Some((stored, _)) = state.users.get_mut(&user.id) {
                stored.email = user.email.clone();
            }
        }
        let token = state.issue_token(user.id)?;
        Ok(Session { token, user })
    }

    async fn profile(&self, token: &AuthToken) -> Result<UserProfile, BillioError> {
        let state = self.state.read().await;
        let user_id = state.user_for(token)?;
        state.profile(user_id)
    }

    async fn logout(&self, token: &AuthToken) -> Result<(), BillioError> {
        let mut state = self.state.write().await;
        state.user_for(token)?;
        state.tokens.remove(token.as_str());
        Ok(())
    }

    async fn list_groups(&self, token: &AuthToken) -> Result<Vec<Group>, BillioError> {
        let state = self.state.read().await;
        let user_id = state.user_for(token)?;
        Ok(state.groups.values().filter(|g| g.is_member(user_id)).cloned().collect())
    }

    async fn create_group(&self, token: &AuthToken, name: &str, description: &str) -> Result<Group, BillioError> {
        self.begin_write().await?;
        let mut state = self.state.write().await;
        let user_id = state.user_for(token)?;
        if name.trim().is_empty() {
            return Err(BillioError::ServerRejected("name: This field may not be blank.".to_string()));
        }
        let creator = state.profile(user_id)?.to_participant();
        let id = GroupId(state.next_id());
        let group = Group::new(
            id,
            name.to_string(),
            description.to_string(),
            creator,
            Vec::new(),
            Some(Utc::now()),
        );
        state.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn group_details(&self, token: &AuthToken, group_id: GroupId) -> Result<Group, BillioError> {
        let state = self.state.read().await;
        state.user_for(token)?;
        state
            .groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| BillioError::GroupNotFound(group_id.to_string()))
    }

    async fn join_group(&self, token: &AuthToken, group_id: GroupId) -> Result<Group, BillioError> {
        self.begin_write().await?;
        let mut state = self.state.write().await;
        let user_id = state.user_for(token)?;
        let participant = state.profile(user_id)?.to_participant();
        let group = state.group_mut(group_id)?;
        group.add_member(participant);
        Ok(group.clone())
    }

    async fn add_member(&self, token: &AuthToken, group_id: GroupId, username: &str) -> Result<(), BillioError> {
        self.begin_write().await?;
        let mut state = self.state.write().await;
        state.user_for(token)?;
        let user = state
            .find_username(username)
            .ok_or_else(|| BillioError::ServerRejected("User not found".to_string()))?;
        state.group_mut(group_id)?.add_member(user.to_participant());
        Ok(())
    }

    async fn list_expenses(&self, token: &AuthToken, group: &Group) -> Result<Vec<Expense>, BillioError> {
        let state = self.state.read().await;
        state.user_for(token)?;
        Ok(state.expenses.iter().filter(|e| e.group_id == group.id).cloned().collect())
    }

    async fn create_expense(&self, token: &AuthToken, draft: &ExpenseDraft) -> Result<Expense, BillioError> {
        self.state.write().await.create_expense_calls += 1;
        self.begin_write().await?;
        let mut state = self.state.write().await;
        state.user_for(token)?;
        let group = state
            .groups
            .get(&draft.group_id)
            .cloned()
            .ok_or_else(|| BillioError::GroupNotFound(draft.group_id.to_string()))?;
        let rejected = |e: BillioError| BillioError::ServerRejected(e.to_string());
        draft.validate(&group).map_err(rejected)?;
        // the backend stores what each participant owes, not the method
        let shares = draft.split.shares(draft.total, &draft.participants).map_err(rejected)?;
        let mut stored = draft.clone();
        stored.split = SplitMethod::exact(shares);
        let expense = Expense::from_draft(ExpenseId(state.next_id()), Utc::now(), stored).map_err(rejected)?;
        state.expenses.push(expense.clone());
        Ok(expense)
    }

    async fn list_friends(&self, token: &AuthToken) -> Result<Vec<UserProfile>, BillioError> {
        let state = self.state.read().await;
        let user_id = state.user_for(token)?;
        state
            .friends
            .get(&user_id)
            .into_iter()
            .flatten()
            .map(|friend| state.profile(*friend))
            .collect()
    }

    async fn add_friend(&self, token: &AuthToken, username: &str) -> Result<(), BillioError> {
        self.begin_write().await?;
        let mut state = self.state.write().await;
        let user_id = state.user_for(token)?;
        let target = state
            .find_username(username)
            .ok_or_else(|| BillioError::ServerRejected("User not found".to_string()))?;
        if target.id == user_id {
            return Err(BillioError::ServerRejected("You cannot add yourself".to_string()));
        }
        if state.friends.get(&user_id).is_some_and(|f| f.contains(&target.id)) {
            return Err(BillioError::ServerRejected("Already friends".to_string()));
        }
        let sender = state.profile(user_id)?;
        let id = FriendRequestId(state.next_id());
        state.friend_requests.push(FriendRequest {
            id,
            sender,
            receiver: Some(target),
            status: FriendRequestStatus::Pending,
            created_at: Some(Utc::now()),
        });
        Ok(())
    }

    async fn list_friend_requests(&self, token: &AuthToken) -> Result<Vec<FriendRequest>, BillioError> {
        let state = self.state.read().await;
        let user_id = state.user_for(token)?;
        Ok(state
            .friend_requests
            .iter()
            .filter(|r| r.is_pending() && r.receiver.as_ref().map(|p| p.id) == Some(user_id))
            .cloned()
            .collect())
    }

    async fn accept_friend_request(&self, token: &AuthToken, request_id: FriendRequestId) -> Result<(), BillioError> {
        self.resolve_request(token, request_id, FriendRequestStatus::Accepted).await
    }

    async fn reject_friend_request(&self, token: &AuthToken, request_id: FriendRequestId) -> Result<(), BillioError> {
        self.resolve_request(token, request_id, FriendRequestStatus::Rejected).await
    }
}
