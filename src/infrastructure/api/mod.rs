pub mod contracts;
pub mod http;
pub mod in_memory;

use crate::auth::{AuthToken, Session};
use crate::core::errors::BillioError;
use crate::core::models::expense::{Expense, ExpenseDraft};
use crate::core::models::friend::{FriendRequest, FriendRequestId};
use crate::core::models::group::{Group, GroupId};
use crate::core::models::user::{Registration, UserProfile};
use async_trait::async_trait;

/// The remote expense backend.
///
/// Every call but `login` and `register` carries the session token. Responses
/// come back as validated domain types.
#[async_trait]
pub trait ExpenseApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<Session, BillioError>;
    async fn register(&self, registration: &Registration) -> Result<Session, BillioError>;
    async fn profile(&self, token: &AuthToken) -> Result<UserProfile, BillioError>;
    async fn logout(&self, token: &AuthToken) -> Result<(), BillioError>;

    async fn list_groups(&self, token: &AuthToken) -> Result<Vec<Group>, BillioError>;
    async fn create_group(&self, token: &AuthToken, name: &str, description: &str) -> Result<Group, BillioError>;
    async fn group_details(&self, token: &AuthToken, group_id: GroupId) -> Result<Group, BillioError>;
    async fn join_group(&self, token: &AuthToken, group_id: GroupId) -> Result<Group, BillioError>;
    async fn add_member(&self, token: &AuthToken, group_id: GroupId, username: &str) -> Result<(), BillioError>;

    /// Expenses of `group`, oldest first. The group is needed to resolve
    /// members and the default split.
    async fn list_expenses(&self, token: &AuthToken, group: &Group) -> Result<Vec<Expense>, BillioError>;
    async fn create_expense(&self, token: &AuthToken, draft: &ExpenseDraft) -> Result<Expense, BillioError>;

    async fn list_friends(&self, token: &AuthToken) -> Result<Vec<UserProfile>, BillioError>;
    async fn add_friend(&self, token: &AuthToken, username: &str) -> Result<(), BillioError>;
    async fn list_friend_requests(&self, token: &AuthToken) -> Result<Vec<FriendRequest>, BillioError>;
    async fn accept_friend_request(&self, token: &AuthToken, request_id: FriendRequestId) -> Result<(), BillioError>;
    async fn reject_friend_request(&self, token: &AuthToken, request_id: FriendRequestId) -> Result<(), BillioError>;
}
