use crate::auth::{AuthToken, Session};
use crate::config::Config;
use crate::core::errors::BillioError;
use crate::core::models::expense::{Expense, ExpenseDraft};
use crate::core::models::friend::{FriendRequest, FriendRequestId};
use crate::core::models::group::{Group, GroupId};
use crate::core::models::money::Currency;
use crate::core::models::user::{Registration, UserProfile};
use crate::infrastructure::api::ExpenseApi;
use crate::infrastructure::api::contracts::{
    AuthResponseDto, CreateExpenseRequest, CreateGroupRequest, ExpenseDto, FriendRequestDto, GroupDto,
    ListResponse, LoginRequest, ProfileResponseDto, UserDto, UsernameRequest, server_message,
};
use async_trait::async_trait;
use http::StatusCode;
use http::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Maps a non-success status to the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> BillioError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BillioError::AuthExpired,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            BillioError::NetworkTransient(format!("server answered {}", status))
        }
        s if s.is_server_error() => BillioError::NetworkTransient(format!("server answered {}", status)),
        _ => BillioError::ServerRejected(server_message(body)),
    }
}

fn transport_error(e: reqwest::Error) -> BillioError {
    if e.is_decode() {
        BillioError::InvalidResponse(e.to_string())
    } else {
        BillioError::NetworkTransient(e.to_string())
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BillioError> {
    serde_json::from_str(body).map_err(|e| BillioError::InvalidResponse(format!("Failed to decode response: {}", e)))
}

/// Talks to the REST backend over HTTP.
pub struct HttpApi {
    client: Client,
    base_url: String,
    auth_scheme: String,
    currency: Currency,
}

impl HttpApi {
    pub fn new(config: &Config) -> Result<Self, BillioError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BillioError::NetworkTransient(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpApi {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.clone(),
            currency: config.currency,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn get(&self, token: &AuthToken, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(AUTHORIZATION, token.header_value(&self.auth_scheme))
    }

    fn post(&self, token: &AuthToken, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header(AUTHORIZATION, token.header_value(&self.auth_scheme))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(StatusCode, String), BillioError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!("Backend answered {} ({} bytes)", status, body.len());
        Ok((status, body))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BillioError> {
        let (status, body) = self.execute(request).await?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        decode(&body)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), BillioError> {
        let (status, body) = self.execute(request).await?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        Ok(())
    }

    async fn group(&self, request: RequestBuilder, group_id: GroupId) -> Result<Group, BillioError> {
        let (status, body) = self.execute(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(BillioError::GroupNotFound(group_id.to_string()));
        }
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        decode::<GroupDto>(&body)?.try_into()
    }
}

#[async_trait]
impl ExpenseApi for HttpApi {
    async fn login(&self, username: &str, password: &str) -> Result<Session, BillioError> {
        let request = self
            .client
            .post(self.url("auth/login/"))
            .json(&LoginRequest { username, password });
        self.send::<AuthResponseDto>(request).await?.try_into()
    }

    async fn register(&self, registration: &Registration) -> Result<Session, BillioError> {
        let request = self.client.post(self.url("auth/register/")).json(registration);
        self.send::<AuthResponseDto>(request).await?.try_into()
    }

    async fn profile(&self, token: &AuthToken) -> Result<UserProfile, BillioError> {
        self.send::<ProfileResponseDto>(self.get(token, "auth/profile/"))
            .await?
            .try_into()
    }

    async fn logout(&self, token: &AuthToken) -> Result<(), BillioError> {
        self.send_empty(self.post(token, "auth/logout/")).await
    }

    async fn list_groups(&self, token: &AuthToken) -> Result<Vec<Group>, BillioError> {
        self.send::<ListResponse<GroupDto>>(self.get(token, "groups/"))
            .await?
            .into_vec()
            .into_iter()
            .map(Group::try_from)
            .collect()
    }

    async fn create_group(&self, token: &AuthToken, name: &str, description: &str) -> Result<Group, BillioError> {
        let request = self
            .post(token, "groups/")
            .json(&CreateGroupRequest { name, description });
        self.send::<GroupDto>(request).await?.try_into()
    }

    async fn group_details(&self, token: &AuthToken, group_id: GroupId) -> Result<Group, BillioError> {
        self.group(self.get(token, &format!("groups/{}/details/", group_id)), group_id)
            .await
    }

    async fn join_group(&self, token: &AuthToken, group_id: GroupId) -> Result<Group, BillioError> {
        self.group(self.post(token, &format!("groups/{}/join/", group_id)), group_id)
            .await
    }

    async fn add_member(&self, token: &AuthToken, group_id: GroupId, username: &str) -> Result<(), BillioError> {
        let request = self
            .post(token, &format!("groups/{}/add_member/", group_id))
            .json(&UsernameRequest { username });
        self.send_empty(request).await
    }

    async fn list_expenses(&self, token: &AuthToken, group: &Group) -> Result<Vec<Expense>, BillioError> {
        let request = self.get(token, "expenses/").query(&[("group", group.id.0)]);
        let dtos = self.send::<ListResponse<ExpenseDto>>(request).await?.into_vec();
        let mut expenses = Vec::with_capacity(dtos.len());
        for dto in dtos {
            // the filter is advisory on some deployments
            if dto.group != group.id.0 {
                warn!("Skipping expense {} of group {} in listing for {}", dto.id, dto.group, group.id);
                continue;
            }
            expenses.push(dto.into_expense(group.id, group.members(), self.currency)?);
        }
        expenses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(expenses)
    }

    async fn create_expense(&self, token: &AuthToken, draft: &ExpenseDraft) -> Result<Expense, BillioError> {
        let body = CreateExpenseRequest::from_draft(draft)?;
        let request = self.post(token, "expenses/").json(&body);
        self.send::<ExpenseDto>(request)
            .await?
            .into_expense(draft.group_id, &draft.participants, draft.total.currency())
    }

    async fn list_friends(&self, token: &AuthToken) -> Result<Vec<UserProfile>, BillioError> {
        self.send::<ListResponse<UserDto>>(self.get(token, "friends/"))
            .await?
            .into_vec()
            .into_iter()
            .map(UserProfile::try_from)
            .collect()
    }

    async fn add_friend(&self, token: &AuthToken, username: &str) -> Result<(), BillioError> {
        let request = self.post(token, "friends/add/").json(&UsernameRequest { username });
        self.send_empty(request).await
    }

    async fn list_friend_requests(&self, token: &AuthToken) -> Result<Vec<FriendRequest>, BillioError> {
        self.send::<ListResponse<FriendRequestDto>>(self.get(token, "friend-requests/"))
            .await?
            .into_vec()
            .into_iter()
            .map(FriendRequest::try_from)
            .collect()
    }

    async fn accept_friend_request(&self, token: &AuthToken, request_id: FriendRequestId) -> Result<(), BillioError> {
        self.send_empty(self.post(token, &format!("friend-requests/{}/accept/", request_id)))
            .await
    }

    async fn reject_friend_request(&self, token: &AuthToken, request_id: FriendRequestId) -> Result<(), BillioError> {
        self.send_empty(self.post(token, &format!("friend-requests/{}/reject/", request_id)))
            .await
    }
}
