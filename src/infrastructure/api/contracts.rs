//! Wire shapes of the backend's JSON, and their checked conversion into
//! domain types. Anything that does not make sense as a domain value is an
//! `InvalidResponse`.

use crate::auth::{AuthToken, Session};
use crate::core::errors::BillioError;
use crate::core::models::expense::{Expense, ExpenseDraft, ExpenseId, Payer};
use crate::core::models::friend::{FriendRequest, FriendRequestId, FriendRequestStatus};
use crate::core::models::group::{Group, GroupId};
use crate::core::models::money::{Currency, Money};
use crate::core::models::user::{Participant, UserId, UserProfile};
use crate::core::split::{SplitMethod, SplitStrategy};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn invalid(e: BillioError) -> BillioError {
    match e {
        BillioError::InvalidResponse(_) => e,
        other => BillioError::InvalidResponse(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> ListResponse<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Plain(items) | ListResponse::Paged { results: items } => items,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserDto {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl TryFrom<UserDto> for UserProfile {
    type Error = BillioError;

    fn try_from(dto: UserDto) -> Result<Self, Self::Error> {
        if dto.username.trim().is_empty() {
            return Err(BillioError::InvalidResponse(format!("user {} has no username", dto.id)));
        }
        Ok(UserProfile {
            id: UserId(dto.id),
            username: dto.username,
            email: dto.email,
            first_name: dto.first_name,
            last_name: dto.last_name,
        })
    }
}

fn participant(dto: UserDto) -> Result<Participant, BillioError> {
    UserProfile::try_from(dto).map(|profile| profile.to_participant())
}

#[derive(Debug, Deserialize)]
pub struct AuthResponseDto {
    pub token: String,
    pub user: UserDto,
}

impl TryFrom<AuthResponseDto> for Session {
    type Error = BillioError;

    fn try_from(dto: AuthResponseDto) -> Result<Self, Self::Error> {
        Ok(Session {
            token: AuthToken::new(dto.token)?,
            user: dto.user.try_into()?,
        })
    }
}

/// `auth/profile/` answers either `{"user": {...}}` or the bare user.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProfileResponseDto {
    Wrapped { user: UserDto },
    Bare(UserDto),
}

impl TryFrom<ProfileResponseDto> for UserProfile {
    type Error = BillioError;

    fn try_from(dto: ProfileResponseDto) -> Result<Self, Self::Error> {
        match dto {
            ProfileResponseDto::Wrapped { user } | ProfileResponseDto::Bare(user) => user.try_into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GroupDto {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_by: UserDto,
    #[serde(default)]
    pub members: Vec<UserDto>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<GroupDto> for Group {
    type Error = BillioError;

    fn try_from(dto: GroupDto) -> Result<Self, Self::Error> {
        if dto.name.trim().is_empty() {
            return Err(BillioError::InvalidResponse(format!("group {} has no name", dto.id)));
        }
        let members = dto
            .members
            .into_iter()
            .map(participant)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Group::new(
            GroupId(dto.id),
            dto.name,
            dto.description,
            participant(dto.created_by)?,
            members,
            dto.created_at,
        ))
    }
}

/// Decimal fields arrive as strings, but older endpoints send bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DecimalField {
    Text(String),
    Number(serde_json::Number),
}

impl DecimalField {
    pub fn to_money(&self, currency: Currency) -> Result<Money, BillioError> {
        let parsed = match self {
            DecimalField::Text(text) => Money::from_decimal_str(text, currency),
            DecimalField::Number(number) => Money::from_decimal_str(&number.to_string(), currency),
        };
        parsed.map_err(invalid)
    }
}

#[derive(Debug, Deserialize)]
pub struct PayerDto {
    pub user: UserDto,
    pub amount: DecimalField,
}

#[derive(Debug, Deserialize)]
pub struct ShareDto {
    pub user: u64,
    pub amount_owed: DecimalField,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseDto {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: DecimalField,
    pub group: u64,
    #[serde(default)]
    pub paid_by: Option<UserDto>,
    #[serde(default)]
    pub payers: Vec<PayerDto>,
    #[serde(default)]
    pub participants: Vec<UserDto>,
    #[serde(default)]
    pub shares: Vec<ShareDto>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl ExpenseDto {
    /// Converts into a domain expense of `group_id`. When the backend does not
    /// list participants, `members` split the expense equally.
    pub fn into_expense(
        self,
        group_id: GroupId,
        members: &[Participant],
        currency: Currency,
    ) -> Result<Expense, BillioError> {
        if self.group != group_id.0 {
            return Err(BillioError::InvalidResponse(format!(
                "expense {} belongs to group {}, expected {}",
                self.id, self.group, group_id
            )));
        }
        let total = self.amount.to_money(currency)?;
        if !total.is_positive() {
            return Err(BillioError::InvalidResponse(format!(
                "expense {} has a non-positive amount {}",
                self.id, total
            )));
        }

        let payers = if !self.payers.is_empty() {
            self.payers
                .into_iter()
                .map(|payer| {
                    Ok(Payer {
                        participant: participant(payer.user)?,
                        amount: payer.amount.to_money(currency)?,
                    })
                })
                .collect::<Result<Vec<_>, BillioError>>()?
        } else if let Some(paid_by) = self.paid_by {
            vec![Payer {
                participant: participant(paid_by)?,
                amount: total,
            }]
        } else {
            return Err(BillioError::InvalidResponse(format!("expense {} has no payer", self.id)));
        };

        let participants = if self.participants.is_empty() {
            members.to_vec()
        } else {
            self.participants
                .into_iter()
                .map(participant)
                .collect::<Result<Vec<_>, _>>()?
        };

        let split = if self.shares.is_empty() {
            SplitMethod::Equal
        } else {
            let amounts = self
                .shares
                .iter()
                .map(|share| Ok((UserId(share.user), share.amount_owed.to_money(currency)?)))
                .collect::<Result<Vec<_>, BillioError>>()?;
            SplitMethod::exact(amounts)
        };

        let expense = Expense::from_draft(
            ExpenseId(self.id),
            self.date.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            ExpenseDraft {
                group_id,
                title: self.title,
                description: self.description,
                total,
                payers,
                participants,
                split,
            },
        )
        .map_err(invalid)?;
        expense.split_result().map_err(invalid)?;
        Ok(expense)
    }
}

#[derive(Debug, Deserialize)]
pub struct FriendRequestDto {
    pub id: u64,
    pub sender: UserDto,
    #[serde(default)]
    pub receiver: Option<UserDto>,
    pub status: FriendRequestStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<FriendRequestDto> for FriendRequest {
    type Error = BillioError;

    fn try_from(dto: FriendRequestDto) -> Result<Self, Self::Error> {
        Ok(FriendRequest {
            id: FriendRequestId(dto.id),
            sender: dto.sender.try_into()?,
            receiver: dto.receiver.map(UserProfile::try_from).transpose()?,
            status: dto.status,
            created_at: dto.created_at,
        })
    }
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub struct CreateGroupRequest<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

#[derive(Serialize)]
pub struct UsernameRequest<'a> {
    pub username: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PayerRequest {
    pub user: UserId,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ShareRequest {
    pub user: UserId,
    pub amount_owed: Decimal,
}

/// Body of `POST expenses/`. The owed share of every participant is sent
/// alongside the method so the backend stores the split as computed here.
#[derive(Debug, Serialize)]
pub struct CreateExpenseRequest<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub amount: Decimal,
    pub group: GroupId,
    pub split_method: &'static str,
    pub payers: Vec<PayerRequest>,
    pub participants: Vec<UserId>,
    pub shares: Vec<ShareRequest>,
}

impl<'a> CreateExpenseRequest<'a> {
    pub fn from_draft(draft: &'a ExpenseDraft) -> Result<Self, BillioError> {
        let shares = draft.split.shares(draft.total, &draft.participants)?;
        Ok(CreateExpenseRequest {
            title: &draft.title,
            description: &draft.description,
            amount: draft.total.to_decimal(),
            group: draft.group_id,
            split_method: draft.split.name(),
            payers: draft
                .payers
                .iter()
                .map(|payer| PayerRequest {
                    user: payer.participant.id,
                    amount: payer.amount.to_decimal(),
                })
                .collect(),
            participants: draft.participants.iter().map(|p| p.id).collect(),
            shares: shares
                .into_iter()
                .map(|(user, amount)| ShareRequest {
                    user,
                    amount_owed: amount.to_decimal(),
                })
                .collect(),
        })
    }
}

/// The human readable part of an error body: `error` or `detail`, else the
/// field errors of a validation response, else the raw text.
pub fn server_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return if trimmed.is_empty() {
            "request rejected".to_string()
        } else {
            trimmed.to_string()
        };
    };
    for key in ["error", "detail"] {
        if let Some(serde_json::Value::String(message)) = fields.get(key) {
            return message.clone();
        }
    }
    let messages: Vec<String> = fields
        .iter()
        .flat_map(|(field, value)| {
            let texts: Vec<String> = match value {
                serde_json::Value::String(text) => vec![text.clone()],
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                _ => Vec::new(),
            };
            texts.into_iter().map(move |text| {
                if field.as_str() == "non_field_errors" {
                    text
                } else {
                    format!("{}: {}", field, text)
                }
            })
        })
        .collect();
    if messages.is_empty() {
        "request rejected".to_string()
    } else {
        messages.join("; ")
    }
}
