use super::group::{Group, GroupId};
use super::money::Money;
use super::split_result::SplitResult;
use super::user::Participant;
use crate::constants::{MAX_DESCRIPTION_LENGTH, MAX_EXPENSE_MINOR, MAX_TITLE_LENGTH};
use crate::core::errors::BillioError;
use crate::core::split::{SplitMethod, SplitStrategy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExpenseId(pub u64);

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Someone who paid (part of) an expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Payer {
    pub participant: Participant,
    pub amount: Money,
}

/// An expense as entered in the form, before the backend has accepted it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpenseDraft {
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub total: Money,
    pub payers: Vec<Payer>,
    pub participants: Vec<Participant>,
    pub split: SplitMethod,
}

impl ExpenseDraft {
    /// The common case: one person paid the whole amount.
    pub fn paid_by(
        group_id: GroupId,
        title: impl Into<String>,
        total: Money,
        payer: Participant,
        participants: Vec<Participant>,
        split: SplitMethod,
    ) -> Self {
        ExpenseDraft {
            group_id,
            title: title.into(),
            description: String::new(),
            total,
            payers: vec![Payer {
                participant: payer,
                amount: total,
            }],
            participants,
            split,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Checks the draft against the group it is submitted to. Nothing here
    /// touches the network.
    pub fn validate(&self, group: &Group) -> Result<(), BillioError> {
        if self.group_id != group.id {
            return Err(BillioError::invalid_input(
                "group",
                "Wrong group",
                format!("expense belongs to group {}, not {}", self.group_id, group.id),
            ));
        }
        validate_text("title", &self.title, MAX_TITLE_LENGTH, true)?;
        validate_text("description", &self.description, MAX_DESCRIPTION_LENGTH, false)?;
        validate_total(self.total)?;

        if self.payers.is_empty() {
            return Err(BillioError::invalid_input("payers", "No payer", "select who paid"));
        }
        let mut seen = HashSet::new();
        for payer in &self.payers {
            if !group.is_member(payer.participant.id) {
                return Err(BillioError::InvalidParticipant(format!(
                    "payer {} is not a member of {}",
                    payer.participant.name, group.name
                )));
            }
            if !seen.insert(payer.participant.id) {
                return Err(BillioError::InvalidParticipant(format!(
                    "payer {} is listed twice",
                    payer.participant.name
                )));
            }
            if !payer.amount.is_positive() {
                return Err(BillioError::InvalidAmount(format!(
                    "{} paid {}",
                    payer.participant.name, payer.amount
                )));
            }
        }
        for participant in &self.participants {
            if !group.is_member(participant.id) {
                return Err(BillioError::InvalidParticipant(format!(
                    "{} is not a member of {}",
                    participant.name, group.name
                )));
            }
        }
        Ok(())
    }

    pub fn split_result(&self) -> Result<SplitResult, BillioError> {
        self.split.compute(self.total, &self.payers, &self.participants)
    }
}

/// An expense accepted by the backend. Payer amounts always add up to the total.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub title: String,
    pub description: String,
    pub total: Money,
    pub payers: Vec<Payer>,
    pub participants: Vec<Participant>,
    pub split: SplitMethod,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn from_draft(
        id: ExpenseId,
        created_at: DateTime<Utc>,
        draft: ExpenseDraft,
    ) -> Result<Self, BillioError> {
        let paid = Money::sum(draft.payers.iter().map(|p| &p.amount), draft.total.currency())?;
        if draft.payers.is_empty() || paid != draft.total {
            return Err(BillioError::SplitMismatch(format!(
                "payers paid {}, expense total is {}",
                paid, draft.total
            )));
        }
        Ok(Expense {
            id,
            group_id: draft.group_id,
            title: draft.title,
            description: draft.description,
            total: draft.total,
            payers: draft.payers,
            participants: draft.participants,
            split: draft.split,
            created_at,
        })
    }

    pub fn split_result(&self) -> Result<SplitResult, BillioError> {
        self.split.compute(self.total, &self.payers, &self.participants)
    }
}

fn validate_text(field: &str, value: &str, max_length: usize, required: bool) -> Result<(), BillioError> {
    if required && value.trim().is_empty() {
        return Err(BillioError::invalid_input(
            field,
            &format!("Invalid {}", field),
            format!("{} cannot be empty", field),
        ));
    }
    if value.chars().count() > max_length {
        return Err(BillioError::invalid_input(
            field,
            &format!("{} Too Long", field),
            format!("{} cannot exceed {} characters", field, max_length),
        ));
    }
    if value.chars().any(|c| (c.is_control() && c != '\n') || "<>{}[]".contains(c)) {
        return Err(BillioError::invalid_input(
            field,
            &format!("Invalid {}", field),
            format!("{} contains invalid characters", field),
        ));
    }
    Ok(())
}

fn validate_total(total: Money) -> Result<(), BillioError> {
    if !total.is_positive() {
        return Err(BillioError::InvalidAmount("amount must be greater than 0".to_string()));
    }
    if total.minor() > MAX_EXPENSE_MINOR {
        return Err(BillioError::InvalidAmount("amount cannot exceed 1,000,000".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_name(field: &str, value: &str, max_length: usize) -> Result<(), BillioError> {
    validate_text(field, value, max_length, true)
}
