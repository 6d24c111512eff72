use super::expense::Payer;
use super::money::{Currency, Money};
use super::user::UserId;
use crate::core::errors::BillioError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-participant outcome of one expense.
///
/// Positive entries are owed to the participant, negative entries are owed by
/// them. The entries of a valid result always sum to zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SplitResult {
    currency: Currency,
    entries: BTreeMap<UserId, Money>,
}

impl SplitResult {
    /// Combines the owed shares with what each payer actually paid.
    pub fn from_shares(
        total: Money,
        payers: &[Payer],
        shares: Vec<(UserId, Money)>,
    ) -> Result<Self, BillioError> {
        let currency = total.currency();
        if payers.is_empty() {
            return Err(BillioError::SplitMismatch("expense has no payer".to_string()));
        }

        let paid = Money::sum(payers.iter().map(|p| &p.amount), currency)?;
        if paid != total {
            return Err(BillioError::SplitMismatch(format!(
                "payers paid {}, expense total is {}",
                paid, total
            )));
        }
        let owed = Money::sum(shares.iter().map(|(_, share)| share), currency)?;
        if owed != total {
            return Err(BillioError::SplitMismatch(format!(
                "shares add up to {}, expense total is {}",
                owed, total
            )));
        }

        let mut entries: BTreeMap<UserId, Money> = BTreeMap::new();
        for (user_id, share) in shares {
            let entry = entries.entry(user_id).or_insert_with(|| Money::zero(currency));
            *entry = entry.checked_sub(share)?;
        }
        for payer in payers {
            let entry = entries
                .entry(payer.participant.id)
                .or_insert_with(|| Money::zero(currency));
            *entry = entry.checked_add(payer.amount)?;
        }

        Ok(SplitResult { currency, entries })
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// What the user is owed (positive) or owes (negative) for this expense.
    pub fn get(&self, user_id: UserId) -> Money {
        self.entries
            .get(&user_id)
            .copied()
            .unwrap_or_else(|| Money::zero(self.currency))
    }

    pub fn entries(&self) -> impl Iterator<Item = (UserId, Money)> + '_ {
        self.entries.iter().map(|(id, amount)| (*id, *amount))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> Result<Money, BillioError> {
        Money::sum(self.entries.values(), self.currency)
    }

    pub fn is_balanced(&self) -> bool {
        matches!(self.sum(), Ok(total) if total.is_zero())
    }

    /// Participants with a negative entry, in id order.
    pub fn debtors(&self) -> Vec<(UserId, Money)> {
        self.entries().filter(|(_, amount)| amount.is_negative()).collect()
    }

    /// Participants with a positive entry, in id order.
    pub fn creditors(&self) -> Vec<(UserId, Money)> {
        self.entries().filter(|(_, amount)| amount.is_positive()).collect()
    }
}
