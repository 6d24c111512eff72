//! Split methods behind the expense form.
//!
//! Every method first works out how much of the total each participant owes
//! (`shares`), then `compute` credits the payers to get a zero-sum
//! [`SplitResult`].

use crate::core::errors::BillioError;
use crate::core::models::expense::Payer;
use crate::core::models::money::Money;
use crate::core::models::split_result::SplitResult;
use crate::core::models::user::{Participant, UserId};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::BTreeMap;

/// Percentages may miss 100 by at most this many percentage points.
const PERCENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
/// Percentages are weighted at a resolution of 0.0001 %.
const PERCENT_WEIGHT_SCALE: i64 = 10_000;

pub trait SplitStrategy {
    /// Each participant's owed portion of `total`, in participant id order.
    /// The portions add up to `total`.
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError>;

    fn compute(
        &self,
        total: Money,
        payers: &[Payer],
        participants: &[Participant],
    ) -> Result<SplitResult, BillioError> {
        let shares = self.shares(total, participants)?;
        SplitResult::from_shares(total, payers, shares)
    }
}

/// Participant ids sorted ascending, rejecting empty and duplicated lists.
fn ordered_ids(participants: &[Participant]) -> Result<Vec<UserId>, BillioError> {
    if participants.is_empty() {
        return Err(BillioError::InvalidParticipant("no participants selected".to_string()));
    }
    let mut ids: Vec<UserId> = participants.iter().map(|p| p.id).collect();
    ids.sort();
    if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
        return Err(BillioError::InvalidParticipant(format!(
            "user {} is listed twice",
            pair[0]
        )));
    }
    Ok(ids)
}

fn ensure_known<V>(params: &BTreeMap<UserId, V>, ids: &[UserId]) -> Result<(), BillioError> {
    match params.keys().find(|id| ids.binary_search(id).is_err()) {
        Some(stranger) => Err(BillioError::InvalidParticipant(format!(
            "user {} is not part of this split",
            stranger
        ))),
        None => Ok(()),
    }
}

fn allocate_by(total: Money, ids: Vec<UserId>, weights: &[u64]) -> Result<Vec<(UserId, Money)>, BillioError> {
    let parts = total.allocate(weights)?;
    Ok(ids.into_iter().zip(parts).collect())
}

fn ensure_sums_to(total: Money, shares: &[(UserId, Money)]) -> Result<(), BillioError> {
    let sum = Money::sum(shares.iter().map(|(_, share)| share), total.currency())?;
    if sum != total {
        return Err(BillioError::SplitMismatch(format!(
            "amounts add up to {}, expected {}",
            sum, total
        )));
    }
    Ok(())
}

/// Everyone pays the same; leftover cents go to the lowest ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EqualSplit;

impl SplitStrategy for EqualSplit {
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError> {
        let ids = ordered_ids(participants)?;
        let weights = vec![1; ids.len()];
        allocate_by(total, ids, &weights)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExactSplit {
    pub amounts: BTreeMap<UserId, Money>,
}

impl SplitStrategy for ExactSplit {
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError> {
        let ids = ordered_ids(participants)?;
        ensure_known(&self.amounts, &ids)?;

        let mut shares = Vec::with_capacity(ids.len());
        for id in ids {
            let amount = self
                .amounts
                .get(&id)
                .copied()
                .unwrap_or_else(|| Money::zero(total.currency()));
            if amount.currency() != total.currency() {
                return Err(BillioError::CurrencyMismatch(
                    total.currency().to_string(),
                    amount.currency().to_string(),
                ));
            }
            if amount.is_negative() {
                return Err(BillioError::SplitMismatch(format!("user {} has a negative amount", id)));
            }
            shares.push((id, amount));
        }
        ensure_sums_to(total, &shares)?;
        Ok(shares)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PercentageSplit {
    pub percentages: BTreeMap<UserId, Decimal>,
}

impl SplitStrategy for PercentageSplit {
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError> {
        let ids = ordered_ids(participants)?;
        ensure_known(&self.percentages, &ids)?;

        let mut sum = Decimal::ZERO;
        let mut weights = Vec::with_capacity(ids.len());
        for id in &ids {
            let percent = self.percentages.get(id).copied().unwrap_or(Decimal::ZERO);
            if percent.is_sign_negative() && !percent.is_zero() {
                return Err(BillioError::SplitMismatch(format!("user {} has a negative percentage", id)));
            }
            sum = sum
                .checked_add(percent)
                .ok_or_else(|| BillioError::SplitMismatch("percentages are too large".to_string()))?;
            let weight = percent
                .checked_mul(Decimal::from(PERCENT_WEIGHT_SCALE))
                .and_then(|w| w.round().to_u64())
                .ok_or_else(|| BillioError::SplitMismatch(format!("invalid percentage {}", percent)))?;
            weights.push(weight);
        }

        if (sum - Decimal::ONE_HUNDRED).abs() > PERCENT_TOLERANCE {
            return Err(BillioError::SplitMismatch(format!(
                "percentages add up to {}%, expected 100%",
                sum
            )));
        }
        allocate_by(total, ids, &weights)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SharesSplit {
    pub counts: BTreeMap<UserId, u32>,
}

impl SplitStrategy for SharesSplit {
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError> {
        let ids = ordered_ids(participants)?;
        ensure_known(&self.counts, &ids)?;
        let weights: Vec<u64> = ids
            .iter()
            .map(|id| u64::from(self.counts.get(id).copied().unwrap_or(0)))
            .collect();
        allocate_by(total, ids, &weights)
    }
}

/// An equal split with signed per-participant corrections. The corrections
/// must cancel out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AdjustmentSplit {
    pub adjustments: BTreeMap<UserId, Money>,
}

impl SplitStrategy for AdjustmentSplit {
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError> {
        let base = EqualSplit.shares(total, participants)?;
        let ids: Vec<UserId> = base.iter().map(|(id, _)| *id).collect();
        ensure_known(&self.adjustments, &ids)?;

        let mut shares = Vec::with_capacity(base.len());
        for (id, share) in base {
            let adjusted = match self.adjustments.get(&id) {
                Some(delta) => share.checked_add(*delta)?,
                None => share,
            };
            if adjusted.is_negative() {
                return Err(BillioError::SplitMismatch(format!(
                    "adjustment leaves user {} with {}",
                    id, adjusted
                )));
            }
            shares.push((id, adjusted));
        }
        ensure_sums_to(total, &shares)?;
        Ok(shares)
    }
}

/// The split method chosen for an expense, with its parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SplitMethod {
    #[default]
    Equal,
    Exact(ExactSplit),
    Percentage(PercentageSplit),
    Shares(SharesSplit),
    Adjustment(AdjustmentSplit),
}

impl SplitMethod {
    pub fn name(&self) -> &'static str {
        match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Exact(_) => "exact",
            SplitMethod::Percentage(_) => "percentage",
            SplitMethod::Shares(_) => "shares",
            SplitMethod::Adjustment(_) => "adjustment",
        }
    }

    pub fn exact(amounts: impl IntoIterator<Item = (UserId, Money)>) -> Self {
        SplitMethod::Exact(ExactSplit {
            amounts: amounts.into_iter().collect(),
        })
    }

    pub fn percentage(percentages: impl IntoIterator<Item = (UserId, Decimal)>) -> Self {
        SplitMethod::Percentage(PercentageSplit {
            percentages: percentages.into_iter().collect(),
        })
    }

    pub fn by_shares(counts: impl IntoIterator<Item = (UserId, u32)>) -> Self {
        SplitMethod::Shares(SharesSplit {
            counts: counts.into_iter().collect(),
        })
    }

    pub fn adjustment(adjustments: impl IntoIterator<Item = (UserId, Money)>) -> Self {
        SplitMethod::Adjustment(AdjustmentSplit {
            adjustments: adjustments.into_iter().collect(),
        })
    }
}

impl SplitStrategy for SplitMethod {
    fn shares(&self, total: Money, participants: &[Participant]) -> Result<Vec<(UserId, Money)>, BillioError> {
        match self {
            SplitMethod::Equal => EqualSplit.shares(total, participants),
            SplitMethod::Exact(split) => split.shares(total, participants),
            SplitMethod::Percentage(split) => split.shares(total, participants),
            SplitMethod::Shares(split) => split.shares(total, participants),
            SplitMethod::Adjustment(split) => split.shares(total, participants),
        }
    }
}
