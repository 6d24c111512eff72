use crate::core::errors::BillioError;
use crate::core::models::expense::Expense;
use crate::core::models::money::{Currency, Money};
use crate::core::models::split_result::SplitResult;
use crate::core::models::user::UserId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// `user_id` owes `owes_to` a positive `amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub user_id: UserId,
    pub owes_to: UserId,
    pub amount: Money,
}

/// Pairwise balances of a group, folded from its expenses.
///
/// Debts are kept per direction, so the net balance of a pair is always
/// `owed(a -> b) - owed(b -> a)` and therefore antisymmetric.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceAggregator {
    currency: Currency,
    owed: BTreeMap<(UserId, UserId), i64>,
}

impl BalanceAggregator {
    pub fn new(currency: Currency) -> Self {
        BalanceAggregator {
            currency,
            owed: BTreeMap::new(),
        }
    }

    /// Folds a whole expense list, oldest first.
    pub fn from_expenses<'a>(
        currency: Currency,
        expenses: impl IntoIterator<Item = &'a Expense>,
    ) -> Result<Self, BillioError> {
        let mut aggregator = BalanceAggregator::new(currency);
        for expense in expenses {
            aggregator.record(expense, &expense.split_result()?)?;
        }
        Ok(aggregator)
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_empty(&self) -> bool {
        self.owed.is_empty()
    }

    /// Returns the balances with `split` applied, leaving `self` untouched.
    pub fn apply(&self, expense: &Expense, split: &SplitResult) -> Result<BalanceAggregator, BillioError> {
        if expense.total.currency() != self.currency {
            return Err(BillioError::CurrencyMismatch(
                self.currency.to_string(),
                expense.total.currency().to_string(),
            ));
        }
        let updated = self.apply_split(split)?;
        debug!("applied expense {} to balances", expense.id);
        Ok(updated)
    }

    /// Applies a split that has no backend expense yet.
    ///
    /// Each debtor's debt is spread over the creditors in proportion to what
    /// they are owed. Every debtor's row adds up to its debt and every
    /// creditor's column adds up to its credit, so `net_position` moves by
    /// exactly the split entry. With a single payer every debtor simply owes
    /// the payer its entry.
    pub fn apply_split(&self, split: &SplitResult) -> Result<BalanceAggregator, BillioError> {
        if split.currency() != self.currency {
            return Err(BillioError::CurrencyMismatch(
                self.currency.to_string(),
                split.currency().to_string(),
            ));
        }
        if !split.is_balanced() {
            return Err(BillioError::SplitMismatch("split does not sum to zero".to_string()));
        }

        let creditors: Vec<(UserId, i64)> = split
            .creditors()
            .into_iter()
            .map(|(id, credit)| (id, credit.minor()))
            .collect();
        let debtors = split
            .debtors()
            .into_iter()
            .map(|(id, debt)| Ok((id, debt.abs()?.minor())))
            .collect::<Result<Vec<(UserId, i64)>, BillioError>>()?;

        let mut updated = self.clone();
        for (debtor, creditor, minor) in transfer_matrix(&debtors, &creditors)? {
            updated.add_debt(debtor, creditor, minor)?;
        }
        Ok(updated)
    }

    /// In-place variant of [`apply`](Self::apply); on error nothing changes.
    pub fn record(&mut self, expense: &Expense, split: &SplitResult) -> Result<(), BillioError> {
        *self = self.apply(expense, split)?;
        Ok(())
    }

    fn add_debt(&mut self, debtor: UserId, creditor: UserId, minor: i64) -> Result<(), BillioError> {
        let entry = self.owed.entry((debtor, creditor)).or_insert(0);
        *entry = entry.checked_add(minor).ok_or(BillioError::AmountOverflow)?;
        Ok(())
    }

    fn gross(&self, debtor: UserId, creditor: UserId) -> i64 {
        self.owed.get(&(debtor, creditor)).copied().unwrap_or(0)
    }

    /// What `a` owes `b`; negative when `b` owes `a`.
    pub fn net(&self, a: UserId, b: UserId) -> Money {
        let minor = self.gross(a, b).saturating_sub(self.gross(b, a));
        Money::from_minor(minor, self.currency)
    }

    /// Everyone who appears in any balance, in id order.
    pub fn users(&self) -> BTreeSet<UserId> {
        self.owed.keys().flat_map(|(a, b)| [*a, *b]).collect()
    }

    /// Nets every pair down to a single direction, dropping settled pairs.
    /// Net balances are unchanged.
    pub fn simplify(&self) -> BalanceAggregator {
        let mut simplified = BalanceAggregator::new(self.currency);
        for &(a, b) in self.owed.keys() {
            if a >= b && self.owed.contains_key(&(b, a)) {
                continue;
            }
            let net = self.gross(a, b).saturating_sub(self.gross(b, a));
            if net > 0 {
                simplified.owed.insert((a, b), net);
            } else if net < 0 {
                simplified.owed.insert((b, a), -net);
            }
        }
        simplified
    }

    /// One directional balance per indebted pair.
    pub fn balances(&self) -> Vec<Balance> {
        self.simplify()
            .owed
            .into_iter()
            .map(|((user_id, owes_to), minor)| Balance {
                user_id,
                owes_to,
                amount: Money::from_minor(minor, self.currency),
            })
            .collect()
    }

    /// The balances `user` is part of, either side.
    pub fn balances_for(&self, user: UserId) -> Vec<Balance> {
        self.balances()
            .into_iter()
            .filter(|b| b.user_id == user || b.owes_to == user)
            .collect()
    }

    /// Everything owed to `user` minus everything `user` owes.
    pub fn net_position(&self, user: UserId) -> Money {
        let minor = self.owed.iter().fold(0i64, |acc, (&(debtor, creditor), &amount)| {
            if creditor == user {
                acc.saturating_add(amount)
            } else if debtor == user {
                acc.saturating_sub(amount)
            } else {
                acc
            }
        });
        Money::from_minor(minor, self.currency)
    }

    /// Pays off net positions greedily, largest creditor against largest
    /// debtor. Usually fewer transfers than [`balances`](Self::balances), but
    /// not guaranteed to be the minimum.
    pub fn suggest_settlements(&self) -> Vec<Balance> {
        let positions: Vec<(UserId, i64)> = self
            .users()
            .into_iter()
            .map(|user| (user, self.net_position(user).minor()))
            .collect();
        let mut creditors: Vec<(UserId, i64)> = positions.iter().copied().filter(|(_, m)| *m > 0).collect();
        let mut debtors: Vec<(UserId, i64)> = positions
            .iter()
            .copied()
            .filter(|(_, m)| *m < 0)
            .map(|(id, m)| (id, -m))
            .collect();

        let mut transfers = Vec::new();
        loop {
            creditors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            debtors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let (Some(creditor), Some(debtor)) = (creditors.first_mut(), debtors.first_mut()) else {
                break;
            };
            let amount = creditor.1.min(debtor.1);
            transfers.push(Balance {
                user_id: debtor.0,
                owes_to: creditor.0,
                amount: Money::from_minor(amount, self.currency),
            });
            creditor.1 -= amount;
            debtor.1 -= amount;
            creditors.retain(|(_, m)| *m > 0);
            debtors.retain(|(_, m)| *m > 0);
        }
        transfers
    }
}

/// Proportional debtor x creditor transfers with integer cents.
///
/// Cells start at the floor of `debt * credit / total`. The cents left over
/// in each row are then handed out one per cell, always to the creditors
/// still missing the most (then largest fractional part, then lowest id),
/// which fills every column exactly.
fn transfer_matrix(
    debtors: &[(UserId, i64)],
    creditors: &[(UserId, i64)],
) -> Result<Vec<(UserId, UserId, i64)>, BillioError> {
    let total: i128 = creditors.iter().map(|(_, credit)| i128::from(*credit)).sum();
    if total == 0 || debtors.is_empty() {
        return Ok(Vec::new());
    }

    let mut cells = vec![vec![0i64; creditors.len()]; debtors.len()];
    let mut remainders = vec![vec![0i128; creditors.len()]; debtors.len()];
    let mut column_need: Vec<i64> = creditors.iter().map(|(_, credit)| *credit).collect();
    let mut row_need: Vec<i64> = debtors.iter().map(|(_, debt)| *debt).collect();

    for (i, (_, debt)) in debtors.iter().enumerate() {
        for (j, (_, credit)) in creditors.iter().enumerate() {
            let product = i128::from(*debt) * i128::from(*credit);
            let floor = i64::try_from(product / total).map_err(|_| BillioError::AmountOverflow)?;
            cells[i][j] = floor;
            remainders[i][j] = product % total;
            row_need[i] -= floor;
            column_need[j] -= floor;
        }
    }

    for (i, need) in row_need.iter().enumerate() {
        let mut order: Vec<usize> = (0..creditors.len()).collect();
        order.sort_by(|&a, &b| {
            column_need[b]
                .cmp(&column_need[a])
                .then(remainders[i][b].cmp(&remainders[i][a]))
                .then(a.cmp(&b))
        });
        for &j in order.iter().take(usize::try_from(*need).unwrap_or(0)) {
            if column_need[j] <= 0 {
                return Err(BillioError::SplitMismatch(
                    "cannot spread debts over creditors".to_string(),
                ));
            }
            cells[i][j] += 1;
            column_need[j] -= 1;
        }
    }

    let mut transfers = Vec::new();
    for (i, (debtor, _)) in debtors.iter().enumerate() {
        for (j, (creditor, _)) in creditors.iter().enumerate() {
            if cells[i][j] != 0 {
                transfers.push((*debtor, *creditor, cells[i][j]));
            }
        }
    }
    Ok(transfers)
}
