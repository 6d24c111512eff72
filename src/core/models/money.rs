use crate::core::errors::BillioError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every supported currency carries two minor-unit digits.
pub const MINOR_DIGITS: u32 = 2;
const MINOR_PER_MAJOR: i64 = 100;

/// Three-letter uppercase currency code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    pub fn as_str(&self) -> &str {
        // constructed from ASCII letters only
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = BillioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_alphabetic) {
            return Err(BillioError::invalid_input(
                "currency",
                "Invalid currency",
                format!("`{}` is not a three-letter currency code", code),
            ));
        }
        let mut upper = [0u8; 3];
        for (slot, byte) in upper.iter_mut().zip(bytes) {
            *slot = byte.to_ascii_uppercase();
        }
        Ok(Currency(upper))
    }
}

impl TryFrom<String> for Currency {
    type Error = BillioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exact amount of money in minor units (cents).
///
/// Arithmetic is checked: mixing currencies or leaving the `i64` range is an
/// error rather than a silent wrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub fn from_minor(minor: i64, currency: Currency) -> Self {
        Money { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Money { minor: 0, currency }
    }

    /// Parses user input such as `"12.5"`, `"-3"` or `"1000.00"`.
    ///
    /// At most two fractional digits are accepted; nothing is rounded.
    pub fn from_decimal_str(input: &str, currency: Currency) -> Result<Self, BillioError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(BillioError::InvalidAmount("amount is empty".to_string()));
        }
        let unsigned = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
        let well_formed = !unsigned.is_empty()
            && unsigned.chars().all(|c| c.is_ascii_digit() || c == '.')
            && unsigned.matches('.').count() <= 1
            && unsigned.chars().any(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(BillioError::InvalidAmount(format!("`{}` is not a number", trimmed)));
        }
        let value = Decimal::from_str(trimmed)
            .map_err(|e| BillioError::InvalidAmount(format!("`{}`: {}", trimmed, e)))?;
        Self::from_decimal(value, currency)
    }

    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Self, BillioError> {
        let normalized = value.normalize();
        if normalized.scale() > MINOR_DIGITS {
            return Err(BillioError::InvalidAmount(format!(
                "`{}` has more than {} decimal places",
                value, MINOR_DIGITS
            )));
        }
        let minor = normalized
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .and_then(|scaled| scaled.to_i64())
            .ok_or(BillioError::AmountOverflow)?;
        Ok(Money { minor, currency })
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.minor, MINOR_DIGITS)
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), BillioError> {
        if self.currency != other.currency {
            return Err(BillioError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }

    pub fn checked_add(self, other: Money) -> Result<Money, BillioError> {
        self.ensure_same_currency(&other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(BillioError::AmountOverflow)?;
        Ok(Money { minor, ..self })
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, BillioError> {
        self.ensure_same_currency(&other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or(BillioError::AmountOverflow)?;
        Ok(Money { minor, ..self })
    }

    pub fn negate(self) -> Result<Money, BillioError> {
        let minor = self.minor.checked_neg().ok_or(BillioError::AmountOverflow)?;
        Ok(Money { minor, ..self })
    }

    pub fn abs(self) -> Result<Money, BillioError> {
        if self.minor < 0 { self.negate() } else { Ok(self) }
    }

    /// Sums amounts that must all be in `currency`.
    pub fn sum<'a>(
        amounts: impl IntoIterator<Item = &'a Money>,
        currency: Currency,
    ) -> Result<Money, BillioError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, amount| acc.checked_add(*amount))
    }

    /// Splits this amount across `weights` with the largest-remainder method.
    ///
    /// The parts always add up to `self` exactly. Leftover cents go to the parts
    /// with the largest fractional remainder; equal remainders favour the
    /// earlier index, so equal weights hand the extra cents to the first parts.
    pub fn allocate(&self, weights: &[u64]) -> Result<Vec<Money>, BillioError> {
        if weights.is_empty() {
            return Err(BillioError::SplitMismatch("nothing to allocate across".to_string()));
        }
        let weight_total: u128 = weights.iter().map(|&w| u128::from(w)).sum();
        if weight_total == 0 {
            return Err(BillioError::SplitMismatch("all allocation weights are zero".to_string()));
        }

        let magnitude = u128::from(self.minor.unsigned_abs());
        let mut parts = Vec::with_capacity(weights.len());
        let mut remainders = Vec::with_capacity(weights.len());
        let mut allocated: u128 = 0;
        for (index, &weight) in weights.iter().enumerate() {
            let product = magnitude * u128::from(weight);
            let base = product / weight_total;
            allocated += base;
            parts.push(base);
            remainders.push((product % weight_total, index));
        }

        remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let leftover = magnitude - allocated;
        for &(_, index) in remainders.iter().take(leftover as usize) {
            parts[index] += 1;
        }

        parts
            .into_iter()
            .map(|part| {
                let part = part as i128;
                let signed = if self.minor < 0 { -part } else { part };
                i64::try_from(signed)
                    .map(|minor| Money { minor, currency: self.currency })
                    .map_err(|_| BillioError::AmountOverflow)
            })
            .collect()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}
