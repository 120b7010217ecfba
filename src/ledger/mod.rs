//! Ledger model: candidate and persisted transactions share one shape.

pub mod categorize;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use categorize::{CategoryRule, apply_category_rules};

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            "transfer" => Ok(Self::Transfer),
            other => Err(format!("unknown transaction type: {other}")),
        }
    }
}

/// A ledger entry.
///
/// Candidates come out of a parser with nil `id`/`wallet_id`/`user_id`; the
/// orchestrator stamps ownership before reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub user_id: Uuid,
    /// Where the entry came from, e.g. `nu-bank-email`.
    pub origin: String,
    /// Provider reference. Empty when the source has none; see [`Transaction::reference`].
    pub reference: String,
    /// Position among same-looking candidates without a provider reference.
    #[serde(default)]
    pub uniqueness_count: u32,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Signed; negative is an outflow.
    pub amount: Decimal,
    /// User-owned free text. Never written by the pipeline.
    pub user_description: String,
    /// Parser-derived text.
    pub system_description: String,
    pub category_id: Option<Uuid>,
    pub category_setter_id: Option<Uuid>,
    /// Business date of the transaction.
    pub processed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// A parser-produced candidate with no owner yet.
    pub fn candidate(
        origin: impl Into<String>,
        reference: impl Into<String>,
        transaction_type: TransactionType,
        amount: Decimal,
        system_description: impl Into<String>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            wallet_id: Uuid::nil(),
            user_id: Uuid::nil(),
            origin: origin.into(),
            reference: reference.into(),
            uniqueness_count: 0,
            transaction_type,
            amount,
            user_description: String::new(),
            system_description: system_description.into(),
            category_id: None,
            category_setter_id: None,
            processed_at,
            created_at: processed_at,
        }
    }

    /// The de-duplication key within a wallet.
    ///
    /// The provider reference when there is one, otherwise
    /// `<processed_at>/<origin>/<system_description>/<amount>/<uniqueness_count>`.
    pub fn reference(&self) -> String {
        if !self.reference.is_empty() {
            return self.reference.clone();
        }
        format!(
            "{}/{}/{}/{}/{}",
            self.processed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.origin,
            self.system_description,
            self.amount.normalize(),
            self.uniqueness_count
        )
    }
}

/// Number same-looking candidates that lack a provider reference, in encounter order.
///
/// Two identical purchases on the same day stay distinct rows, and re-parsing
/// the same source yields the same counts. Keyed at whole-second precision,
/// the same precision the fallback reference renders.
pub fn assign_uniqueness_counts(transactions: &mut [Transaction]) {
    let mut seen: HashMap<(i64, String, String, Decimal), u32> = HashMap::new();
    for t in transactions.iter_mut().filter(|t| t.reference.is_empty()) {
        let key = (
            t.processed_at.timestamp(),
            t.origin.clone(),
            t.system_description.clone(),
            t.amount.normalize(),
        );
        let count = seen.entry(key).or_insert(0);
        t.uniqueness_count = *count;
        *count += 1;
    }
}

/// Fill every empty reference with its derived fallback.
pub fn resolve_references(transactions: &mut [Transaction]) {
    assign_uniqueness_counts(transactions);
    for t in transactions.iter_mut() {
        if t.reference.is_empty() {
            t.reference = t.reference();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 12, 0, 0, 0).unwrap()
    }

    #[test]
    fn provider_reference_wins() {
        let t = Transaction::candidate("nu-bank-email", "18d4f0a", TransactionType::Expense, dec!(-10), "x", at());
        assert_eq!(t.reference(), "18d4f0a");
    }

    #[test]
    fn fallback_reference_is_deterministic() {
        let t = Transaction::candidate("nu/savings", "", TransactionType::Expense, dec!(-5000.00), "Envío a Diana E.", at());
        assert_eq!(t.reference(), "2025-04-12T00:00:00Z/nu/savings/Envío a Diana E./-5000/0");
        assert_eq!(t.reference(), t.clone().reference());
    }

    #[test]
    fn identical_candidates_get_increasing_counts() {
        let base = Transaction::candidate("nu/savings", "", TransactionType::Expense, dec!(-5000), "Tienda D1", at());
        let other = Transaction::candidate("nu/savings", "", TransactionType::Expense, dec!(-7000), "Tienda D1", at());
        let mut batch = vec![base.clone(), other, base.clone(), base];

        resolve_references(&mut batch);

        let counts: Vec<u32> = batch.iter().map(|t| t.uniqueness_count).collect();
        assert_eq!(counts, vec![0, 0, 1, 2]);
        assert_ne!(batch[0].reference, batch[2].reference);
        assert!(batch[3].reference.ends_with("/2"));
    }

    #[test]
    fn equal_amounts_with_different_scale_collide() {
        let a = Transaction::candidate("o", "", TransactionType::Expense, dec!(-5000), "d", at());
        let b = Transaction::candidate("o", "", TransactionType::Expense, dec!(-5000.00), "d", at());
        let mut batch = vec![a, b];
        assign_uniqueness_counts(&mut batch);
        assert_eq!(batch[1].uniqueness_count, 1);
    }

    #[test]
    fn sub_second_times_share_a_count_sequence() {
        let first = at() + chrono::Duration::milliseconds(100);
        let second = at() + chrono::Duration::milliseconds(300);
        let mut batch = vec![
            Transaction::candidate("o", "", TransactionType::Expense, dec!(-1), "d", first),
            Transaction::candidate("o", "", TransactionType::Expense, dec!(-1), "d", second),
        ];

        resolve_references(&mut batch);

        assert_eq!(batch[0].uniqueness_count, 0);
        assert_eq!(batch[1].uniqueness_count, 1);
        assert_ne!(batch[0].reference, batch[1].reference);
    }

    #[test]
    fn referenced_candidates_are_not_counted() {
        let mut batch = vec![
            Transaction::candidate("o", "m1", TransactionType::Expense, dec!(-1), "d", at()),
            Transaction::candidate("o", "m2", TransactionType::Expense, dec!(-1), "d", at()),
        ];
        resolve_references(&mut batch);
        assert_eq!(batch[0].reference, "m1");
        assert_eq!(batch[1].reference, "m2");
        assert_eq!(batch[1].uniqueness_count, 0);
    }

    #[test]
    fn transaction_type_round_trips_through_str() {
        for ty in [TransactionType::Expense, TransactionType::Income, TransactionType::Transfer] {
            assert_eq!(ty.as_str().parse::<TransactionType>().unwrap(), ty);
        }
        assert!("refund".parse::<TransactionType>().is_err());
    }
}
