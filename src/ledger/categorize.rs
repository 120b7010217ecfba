//! Pattern-based category assignment for freshly parsed candidates.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::ids::is_sentinel_setter;
use crate::ledger::Transaction;

/// A wallet category and the description fragments that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category_id: Uuid,
    pub wallet_id: Uuid,
    pub name: String,
    /// Case-insensitive substrings matched against `system_description`.
    pub patterns: Vec<String>,
}

impl CategoryRule {
    pub fn matches(&self, description: &str) -> bool {
        let description = description.to_lowercase();
        self.patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .any(|p| description.contains(&p.to_lowercase()))
    }
}

/// Tag candidates whose category no real actor has set.
///
/// Rules are evaluated in order and the last one that matches wins, so a rule
/// created later overrides an older, broader one. The setter is the nil id so a
/// later human or rule assignment can replace it.
/// Returns how many candidates were tagged.
pub fn apply_category_rules(rules: &[CategoryRule], transactions: &mut [Transaction]) -> usize {
    let mut tagged = 0;
    let unconfirmed = |t: &Transaction| {
        is_sentinel_setter(t.category_setter_id.map(|s| s.to_string()).as_deref())
    };
    for t in transactions.iter_mut().filter(|t| unconfirmed(t)) {
        if let Some(rule) = rules.iter().rev().find(|r| r.matches(&t.system_description)) {
            debug!(category = %rule.name, description = %t.system_description, "Category rule matched");
            t.category_id = Some(rule.category_id);
            t.category_setter_id = Some(Uuid::nil());
            tagged += 1;
        }
    }
    tagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn rule(name: &str, patterns: &[&str]) -> CategoryRule {
        CategoryRule {
            category_id: Uuid::now_v7(),
            wallet_id: Uuid::nil(),
            name: name.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn txn(desc: &str) -> Transaction {
        Transaction::candidate("nu-bank-email", "r", TransactionType::Expense, dec!(-1), desc, Utc::now())
    }

    #[test]
    fn matches_case_insensitively() {
        assert!(rule("Mercado", &["tienda d1"]).matches("TIENDA D1 CALLE 80"));
        assert!(!rule("Mercado", &["ara"]).matches("Rappi"));
    }

    #[test]
    fn blank_patterns_never_match() {
        assert!(!rule("Todo", &["", "  "]).matches("anything"));
    }

    #[test]
    fn matching_rules_tag_with_sentinel_setter() {
        let food = rule("Comida", &["rappi"]);
        let taxes = rule("Impuestos", &["4x1.000"]);
        let mut batch = vec![txn("RAPPI COLOMBIA"), txn("4x1.000"), txn("Envío a Diana E.")];

        let tagged = apply_category_rules(&[food.clone(), taxes.clone()], &mut batch);

        assert_eq!(tagged, 2);
        assert_eq!(batch[0].category_id, Some(food.category_id));
        assert_eq!(batch[0].category_setter_id, Some(Uuid::nil()));
        assert_eq!(batch[1].category_id, Some(taxes.category_id));
        assert_eq!(batch[2].category_id, None);
        assert_eq!(batch[2].category_setter_id, None);
    }

    #[test]
    fn later_overlapping_rule_wins() {
        let transfers = rule("Transferencias", &["envío"]);
        let family = rule("Familia", &["diana"]);
        let mut batch = vec![txn("Envío a Diana E."), txn("Envío a Carlos R.")];

        apply_category_rules(&[transfers.clone(), family.clone()], &mut batch);

        assert_eq!(batch[0].category_id, Some(family.category_id));
        assert_eq!(batch[1].category_id, Some(transfers.category_id));
    }

    #[test]
    fn human_categorized_candidates_are_left_alone() {
        let existing = Uuid::now_v7();
        let mut t = txn("rappi");
        t.category_id = Some(existing);
        t.category_setter_id = Some(Uuid::now_v7());
        let mut batch = vec![t];
        assert_eq!(apply_category_rules(&[rule("Comida", &["rappi"])], &mut batch), 0);
        assert_eq!(batch[0].category_id, Some(existing));
    }
}
