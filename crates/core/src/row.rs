use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw CSV data row as delivered by the external tokenizer.
/// Immutable once created; journal entries reference it by row number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    /// Global 1-based row number, stable across re-parses of the same file set.
    pub row_number: u64,
    pub file_id: String,
    pub fields: BTreeMap<String, String>,
    /// Broker-reported running balance, when the row carries one.
    pub reported_balance: Option<Decimal>,
}

impl SourceRow {
    pub fn new(row_number: u64, file_id: impl Into<String>) -> Self {
        SourceRow {
            row_number,
            file_id: file_id.into(),
            fields: BTreeMap::new(),
            reported_balance: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A row after the external field-mapping engine has applied a parse plan:
/// decimal amounts, parsed dates, trimmed strings. This is the input to the
/// settlement grouper and the categorization oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedRow {
    pub row_number: u64,
    pub file_id: String,
    pub date: Option<NaiveDate>,
    /// Broker action verb ("Buy", "Sell", "Dividend", ...). Empty or absent
    /// on settlement rows.
    pub action: Option<String>,
    pub symbol: Option<String>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub description: String,
    pub reported_balance: Option<Decimal>,
}

impl TypedRow {
    pub fn new(row_number: u64, file_id: impl Into<String>) -> Self {
        TypedRow {
            row_number,
            file_id: file_id.into(),
            date: None,
            action: None,
            symbol: None,
            quantity: None,
            price: None,
            amount: None,
            description: String::new(),
            reported_balance: None,
        }
    }

    /// A row with a non-empty action classifies a new transaction group.
    pub fn is_classifying(&self) -> bool {
        self.action
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }
}

/// Row number → reported running balance, for checkpoint construction.
pub fn reported_balances(rows: &[TypedRow]) -> BTreeMap<u64, Decimal> {
    rows.iter()
        .filter_map(|r| r.reported_balance.map(|b| (r.row_number, b)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn classifying_requires_nonempty_action() {
        let mut row = TypedRow::new(1, "a.csv");
        assert!(!row.is_classifying());
        row.action = Some("  ".to_string());
        assert!(!row.is_classifying());
        row.action = Some("Buy".to_string());
        assert!(row.is_classifying());
    }

    #[test]
    fn reported_balances_skips_rows_without_one() {
        let mut r1 = TypedRow::new(1, "a.csv");
        r1.reported_balance = Some(dec!(100.00));
        let r2 = TypedRow::new(2, "a.csv");
        let mut r3 = TypedRow::new(3, "a.csv");
        r3.reported_balance = Some(dec!(50.00));

        let map = reported_balances(&[r1, r2, r3]);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], dec!(100.00));
        assert_eq!(map[&3], dec!(50.00));
    }

    #[test]
    fn source_row_field_lookup() {
        let mut row = SourceRow::new(7, "export.csv");
        row.fields.insert("Action".to_string(), "Buy".to_string());
        assert_eq!(row.field("Action"), Some("Buy"));
        assert_eq!(row.field("Missing"), None);
    }
}
