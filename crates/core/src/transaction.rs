use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use super::journal::JournalEntry;
use super::money::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Buy,
    Sell,
    Dividend,
    Interest,
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Fee,
    Tax,
    Split,
    Other,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Buy => "Buy",
            TransactionKind::Sell => "Sell",
            TransactionKind::Dividend => "Dividend",
            TransactionKind::Interest => "Interest",
            TransactionKind::Deposit => "Deposit",
            TransactionKind::Withdrawal => "Withdrawal",
            TransactionKind::TransferIn => "TransferIn",
            TransactionKind::TransferOut => "TransferOut",
            TransactionKind::Fee => "Fee",
            TransactionKind::Tax => "Tax",
            TransactionKind::Split => "Split",
            TransactionKind::Other => "Other",
        };
        write!(f, "{s}")
    }
}

/// Per-unit debit/credit totals that fail to net out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Imbalance {
    pub unit: Unit,
    pub debits: Decimal,
    pub credits: Decimal,
}

impl Imbalance {
    pub fn shortfall(&self) -> Decimal {
        self.debits - self.credits
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Unbalanced transaction in {unit}: debits={debits}, credits={credits}")]
    Unbalanced {
        unit: Unit,
        debits: Decimal,
        credits: Decimal,
    },
    #[error("Transaction has no journal entries")]
    EmptyTransaction,
}

/// One economic event as a set of journal legs. Leg composition is immutable
/// once built; corrections replace the whole transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub kind: TransactionKind,
    pub entries: Vec<JournalEntry>,
    /// Broker-reported balance snapshot, when the source rows carried one.
    pub reported_balance: Option<Decimal>,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        description: impl Into<String>,
        kind: TransactionKind,
        entries: Vec<JournalEntry>,
    ) -> Self {
        Transaction {
            date,
            description: description.into(),
            kind,
            entries,
            reported_balance: None,
        }
    }

    /// Union of source row numbers across all legs.
    pub fn source_rows(&self) -> BTreeSet<u64> {
        self.entries
            .iter()
            .flat_map(|e| e.source_rows.iter().copied())
            .collect()
    }

    /// Smallest source row referenced — the replay tie-breaker for same-date
    /// transactions (broker exports list most-recent-first).
    pub fn min_source_row(&self) -> Option<u64> {
        self.entries
            .iter()
            .flat_map(|e| e.source_rows.iter().copied())
            .min()
    }

    /// Debit and credit totals grouped by unit.
    pub fn balance_by_unit(&self) -> BTreeMap<Unit, (Decimal, Decimal)> {
        let mut totals: BTreeMap<Unit, (Decimal, Decimal)> = BTreeMap::new();
        for entry in &self.entries {
            let slot = totals
                .entry(entry.amount.unit.clone())
                .or_insert((Decimal::ZERO, Decimal::ZERO));
            slot.0 += entry.debit_amount();
            slot.1 += entry.credit_amount();
        }
        totals
    }

    /// Unit groups where debits != credits, exact decimal comparison.
    pub fn imbalances(&self) -> Vec<Imbalance> {
        self.balance_by_unit()
            .into_iter()
            .filter(|(_, (d, c))| d != c)
            .map(|(unit, (debits, credits))| Imbalance {
                unit,
                debits,
                credits,
            })
            .collect()
    }

    pub fn is_balanced(&self) -> bool {
        !self.entries.is_empty() && self.imbalances().is_empty()
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.entries.is_empty() {
            return Err(LedgerError::EmptyTransaction);
        }
        if let Some(im) = self.imbalances().into_iter().next() {
            return Err(LedgerError::Unbalanced {
                unit: im.unit,
                debits: im.debits,
                credits: im.credits,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{AccountKind, JournalEntry};
    use crate::money::Money;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cash_pair(amount: Decimal) -> Vec<JournalEntry> {
        vec![
            JournalEntry::debit(AccountKind::Cash, "Cash", Money::usd(amount)).with_rows([1]),
            JournalEntry::credit(AccountKind::Income, "Dividends", Money::usd(amount))
                .with_rows([1]),
        ]
    }

    #[test]
    fn balanced_transaction_validates() {
        let tx = Transaction::new(
            date(2024, 3, 1),
            "Dividend",
            TransactionKind::Dividend,
            cash_pair(dec!(12.34)),
        );
        assert!(tx.validate().is_ok());
        assert!(tx.is_balanced());
    }

    #[test]
    fn unbalanced_transaction_names_the_unit_and_amounts() {
        let entries = vec![
            JournalEntry::debit(AccountKind::Cash, "Cash", Money::usd(dec!(100))),
            JournalEntry::credit(AccountKind::Income, "Dividends", Money::usd(dec!(90))),
        ];
        let tx = Transaction::new(date(2024, 3, 1), "Bad", TransactionKind::Dividend, entries);
        match tx.validate() {
            Err(LedgerError::Unbalanced {
                unit,
                debits,
                credits,
            }) => {
                assert_eq!(unit, crate::money::Unit::usd());
                assert_eq!(debits, dec!(100));
                assert_eq!(credits, dec!(90));
            }
            other => panic!("expected Unbalanced, got {other:?}"),
        }
    }

    #[test]
    fn empty_transaction_rejected() {
        let tx = Transaction::new(date(2024, 3, 1), "Empty", TransactionKind::Other, vec![]);
        assert!(matches!(tx.validate(), Err(LedgerError::EmptyTransaction)));
    }

    #[test]
    fn balance_is_checked_per_unit_group() {
        // A buy: USD legs balance, and the share unit appears only on the
        // asset leg's quantity, not as a money unit — one unit group.
        let entries = vec![
            JournalEntry::debit(AccountKind::Asset, "AAPL", Money::usd(dec!(1500)))
                .with_quantity(dec!(10), "AAPL")
                .with_rows([2]),
            JournalEntry::credit(AccountKind::Cash, "Cash", Money::usd(dec!(1500))).with_rows([3]),
        ];
        let tx = Transaction::new(date(2024, 3, 1), "Buy AAPL", TransactionKind::Buy, entries);
        assert!(tx.validate().is_ok());
        assert_eq!(tx.balance_by_unit().len(), 1);
    }

    #[test]
    fn exact_decimal_equality_no_tolerance() {
        let entries = vec![
            JournalEntry::debit(AccountKind::Cash, "Cash", Money::usd(dec!(10.001))),
            JournalEntry::credit(AccountKind::Income, "Interest", Money::usd(dec!(10.00))),
        ];
        let tx = Transaction::new(date(2024, 3, 1), "Off", TransactionKind::Interest, entries);
        assert!(!tx.is_balanced());
    }

    #[test]
    fn source_rows_union_and_min() {
        let entries = vec![
            JournalEntry::debit(AccountKind::Cash, "Cash", Money::usd(dec!(5))).with_rows([4, 5]),
            JournalEntry::credit(AccountKind::Income, "Interest", Money::usd(dec!(5)))
                .with_rows([2]),
        ];
        let tx = Transaction::new(date(2024, 3, 1), "x", TransactionKind::Interest, entries);
        assert_eq!(tx.source_rows().into_iter().collect::<Vec<_>>(), vec![2, 4, 5]);
        assert_eq!(tx.min_source_row(), Some(2));
    }
}
