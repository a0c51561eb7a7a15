use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Cash,
    Asset,
    Equity,
    Income,
    Expense,
    Liability,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Cash => write!(f, "Cash"),
            AccountKind::Asset => write!(f, "Asset"),
            AccountKind::Equity => write!(f, "Equity"),
            AccountKind::Income => write!(f, "Income"),
            AccountKind::Expense => write!(f, "Expense"),
            AccountKind::Liability => write!(f, "Liability"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Debit,
    Credit,
}

/// One leg of a double-entry transaction. A leg is exactly one of debit or
/// credit by construction; it carries the set of source rows it derives from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub account: AccountKind,
    /// Account name ("Brokerage Cash") or asset symbol ("AAPL").
    pub name: String,
    pub side: Side,
    pub amount: Money,
    /// Share quantity, for asset legs.
    pub quantity: Option<Decimal>,
    pub quantity_unit: Option<String>,
    pub source_rows: BTreeSet<u64>,
}

impl JournalEntry {
    pub fn debit(account: AccountKind, name: impl Into<String>, amount: Money) -> Self {
        Self::leg(account, name, Side::Debit, amount)
    }

    pub fn credit(account: AccountKind, name: impl Into<String>, amount: Money) -> Self {
        Self::leg(account, name, Side::Credit, amount)
    }

    fn leg(account: AccountKind, name: impl Into<String>, side: Side, amount: Money) -> Self {
        JournalEntry {
            account,
            name: name.into(),
            side,
            amount,
            quantity: None,
            quantity_unit: None,
            source_rows: BTreeSet::new(),
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal, unit: impl Into<String>) -> Self {
        self.quantity = Some(quantity);
        self.quantity_unit = Some(unit.into());
        self
    }

    pub fn with_rows<I: IntoIterator<Item = u64>>(mut self, rows: I) -> Self {
        self.source_rows.extend(rows);
        self
    }

    pub fn debit_amount(&self) -> Decimal {
        match self.side {
            Side::Debit => self.amount.amount,
            Side::Credit => Decimal::ZERO,
        }
    }

    pub fn credit_amount(&self) -> Decimal {
        match self.side {
            Side::Credit => self.amount.amount,
            Side::Debit => Decimal::ZERO,
        }
    }
}
