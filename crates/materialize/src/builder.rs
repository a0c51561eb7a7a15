use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use saldo_core::{
    AccountKind, JournalEntry, Money, PriceSource, Transaction, TransactionKind, TypedRow,
};

use crate::grouper::{GroupKind, RowGroup};
use crate::profile::InstitutionProfile;

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum MaterializeError {
    #[error("Row {row}: unrecognized action '{action}'")]
    UnknownAction { row: u64, action: String },
    #[error("Row {row}: no parseable date")]
    MissingDate { row: u64 },
    #[error("Row {row}: asset action without a symbol")]
    MissingSymbol { row: u64 },
    #[error("Row {row}: no price for {symbol} and no amount to infer from")]
    MissingPrice { row: u64, symbol: String },
    #[error("Row {row}: no amount and nothing to infer one from")]
    MissingAmount { row: u64 },
    #[error("Row {row}: settlement total {actual} does not net against reported amount {expected}")]
    SettlementMismatch {
        row: u64,
        expected: Decimal,
        actual: Decimal,
    },
    #[error("Rows {rows:?}: settlement rows with no preceding classifying row")]
    OrphanedSettlement { rows: Vec<u64> },
    #[error("Unbalanced result in {unit}: debits={debits}, credits={credits}")]
    Unbalanced {
        unit: String,
        debits: Decimal,
        credits: Decimal,
    },
}

/// A group that could not be materialized, kept for the validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupFailure {
    pub rows: Vec<u64>,
    pub error: MaterializeError,
}

/// Result of materializing a batch of groups. One bad group never blocks
/// the others; orphaned-settlement groups pass through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializeOutcome {
    pub transactions: Vec<Transaction>,
    pub failures: Vec<GroupFailure>,
    pub orphaned: Vec<RowGroup>,
}

/// Converts row groups into balanced double-entry transactions.
pub struct TransactionBuilder<'a, P: PriceSource> {
    profile: &'a InstitutionProfile,
    prices: &'a P,
}

impl<'a, P: PriceSource> TransactionBuilder<'a, P> {
    pub fn new(profile: &'a InstitutionProfile, prices: &'a P) -> Self {
        Self { profile, prices }
    }

    pub fn build_all(&self, groups: &[RowGroup]) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();
        for group in groups {
            if group.kind == GroupKind::OrphanedSettlement {
                outcome.orphaned.push(group.clone());
                continue;
            }
            match self.build(group) {
                Ok(tx) => outcome.transactions.push(tx),
                Err(error) => outcome.failures.push(GroupFailure {
                    rows: group.row_numbers(),
                    error,
                }),
            }
        }
        outcome
    }

    pub fn build(&self, group: &RowGroup) -> Result<Transaction, MaterializeError> {
        let primary = group.primary().ok_or(MaterializeError::OrphanedSettlement {
            rows: group.row_numbers(),
        })?;
        let row = primary.row_number;

        let action = primary.action.as_deref().unwrap_or_default();
        let kind = self
            .profile
            .classify(action)
            .ok_or_else(|| MaterializeError::UnknownAction {
                row,
                action: action.to_string(),
            })?;
        let date = primary.date.ok_or(MaterializeError::MissingDate { row })?;

        // Cash delta, money-in positive. Settlement data is authoritative
        // over inference; an explicit primary amount that contradicts the
        // settlement total is a materialization failure.
        let settlement_total = settlement_total(group.settlements());
        let cash = match (primary.amount, settlement_total) {
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(MaterializeError::SettlementMismatch {
                    row,
                    expected,
                    actual,
                });
            }
            (_, Some(actual)) => actual,
            (Some(amount), None) => amount,
            (None, None) => self.infer_cash(primary, kind)?,
        };

        let description = if primary.description.trim().is_empty() {
            match &primary.symbol {
                Some(symbol) => format!("{kind} {symbol}"),
                None => kind.to_string(),
            }
        } else {
            primary.description.clone()
        };

        let entries = self.legs(primary, kind, cash, group)?;
        let mut tx = Transaction::new(date, description, kind, entries);
        tx.reported_balance = group
            .rows
            .iter()
            .filter_map(|r| r.reported_balance)
            .next_back();

        // Post-condition, not an assumption.
        tx.validate().map_err(|e| match e {
            saldo_core::LedgerError::Unbalanced {
                unit,
                debits,
                credits,
            } => MaterializeError::Unbalanced {
                unit: unit.to_string(),
                debits,
                credits,
            },
            saldo_core::LedgerError::EmptyTransaction => MaterializeError::MissingAmount { row },
        })?;
        Ok(tx)
    }

    fn infer_cash(
        &self,
        primary: &TypedRow,
        kind: TransactionKind,
    ) -> Result<Decimal, MaterializeError> {
        let row = primary.row_number;
        match kind {
            TransactionKind::Buy | TransactionKind::Sell => {
                let symbol = primary
                    .symbol
                    .as_deref()
                    .ok_or(MaterializeError::MissingSymbol { row })?;
                let quantity = primary
                    .quantity
                    .ok_or(MaterializeError::MissingAmount { row })?;
                let price = primary
                    .price
                    .or_else(|| {
                        primary
                            .date
                            .and_then(|d| self.prices.price(symbol, d))
                    })
                    .ok_or_else(|| MaterializeError::MissingPrice {
                        row,
                        symbol: symbol.to_string(),
                    })?;
                let gross = quantity * price;
                Ok(match kind {
                    TransactionKind::Buy => -gross,
                    _ => gross,
                })
            }
            TransactionKind::Split => Ok(Decimal::ZERO),
            _ => Err(MaterializeError::MissingAmount { row }),
        }
    }

    fn legs(
        &self,
        primary: &TypedRow,
        kind: TransactionKind,
        cash: Decimal,
        group: &RowGroup,
    ) -> Result<Vec<JournalEntry>, MaterializeError> {
        let row = primary.row_number;
        let currency = self.profile.base_currency.clone();
        let magnitude = Money::new(cash.abs(), currency.clone());
        let all_rows = group.row_numbers();

        // Share splits move quantity without moving cash.
        if kind == TransactionKind::Split {
            let symbol = primary
                .symbol
                .as_deref()
                .ok_or(MaterializeError::MissingSymbol { row })?;
            let quantity = primary
                .quantity
                .ok_or(MaterializeError::MissingAmount { row })?;
            let leg = JournalEntry::debit(
                AccountKind::Asset,
                symbol,
                Money::zero(currency),
            )
            .with_quantity(quantity, symbol)
            .with_rows(all_rows);
            return Ok(vec![leg]);
        }

        let cash_leg = if cash >= Decimal::ZERO {
            JournalEntry::debit(AccountKind::Cash, &self.profile.cash_account, magnitude.clone())
        } else {
            JournalEntry::credit(AccountKind::Cash, &self.profile.cash_account, magnitude.clone())
        }
        .with_rows(all_rows);

        let (account, name) = match kind {
            TransactionKind::Buy | TransactionKind::Sell => {
                let symbol = primary
                    .symbol
                    .as_deref()
                    .ok_or(MaterializeError::MissingSymbol { row })?;
                (AccountKind::Asset, symbol.to_string())
            }
            TransactionKind::Dividend => (AccountKind::Income, "Dividends".to_string()),
            TransactionKind::Interest => (AccountKind::Income, "Interest".to_string()),
            TransactionKind::Fee => (AccountKind::Expense, "Fees".to_string()),
            TransactionKind::Tax => (AccountKind::Expense, "Tax Withholding".to_string()),
            TransactionKind::Deposit
            | TransactionKind::Withdrawal
            | TransactionKind::TransferIn
            | TransactionKind::TransferOut => (AccountKind::Equity, "Transfers".to_string()),
            TransactionKind::Other => (AccountKind::Equity, "Uncategorized".to_string()),
            TransactionKind::Split => unreachable!("handled above"),
        };

        // The offset leg mirrors the cash leg on the opposite side.
        let mut offset = if cash >= Decimal::ZERO {
            JournalEntry::credit(account, name, magnitude)
        } else {
            JournalEntry::debit(account, name, magnitude)
        }
        .with_rows([row]);

        if matches!(kind, TransactionKind::Buy | TransactionKind::Sell) {
            if let (Some(quantity), Some(symbol)) = (primary.quantity, primary.symbol.as_deref()) {
                offset = offset.with_quantity(quantity, symbol);
            }
        }

        Ok(vec![cash_leg, offset])
    }
}

/// Sum of the settlement rows' cash deltas, when any carry one.
fn settlement_total(settlements: &[TypedRow]) -> Option<Decimal> {
    let amounts: Vec<Decimal> = settlements.iter().filter_map(|r| r.amount).collect();
    if amounts.is_empty() {
        None
    } else {
        Some(amounts.iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouper::{AssetSettlementPattern, SettlementPattern};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use saldo_core::{NoPrices, Side, StaticPriceSource, Unit};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn buy_row(n: u64, symbol: &str, qty: Decimal, price: Option<Decimal>) -> TypedRow {
        let mut row = TypedRow::new(n, "export.csv");
        row.action = Some("Buy".to_string());
        row.symbol = Some(symbol.to_string());
        row.quantity = Some(qty);
        row.price = price;
        row.date = Some(date(2024, 1, 10));
        row
    }

    fn settlement_row(n: u64, amount: Decimal) -> TypedRow {
        let mut row = TypedRow::new(n, "export.csv");
        row.amount = Some(amount);
        row
    }

    fn group_of(rows: Vec<TypedRow>) -> RowGroup {
        RowGroup {
            kind: GroupKind::Primary,
            rows,
        }
    }

    fn build_one(group: &RowGroup) -> Result<Transaction, MaterializeError> {
        let profile = InstitutionProfile::generic();
        let prices = StaticPriceSource::new();
        TransactionBuilder::new(&profile, &prices).build(group)
    }

    #[test]
    fn buy_with_price_produces_balanced_asset_and_cash_legs() {
        let tx = build_one(&group_of(vec![buy_row(1, "AAPL", dec!(10), Some(dec!(150)))])).unwrap();
        assert_eq!(tx.kind, TransactionKind::Buy);
        assert!(tx.is_balanced());

        let cash = tx
            .entries
            .iter()
            .find(|e| e.account == AccountKind::Cash)
            .unwrap();
        assert_eq!(cash.side, Side::Credit);
        assert_eq!(cash.amount.amount, dec!(1500));

        let asset = tx
            .entries
            .iter()
            .find(|e| e.account == AccountKind::Asset)
            .unwrap();
        assert_eq!(asset.side, Side::Debit);
        assert_eq!(asset.quantity, Some(dec!(10)));
        assert_eq!(asset.name, "AAPL");
    }

    #[test]
    fn settlement_amount_overrides_inferred_amount() {
        // Inferred gross is -1500; the settlement reports -1507.95 (commission).
        let group = group_of(vec![
            buy_row(1, "AAPL", dec!(10), Some(dec!(150))),
            settlement_row(2, dec!(-1507.95)),
        ]);
        let tx = build_one(&group).unwrap();
        let cash = tx
            .entries
            .iter()
            .find(|e| e.account == AccountKind::Cash)
            .unwrap();
        assert_eq!(cash.amount.amount, dec!(1507.95));
        assert_eq!(cash.side, Side::Credit);
        assert!(tx.is_balanced());
    }

    #[test]
    fn settlement_contradicting_explicit_amount_fails() {
        let mut primary = buy_row(1, "AAPL", dec!(10), None);
        primary.amount = Some(dec!(-1500));
        let group = group_of(vec![primary, settlement_row(2, dec!(-1400))]);
        assert!(matches!(
            build_one(&group),
            Err(MaterializeError::SettlementMismatch {
                expected,
                actual,
                ..
            }) if expected == dec!(-1500) && actual == dec!(-1400)
        ));
    }

    #[test]
    fn buy_without_price_falls_back_to_price_source() {
        let profile = InstitutionProfile::generic();
        let prices = StaticPriceSource::new().with_price("MSFT", dec!(400));
        let builder = TransactionBuilder::new(&profile, &prices);
        let tx = builder
            .build(&group_of(vec![buy_row(1, "MSFT", dec!(5), None)]))
            .unwrap();
        let cash = tx
            .entries
            .iter()
            .find(|e| e.account == AccountKind::Cash)
            .unwrap();
        assert_eq!(cash.amount.amount, dec!(2000));
    }

    #[test]
    fn buy_with_no_resolvable_price_fails() {
        let profile = InstitutionProfile::generic();
        let builder = TransactionBuilder::new(&profile, &NoPrices);
        assert!(matches!(
            builder.build(&group_of(vec![buy_row(1, "ZZZZ", dec!(5), None)])),
            Err(MaterializeError::MissingPrice { row: 1, .. })
        ));
    }

    #[test]
    fn unknown_action_fails() {
        let mut row = TypedRow::new(1, "export.csv");
        row.action = Some("Quux".to_string());
        row.date = Some(date(2024, 1, 10));
        assert!(matches!(
            build_one(&group_of(vec![row])),
            Err(MaterializeError::UnknownAction { row: 1, .. })
        ));
    }

    #[test]
    fn dividend_credits_income() {
        let mut row = TypedRow::new(3, "export.csv");
        row.action = Some("Dividend".to_string());
        row.amount = Some(dec!(25.50));
        row.date = Some(date(2024, 3, 1));
        let tx = build_one(&group_of(vec![row])).unwrap();
        assert_eq!(tx.kind, TransactionKind::Dividend);
        let income = tx
            .entries
            .iter()
            .find(|e| e.account == AccountKind::Income)
            .unwrap();
        assert_eq!(income.side, Side::Credit);
        assert_eq!(income.name, "Dividends");
        assert!(tx.is_balanced());
    }

    #[test]
    fn cash_legs_cover_all_group_rows() {
        let group = group_of(vec![
            buy_row(4, "AAPL", dec!(10), Some(dec!(150))),
            settlement_row(5, dec!(-1500)),
            settlement_row(6, dec!(0)),
        ]);
        let tx = build_one(&group).unwrap();
        assert_eq!(
            tx.source_rows().into_iter().collect::<Vec<_>>(),
            vec![4, 5, 6]
        );
    }

    #[test]
    fn build_all_collects_failures_without_aborting() {
        let mut bad = TypedRow::new(1, "export.csv");
        bad.action = Some("Mystery".to_string());
        bad.date = Some(date(2024, 1, 10));
        let rows = vec![bad, buy_row(2, "AAPL", dec!(1), Some(dec!(100)))];
        let groups = AssetSettlementPattern.group(&rows);

        let profile = InstitutionProfile::generic();
        let prices = StaticPriceSource::new();
        let outcome = TransactionBuilder::new(&profile, &prices).build_all(&groups);

        assert_eq!(outcome.transactions.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].rows, vec![1]);
    }

    #[test]
    fn build_all_passes_orphans_through() {
        let rows = vec![settlement_row(1, dec!(10)), buy_row(2, "AAPL", dec!(1), Some(dec!(100)))];
        let groups = AssetSettlementPattern.group(&rows);

        let profile = InstitutionProfile::generic();
        let prices = StaticPriceSource::new();
        let outcome = TransactionBuilder::new(&profile, &prices).build_all(&groups);

        assert_eq!(outcome.orphaned.len(), 1);
        assert_eq!(outcome.orphaned[0].row_numbers(), vec![1]);
        assert_eq!(outcome.transactions.len(), 1);
    }

    #[test]
    fn reported_balance_snapshot_comes_from_last_carrying_row() {
        let mut s = settlement_row(2, dec!(-1500));
        s.reported_balance = Some(dec!(8500));
        let group = group_of(vec![buy_row(1, "AAPL", dec!(10), Some(dec!(150))), s]);
        let tx = build_one(&group).unwrap();
        assert_eq!(tx.reported_balance, Some(dec!(8500)));
    }

    #[test]
    fn every_built_transaction_is_balanced() {
        let profile = InstitutionProfile::generic();
        let prices = StaticPriceSource::new().with_price("AAPL", dec!(150));
        let builder = TransactionBuilder::new(&profile, &prices);

        let mut div = TypedRow::new(3, "export.csv");
        div.action = Some("Dividend".to_string());
        div.amount = Some(dec!(12.34));
        div.date = Some(date(2024, 2, 1));

        let mut fee = TypedRow::new(4, "export.csv");
        fee.action = Some("Fee".to_string());
        fee.amount = Some(dec!(-7.00));
        fee.date = Some(date(2024, 2, 2));

        let rows = vec![buy_row(1, "AAPL", dec!(2), None), div, fee];
        let outcome = builder.build_all(&AssetSettlementPattern.group(&rows));
        assert_eq!(outcome.transactions.len(), 3);
        assert!(outcome.transactions.iter().all(Transaction::is_balanced));
        assert_eq!(
            outcome.transactions[0].entries[0].amount.unit,
            Unit::usd()
        );
    }
}
