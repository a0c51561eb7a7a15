use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use saldo_core::{AccountKind, Money, Side, Transaction, Unit};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReplayError {
    #[error("Journal leg in {found} cannot be replayed against base currency {base}")]
    UnitMismatch { found: Unit, base: Unit },
}

/// Per-asset running quantity and cost basis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: Decimal,
    pub cost_basis: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub cash: Money,
    pub positions: BTreeMap<String, Position>,
}

/// Data-quality observations made during replay. None of these abort the
/// replay; the validation report decides how loudly to surface them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayWarning {
    /// A sell took the position negative. Preserved, not rejected.
    Oversold {
        symbol: String,
        row: Option<u64>,
        resulting_quantity: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub state: LedgerState,
    /// Indices into the input slice, in replay order.
    pub order: Vec<usize>,
    /// Cash balance after each transaction, parallel to `order`.
    pub running: Vec<Decimal>,
    pub warnings: Vec<ReplayWarning>,
}

/// Replay order: ascending date, ties broken by ascending minimum source
/// row. Broker exports list most-recent-first, so the smallest row number
/// in a same-date cluster is the latest event; the minimum-row tie-break
/// keeps re-runs deterministic either way.
pub fn replay_order(transactions: &[Transaction]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..transactions.len()).collect();
    order.sort_by_key(|&i| {
        (
            transactions[i].date,
            transactions[i].min_source_row().unwrap_or(u64::MAX),
        )
    });
    order
}

/// Pure left-fold over the ordered transaction list. Two calls on the same
/// input produce identical outcomes; no accumulator state survives a call.
pub fn replay(transactions: &[Transaction], base: &Unit) -> Result<ReplayOutcome, ReplayError> {
    let order = replay_order(transactions);
    let mut cash = Decimal::ZERO;
    let mut positions: BTreeMap<String, Position> = BTreeMap::new();
    let mut running = Vec::with_capacity(order.len());
    let mut warnings = Vec::new();

    for &idx in &order {
        let tx = &transactions[idx];
        for entry in &tx.entries {
            if entry.amount.unit != *base {
                return Err(ReplayError::UnitMismatch {
                    found: entry.amount.unit.clone(),
                    base: base.clone(),
                });
            }
            match entry.account {
                AccountKind::Cash => {
                    cash += entry.debit_amount() - entry.credit_amount();
                }
                AccountKind::Asset => {
                    if let Some(quantity) = entry.quantity {
                        apply_asset_leg(
                            &mut positions,
                            &mut warnings,
                            entry.name.clone(),
                            entry.side,
                            quantity,
                            entry.amount.amount,
                            entry.source_rows.iter().copied().min(),
                        );
                    }
                }
                // Income/expense/equity/liability legs have no cash or
                // position effect at this layer.
                _ => {}
            }
        }
        running.push(cash);
    }

    Ok(ReplayOutcome {
        state: LedgerState {
            cash: Money::new(cash, base.clone()),
            positions,
        },
        order,
        running,
        warnings,
    })
}

fn apply_asset_leg(
    positions: &mut BTreeMap<String, Position>,
    warnings: &mut Vec<ReplayWarning>,
    symbol: String,
    side: Side,
    quantity: Decimal,
    amount: Decimal,
    row: Option<u64>,
) {
    let position = positions.entry(symbol.clone()).or_default();
    match side {
        Side::Debit => {
            position.quantity += quantity;
            position.cost_basis += amount;
        }
        Side::Credit => {
            // Proportional cost-basis reduction on a partial sell. Selling
            // more than held is preserved as a negative quantity and
            // flagged, not rejected.
            if position.quantity > Decimal::ZERO {
                let reduction = (quantity / position.quantity) * position.cost_basis;
                position.cost_basis -= reduction;
            }
            position.quantity -= quantity;
            if position.quantity < Decimal::ZERO {
                warnings.push(ReplayWarning::Oversold {
                    symbol,
                    row,
                    resulting_quantity: position.quantity,
                });
            }
        }
    }
}
