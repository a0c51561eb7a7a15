use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use saldo_core::{AccountKind, JournalEntry, Side, Transaction, Unit};

use crate::checkpoint::{
    build_checkpoints, BalanceCheckpoint, ReconcileError, ReconcilerConfig, Severity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcilerState {
    Idle,
    BuildingCheckpoints,
    DiscrepancyFound(Severity),
    Repairing,
    Resolved,
    Exhausted,
}

/// Proposes replacement transactions for the worst checkpoint. `None` means
/// the corrector cannot help with this discrepancy.
pub trait Corrector {
    fn propose(
        &self,
        worst: &BalanceCheckpoint,
        transactions: &[Transaction],
    ) -> Option<Vec<Transaction>>;
}

/// Rule-based corrector that trusts the broker-reported balance: it shifts
/// the cash leg of the transaction covering the worst row by the
/// discrepancy and moves the offset leg with it to keep the transaction
/// balanced. The corrected transaction replaces the original wholesale.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportedBalanceCorrector;

impl Corrector for ReportedBalanceCorrector {
    fn propose(
        &self,
        worst: &BalanceCheckpoint,
        transactions: &[Transaction],
    ) -> Option<Vec<Transaction>> {
        let target = transactions
            .iter()
            .position(|tx| tx.source_rows().contains(&worst.row_number))?;
        let corrected = shift_cash_effect(&transactions[target], worst.discrepancy)?;

        let mut next = transactions.to_vec();
        next[target] = corrected;
        Some(next)
    }
}

/// Rebuild a transaction with its cash effect reduced by `delta`, adjusting
/// the first non-cash leg identically so debits still equal credits.
fn shift_cash_effect(tx: &Transaction, delta: Decimal) -> Option<Transaction> {
    let cash_idx = tx.entries.iter().position(|e| e.account == AccountKind::Cash)?;
    let offset_idx = tx.entries.iter().position(|e| e.account != AccountKind::Cash)?;

    let mut corrected = tx.clone();
    // Cash effect is debit − credit; reducing it by delta means a debit leg
    // shrinks and a credit leg grows.
    let adjustment = match corrected.entries[cash_idx].side {
        Side::Debit => -delta,
        Side::Credit => delta,
    };
    adjust_leg(&mut corrected.entries[cash_idx], adjustment);
    adjust_leg(&mut corrected.entries[offset_idx], adjustment);
    corrected.validate().ok()?;
    Some(corrected)
}

/// Leg amounts stay non-negative: an adjustment that crosses zero flips the
/// leg to the other side instead of recording a negative amount.
fn adjust_leg(entry: &mut JournalEntry, adjustment: Decimal) {
    let next = entry.amount.amount + adjustment;
    if next < Decimal::ZERO {
        entry.side = match entry.side {
            Side::Debit => Side::Credit,
            Side::Credit => Side::Debit,
        };
        entry.amount.amount = -next;
    } else {
        entry.amount.amount = next;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub state: ReconcilerState,
    pub checkpoints: Vec<BalanceCheckpoint>,
    pub iterations: usize,
    /// The transaction list after any repairs; unchanged when already clean.
    pub transactions: Vec<Transaction>,
    /// Every state the reconciler passed through, in order.
    pub trace: Vec<ReconcilerState>,
}

impl ReconciliationOutcome {
    pub fn remaining_discrepancies(&self) -> Vec<&BalanceCheckpoint> {
        self.checkpoints
            .iter()
            .filter(|c| c.severity.is_some())
            .collect()
    }
}

/// The bounded repair loop. Deterministic: given the same transactions,
/// reported balances, and corrector, the end state is always the same.
pub struct Reconciler<'a, C: Corrector> {
    config: &'a ReconcilerConfig,
    corrector: &'a C,
}

impl<'a, C: Corrector> Reconciler<'a, C> {
    pub fn new(config: &'a ReconcilerConfig, corrector: &'a C) -> Self {
        Self { config, corrector }
    }

    pub fn run(
        &self,
        transactions: Vec<Transaction>,
        reported: &BTreeMap<u64, Decimal>,
        base: &Unit,
    ) -> Result<ReconciliationOutcome, ReconcileError> {
        let mut transactions = transactions;
        let mut trace = vec![ReconcilerState::Idle, ReconcilerState::BuildingCheckpoints];
        let mut checkpoints = build_checkpoints(&transactions, reported, base, self.config)?;

        if worst_of(&checkpoints).is_none() {
            // Already clean: zero repair iterations, idempotent by design.
            trace.push(ReconcilerState::Resolved);
            return Ok(ReconciliationOutcome {
                state: ReconcilerState::Resolved,
                checkpoints,
                iterations: 0,
                transactions,
                trace,
            });
        }

        let mut iterations = 0;
        while iterations < self.config.max_repair_iterations {
            let Some(worst) = worst_of(&checkpoints).cloned() else {
                break;
            };
            if let Some(severity) = worst.severity {
                trace.push(ReconcilerState::DiscrepancyFound(severity));
            }
            tracing::info!(
                iteration = iterations + 1,
                row = worst.row_number,
                discrepancy = %worst.discrepancy,
                "repairing worst checkpoint"
            );

            let Some(proposal) = self.corrector.propose(&worst, &transactions) else {
                // Corrector has nothing to offer; further iterations would
                // loop on the same checkpoint.
                break;
            };
            trace.push(ReconcilerState::Repairing);
            iterations += 1;
            transactions = proposal;
            checkpoints = build_checkpoints(&transactions, reported, base, self.config)?;
        }

        let state = if worst_of(&checkpoints).is_none() {
            ReconcilerState::Resolved
        } else {
            tracing::warn!(
                remaining = checkpoints.iter().filter(|c| c.severity.is_some()).count(),
                "repair budget exhausted with discrepancies remaining"
            );
            ReconcilerState::Exhausted
        };
        trace.push(state);
        Ok(ReconciliationOutcome {
            state,
            checkpoints,
            iterations,
            transactions,
            trace,
        })
    }
}

/// The checkpoint with the largest absolute discrepancy among those that
/// classify as discrepancies; ties go to the smallest row number.
fn worst_of(checkpoints: &[BalanceCheckpoint]) -> Option<&BalanceCheckpoint> {
    checkpoints
        .iter()
        .filter(|c| c.severity.is_some())
        .max_by(|a, b| {
            a.discrepancy
                .abs()
                .cmp(&b.discrepancy.abs())
                .then(b.row_number.cmp(&a.row_number))
        })
}
