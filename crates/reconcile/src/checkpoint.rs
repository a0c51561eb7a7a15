use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use saldo_core::{Transaction, Unit};

use crate::tracker::{replay, ReplayOutcome};

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Checkpoint construction failed; the rest of the pipeline still runs.
    #[error("Reconciliation unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to parse reconciler config TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Discrepancy thresholds and the repair-iteration budget. These are
/// inputs, not constants baked into the logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub critical_threshold: Decimal,
    pub high_threshold: Decimal,
    pub medium_threshold: Decimal,
    pub max_repair_iterations: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            critical_threshold: Decimal::ONE_HUNDRED,
            high_threshold: Decimal::from(20),
            medium_threshold: Decimal::ONE,
            max_repair_iterations: 3,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ReconcileError> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// Classify an absolute discrepancy; below the medium threshold it is not
/// a discrepancy at all.
pub fn classify(discrepancy_abs: Decimal, config: &ReconcilerConfig) -> Option<Severity> {
    if discrepancy_abs >= config.critical_threshold {
        Some(Severity::Critical)
    } else if discrepancy_abs >= config.high_threshold {
        Some(Severity::High)
    } else if discrepancy_abs >= config.medium_threshold {
        Some(Severity::Medium)
    } else {
        None
    }
}

/// A row where both a computed and a broker-reported running balance exist.
/// Derived data — rebuilt whenever the transaction set changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheckpoint {
    pub row_number: u64,
    pub computed: Decimal,
    pub reported: Decimal,
    /// computed − reported.
    pub discrepancy: Decimal,
    pub severity: Option<Severity>,
}

/// Build checkpoints by replaying the transactions and comparing the cash
/// balance after each one against the reported balance on its source rows.
/// Rows without a reported balance are skipped. Replay failure degrades to
/// `Unavailable` rather than crashing the session.
pub fn build_checkpoints(
    transactions: &[Transaction],
    reported: &BTreeMap<u64, Decimal>,
    base: &Unit,
    config: &ReconcilerConfig,
) -> Result<Vec<BalanceCheckpoint>, ReconcileError> {
    let ReplayOutcome { order, running, .. } =
        replay(transactions, base).map_err(|e| ReconcileError::Unavailable(e.to_string()))?;

    let mut checkpoints = Vec::new();
    for (position, &idx) in order.iter().enumerate() {
        let computed = running[position];
        for row in transactions[idx].source_rows() {
            if let Some(&reported_balance) = reported.get(&row) {
                let discrepancy = computed - reported_balance;
                checkpoints.push(BalanceCheckpoint {
                    row_number: row,
                    computed,
                    reported: reported_balance,
                    discrepancy,
                    severity: classify(discrepancy.abs(), config),
                });
            }
        }
    }
    checkpoints.sort_by_key(|c| c.row_number);
    Ok(checkpoints)
}
