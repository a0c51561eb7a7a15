use serde::{Deserialize, Serialize};

use saldo_core::Transaction;
use saldo_materialize::{GroupFailure, RowGroup};

use crate::checkpoint::Severity;
use crate::coverage::CoverageSummary;
use crate::reconciler::{ReconciliationOutcome, ReconcilerState};
use crate::tracker::ReplayWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    UnbalancedTransaction,
    OrphanedSettlement,
    CoverageGap,
    BalanceDiscrepancy,
    Oversold,
    RepairExhausted,
    MaterializationFailed,
    ReconciliationUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub kind: IssueKind,
    pub message: String,
    pub rows: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Pass,
    Warning,
    Critical,
}

/// Everything the reporter aggregates. Pure data in, pure data out.
pub struct ReportInputs<'a> {
    pub transactions: &'a [Transaction],
    pub coverage: CoverageSummary,
    pub orphaned: &'a [RowGroup],
    pub failures: &'a [GroupFailure],
    pub replay_warnings: &'a [ReplayWarning],
    pub reconciliation: Option<&'a ReconciliationOutcome>,
    /// Reason checkpoint construction was skipped, when it was.
    pub reconciliation_unavailable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: ReportStatus,
    pub coverage: CoverageSummary,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn assemble(inputs: ReportInputs<'_>) -> Self {
        let mut issues = Vec::new();

        for tx in inputs.transactions {
            if let Err(e) = tx.validate() {
                issues.push(Issue {
                    severity: IssueSeverity::Critical,
                    kind: IssueKind::UnbalancedTransaction,
                    message: format!("{} ({}): {e}", tx.description, tx.date),
                    rows: tx.source_rows().into_iter().collect(),
                });
            }
        }

        for group in inputs.orphaned {
            issues.push(Issue {
                severity: IssueSeverity::Critical,
                kind: IssueKind::OrphanedSettlement,
                message: "Settlement row with no preceding classifying row".to_string(),
                rows: group.row_numbers(),
            });
        }

        for failure in inputs.failures {
            issues.push(Issue {
                severity: IssueSeverity::Warning,
                kind: IssueKind::MaterializationFailed,
                message: failure.error.to_string(),
                rows: failure.rows.clone(),
            });
        }

        if !inputs.coverage.gaps.is_empty() {
            issues.push(Issue {
                severity: IssueSeverity::Warning,
                kind: IssueKind::CoverageGap,
                message: format!("{} source row(s) not covered by any transaction", inputs.coverage.gaps.len()),
                rows: inputs.coverage.gaps.iter().copied().collect(),
            });
        }

        for warning in inputs.replay_warnings {
            match warning {
                ReplayWarning::Oversold {
                    symbol,
                    row,
                    resulting_quantity,
                } => issues.push(Issue {
                    severity: IssueSeverity::Warning,
                    kind: IssueKind::Oversold,
                    message: format!("Sold more {symbol} than held (resulting quantity {resulting_quantity})"),
                    rows: row.iter().copied().collect(),
                }),
            }
        }

        if let Some(outcome) = inputs.reconciliation {
            for checkpoint in &outcome.checkpoints {
                if let Some(severity) = checkpoint.severity {
                    issues.push(Issue {
                        severity: match severity {
                            Severity::Critical => IssueSeverity::Critical,
                            Severity::High | Severity::Medium => IssueSeverity::Warning,
                        },
                        kind: IssueKind::BalanceDiscrepancy,
                        message: format!(
                            "Row {}: computed {} vs reported {} (off by {})",
                            checkpoint.row_number,
                            checkpoint.computed,
                            checkpoint.reported,
                            checkpoint.discrepancy,
                        ),
                        rows: vec![checkpoint.row_number],
                    });
                }
            }
            if outcome.state == ReconcilerState::Exhausted {
                issues.push(Issue {
                    severity: IssueSeverity::Warning,
                    kind: IssueKind::RepairExhausted,
                    message: format!(
                        "Repair budget exhausted after {} iteration(s)",
                        outcome.iterations
                    ),
                    rows: vec![],
                });
            }
        }

        if let Some(reason) = inputs.reconciliation_unavailable {
            issues.push(Issue {
                severity: IssueSeverity::Warning,
                kind: IssueKind::ReconciliationUnavailable,
                message: reason,
                rows: vec![],
            });
        }

        let status = if issues.iter().any(|i| i.severity == IssueSeverity::Critical) {
            ReportStatus::Critical
        } else if issues.is_empty() {
            ReportStatus::Pass
        } else {
            ReportStatus::Warning
        };

        ValidationReport {
            status,
            coverage: inputs.coverage,
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use saldo_core::{AccountKind, JournalEntry, Money, TransactionKind};
    use saldo_materialize::{GroupKind, MaterializeError};
    use std::collections::BTreeSet;

    fn balanced_tx(row: u64) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "ok",
            TransactionKind::Deposit,
            vec![
                JournalEntry::debit(AccountKind::Cash, "Cash", Money::usd(dec!(10)))
                    .with_rows([row]),
                JournalEntry::credit(AccountKind::Equity, "Transfers", Money::usd(dec!(10)))
                    .with_rows([row]),
            ],
        )
    }

    fn unbalanced_tx(row: u64) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "bad",
            TransactionKind::Deposit,
            vec![
                JournalEntry::debit(AccountKind::Cash, "Cash", Money::usd(dec!(10)))
                    .with_rows([row]),
                JournalEntry::credit(AccountKind::Equity, "Transfers", Money::usd(dec!(9)))
                    .with_rows([row]),
            ],
        )
    }

    fn inputs_for(transactions: &[Transaction]) -> ReportInputs<'_> {
        ReportInputs {
            transactions,
            coverage: CoverageSummary::compute(
                transactions.len() as u64,
                &BTreeSet::new(),
                transactions,
            ),
            orphaned: &[],
            failures: &[],
            replay_warnings: &[],
            reconciliation: None,
            reconciliation_unavailable: None,
        }
    }

    #[test]
    fn clean_session_passes() {
        let txs = vec![balanced_tx(1)];
        let report = ValidationReport::assemble(inputs_for(&txs));
        assert_eq!(report.status, ReportStatus::Pass);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn unbalanced_transaction_is_critical() {
        let txs = vec![unbalanced_tx(1)];
        let report = ValidationReport::assemble(inputs_for(&txs));
        assert_eq!(report.status, ReportStatus::Critical);
        assert_eq!(report.issues[0].kind, IssueKind::UnbalancedTransaction);
    }

    #[test]
    fn orphaned_settlement_is_critical() {
        let txs = vec![balanced_tx(2)];
        let orphan = RowGroup {
            kind: GroupKind::OrphanedSettlement,
            rows: vec![saldo_core::TypedRow::new(1, "export.csv")],
        };
        let mut inputs = inputs_for(&txs);
        let orphans = [orphan];
        inputs.orphaned = &orphans;
        // Row 1 is uncovered too, but the orphan is what makes this critical.
        let report = ValidationReport::assemble(inputs);
        assert_eq!(report.status, ReportStatus::Critical);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::OrphanedSettlement && i.rows == vec![1]));
    }

    #[test]
    fn gaps_and_failures_are_warnings() {
        let txs = vec![balanced_tx(1)];
        let mut inputs = ReportInputs {
            coverage: CoverageSummary::compute(3, &BTreeSet::new(), &txs),
            ..inputs_for(&txs)
        };
        let failures = [GroupFailure {
            rows: vec![2],
            error: MaterializeError::MissingDate { row: 2 },
        }];
        inputs.failures = &failures;
        let report = ValidationReport::assemble(inputs);
        assert_eq!(report.status, ReportStatus::Warning);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::CoverageGap));
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::MaterializationFailed));
    }

    #[test]
    fn oversold_replay_warning_is_surfaced() {
        let txs = vec![balanced_tx(1)];
        let mut inputs = inputs_for(&txs);
        let warnings = [ReplayWarning::Oversold {
            symbol: "VTI".to_string(),
            row: Some(1),
            resulting_quantity: dec!(-5),
        }];
        inputs.replay_warnings = &warnings;
        let report = ValidationReport::assemble(inputs);
        assert_eq!(report.status, ReportStatus::Warning);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::Oversold));
    }

    #[test]
    fn reconciliation_unavailable_degrades_to_warning() {
        let txs = vec![balanced_tx(1)];
        let mut inputs = inputs_for(&txs);
        inputs.reconciliation_unavailable = Some("missing price data".to_string());
        let report = ValidationReport::assemble(inputs);
        assert_eq!(report.status, ReportStatus::Warning);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::ReconciliationUnavailable));
    }
}
