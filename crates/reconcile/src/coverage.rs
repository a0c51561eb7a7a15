use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use saldo_core::Transaction;

/// Union of source row numbers referenced by any journal leg. Always
/// recomputed from the transaction list — no incremental counters to drift.
pub fn coverage(transactions: &[Transaction]) -> BTreeSet<u64> {
    transactions
        .iter()
        .flat_map(|tx| tx.source_rows())
        .collect()
}

/// Rows in 1..=total_rows that are neither covered nor explicitly excluded.
pub fn find_gaps(
    total_rows: u64,
    excluded: &BTreeSet<u64>,
    covered: &BTreeSet<u64>,
) -> BTreeSet<u64> {
    (1..=total_rows)
        .filter(|n| !covered.contains(n) && !excluded.contains(n))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub total_rows: u64,
    pub covered: u64,
    pub excluded: u64,
    pub gaps: BTreeSet<u64>,
    /// covered / (total − excluded), exact decimal; 1 when nothing counts.
    pub percentage: Decimal,
}

impl CoverageSummary {
    pub fn compute(
        total_rows: u64,
        excluded: &BTreeSet<u64>,
        transactions: &[Transaction],
    ) -> Self {
        let covered_set = coverage(transactions);
        let gaps = find_gaps(total_rows, excluded, &covered_set);
        let countable = total_rows.saturating_sub(excluded.len() as u64);
        let covered = covered_set
            .iter()
            .filter(|n| **n <= total_rows && !excluded.contains(n))
            .count() as u64;
        let percentage = if countable == 0 {
            Decimal::ONE
        } else {
            Decimal::from(covered) / Decimal::from(countable)
        };
        CoverageSummary {
            total_rows,
            covered,
            excluded: excluded.len() as u64,
            gaps,
            percentage,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use saldo_core::{AccountKind, JournalEntry, Money, TransactionKind};

    fn tx_covering(rows: &[u64]) -> Transaction {
        let amount = Money::usd(dec!(10));
        Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            "x",
            TransactionKind::Other,
            vec![
                JournalEntry::debit(AccountKind::Cash, "Cash", amount.clone())
                    .with_rows(rows.iter().copied()),
                JournalEntry::credit(AccountKind::Equity, "Transfers", amount)
                    .with_rows(rows.iter().copied()),
            ],
        )
    }

    #[test]
    fn gap_detection_concrete_example() {
        // 10 rows, transactions cover {1,2,3,5,6,7,8,9,10} → gap {4}, 90%.
        let txs = vec![tx_covering(&[1, 2, 3]), tx_covering(&[5, 6, 7, 8, 9, 10])];
        let summary = CoverageSummary::compute(10, &BTreeSet::new(), &txs);
        assert_eq!(summary.gaps, BTreeSet::from([4]));
        assert_eq!(summary.percentage, dec!(0.9));
        assert!(!summary.is_complete());
    }

    #[test]
    fn full_coverage_is_complete() {
        let txs = vec![tx_covering(&[1, 2, 3, 4, 5])];
        let summary = CoverageSummary::compute(5, &BTreeSet::new(), &txs);
        assert!(summary.is_complete());
        assert_eq!(summary.percentage, Decimal::ONE);
    }

    #[test]
    fn excluded_rows_never_count_against_coverage() {
        // Rows 4 and 5 are legal boilerplate; covering 1-3 is 100%.
        let excluded = BTreeSet::from([4, 5]);
        let txs = vec![tx_covering(&[1, 2, 3])];
        let summary = CoverageSummary::compute(5, &excluded, &txs);
        assert!(summary.gaps.is_empty());
        assert_eq!(summary.percentage, Decimal::ONE);
        assert_eq!(summary.excluded, 2);
    }

    #[test]
    fn rows_covered_by_multiple_transactions_count_once() {
        let txs = vec![tx_covering(&[1, 2]), tx_covering(&[2, 3])];
        let summary = CoverageSummary::compute(3, &BTreeSet::new(), &txs);
        assert_eq!(summary.covered, 3);
        assert_eq!(summary.percentage, Decimal::ONE);
    }

    #[test]
    fn zero_countable_rows_is_full_coverage() {
        let summary = CoverageSummary::compute(0, &BTreeSet::new(), &[]);
        assert_eq!(summary.percentage, Decimal::ONE);
        assert!(summary.is_complete());
    }
}
