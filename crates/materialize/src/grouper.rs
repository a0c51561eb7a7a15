use serde::{Deserialize, Serialize};

use saldo_core::TypedRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    /// A classifying row plus its trailing settlement rows.
    Primary,
    /// A settlement row with no preceding classifying row. Surfaced as an
    /// error condition by the validation report, never silently dropped.
    OrphanedSettlement,
}

/// A cluster of source rows that materializes into one transaction.
/// Rows keep their original order; the classifying row comes first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowGroup {
    pub kind: GroupKind,
    pub rows: Vec<TypedRow>,
}

impl RowGroup {
    pub fn row_numbers(&self) -> Vec<u64> {
        self.rows.iter().map(|r| r.row_number).collect()
    }

    /// The classifying row, for `Primary` groups.
    pub fn primary(&self) -> Option<&TypedRow> {
        match self.kind {
            GroupKind::Primary => self.rows.first(),
            GroupKind::OrphanedSettlement => None,
        }
    }

    /// Settlement rows attached to the primary row.
    pub fn settlements(&self) -> &[TypedRow] {
        match self.kind {
            GroupKind::Primary if !self.rows.is_empty() => &self.rows[1..],
            _ => &self.rows,
        }
    }
}

/// Institution-specific row grouping strategy, selected by configuration.
pub trait SettlementPattern: Send + Sync {
    fn group(&self, rows: &[TypedRow]) -> Vec<RowGroup>;
}

/// The standard brokerage pattern: a row with a non-empty action starts a
/// group; subsequent action-less rows attach to the open group. Strictly
/// sequential, no look-ahead — an action-less row before any classifying
/// row becomes an `OrphanedSettlement` group (group boundaries are
/// forward-only, it is never merged into a later group).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssetSettlementPattern;

impl SettlementPattern for AssetSettlementPattern {
    fn group(&self, rows: &[TypedRow]) -> Vec<RowGroup> {
        let mut groups = Vec::new();
        let mut open: Option<Vec<TypedRow>> = None;

        for row in rows {
            if row.is_classifying() {
                if let Some(rows) = open.take() {
                    groups.push(RowGroup {
                        kind: GroupKind::Primary,
                        rows,
                    });
                }
                open = Some(vec![row.clone()]);
            } else if let Some(group) = open.as_mut() {
                group.push(row.clone());
            } else {
                groups.push(RowGroup {
                    kind: GroupKind::OrphanedSettlement,
                    rows: vec![row.clone()],
                });
            }
        }

        if let Some(rows) = open.take() {
            groups.push(RowGroup {
                kind: GroupKind::Primary,
                rows,
            });
        }

        groups
    }
}
