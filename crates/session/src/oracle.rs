use serde::{Deserialize, Serialize};
use thiserror::Error;

use saldo_core::{PriceSource, Transaction, TypedRow, Unit};
use saldo_materialize::{
    AssetSettlementPattern, GroupFailure, GroupKind, InstitutionProfile, RowGroup,
    SettlementPattern, TransactionBuilder,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle is rate limited; retry after the indicated delay.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Categorization failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleContext {
    pub account: String,
    pub base_currency: Unit,
    /// True when no further rows will follow this batch. A non-final batch
    /// may end mid-transaction; the oracle signals "needs more rows" by
    /// consuming fewer rows than it was given.
    pub final_batch: bool,
}

/// One batch worth of proposals. `rows_consumed` strictly less than the
/// batch size means the tail rows belong to a transaction spanning into
/// the next batch — they are re-presented, never dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleBatch {
    pub transactions: Vec<Transaction>,
    pub rows_consumed: usize,
    pub failures: Vec<GroupFailure>,
    pub orphaned: Vec<RowGroup>,
}

/// The pluggable categorization boundary: a rule engine, an AI call, or a
/// test double. The core validates and repairs whatever comes back.
pub trait CategorizationOracle: Send + Sync {
    fn propose(
        &self,
        rows: &[TypedRow],
        context: &OracleContext,
    ) -> impl std::future::Future<Output = Result<OracleBatch, OracleError>> + Send;
}

/// The built-in rule-based detector: settlement grouping plus the
/// transaction builder, wrapped behind the oracle interface.
pub struct RuleOracle<P: PriceSource> {
    profile: InstitutionProfile,
    prices: P,
}

impl<P: PriceSource> RuleOracle<P> {
    pub fn new(profile: InstitutionProfile, prices: P) -> Self {
        Self { profile, prices }
    }
}

impl<P: PriceSource> CategorizationOracle for RuleOracle<P> {
    async fn propose(
        &self,
        rows: &[TypedRow],
        context: &OracleContext,
    ) -> Result<OracleBatch, OracleError> {
        let mut groups = AssetSettlementPattern.group(rows);

        // A trailing primary group in a non-final batch may still be
        // collecting settlement rows; hold it back for the next batch.
        // When it is the only group, `rows_consumed` drops to zero — the
        // explicit needs-more-rows signal, to which the runner responds by
        // widening the batch window.
        let mut rows_consumed = rows.len();
        if !context.final_batch {
            if let Some(last) = groups.last() {
                if last.kind == GroupKind::Primary {
                    rows_consumed -= last.rows.len();
                    groups.pop();
                }
            }
        }

        let outcome = TransactionBuilder::new(&self.profile, &self.prices).build_all(&groups);
        Ok(OracleBatch {
            transactions: outcome.transactions,
            rows_consumed,
            failures: outcome.failures,
            orphaned: outcome.orphaned,
        })
    }
}
