use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use saldo_core::{reported_balances, Transaction, TypedRow};
use saldo_reconcile::{
    replay, CoverageSummary, Corrector, ReconcileError, Reconciler, ReconcilerConfig,
    ReconcilerState, ReconciliationOutcome, ReportInputs, ValidationReport,
};

use crate::oracle::{CategorizationOracle, OracleContext, OracleError};
use crate::session::{CategorizationSession, SessionState};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No rows supplied")]
    NoRows,
    #[error("Categorization oracle failed: {0}")]
    OracleFailed(String),
    #[error("Session is not complete")]
    NotComplete,
}

/// Drives one session through the oracle, batch by batch, in source-row
/// order. The oracle call is the only I/O-bound step; everything after it
/// is synchronous.
pub struct SessionRunner<O: CategorizationOracle> {
    oracle: O,
    batch_size: usize,
    max_rate_limit_retries: usize,
}

impl<O: CategorizationOracle> SessionRunner<O> {
    pub fn new(oracle: O, batch_size: usize) -> Self {
        Self {
            oracle,
            batch_size: batch_size.max(1),
            max_rate_limit_retries: 3,
        }
    }

    pub fn with_max_rate_limit_retries(mut self, retries: usize) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    /// Process rows from the session's resume point until complete, paused,
    /// or failed. Pause requests are honored at batch boundaries only.
    pub async fn run(
        &self,
        session: &mut CategorizationSession,
        rows: &[TypedRow],
    ) -> Result<(), SessionError> {
        if rows.is_empty() {
            session.fail("no rows supplied");
            return Err(SessionError::NoRows);
        }

        let mut stalls = 0;
        while (session.processed_rows as usize) < rows.len() {
            if session.pause_requested() {
                session.enter_paused();
                tracing::info!(processed = session.processed_rows, "session paused");
                return Ok(());
            }
            session.state = SessionState::Processing;

            let start = session.processed_rows as usize;
            let end = (start + self.batch_size * (stalls + 1)).min(rows.len());
            let batch = &rows[start..end];
            let final_batch = end == rows.len();
            let context = OracleContext {
                account: session.account.clone(),
                base_currency: session.base_currency.clone(),
                final_batch,
            };

            let proposal = self.propose_with_backoff(session, batch, &context).await?;

            // A spanning group can fill the whole window; re-present it with
            // a wider one rather than splitting the group.
            if proposal.rows_consumed == 0 && !final_batch {
                stalls += 1;
                tracing::info!(rows = batch.len(), "batch window too narrow, widening");
                continue;
            }
            stalls = 0;

            // Guarantee forward progress even against a confused oracle.
            let consumed = match proposal.rows_consumed {
                0 => batch.len(),
                n => n.min(batch.len()),
            };
            let first_row = batch[0].row_number;
            let last_row = batch[consumed - 1].row_number;
            let added = proposal.transactions.len();
            session.merge_batch(
                proposal.transactions,
                proposal.orphaned,
                proposal.failures,
                first_row,
                last_row,
            );
            session.processed_rows += consumed as u64;
            tracing::info!(
                rows = consumed,
                transactions = added,
                processed = session.processed_rows,
                "batch merged"
            );
        }

        session.mark_complete();
        Ok(())
    }

    async fn propose_with_backoff(
        &self,
        session: &mut CategorizationSession,
        batch: &[TypedRow],
        context: &OracleContext,
    ) -> Result<crate::oracle::OracleBatch, SessionError> {
        let mut rate_limit_attempts = 0;
        loop {
            match self.oracle.propose(batch, context).await {
                Ok(proposal) => return Ok(proposal),
                Err(OracleError::RateLimited { retry_after_secs }) => {
                    rate_limit_attempts += 1;
                    if rate_limit_attempts > self.max_rate_limit_retries {
                        let reason = "rate limit retries exhausted".to_string();
                        session.fail(&reason);
                        return Err(SessionError::OracleFailed(reason));
                    }
                    session.state = SessionState::WaitingForRateLimit {
                        seconds: retry_after_secs,
                    };
                    tracing::warn!(retry_after_secs, "oracle rate limited, backing off");
                    tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
                    session.state = SessionState::Processing;
                }
                Err(OracleError::Failed(reason)) => {
                    session.fail(&reason);
                    return Err(SessionError::OracleFailed(reason));
                }
            }
        }
    }
}

/// Everything the host needs to persist or display after a session run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutput {
    pub transactions: Vec<Transaction>,
    pub coverage: CoverageSummary,
    pub reconciliation: Option<ReconciliationOutcome>,
    pub reconciliation_state: Option<ReconcilerState>,
    pub report: ValidationReport,
}

/// Terminal step of a completed session: replay, coverage, the bounded
/// repair loop, and the aggregated validation report. Reconciliation
/// failure degrades to an unavailable note; coverage and the basic balance
/// checks still report.
pub fn finalize(
    session: &CategorizationSession,
    rows: &[TypedRow],
    config: &ReconcilerConfig,
    corrector: &impl Corrector,
) -> Result<SessionOutput, SessionError> {
    if !session.is_complete() {
        return Err(SessionError::NotComplete);
    }

    let reported = reported_balances(rows);
    let base = &session.base_currency;

    let (reconciliation, unavailable) = match Reconciler::new(config, corrector).run(
        session.transactions.clone(),
        &reported,
        base,
    ) {
        Ok(outcome) => (Some(outcome), None),
        Err(ReconcileError::Unavailable(reason)) => {
            tracing::warn!(%reason, "reconciliation unavailable");
            (None, Some(reason))
        }
        Err(e) => (None, Some(e.to_string())),
    };

    let transactions = reconciliation
        .as_ref()
        .map(|o| o.transactions.clone())
        .unwrap_or_else(|| session.transactions.clone());

    let replay_warnings = replay(&transactions, base)
        .map(|outcome| outcome.warnings)
        .unwrap_or_default();

    let coverage = CoverageSummary::compute(
        session.total_rows,
        &session.excluded_rows,
        &transactions,
    );

    let report = ValidationReport::assemble(ReportInputs {
        transactions: &transactions,
        coverage: coverage.clone(),
        orphaned: &session.orphaned,
        failures: &session.failures,
        replay_warnings: &replay_warnings,
        reconciliation: reconciliation.as_ref(),
        reconciliation_unavailable: unavailable,
    });

    Ok(SessionOutput {
        transactions,
        coverage,
        reconciliation_state: reconciliation.as_ref().map(|o| o.state),
        reconciliation,
        report,
    })
}
