use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use saldo_core::{Transaction, Unit};
use saldo_materialize::{GroupFailure, RowGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Categorize every row from scratch.
    Full,
    /// Append newly imported rows to an existing transaction set.
    Incremental,
    /// Re-run categorization over rows whose transactions are being replaced.
    Override,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Processing,
    WaitingForRateLimit { seconds: u64 },
    Paused,
    Failed { reason: String },
    Complete,
}

/// One completed oracle round-trip, kept for retry/resume bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub index: usize,
    pub first_row: u64,
    pub last_row: u64,
    pub transactions_added: usize,
}

/// The mutable aggregate for one categorization run. Mutated by exactly one
/// pipeline at a time; pausing is cooperative and lands on a batch
/// boundary, so `processed_rows` is always an exact resume point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationSession {
    pub id: Uuid,
    pub account: String,
    pub mode: SessionMode,
    pub base_currency: Unit,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub excluded_rows: BTreeSet<u64>,
    pub transactions: Vec<Transaction>,
    pub orphaned: Vec<RowGroup>,
    pub failures: Vec<GroupFailure>,
    pub batches: Vec<BatchRecord>,
    pub state: SessionState,
    pause_requested: bool,
}

/// Point-in-time view for hosts that want to display progress. The session
/// itself exposes no observation mechanism; poll this or wire it to
/// whatever the host uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: SessionState,
    pub mode: SessionMode,
    pub total_rows: u64,
    pub processed_rows: u64,
    pub transaction_count: usize,
    pub batch_count: usize,
}

impl CategorizationSession {
    pub fn new(
        account: impl Into<String>,
        mode: SessionMode,
        base_currency: Unit,
        total_rows: u64,
    ) -> Self {
        CategorizationSession {
            id: Uuid::new_v4(),
            account: account.into(),
            mode,
            base_currency,
            total_rows,
            processed_rows: 0,
            excluded_rows: BTreeSet::new(),
            transactions: Vec::new(),
            orphaned: Vec::new(),
            failures: Vec::new(),
            batches: Vec::new(),
            state: SessionState::Idle,
            pause_requested: false,
        }
    }

    pub fn exclude_rows<I: IntoIterator<Item = u64>>(&mut self, rows: I) {
        self.excluded_rows.extend(rows);
    }

    /// Cooperative: takes effect at the next batch boundary, never mid-batch.
    pub fn request_pause(&mut self) {
        self.pause_requested = true;
    }

    pub fn pause_requested(&self) -> bool {
        self.pause_requested
    }

    /// Honor a pending pause request. Called by the runner between batches.
    pub fn enter_paused(&mut self) {
        self.pause_requested = false;
        self.state = SessionState::Paused;
    }

    /// A paused or failed session keeps everything built so far and resumes
    /// from `processed_rows`.
    pub fn resume(&mut self) {
        self.pause_requested = false;
        self.state = SessionState::Idle;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = SessionState::Failed {
            reason: reason.into(),
        };
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// Merge one batch of proposals. Proposals are re-sequenced by ascending
    /// minimum source row before appending — out-of-order batch completion
    /// must never leak arrival order into the transaction list.
    pub fn merge_batch(
        &mut self,
        mut transactions: Vec<Transaction>,
        orphaned: Vec<RowGroup>,
        failures: Vec<GroupFailure>,
        first_row: u64,
        last_row: u64,
    ) {
        transactions.sort_by_key(|tx| tx.min_source_row().unwrap_or(u64::MAX));
        let added = transactions.len();
        self.transactions.extend(transactions);
        self.orphaned.extend(orphaned);
        self.failures.extend(failures);
        self.batches.push(BatchRecord {
            index: self.batches.len(),
            first_row,
            last_row,
            transactions_added: added,
        });
    }

    pub fn mark_complete(&mut self) {
        self.state = SessionState::Complete;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state.clone(),
            mode: self.mode,
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            transaction_count: self.transactions.len(),
            batch_count: self.batches.len(),
        }
    }
}
