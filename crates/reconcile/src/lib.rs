pub mod checkpoint;
pub mod coverage;
pub mod reconciler;
pub mod report;
pub mod tracker;

pub use checkpoint::{
    build_checkpoints, classify, BalanceCheckpoint, ReconcileError, ReconcilerConfig, Severity,
};
pub use coverage::{coverage, find_gaps, CoverageSummary};
pub use reconciler::{
    Corrector, ReconciliationOutcome, Reconciler, ReconcilerState, ReportedBalanceCorrector,
};
pub use report::{Issue, IssueKind, IssueSeverity, ReportInputs, ReportStatus, ValidationReport};
pub use tracker::{replay, replay_order, LedgerState, Position, ReplayOutcome, ReplayWarning};
