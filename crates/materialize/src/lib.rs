pub mod builder;
pub mod grouper;
pub mod profile;

pub use builder::{GroupFailure, MaterializeError, MaterializeOutcome, TransactionBuilder};
pub use grouper::{AssetSettlementPattern, GroupKind, RowGroup, SettlementPattern};
pub use profile::{ActionRule, InstitutionProfile, ProfileError};
