pub mod oracle;
pub mod runner;
pub mod session;

pub use oracle::{CategorizationOracle, OracleBatch, OracleContext, OracleError, RuleOracle};
pub use runner::{finalize, SessionError, SessionOutput, SessionRunner};
pub use session::{
    BatchRecord, CategorizationSession, SessionMode, SessionSnapshot, SessionState,
};
