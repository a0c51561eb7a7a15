pub mod journal;
pub mod money;
pub mod price;
pub mod row;
pub mod transaction;

pub use journal::{AccountKind, JournalEntry, Side};
pub use money::{Money, MoneyError, Unit};
pub use price::{NoPrices, PriceSource, StaticPriceSource};
pub use row::{reported_balances, SourceRow, TypedRow};
pub use transaction::{Imbalance, LedgerError, Transaction, TransactionKind};
