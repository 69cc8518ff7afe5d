pub mod lockbox;

pub use lockbox::{LockBoxState, LockRecord, PortfolioSummary, ProfitLockBox};
