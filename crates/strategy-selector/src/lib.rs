pub mod selector;

pub use selector::{RankedStrategy, SelectedStrategy, StrategySelector};
