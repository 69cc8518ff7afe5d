pub mod allocator;

pub use allocator::{AllocationOutcome, CapitalAllocator};
