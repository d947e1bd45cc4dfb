/// Batch requests and their expansion into job plans.
pub mod request;
/// Per-job outcomes and batch aggregation.
pub mod result;
/// Bounded worker-pool execution of batches.
pub mod scheduler;
