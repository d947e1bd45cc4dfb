/// Shared identifiers and enums.
pub mod core;
/// Error taxonomy.
pub mod error;
/// Filesystem helpers.
pub mod fs;
