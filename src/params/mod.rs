/// Image files bound to archive entries.
pub mod binding;
/// Parameter resolution.
pub mod resolve;
/// Parameter declarations and values.
pub mod schema;
