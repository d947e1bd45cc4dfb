/// Placement of produced files.
pub mod layout;
