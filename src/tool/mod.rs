/// Channel classification of produced files.
pub mod classify;
/// Tool command lines.
pub mod command;
/// Archive descriptions.
pub mod info;
/// The tool execution seam.
pub mod invoker;
/// Tool discovery.
pub mod locate;
/// Child process execution with timeouts.
pub mod process;
