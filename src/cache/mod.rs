/// Content-addressed store of tool outputs.
pub mod store;
