/// Job cache keys.
pub mod fingerprint;
/// Jobs and their settings.
pub mod model;
/// Single-stage execution against the cache.
pub mod runner;
