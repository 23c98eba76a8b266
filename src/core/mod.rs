//! In-memory scan history and the pure rules applied to it.

/// Single-slot repeat suppression.
pub mod debounce;
/// Bounded newest-first scan history.
pub mod history;
/// Per-status aggregate counts.
pub mod stats;
