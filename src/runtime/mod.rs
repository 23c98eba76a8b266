//! Single-writer scan session runtime and event stream APIs.

/// Time sources for the debounce window.
pub mod clock;
/// Event stream types emitted by the runtime.
pub mod events;
/// Handle and session loop implementation.
pub mod handle;
