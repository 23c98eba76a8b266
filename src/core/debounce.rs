/// Default lock window for repeated codes, in milliseconds.
pub const SCAN_LOCK_MS: u64 = 3000;

/// Remembers only the immediately preceding decode.
///
/// A repeat is suppressed when it matches the last code seen and arrives
/// inside the lock window. Any different code replaces the slot, so the
/// guard never acts as a per-code map.
#[derive(Debug, Clone)]
pub struct DebounceGuard {
    window_ms: u64,
    last: Option<(String, u64)>,
}

impl Default for DebounceGuard {
    fn default() -> Self {
        Self::new(SCAN_LOCK_MS)
    }
}

impl DebounceGuard {
    /// Creates a guard with the given lock window.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            last: None,
        }
    }

    /// Returns `true` when `code` should be processed, updating the slot.
    /// Suppressed repeats leave the slot untouched.
    pub fn admit(&mut self, code: &str, now_ms: u64) -> bool {
        if let Some((last_code, last_ms)) = &self.last {
            if last_code == code && now_ms.saturating_sub(*last_ms) < self.window_ms {
                return false;
            }
        }
        self.last = Some((code.to_string(), now_ms));
        true
    }

    /// Most recently admitted code.
    pub fn last_code(&self) -> Option<&str> {
        self.last.as_ref().map(|(code, _)| code.as_str())
    }
}
