//! Scoped overrides
//!
//! RAII guards that change how memoized calls behave for as long as they are
//! alive. Every guard registers itself on creation and withdraws only its own
//! registration when dropped (including during unwinding), so scopes opened
//! on different threads may end in any order without disturbing each other.
//!
//! Overrides stack: the most recently opened live override wins, and when it
//! ends the one opened right before it takes effect again. Caching stays
//! disabled while at least one disable scope is alive.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ScopeStack {
    next_id: u64,
    /// Live overrides as `(guard id, seconds)`, oldest first
    overrides: Vec<(u64, u64)>,
    /// Number of live disable scopes
    disabled: usize,
}

/// Override settings read by every memoized call.
#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    stack: Mutex<ScopeStack>,
}

impl ScopeState {
    pub(crate) fn override_timeout(&self) -> Option<u64> {
        self.stack.lock().overrides.last().map(|&(_, secs)| secs)
    }

    pub(crate) fn caching_enabled(&self) -> bool {
        self.stack.lock().disabled == 0
    }

    pub(crate) fn push_timeout(&self, timeout_secs: u64) -> TimeoutOverride<'_> {
        let mut stack = self.stack.lock();
        let id = stack.next_id;
        stack.next_id += 1;

        let previous = stack.overrides.last().map(|&(_, secs)| secs);
        stack.overrides.push((id, timeout_secs));

        TimeoutOverride {
            scopes: self,
            id,
            previous,
        }
    }

    pub(crate) fn push_disabled(&self) -> CachingDisabled<'_> {
        self.stack.lock().disabled += 1;
        CachingDisabled { scopes: self }
    }
}

// == Timeout Override ==
/// Forces the effective timeout of every memoized call while alive.
///
/// Created by [`crate::Cache::override_timeout`].
#[must_use = "the override ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TimeoutOverride<'a> {
    scopes: &'a ScopeState,
    id: u64,
    previous: Option<u64>,
}

impl TimeoutOverride<'_> {
    /// The override that was in effect when this guard was created.
    pub fn previous(&self) -> Option<u64> {
        self.previous
    }
}

impl Drop for TimeoutOverride<'_> {
    fn drop(&mut self) {
        let mut stack = self.scopes.stack.lock();
        if let Some(pos) = stack.overrides.iter().rposition(|&(id, _)| id == self.id) {
            stack.overrides.remove(pos);
        }
    }
}

// == Caching Disabled ==
/// Bypasses the store for every memoized call while alive.
///
/// Created by [`crate::Cache::disable_caching`].
#[must_use = "caching is re-enabled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct CachingDisabled<'a> {
    scopes: &'a ScopeState,
}

impl Drop for CachingDisabled<'_> {
    fn drop(&mut self) {
        let mut stack = self.scopes.stack.lock();
        stack.disabled = stack.disabled.saturating_sub(1);
    }
}
