//! Per-call cancellation and deadline context.
//!
//! # Responsibility
//! - Carry a caller deadline and a shared cancel flag into store calls.
//! - Let long-running statements be interrupted from another thread.
//!
//! # Invariants
//! - Once a context reports done it never becomes live again.
//! - Child contexts share the parent's cancel flag and never extend its deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Live,
    Cancelled,
    DeadlineExceeded,
}

/// Handle that cancels every context derived from the same root.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Cancellation/deadline context accepted by every repository call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Context with no deadline that only stops when cancelled.
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// Derives a context that ends at the earlier of `deadline` and the parent deadline.
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.child_with_deadline(deadline),
            None => self.clone(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn state(&self) -> ContextState {
        if self.cancelled.load(Ordering::SeqCst) {
            return ContextState::Cancelled;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => ContextState::DeadlineExceeded,
            _ => ContextState::Live,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state() != ContextState::Live
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::{ContextState, RequestContext};
    use std::time::{Duration, Instant};

    #[test]
    fn background_context_is_live_until_cancelled() {
        let ctx = RequestContext::background();
        assert_eq!(ctx.state(), ContextState::Live);
        assert!(ctx.deadline().is_none());

        ctx.cancel_handle().cancel();
        assert_eq!(ctx.state(), ContextState::Cancelled);
    }

    #[test]
    fn elapsed_deadline_reports_deadline_exceeded() {
        let ctx = RequestContext::background().child_with_deadline(Instant::now());
        assert_eq!(ctx.state(), ContextState::DeadlineExceeded);
        assert!(ctx.is_done());
    }

    #[test]
    fn child_shares_cancel_flag_and_keeps_earlier_deadline() {
        let parent = RequestContext::with_timeout(Duration::from_millis(50));
        let child = parent.child_with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());

        parent.cancel_handle().cancel();
        assert_eq!(child.state(), ContextState::Cancelled);
    }
}
