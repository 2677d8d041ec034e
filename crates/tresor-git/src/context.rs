//! Caller-supplied cancellation context for network operations

use std::time::{Duration, Instant};

/// Deadline honored by fetch and push transports.
///
/// The transport callbacks poll [`OperationContext::is_expired`] and abort the
/// call once it returns true. No timeout is imposed when no deadline is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationContext {
    deadline: Option<Instant>,
}

impl OperationContext {
    /// Context without a deadline
    pub fn background() -> Self {
        Self { deadline: None }
    }

    /// Context expiring `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Context expiring at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
