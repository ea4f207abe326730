//! Shared utilities for rmcp-batteries

use rmcp::{model::*, ErrorData as McpError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Create an internal error
pub fn internal_error(msg: impl Into<String>) -> McpError {
    McpError::internal_error(msg.into(), None)
}

/// Successful tool result carrying a single text block
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

/// Failed tool result carrying a single text block
pub fn error_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(text.into())])
}

/// Allows at most one outstanding request of a given kind.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

/// Releases the slot when dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a>(&'a AtomicBool);

impl InFlight {
    /// Claim the slot, or `None` if a request is already running
    pub fn try_start(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
