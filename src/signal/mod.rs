//! Signal handling (SIGINT/SIGTERM)
//!
//! The splay delay is the only cancellation point of a run. On the first
//! signal the shared state is flagged and the sleeping controller returns
//! `Cancelled`, releasing its guards on the way out. A second signal exits the
//! process immediately with the cancelled exit code.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code for cancelled runs
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    /// First signal received (cancellation requested)
    cancel_requested: AtomicBool,
    /// Second signal received (immediate exit requested)
    immediate_exit: AtomicBool,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Check if immediate exit has been requested (second signal)
    pub fn is_immediate_exit(&self) -> bool {
        self.immediate_exit.load(Ordering::SeqCst)
    }

    /// Get the number of signals received
    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record a signal and return the action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        match count {
            0 => {
                self.cancel_requested.store(true, Ordering::SeqCst);
                SignalAction::Cancel
            }
            1 => {
                self.immediate_exit.store(true, Ordering::SeqCst);
                SignalAction::ImmediateExit
            }
            _ => SignalAction::Ignore,
        }
    }

    /// Reset the signal state (for testing)
    pub fn reset(&self) {
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.immediate_exit.store(false, Ordering::SeqCst);
        self.signal_count.store(0, Ordering::SeqCst);
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: interrupt the splay delay
    Cancel,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Signal handler that owns the shared state
#[derive(Debug, Default)]
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a reference to the signal state
    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM.
    ///
    /// Must be called at most once per process.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Cancel => {
                eprintln!("\nReceived interrupt signal, cancelling...");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nReceived second interrupt, exiting immediately");
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_state_initial() {
        let state = SignalState::new();
        assert!(!state.is_cancel_requested());
        assert!(!state.is_immediate_exit());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_first_signal_cancels() {
        let state = SignalState::new();
        assert_eq!(state.handle_signal(), SignalAction::Cancel);
        assert!(state.is_cancel_requested());
        assert!(!state.is_immediate_exit());
    }

    #[test]
    fn test_second_signal_requests_immediate_exit() {
        let state = SignalState::new();
        state.handle_signal();
        assert_eq!(state.handle_signal(), SignalAction::ImmediateExit);
        assert!(state.is_immediate_exit());
        assert_eq!(state.signal_count(), 2);
    }

    #[test]
    fn test_third_signal_ignored() {
        let state = SignalState::new();
        state.handle_signal();
        state.handle_signal();
        assert_eq!(state.handle_signal(), SignalAction::Ignore);
    }

    #[test]
    fn test_reset() {
        let state = SignalState::new();
        state.handle_signal();
        state.reset();
        assert!(!state.is_cancel_requested());
        assert_eq!(state.signal_count(), 0);
    }

    #[test]
    fn test_handler_shares_state() {
        let handler = SignalHandler::new();
        handler.state().handle_signal();
        assert!(handler.state().is_cancel_requested());
    }
}
