//! Latest-request-wins bookkeeping
//!
//! Each logical operation (one permission query, the ticket exchange) owns a
//! [`RequestSlot`]. Beginning a request cancels the previous one and bumps a
//! generation counter; a completion only takes effect through
//! [`RequestSlot::commit`], which re-checks the generation under the same
//! lock `begin` uses. A result that raced past its cancellation signal is
//! therefore still discarded.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Owner of the single in-flight request for one logical operation.
#[derive(Debug, Default)]
pub struct RequestSlot {
    state: Mutex<SlotState>,
}

/// Proof of having started a request; carried by the request's task.
#[derive(Debug, Clone)]
pub struct RequestLease {
    generation: u64,
    token: CancellationToken,
}

impl RequestLease {
    /// Generation this lease was issued for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this request was superseded or cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this request has been superseded or cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl RequestSlot {
    /// Slot with nothing in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding whatever was in flight.
    pub fn begin(&self) -> RequestLease {
        let mut state = self.state.lock();
        if let Some(previous) = state.token.take() {
            previous.cancel();
        }
        state.generation += 1;
        let token = CancellationToken::new();
        state.token = Some(token.clone());
        RequestLease {
            generation: state.generation,
            token,
        }
    }

    /// Cancel the in-flight request, if any. Later commits from it are
    /// ignored.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        if let Some(token) = state.token.take() {
            token.cancel();
        }
        state.generation += 1;
    }

    /// Whether `lease` still names the in-flight request.
    pub fn is_current(&self, lease: &RequestLease) -> bool {
        let state = self.state.lock();
        state.generation == lease.generation && !lease.token.is_cancelled()
    }

    /// Run `apply` only if `lease` still names the current request.
    ///
    /// The slot lock is held while `apply` runs, so it must not call back
    /// into this slot.
    pub fn commit<R>(&self, lease: &RequestLease, apply: impl FnOnce() -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.generation != lease.generation || lease.token.is_cancelled() {
            return None;
        }
        state.token = None;
        Some(apply())
    }

    /// Whether a request has begun and not yet committed or been cancelled.
    pub fn in_flight(&self) -> bool {
        self.state.lock().token.is_some()
    }
}
