//! Realtime channel manager
//!
//! Keeps one push channel open for the current identity and republishes
//! the invalidations it carries on the [`InvalidationBus`]. The channel and
//! the in-flight ticket request are owned by a single worker task; callers
//! only hold a [`RealtimeChannel`] handle that exposes the published
//! [`ChannelStatus`] and a way to shut the worker down.
//!
//! Per identity change the worker runs
//!
//! ```text
//! Idle ──user set──► RequestingTicket ──ticket──► Connecting ──open──► Connected
//!                          │                          │                   │
//!                          └──────── failure ─────────┴──► Degraded       └─close─► Disconnected
//! ```
//!
//! and any identity change or shutdown first closes the open channel and
//! cancels the outstanding ticket request.

mod connector;
mod worker;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use connector::{ChannelConnector, PushChannel, WsConnector, push_endpoint};

use crate::api::AuthorizationApi;
use crate::bus::InvalidationBus;
use crate::session::SessionStore;
use worker::ChannelWorker;

/// Externally observable state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelStatus {
    /// No user signed in; nothing requested
    #[default]
    Idle,
    /// Waiting for the service to issue a ticket
    RequestingTicket,
    /// Ticket received, websocket handshake in progress
    Connecting,
    /// Channel open and delivering invalidations
    Connected,
    /// Server closed the channel; no reconnect unless policy allows
    Disconnected,
    /// Ticket exchange or channel failed
    Degraded,
}

impl ChannelStatus {
    /// Whether the presentational error indicator should be shown.
    pub fn is_error(&self) -> bool {
        matches!(self, ChannelStatus::Degraded)
    }

    /// Whether invalidations are currently being delivered.
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelStatus::Connected)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelStatus::Idle => "idle",
            ChannelStatus::RequestingTicket => "requesting-ticket",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Disconnected => "disconnected",
            ChannelStatus::Degraded => "degraded",
        };
        f.write_str(label)
    }
}

/// Backoff applied when the channel is lost or a ticket cannot be issued.
///
/// Disabled by default: only an identity change reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry at all; off means only identity changes reconnect.
    pub enabled: bool,
    /// Retries before giving up until the next identity change.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any retry delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Exponential backoff from 1s capped at 30s, 10 retries.
    pub fn exponential() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), or `None` when no
    /// further retry should happen.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Everything the channel worker needs from the rest of the client.
#[derive(Clone)]
pub struct ChannelDeps {
    /// Identity the channel is opened for.
    pub session: SessionStore,
    /// Issues tickets.
    pub api: Arc<dyn AuthorizationApi>,
    /// Redeems tickets for push channels.
    pub connector: Arc<dyn ChannelConnector>,
    /// Where received invalidations are published.
    pub bus: InvalidationBus,
    /// Retry behaviour after failures.
    pub reconnect: ReconnectPolicy,
}

impl fmt::Debug for ChannelDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDeps")
            .field("session", &self.session)
            .field("bus", &self.bus)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

/// Handle onto the running channel worker.
pub struct RealtimeChannel {
    status: watch::Receiver<ChannelStatus>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("status", &*self.status.borrow())
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl RealtimeChannel {
    /// Start the worker for the session in `deps`.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(deps: ChannelDeps) -> Self {
        let (status_tx, status) = watch::channel(ChannelStatus::Idle);
        let shutdown = CancellationToken::new();
        let worker = ChannelWorker::new(deps, status_tx, shutdown.clone());
        let worker = tokio::spawn(worker.run());
        Self {
            status,
            shutdown,
            worker: Some(worker),
        }
    }

    /// Current status.
    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// Presentational error flag: the ticket exchange or channel failed.
    pub fn has_error(&self) -> bool {
        self.status().is_error()
    }

    /// Close the channel, cancel in-flight work and wait for the worker.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.take()
            && let Err(err) = worker.await
        {
            warn!(error = %err, "channel worker ended abnormally");
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_never_retries() {
        assert_eq!(ReconnectPolicy::disabled().delay_for(1), None);
    }

    #[test]
    fn exponential_policy_doubles_and_caps() {
        let policy = ReconnectPolicy::exponential();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for(5), Some(Duration::from_secs(16)));
        assert_eq!(policy.delay_for(6), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(11), None);
    }

    #[test]
    fn only_degraded_shows_error() {
        assert!(ChannelStatus::Degraded.is_error());
        assert!(!ChannelStatus::Disconnected.is_error());
        assert!(!ChannelStatus::Idle.is_error());
    }
}
