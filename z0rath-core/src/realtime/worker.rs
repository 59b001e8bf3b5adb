use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use z0rath_model::{Identity, Ticket, classify};

use super::{ChannelConnector, ChannelDeps, ChannelStatus, PushChannel, ReconnectPolicy};
use crate::api::AuthorizationApi;
use crate::bus::InvalidationBus;
use crate::error::{ApiResult, ChannelError};
use crate::request::{RequestLease, RequestSlot};

/// Result of a ticket request, tagged with the lease and identity it was
/// issued under.
struct TicketOutcome {
    lease: RequestLease,
    identity: Identity,
    result: ApiResult<Ticket>,
}

/// Sole owner of the push channel and the ticket request slot.
pub(super) struct ChannelWorker {
    api: Arc<dyn AuthorizationApi>,
    connector: Arc<dyn ChannelConnector>,
    bus: InvalidationBus,
    reconnect: ReconnectPolicy,
    identity: watch::Receiver<Identity>,
    status: watch::Sender<ChannelStatus>,
    shutdown: CancellationToken,
    tickets: RequestSlot,
    ticket_tx: mpsc::UnboundedSender<TicketOutcome>,
    ticket_rx: mpsc::UnboundedReceiver<TicketOutcome>,
    channel: Option<Box<dyn PushChannel>>,
    // Identity the current ticket/channel belongs to
    bound: Option<Identity>,
    attempts: u32,
}

impl ChannelWorker {
    pub(super) fn new(
        deps: ChannelDeps,
        status: watch::Sender<ChannelStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        let (ticket_tx, ticket_rx) = mpsc::unbounded_channel();
        Self {
            api: deps.api,
            connector: deps.connector,
            bus: deps.bus,
            reconnect: deps.reconnect,
            identity: deps.session.subscribe(),
            status,
            shutdown,
            tickets: RequestSlot::new(),
            ticket_tx,
            ticket_rx,
            channel: None,
            bound: None,
            attempts: 0,
        }
    }

    pub(super) async fn run(mut self) {
        let initial = self.identity.borrow_and_update().clone();
        self.transition(initial).await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                changed = self.identity.changed() => {
                    if changed.is_err() {
                        debug!("session store dropped; stopping channel worker");
                        break;
                    }
                    let identity = self.identity.borrow_and_update().clone();
                    self.transition(identity).await;
                }
                Some(outcome) = self.ticket_rx.recv() => self.on_ticket(outcome).await,
                frame = next_frame(&mut self.channel) => self.on_frame(frame).await,
            }
        }

        self.teardown().await;
        self.bound = None;
        self.set_status(ChannelStatus::Idle);
        debug!("channel worker stopped");
    }

    /// Re-evaluate the channel for a (possibly) new identity.
    async fn transition(&mut self, identity: Identity) {
        // Same identity with a live channel or pending ticket: keep it.
        let live = self.channel.is_some() || self.tickets.in_flight();
        if live && self.bound.as_ref() == Some(&identity) {
            return;
        }

        self.teardown().await;
        self.attempts = 0;

        if identity.is_signed_in() {
            self.bound = Some(identity.clone());
            self.request_ticket(identity, None);
        } else {
            debug!("no user signed in; push channel idle");
            self.bound = None;
            self.set_status(ChannelStatus::Idle);
        }
    }

    /// Close the open channel and cancel any outstanding ticket request.
    async fn teardown(&mut self) {
        self.tickets.cancel();
        if let Some(mut channel) = self.channel.take() {
            match channel.close().await {
                Ok(()) => debug!("push channel closed"),
                Err(err) => debug!(error = %err, "push channel close reported an error"),
            }
        }
    }

    fn request_ticket(&mut self, identity: Identity, delay: Option<Duration>) {
        let Some(user) = identity.user_id.clone() else {
            return;
        };
        let lease = self.tickets.begin();
        if delay.is_none() {
            self.set_status(ChannelStatus::RequestingTicket);
        }
        debug!(user = %user, generation = lease.generation(), ?delay, "requesting push ticket");

        let api = Arc::clone(&self.api);
        let tx = self.ticket_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = lease.cancelled() => {
                    trace!(generation = lease.generation(), "ticket request superseded");
                    return;
                }
                result = async {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    api.issue_ticket(&identity.credential, &user).await
                } => result,
            };
            // The worker may already be gone; nothing to report to then.
            let _ = tx.send(TicketOutcome {
                lease,
                identity,
                result,
            });
        });
    }

    async fn on_ticket(&mut self, outcome: TicketOutcome) {
        let TicketOutcome {
            lease,
            identity,
            result,
        } = outcome;

        let superseded =
            !self.tickets.is_current(&lease) || self.bound.as_ref() != Some(&identity);
        if superseded || self.tickets.commit(&lease, || ()).is_none() {
            debug!(generation = lease.generation(), "dropping ticket for superseded identity");
            return;
        }

        match result {
            Ok(ticket) => self.open_channel(ticket).await,
            Err(err) => {
                error!(error = %err, "unable to establish connection: ticket request failed");
                self.set_status(ChannelStatus::Degraded);
                self.schedule_retry();
            }
        }
    }

    async fn open_channel(&mut self, ticket: Ticket) {
        self.set_status(ChannelStatus::Connecting);
        let connector = Arc::clone(&self.connector);

        let opened = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            changed = self.identity.changed() => {
                debug!("identity changed during handshake; abandoning connection");
                self.bound = None;
                if changed.is_ok() {
                    let identity = self.identity.borrow_and_update().clone();
                    self.transition(identity).await;
                }
                return;
            }
            opened = connector.connect(&ticket) => opened,
        };

        match opened {
            Ok(channel) => {
                info!("push channel connected");
                self.channel = Some(channel);
                self.attempts = 0;
                self.set_status(ChannelStatus::Connected);
            }
            Err(err) => {
                error!(error = %err, "unable to establish connection: channel open failed");
                self.set_status(ChannelStatus::Degraded);
                self.schedule_retry();
            }
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<String, ChannelError>>) {
        match frame {
            Some(Ok(text)) => self.dispatch(&text),
            Some(Err(err)) => {
                error!(error = %err, "push channel error");
                if let Some(mut channel) = self.channel.take()
                    && let Err(err) = channel.close().await
                {
                    debug!(error = %err, "closing failed push channel");
                }
                self.set_status(ChannelStatus::Degraded);
                self.schedule_retry();
            }
            None => {
                info!("push channel closed by server");
                self.channel = None;
                self.set_status(ChannelStatus::Disconnected);
                self.schedule_retry();
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match classify(text) {
            Ok(Some(event)) => {
                let delivered = self.bus.publish(event.kind, &event);
                debug!(kind = %event.kind, delivered, "invalidation received");
            }
            Ok(None) => trace!("ignoring push message without a known action"),
            Err(err) => warn!(error = %err, "dropping malformed push message"),
        }
    }

    fn schedule_retry(&mut self) {
        let Some(identity) = self.bound.clone() else {
            return;
        };
        self.attempts += 1;
        match self.reconnect.delay_for(self.attempts) {
            Some(delay) => {
                info!(attempt = self.attempts, ?delay, "scheduling push channel reconnect");
                self.request_ticket(identity, Some(delay));
            }
            None if self.reconnect.enabled => {
                warn!(
                    attempts = self.attempts - 1,
                    "reconnect attempts exhausted; waiting for identity change"
                );
            }
            None => debug!("automatic reconnect disabled; waiting for identity change"),
        }
    }

    fn set_status(&self, next: ChannelStatus) {
        let changed = self.status.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
        if changed {
            debug!(status = %next, "push channel status");
        }
    }
}

async fn next_frame(
    channel: &mut Option<Box<dyn PushChannel>>,
) -> Option<Result<String, ChannelError>> {
    match channel.as_mut() {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}
