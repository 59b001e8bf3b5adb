use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use z0rath_core::{ChannelConnector, ChannelError, PushChannel};
use z0rath_model::Ticket;

#[derive(Debug)]
enum Frame {
    Text(String),
    Error(String),
    Close,
}

/// Test-side end of a fake push channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    pub ticket: String,
    frames: mpsc::UnboundedSender<Frame>,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub fn send_text(&self, text: &str) {
        let _ = self.frames.send(Frame::Text(text.to_owned()));
    }

    pub fn fail(&self, message: &str) {
        let _ = self.frames.send(Frame::Error(message.to_owned()));
    }

    pub fn close_from_server(&self) {
        let _ = self.frames.send(Frame::Close);
    }

    /// Whether the client side closed this channel.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeChannel {
    frames: mpsc::UnboundedReceiver<Frame>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PushChannel for FakeChannel {
    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        match self.frames.recv().await? {
            Frame::Text(text) => Some(Ok(text)),
            Frame::Error(message) => Some(Err(ChannelError::Other(message))),
            Frame::Close => None,
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector whose channels are driven from the test.
#[derive(Debug, Default)]
pub struct FakeConnector {
    opened: Mutex<Vec<ChannelHandle>>,
    failing_connects: AtomicUsize,
    started: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_connects(&self, count: usize) {
        self.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Hold every handshake open until [`FakeConnector::release_connects`].
    pub fn gate_connects(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held and future handshakes through.
    pub fn release_connects(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.close();
        }
    }

    /// Handshakes begun, including abandoned and failed ones.
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<ChannelHandle> {
        self.opened.lock().clone()
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn latest(&self) -> Option<ChannelHandle> {
        self.opened.lock().last().cloned()
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn connect(&self, ticket: &Ticket) -> Result<Box<dyn PushChannel>, ChannelError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // Closed on release; either outcome lets the handshake finish.
            let _ = gate.acquire().await;
        }

        let failing = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChannelError::Other("handshake rejected".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.opened.lock().push(ChannelHandle {
            ticket: ticket.as_str().to_owned(),
            frames: tx,
            closed: Arc::clone(&closed),
        });
        Ok(Box::new(FakeChannel { frames: rx, closed }))
    }
}
