use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use z0rath_core::{ApiError, ApiResult, AuthorizationApi};
use z0rath_model::{Credential, Ticket};

/// Scripted answer for one slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Granted(bool),
    /// Service answered 403
    Forbidden,
    /// Service answered with an unexpected status
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    HasPermission {
        user: String,
        slug: String,
        credential: String,
    },
    IssueTicket {
        user: String,
        credential: String,
    },
}

/// In-memory [`AuthorizationApi`] with per-slug answers and gates that hold
/// a call open until the test releases it.
#[derive(Debug, Default)]
pub struct FakeApi {
    answers: Mutex<HashMap<String, Answer>>,
    calls: Mutex<Vec<Call>>,
    slug_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    ticket_gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failing_tickets: AtomicUsize,
    tickets_issued: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, slug: &str, answer: Answer) {
        self.answers.lock().insert(slug.to_owned(), answer);
    }

    /// Hold every permission call for `slug` until [`FakeApi::release`].
    pub fn gate_slug(&self, slug: &str) {
        self.slug_gates
            .lock()
            .insert(slug.to_owned(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, slug: &str, calls: usize) {
        if let Some(gate) = self.slug_gates.lock().get(slug) {
            gate.add_permits(calls);
        }
    }

    /// Hold every ticket request for `user` until [`FakeApi::release_ticket`].
    pub fn gate_ticket(&self, user: &str) {
        self.ticket_gates
            .lock()
            .insert(user.to_owned(), Arc::new(Semaphore::new(0)));
    }

    pub fn release_ticket(&self, user: &str) {
        if let Some(gate) = self.ticket_gates.lock().get(user) {
            gate.add_permits(1);
        }
    }

    /// Fail the next `count` ticket requests with a 500.
    pub fn fail_tickets(&self, count: usize) {
        self.failing_tickets.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn permission_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::HasPermission { .. }))
            .count()
    }

    pub fn permission_calls_for(&self, slug: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::HasPermission { slug: s, .. } if s == slug))
            .count()
    }

    pub fn ticket_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::IssueTicket { user, .. } => Some(user.clone()),
                _ => None,
            })
            .collect()
    }

    async fn wait_gate(gates: &Mutex<HashMap<String, Arc<Semaphore>>>, key: &str) {
        let gate = gates.lock().get(key).cloned();
        if let Some(gate) = gate {
            let permit = gate.acquire_owned().await.expect("gate closed");
            permit.forget();
        }
    }
}

fn status(code: u16) -> ApiError {
    ApiError::Status {
        status: StatusCode::from_u16(code).expect("valid status code"),
    }
}

#[async_trait]
impl AuthorizationApi for FakeApi {
    async fn has_permission(
        &self,
        credential: &Credential,
        user: &str,
        slug: &str,
    ) -> ApiResult<bool> {
        self.calls.lock().push(Call::HasPermission {
            user: user.to_owned(),
            slug: slug.to_owned(),
            credential: credential.expose().to_owned(),
        });
        Self::wait_gate(&self.slug_gates, slug).await;

        let answer = self
            .answers
            .lock()
            .get(slug)
            .copied()
            .unwrap_or(Answer::Forbidden);
        match answer {
            Answer::Granted(granted) => Ok(granted),
            Answer::Forbidden => Ok(false),
            Answer::Status(code) => Err(status(code)),
        }
    }

    async fn issue_ticket(&self, credential: &Credential, user: &str) -> ApiResult<Ticket> {
        self.calls.lock().push(Call::IssueTicket {
            user: user.to_owned(),
            credential: credential.expose().to_owned(),
        });
        Self::wait_gate(&self.ticket_gates, user).await;

        let failing = self
            .failing_tickets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(status(500));
        }
        let n = self.tickets_issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Ticket::new(format!("ticket-{user}-{n}")))
    }
}
