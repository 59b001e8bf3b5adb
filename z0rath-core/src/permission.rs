//! Permission query unit
//!
//! A [`PermissionQuery`] answers "does the current user hold `slug`?" and
//! keeps that answer fresh. It re-evaluates on mount, on slug change, on
//! any identity change and whenever the bus carries
//! [`InvalidationKind::PermissionsInvalidated`]. Each unit owns exactly one
//! [`RequestSlot`], so only the most recently issued request may write the
//! verdict; dropping the unit cancels whatever is still in flight.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};
use z0rath_model::{InvalidationEvent, InvalidationKind, Verdict};

use crate::api::AuthorizationApi;
use crate::bus::{InvalidationBus, ScopedSubscription};
use crate::request::RequestSlot;
use crate::session::SessionStore;

/// Collaborators a query needs. Cheap to clone.
#[derive(Clone)]
pub struct QueryDeps {
    /// Identity the query runs as.
    pub session: SessionStore,
    /// Service answering permission checks.
    pub api: Arc<dyn AuthorizationApi>,
    /// Source of permission invalidations.
    pub bus: InvalidationBus,
}

impl fmt::Debug for QueryDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDeps")
            .field("session", &self.session)
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

struct QueryInner {
    api: Arc<dyn AuthorizationApi>,
    session: SessionStore,
    slug: RwLock<String>,
    requests: RequestSlot,
    verdict: watch::Sender<Verdict>,
    runtime: Handle,
}

impl QueryInner {
    fn evaluate(self: &Arc<Self>) {
        let identity = self.session.current();
        let slug = self.slug.read().clone();

        let Some(user) = identity.user_id.clone() else {
            self.requests.cancel();
            debug!(slug = %slug, "no user signed in; denying without a request");
            self.apply(Verdict::resolved(slug, false));
            return;
        };

        let lease = self.requests.begin();
        trace!(user = %user, slug = %slug, generation = lease.generation(), "querying permission");

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = tokio::select! {
                _ = lease.cancelled() => {
                    trace!(slug = %slug, generation = lease.generation(), "permission request cancelled");
                    return;
                }
                outcome = inner.api.has_permission(&identity.credential, &user, &slug) => outcome,
            };

            match outcome {
                Ok(granted) => {
                    let committed = inner
                        .requests
                        .commit(&lease, || inner.apply(Verdict::resolved(slug.clone(), granted)));
                    match committed {
                        Some(_) => debug!(user = %user, slug = %slug, granted, "permission resolved"),
                        None => debug!(slug = %slug, "dropping superseded permission answer"),
                    }
                }
                Err(err) => {
                    // Verdict stays as it was; only the current request reports.
                    if inner.requests.commit(&lease, || ()).is_some() {
                        error!(user = %user, slug = %slug, error = %err, "permission check failed");
                    }
                }
            }
        });
    }

    fn apply(&self, next: Verdict) -> bool {
        self.verdict.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        })
    }
}

/// A mounted permission check for one slug.
///
/// Dropping the query unmounts it: the bus listener is removed, the identity
/// watcher stops and any in-flight request is cancelled before it can touch
/// the verdict.
pub struct PermissionQuery {
    inner: Arc<QueryInner>,
    _invalidations: ScopedSubscription<InvalidationKind, InvalidationEvent>,
    watcher: JoinHandle<()>,
}

impl fmt::Debug for PermissionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionQuery")
            .field("verdict", &*self.inner.verdict.borrow())
            .field("in_flight", &self.inner.requests.in_flight())
            .finish()
    }
}

impl PermissionQuery {
    /// Mount a query for `slug` and issue the first evaluation.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(slug: impl Into<String>, deps: QueryDeps) -> Self {
        let slug = slug.into();
        let (verdict, _) = watch::channel(Verdict::unknown(slug.clone()));
        let inner = Arc::new(QueryInner {
            api: deps.api,
            session: deps.session.clone(),
            slug: RwLock::new(slug),
            requests: RequestSlot::new(),
            verdict,
            runtime: Handle::current(),
        });

        let listener = Arc::downgrade(&inner);
        let invalidations =
            deps.bus
                .scoped(InvalidationKind::PermissionsInvalidated, move |_event| {
                    if let Some(inner) = listener.upgrade() {
                        let slug = inner.slug.read().clone();
                        debug!(slug = %slug, "permissions invalidated; re-querying");
                        inner.evaluate();
                    }
                });

        let mut identity = deps.session.subscribe();
        let weak = Arc::downgrade(&inner);
        let watcher = inner.runtime.spawn(async move {
            while identity.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.evaluate();
            }
        });

        inner.evaluate();

        Self {
            inner,
            _invalidations: invalidations,
            watcher,
        }
    }

    /// Slug currently being checked.
    pub fn slug(&self) -> String {
        self.inner.slug.read().clone()
    }

    /// Point the query at another slug. The verdict goes back to unknown
    /// until the new slug has been answered.
    pub fn set_slug(&self, slug: impl Into<String>) {
        let slug = slug.into();
        {
            let mut current = self.inner.slug.write();
            if *current == slug {
                return;
            }
            *current = slug.clone();
        }
        self.inner.apply(Verdict::unknown(slug));
        self.inner.evaluate();
    }

    /// Re-query now, superseding anything in flight.
    pub fn refresh(&self) {
        self.inner.evaluate();
    }

    /// Latest committed verdict.
    pub fn verdict(&self) -> Verdict {
        self.inner.verdict.borrow().clone()
    }

    /// Shorthand for the verdict's `granted`.
    pub fn granted(&self) -> Option<bool> {
        self.inner.verdict.borrow().granted
    }

    /// Observe verdict transitions. Rapid successive changes may be
    /// coalesced; the receiver always ends up on the latest verdict.
    pub fn subscribe(&self) -> watch::Receiver<Verdict> {
        self.inner.verdict.subscribe()
    }

    /// Whether a request is outstanding.
    pub fn in_flight(&self) -> bool {
        self.inner.requests.in_flight()
    }
}

impl Drop for PermissionQuery {
    fn drop(&mut self) {
        self.inner.requests.cancel();
        self.watcher.abort();
    }
}
