//! Session identity store
//!
//! Holds the identity every other component reads. Backed by a watch
//! channel so readers never block and interested tasks can await changes.
//! All writes go through [`SessionStore::update`], which only notifies
//! subscribers when the identity actually changed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use z0rath_model::{Credential, Identity};

/// Shared handle onto the current identity.
#[derive(Clone, Debug)]
pub struct SessionStore {
    sender: Arc<watch::Sender<Identity>>,
}

impl SessionStore {
    /// Store starting at `initial`.
    pub fn new(initial: Identity) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Snapshot of the current identity
    pub fn current(&self) -> Identity {
        self.sender.borrow().clone()
    }

    /// Signed-in user, if any.
    pub fn user(&self) -> Option<String> {
        self.sender.borrow().user_id.clone()
    }

    /// Subscribe to identity changes. The receiver starts with the current
    /// value marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Identity> {
        self.sender.subscribe()
    }

    /// Sign a user in, switch users, or sign out with `None`.
    pub fn set_user(&self, user: Option<String>) -> bool {
        self.update(|identity| {
            if identity.user_id == user {
                return false;
            }
            identity.user_id = user;
            true
        })
    }

    /// Replace the API key used for every subsequent request.
    pub fn set_credential(&self, credential: Credential) -> bool {
        self.update(|identity| {
            if identity.credential == credential {
                return false;
            }
            identity.credential = credential;
            true
        })
    }

    fn update(&self, mutate: impl FnOnce(&mut Identity) -> bool) -> bool {
        let changed = self.sender.send_if_modified(mutate);
        if changed {
            debug!(user = ?self.sender.borrow().user_id, "session identity changed");
        }
        changed
    }
}
