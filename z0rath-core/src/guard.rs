//! Conditional render boundary over a permission query

use std::fmt;

use tokio::sync::watch;
use tracing::debug;
use z0rath_model::Verdict;

use crate::permission::{PermissionQuery, QueryDeps};

/// Invoked with `redirect = true` when a granted slug is revoked.
pub type LostAccessCallback = Box<dyn FnMut(bool) + Send>;

/// What a guard shows for the verdict it last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    /// Access granted: show the children.
    Children,
    /// Denied or not yet known: show nothing.
    Nothing,
}

/// Tracks the previous verdict to detect revocation.
pub struct Guard {
    previous: Option<bool>,
    on_lost_access: Option<LostAccessCallback>,
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("previous", &self.previous)
            .field("has_callback", &self.on_lost_access.is_some())
            .finish()
    }
}

impl Guard {
    /// Guard that has not observed a verdict yet.
    pub fn new(on_lost_access: Option<LostAccessCallback>) -> Self {
        Self {
            previous: None,
            on_lost_access,
        }
    }

    /// Feed the next verdict. Fires the lost-access callback on a
    /// granted → denied transition only; an unknown → denied resolution
    /// is not a loss.
    pub fn observe(&mut self, granted: Option<bool>) -> Render {
        let lost = self.previous == Some(true) && granted == Some(false);
        self.previous = granted;

        if lost {
            debug!("access revoked");
            if let Some(callback) = self.on_lost_access.as_mut() {
                callback(true);
            }
        }

        if granted == Some(true) {
            Render::Children
        } else {
            Render::Nothing
        }
    }
}

/// Mount-time arguments of a guarded boundary.
pub struct GuardProps {
    /// Permission slug to guard.
    pub slug: String,
    /// Called when a granted slug is revoked.
    pub on_lost_access: Option<LostAccessCallback>,
}

impl GuardProps {
    /// Props for `slug` with no lost-access callback.
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            on_lost_access: None,
        }
    }

    /// Install the lost-access callback.
    pub fn on_lost_access(mut self, callback: impl FnMut(bool) + Send + 'static) -> Self {
        self.on_lost_access = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for GuardProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardProps")
            .field("slug", &self.slug)
            .field("has_callback", &self.on_lost_access.is_some())
            .finish()
    }
}

/// Children shown only while the current user holds the guarded slug.
pub struct Guarded<T> {
    query: PermissionQuery,
    guard: Guard,
    verdicts: watch::Receiver<Verdict>,
    render: Render,
    children: T,
}

impl<T: fmt::Debug> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("query", &self.query)
            .field("render", &self.render)
            .field("children", &self.children)
            .finish()
    }
}

impl<T> Guarded<T> {
    /// Mount the underlying query and take the first render.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(props: GuardProps, deps: QueryDeps, children: T) -> Self {
        let query = PermissionQuery::mount(props.slug, deps);
        let mut verdicts = query.subscribe();
        let mut guard = Guard::new(props.on_lost_access);
        let render = guard.observe(verdicts.borrow_and_update().granted);
        Self {
            query,
            guard,
            verdicts,
            render,
            children,
        }
    }

    /// The children while access is granted.
    pub fn render(&self) -> Option<&T> {
        match self.render {
            Render::Children => Some(&self.children),
            Render::Nothing => None,
        }
    }

    /// What was rendered for the last observed verdict.
    pub fn state(&self) -> Render {
        self.render
    }

    /// The underlying permission query.
    pub fn query(&self) -> &PermissionQuery {
        &self.query
    }

    /// Wait for the next verdict change and re-render.
    ///
    /// The boundary owns its query, so while it is mounted this only
    /// resolves on an actual change. `None` would mean the verdict
    /// publisher is gone, which cannot happen before the boundary drops.
    pub async fn changed(&mut self) -> Option<Render> {
        self.verdicts.changed().await.ok()?;
        let granted = self.verdicts.borrow_and_update().granted;
        self.render = self.guard.observe(granted);
        Some(self.render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_guard() -> (Guard, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let guard = Guard::new(Some(Box::new(move |redirect| {
            assert!(redirect);
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (guard, fired)
    }

    #[test]
    fn revocation_fires_exactly_once() {
        let (mut guard, fired) = counting_guard();

        assert_eq!(guard.observe(Some(true)), Render::Children);
        assert_eq!(guard.observe(Some(true)), Render::Children);
        assert_eq!(guard.observe(Some(false)), Render::Nothing);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert_eq!(guard.observe(Some(false)), Render::Nothing);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initial_denial_is_not_a_loss() {
        let (mut guard, fired) = counting_guard();

        assert_eq!(guard.observe(None), Render::Nothing);
        assert_eq!(guard.observe(Some(false)), Render::Nothing);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn regrant_then_revoke_fires_again() {
        let (mut guard, fired) = counting_guard();

        for granted in [Some(true), Some(false), Some(true), Some(false)] {
            guard.observe(granted);
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn guard_without_callback_still_renders() {
        let mut guard = Guard::new(None);
        assert_eq!(guard.observe(Some(true)), Render::Children);
        assert_eq!(guard.observe(Some(false)), Render::Nothing);
    }
}
