//! Session controller: tracks who is signed in.
//!
//! Subscribes once to the provider's identity feed and forwards every change
//! to its dependent synchronously, in feed order.

use tracing::info;

use crate::backend::{IdentityFeed, IdentityProvider};
use crate::models::Identity;

/// Something that reacts to identity changes.
pub trait IdentityObserver {
    fn identity_changed(&mut self, identity: Option<&Identity>);
}

/// Holds the current identity as reported by the provider.
pub struct SessionController {
    feed: IdentityFeed,
    current: Option<Identity>,
    /// Whether the value present at attach time has been delivered.
    primed: bool,
}

impl SessionController {
    /// Subscribe to `provider`'s identity feed.
    pub fn attach(provider: &dyn IdentityProvider) -> Self {
        Self::from_feed(provider.identity_changes())
    }

    pub fn from_feed(feed: IdentityFeed) -> Self {
        Self {
            feed,
            current: None,
            primed: false,
        }
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    /// Wait for the next identity change and return it.
    ///
    /// The value present when the controller was attached counts as the
    /// first change if it differs from "signed out". Returns `None` once the
    /// provider drops the feed. Cancel-safe.
    pub async fn next_change(&mut self) -> Option<Option<Identity>> {
        if !self.primed {
            self.primed = true;
            let initial = self.feed.borrow_and_update().clone();
            if let Some(change) = self.replace(initial) {
                return Some(change);
            }
        }
        loop {
            self.feed.changed().await.ok()?;
            let next = self.feed.borrow_and_update().clone();
            if let Some(change) = self.replace(next) {
                return Some(change);
            }
        }
    }

    /// Apply a change already queued on the feed, without waiting.
    pub fn poll_change(&mut self) -> Option<Option<Identity>> {
        let pending = !self.primed || self.feed.has_changed().unwrap_or(false);
        if !pending {
            return None;
        }
        self.primed = true;
        let next = self.feed.borrow_and_update().clone();
        self.replace(next)
    }

    /// Wait for the next change and hand it to `observer`. Returns `false`
    /// once the feed is closed.
    pub async fn dispatch(&mut self, observer: &mut dyn IdentityObserver) -> bool {
        match self.next_change().await {
            Some(identity) => {
                observer.identity_changed(identity.as_ref());
                true
            }
            None => false,
        }
    }

    fn replace(&mut self, next: Option<Identity>) -> Option<Option<Identity>> {
        if next == self.current {
            return None;
        }
        info!(
            from = self.current.as_ref().map(|i| i.id.as_str()),
            to = next.as_ref().map(|i| i.id.as_str()),
            "session identity changed"
        );
        self.current = next.clone();
        Some(next)
    }
}
