//! Relays press/release events for logical game inputs to an input backend.
//!
//! A `RelayKey` posts KeyDown/KeyUp events through a [`Poster`] and tracks
//! which keys are currently held. Releasing a key that is not held is a no-op,
//! so a release issued from a stop path and a release issued by the task that
//! pressed the key never double-post.
//!
//! Backends implement [`Poster`]. This crate ships [`LogPoster`], which only
//! traces events (dry runs), and, with the `test-utils` feature,
//! [`RecordingPoster`], which records them for assertions.
#![warn(missing_docs)]
use std::{collections::HashSet, sync::Arc};

use gamekey::GameKey;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

mod error;
pub use error::{Error, Result};

/// Input backend capability: emit a physical down or up for a logical key.
pub trait Poster: Send + Sync {
    /// Emit a key/button down.
    fn post_down(&self, key: GameKey) -> Result<()>;
    /// Emit a key/button up.
    fn post_up(&self, key: GameKey) -> Result<()>;
}

/// Backend that logs events instead of injecting them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPoster;

impl Poster for LogPoster {
    fn post_down(&self, key: GameKey) -> Result<()> {
        info!(key = %key, "relayed_key_down");
        Ok(())
    }

    fn post_up(&self, key: GameKey) -> Result<()> {
        info!(key = %key, "relayed_key_up");
        Ok(())
    }
}

/// A single event observed by [`RecordingPoster`].
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Key down.
    Down(GameKey),
    /// Key up.
    Up(GameKey),
}

/// Backend that records every posted event, optionally failing on demand.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct RecordingPoster {
    /// Events in post order.
    events: Mutex<Vec<InputEvent>>,
    /// Keys whose posts fail.
    failing: Mutex<HashSet<GameKey>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingPoster {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().clone()
    }

    /// Number of downs recorded for `key`.
    pub fn downs(&self, key: GameKey) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == InputEvent::Down(key))
            .count()
    }

    /// Number of ups recorded for `key`.
    pub fn ups(&self, key: GameKey) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == InputEvent::Up(key))
            .count()
    }

    /// Make every subsequent post for `key` fail.
    pub fn fail_on(&self, key: GameKey) {
        self.failing.lock().insert(key);
    }

    /// Let posts for every key succeed again.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Fail if `key` was marked as failing.
    fn check(&self, key: GameKey) -> Result<()> {
        if self.failing.lock().contains(&key) {
            return Err(Error::Post {
                key,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Poster for RecordingPoster {
    fn post_down(&self, key: GameKey) -> Result<()> {
        self.check(key)?;
        self.events.lock().push(InputEvent::Down(key));
        Ok(())
    }

    fn post_up(&self, key: GameKey) -> Result<()> {
        self.check(key)?;
        self.events.lock().push(InputEvent::Up(key));
        Ok(())
    }
}

/// Stateful relayer that forwards Down/Up events and remembers held keys.
#[derive(Clone)]
pub struct RelayKey {
    /// Backend receiving the events.
    poster: Arc<dyn Poster>,
    /// Keys for which a down was posted and no up yet.
    held: Arc<Mutex<HashSet<GameKey>>>,
}

impl RelayKey {
    /// Create a relayer posting to `poster`.
    pub fn new(poster: Arc<dyn Poster>) -> Self {
        Self {
            poster,
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a relayer that only logs events.
    pub fn dry_run() -> Self {
        Self::new(Arc::new(LogPoster))
    }

    /// Post a key down and mark the key as held.
    pub fn key_down(&self, key: GameKey) -> Result<()> {
        trace!(key = %key, "on_key_down");
        self.poster.post_down(key)?;
        if !self.held.lock().insert(key) {
            debug!(key = %key, "key_down_while_held");
        }
        Ok(())
    }

    /// Post a key up if the key is held. Returns whether an up was posted.
    pub fn key_up(&self, key: GameKey) -> Result<bool> {
        if !self.held.lock().remove(&key) {
            trace!(key = %key, "key_up_skip_not_held");
            return Ok(false);
        }
        trace!(key = %key, "on_key_up");
        if let Err(e) = self.poster.post_up(key) {
            // still physically down; keep it for release_all
            self.held.lock().insert(key);
            return Err(e);
        }
        Ok(true)
    }

    /// Return true if the key is currently held.
    pub fn is_held(&self, key: GameKey) -> bool {
        self.held.lock().contains(&key)
    }

    /// Snapshot of held keys in a stable order.
    pub fn held_keys(&self) -> Vec<GameKey> {
        let mut keys: Vec<GameKey> = self.held.lock().iter().copied().collect();
        keys.sort();
        keys
    }

    /// Release every held key (best-effort; failures are logged).
    pub fn release_all(&self) {
        let keys: Vec<GameKey> = self.held.lock().drain().collect();
        for key in keys {
            if let Err(e) = self.poster.post_up(key) {
                warn!(key = %key, error = %e, "release_all_failed");
                self.held.lock().insert(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> (RelayKey, Arc<RecordingPoster>) {
        let poster = Arc::new(RecordingPoster::new());
        (RelayKey::new(poster.clone()), poster)
    }

    #[test]
    fn basic_down_up() {
        let (rk, poster) = relay();
        rk.key_down(GameKey::Dodge).expect("down");
        assert!(rk.is_held(GameKey::Dodge));
        assert!(rk.key_up(GameKey::Dodge).expect("up"));
        assert!(!rk.is_held(GameKey::Dodge));
        assert_eq!(
            poster.events(),
            vec![InputEvent::Down(GameKey::Dodge), InputEvent::Up(GameKey::Dodge)]
        );
    }

    #[test]
    fn double_release_posts_once() {
        let (rk, poster) = relay();
        rk.key_down(GameKey::NormalAttack).expect("down");
        assert!(rk.key_up(GameKey::NormalAttack).expect("up"));
        assert!(!rk.key_up(GameKey::NormalAttack).expect("up"));
        assert_eq!(poster.ups(GameKey::NormalAttack), 1);
    }

    #[test]
    fn keyup_without_prior_down_is_noop() {
        let (rk, poster) = relay();
        assert!(!rk.key_up(GameKey::Lock).expect("up"));
        assert!(poster.events().is_empty());
    }

    #[test]
    fn release_all_clears_held() {
        let (rk, poster) = relay();
        rk.key_down(GameKey::MoveForward).expect("down");
        rk.key_down(GameKey::MoveLeft).expect("down");
        assert_eq!(
            rk.held_keys(),
            vec![GameKey::MoveForward, GameKey::MoveLeft]
        );
        rk.release_all();
        assert!(rk.held_keys().is_empty());
        assert_eq!(poster.ups(GameKey::MoveForward), 1);
        assert_eq!(poster.ups(GameKey::MoveLeft), 1);
    }

    #[test]
    fn failed_up_stays_held() {
        let (rk, poster) = relay();
        rk.key_down(GameKey::Lock).expect("down");
        poster.fail_on(GameKey::Lock);
        assert!(rk.key_up(GameKey::Lock).is_err());
        assert!(rk.is_held(GameKey::Lock));
        rk.release_all();
        assert!(rk.is_held(GameKey::Lock));

        poster.clear_failures();
        rk.release_all();
        assert!(!rk.is_held(GameKey::Lock));
        assert_eq!(poster.ups(GameKey::Lock), 1);
    }

    #[test]
    fn failed_down_is_not_held() {
        let (rk, poster) = relay();
        poster.fail_on(GameKey::Ultimate);
        assert!(rk.key_down(GameKey::Ultimate).is_err());
        assert!(!rk.is_held(GameKey::Ultimate));
    }
}
