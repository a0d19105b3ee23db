//! The user registry: every live connection and its affiliation.
//!
//! # Concurrency note
//!
//! `UserRegistry` is NOT thread-safe by itself. It is a plain `HashMap`.
//! The session coordinator owns it behind a mutex and is the only writer,
//! which keeps every affiliation change in step with the session it
//! refers to.

use std::collections::HashMap;

use cowatch_protocol::{SessionId, UserId};

use crate::{IdGenerator, RandomIdGenerator, User, UserError, UserSender};

/// Registry of connected users, keyed by id.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ affiliate() ──→ clear_session() ──→ remove()
///     │              │                  │                │
///     ▼              ▼                  ▼                ▼
///  [idle]       [in session]         [idle]          [gone]
/// ```
pub struct UserRegistry {
    users: HashMap<UserId, User>,
    ids: Box<dyn IdGenerator>,
}

impl UserRegistry {
    /// Creates an empty registry that draws ids from `ids`.
    pub fn new(ids: impl IdGenerator) -> Self {
        Self {
            users: HashMap::new(),
            ids: Box::new(ids),
        }
    }

    /// Registers a new connection and returns its freshly allocated id.
    ///
    /// Candidates that collide with a connected user are discarded and
    /// re-rolled. There is no retry bound: with 64-bit ids a collision is
    /// already an exceptional event.
    pub fn register(&mut self, sender: UserSender) -> UserId {
        let mut id = self.ids.generate();
        while self.users.contains_key(&id) {
            tracing::debug!(user_id = %id, "user id collision, re-rolling");
            id = self.ids.generate();
        }

        self.users.insert(
            id.clone(),
            User {
                id: id.clone(),
                session_id: None,
                sender,
            },
        );
        tracing::debug!(user_id = %id, users = self.users.len(), "user registered");
        id
    }

    /// Looks up a user by id.
    pub fn get(&self, user_id: &UserId) -> Option<&User> {
        self.users.get(user_id)
    }

    /// Records that `user_id` now occupies `session_id`.
    ///
    /// # Errors
    /// - [`UserError::NotFound`]: the user is not connected
    /// - [`UserError::AlreadyInSession`]: the user must leave first
    pub fn affiliate(
        &mut self,
        user_id: &UserId,
        session_id: SessionId,
    ) -> Result<(), UserError> {
        let user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| UserError::NotFound(user_id.clone()))?;

        if let Some(current) = &user.session_id {
            return Err(UserError::AlreadyInSession(
                user_id.clone(),
                current.clone(),
            ));
        }

        user.session_id = Some(session_id);
        Ok(())
    }

    /// Clears the user's affiliation and returns the session it pointed
    /// at, if any. Unknown users are ignored.
    pub fn clear_session(&mut self, user_id: &UserId) -> Option<SessionId> {
        self.users
            .get_mut(user_id)
            .and_then(|user| user.session_id.take())
    }

    /// Removes a user entirely. Returns the removed record, or `None` if
    /// it was already gone.
    pub fn remove(&mut self, user_id: &UserId) -> Option<User> {
        self.users.remove(user_id)
    }

    /// Drops every user. Their connections stay open; they simply stop
    /// being known to the coordinator.
    pub fn clear(&mut self) {
        self.users.clear();
    }

    /// Returns the number of connected users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns `true` if no user is connected.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new(RandomIdGenerator::default())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Naming follows `test_{function}_{scenario}_{expected}`.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;

    /// Replays a fixed list of ids, in order. Lets a test force the
    /// registry to see collisions.
    struct ScriptedIds(Mutex<VecDeque<&'static str>>);

    impl ScriptedIds {
        fn new(ids: &[&'static str]) -> Self {
            Self(Mutex::new(ids.iter().copied().collect()))
        }
    }

    impl IdGenerator for ScriptedIds {
        fn generate(&self) -> UserId {
            let next = self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .expect("script ran out of ids");
            UserId::new(next)
        }
    }

    fn sender() -> UserSender {
        mpsc::unbounded_channel().0
    }

    fn uid(id: &str) -> UserId {
        UserId::new(id)
    }

    fn sid(id: &str) -> SessionId {
        SessionId::new(id)
    }

    // =====================================================================
    // register()
    // =====================================================================

    #[test]
    fn test_register_new_user_is_unaffiliated() {
        let mut registry = UserRegistry::default();

        let id = registry.register(sender());

        let user = registry.get(&id).expect("should be registered");
        assert_eq!(user.id, id);
        assert!(user.session_id.is_none());
        assert!(!user.is_affiliated());
        assert_eq!(id.as_str().len(), 16);
    }

    #[test]
    fn test_register_collision_rerolls_until_free() {
        // The generator repeats "aaaa" while it is taken; the second
        // registration must discard it and take "bbbb".
        let mut registry =
            UserRegistry::new(ScriptedIds::new(&["aaaa", "aaaa", "aaaa", "bbbb"]));
        let first = registry.register(sender());
        let second = registry.register(sender());

        assert_eq!(first, uid("aaaa"));
        assert_eq!(second, uid("bbbb"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_skips_every_live_id() {
        let mut registry = UserRegistry::new(ScriptedIds::new(&[
            "aaaa", "bbbb", "aaaa", "bbbb", "cccc",
        ]));
        let a = registry.register(sender());
        let b = registry.register(sender());
        let c = registry.register(sender());

        assert_eq!((a, b, c), (uid("aaaa"), uid("bbbb"), uid("cccc")));
    }

    #[test]
    fn test_register_reuses_id_after_removal() {
        // Uniqueness is against the live registry, not history.
        let mut registry =
            UserRegistry::new(ScriptedIds::new(&["aaaa", "aaaa"]));
        let first = registry.register(sender());
        registry.remove(&first);

        let second = registry.register(sender());

        assert_eq!(first, second);
    }

    // =====================================================================
    // affiliate() / clear_session()
    // =====================================================================

    #[test]
    fn test_affiliate_sets_session() {
        let mut registry = UserRegistry::default();
        let id = registry.register(sender());

        registry.affiliate(&id, sid("s1")).expect("should affiliate");

        assert_eq!(registry.get(&id).unwrap().session_id, Some(sid("s1")));
    }

    #[test]
    fn test_affiliate_twice_returns_already_in_session() {
        let mut registry = UserRegistry::default();
        let id = registry.register(sender());
        registry.affiliate(&id, sid("s1")).unwrap();

        let result = registry.affiliate(&id, sid("s2"));

        assert!(matches!(
            result,
            Err(UserError::AlreadyInSession(_, current)) if current == sid("s1")
        ));
        assert_eq!(registry.get(&id).unwrap().session_id, Some(sid("s1")));
    }

    #[test]
    fn test_affiliate_unknown_user_returns_not_found() {
        let mut registry = UserRegistry::default();

        let result = registry.affiliate(&uid("ghost"), sid("s1"));

        assert!(matches!(result, Err(UserError::NotFound(u)) if u == uid("ghost")));
    }

    #[test]
    fn test_clear_session_returns_previous_session() {
        let mut registry = UserRegistry::default();
        let id = registry.register(sender());
        registry.affiliate(&id, sid("s1")).unwrap();

        assert_eq!(registry.clear_session(&id), Some(sid("s1")));
        assert_eq!(registry.clear_session(&id), None);
        assert!(!registry.get(&id).unwrap().is_affiliated());
    }

    // =====================================================================
    // remove() / clear() / len()
    // =====================================================================

    #[test]
    fn test_remove_twice_is_noop() {
        let mut registry = UserRegistry::default();
        let id = registry.register(sender());

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_len_tracks_registrations_and_clear() {
        let mut registry = UserRegistry::default();
        assert!(registry.is_empty());

        registry.register(sender());
        registry.register(sender());
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
    }
}
