//! Session coordinator: registers users, routes them into sessions, and
//! keeps both registries consistent.
//!
//! # Locking
//!
//! The session map and the user registry are each behind an async mutex
//! that is only held for a map lookup or update, never while a session
//! actor is being awaited. Every live session also has a slot of its own,
//! `Arc<Mutex<Option<SessionHandle>>>`. Membership changes for one session
//! (join, leave, the leave half of a disconnect) run with that slot
//! locked, so they are serialized per session while other sessions carry
//! on. A slot set to `None` has been closed: its actor is gone and the
//! entry is on its way out of the map.
//!
//! Locks are only ever nested in the order slot, then map or users.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cowatch_protocol::{
    EventKind, JoinAck, ServerEvent, ServerFrame, SessionId, UserId,
};
use cowatch_users::{IdGenerator, RandomIdGenerator, UserRegistry, UserSender};
use tokio::sync::Mutex;

use crate::session::spawn_session;
use crate::{
    CoordinatorConfig, CoordinatorError, LeaveOutcome, SessionHandle,
    SessionInfo,
};

/// One session's entry in the map.
type Slot = Arc<Mutex<Option<SessionHandle>>>;

/// The authoritative registry of sessions and connected users.
///
/// Shared between connection handlers behind an `Arc`; every method takes
/// `&self`.
pub struct SessionCoordinator {
    sessions: Mutex<HashMap<SessionId, Slot>>,
    users: Mutex<UserRegistry>,
    config: CoordinatorConfig,
}

impl SessionCoordinator {
    /// Creates an empty coordinator with random user ids.
    pub fn new(config: CoordinatorConfig) -> Self {
        let ids = RandomIdGenerator::new(config.id_length);
        Self::with_id_generator(config, ids)
    }

    /// Creates an empty coordinator that draws user ids from `ids`.
    pub fn with_id_generator(
        config: CoordinatorConfig,
        ids: impl IdGenerator,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            users: Mutex::new(UserRegistry::new(ids)),
            config,
        }
    }

    /// Registers a new connection and tells it its id.
    ///
    /// The `userId` event is the first frame pushed into `sender`.
    pub async fn connect(&self, sender: UserSender) -> UserId {
        let mut users = self.users.lock().await;
        let user_id = users.register(sender.clone());
        let _ = sender.send(ServerFrame::Event(ServerEvent::UserId(
            user_id.clone(),
        )));
        tracing::info!(%user_id, users = users.len(), "user connected");
        user_id
    }

    /// Checks that `user_id` is registered and in the right place for a
    /// request of this kind, without looking at its payload.
    ///
    /// # Errors
    /// - [`CoordinatorError::Disconnected`]: the user is not registered
    /// - [`CoordinatorError::AlreadyInSession`]: a join from a member
    /// - [`CoordinatorError::NotInSession`]: anything else from a non-member
    pub async fn check(
        &self,
        user_id: &UserId,
        kind: EventKind,
    ) -> Result<(), CoordinatorError> {
        let users = self.users.lock().await;
        let user = users.get(user_id).ok_or(CoordinatorError::Disconnected)?;
        match (kind.requires_session(), user.is_affiliated()) {
            (false, true) => Err(CoordinatorError::AlreadyInSession),
            (true, false) => Err(CoordinatorError::NotInSession),
            _ => Ok(()),
        }
    }

    /// Puts a user into a session, creating the session if it is unknown.
    ///
    /// # Errors
    /// - [`CoordinatorError::Disconnected`]: the user is not registered
    /// - [`CoordinatorError::AlreadyInSession`]: the user must leave first
    pub async fn join(
        &self,
        user_id: &UserId,
        session_id: SessionId,
    ) -> Result<JoinAck, CoordinatorError> {
        let sender = {
            let users = self.users.lock().await;
            let user =
                users.get(user_id).ok_or(CoordinatorError::Disconnected)?;
            if user.is_affiliated() {
                return Err(CoordinatorError::AlreadyInSession);
            }
            user.sender.clone()
        };

        loop {
            let slot = self.open_slot(&session_id).await;
            let mut current = slot.lock().await;
            // Closed between the lookup and the lock.
            let Some(handle) = current.clone() else {
                continue;
            };

            let ack = match handle.join(user_id.clone(), sender.clone()).await {
                Ok(ack) => ack,
                Err(err) => {
                    if matches!(err, CoordinatorError::Unavailable(_)) {
                        self.close_slot(&session_id, &slot, &mut current)
                            .await;
                    }
                    return Err(err);
                }
            };

            let affiliated =
                self.users.lock().await.affiliate(user_id, session_id.clone());
            if let Err(err) = affiliated {
                // The user went away mid-join (a reset). Undo the join so
                // the session does not list a stranger.
                let outcome = handle.leave(user_id.clone()).await;
                if !matches!(outcome, Ok(LeaveOutcome::Remaining(_))) {
                    self.close_slot(&session_id, &slot, &mut current).await;
                }
                return Err(err.into());
            }
            return Ok(ack);
        }
    }

    /// Takes a user out of its session on its own request.
    ///
    /// # Errors
    /// - [`CoordinatorError::Disconnected`]: the user is not registered
    /// - [`CoordinatorError::NotInSession`]: there is nothing to leave
    pub async fn leave(&self, user_id: &UserId) -> Result<(), CoordinatorError> {
        let session_id = self.session_id_for(user_id).await?;
        self.leave_session(user_id, &session_id).await;
        Ok(())
    }

    /// Sets the user's typing flag and tells the other members.
    ///
    /// # Errors
    /// - [`CoordinatorError::Disconnected`]: the user is not registered
    /// - [`CoordinatorError::NotInSession`]: the user occupies no session
    pub async fn set_typing(
        &self,
        user_id: &UserId,
        typing: bool,
    ) -> Result<(), CoordinatorError> {
        let handle = self.session_handle_for(user_id).await?;
        handle.typing(user_id.clone(), typing).await
    }

    /// Appends a chat message to the user's session and broadcasts it to
    /// every member, the author included.
    ///
    /// # Errors
    /// - [`CoordinatorError::Disconnected`]: the user is not registered
    /// - [`CoordinatorError::NotInSession`]: the user occupies no session
    /// - [`CoordinatorError::InvalidMessageBody`]: blank after trimming
    pub async fn send_message(
        &self,
        user_id: &UserId,
        body: String,
    ) -> Result<(), CoordinatorError> {
        let handle = self.session_handle_for(user_id).await?;
        handle.send_message(user_id.clone(), body).await
    }

    /// Forgets a connection, leaving its session first if it has one.
    ///
    /// Disconnecting an unknown user (a duplicate disconnect, or one that
    /// arrives after a reset) does nothing.
    pub async fn disconnect(&self, user_id: &UserId) {
        let session_id = match self.users.lock().await.get(user_id) {
            Some(user) => user.session_id.clone(),
            None => {
                tracing::debug!(%user_id, "disconnect for unknown user ignored");
                return;
            }
        };

        if let Some(session_id) = session_id {
            self.leave_session(user_id, &session_id).await;
        }

        let mut users = self.users.lock().await;
        users.remove(user_id);
        tracing::info!(%user_id, users = users.len(), "user disconnected");
    }

    /// Returns the session a user currently occupies.
    pub async fn session_of(&self, user_id: &UserId) -> Option<SessionId> {
        self.users
            .lock()
            .await
            .get(user_id)
            .and_then(|user| user.session_id.clone())
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Number of connected users.
    pub async fn user_count(&self) -> usize {
        self.users.lock().await.len()
    }

    /// Snapshots every live session, keyed by id.
    ///
    /// A session that closes in the meantime, or whose first join has not
    /// landed yet, is skipped.
    pub async fn session_details(&self) -> BTreeMap<SessionId, SessionInfo> {
        let slots: Vec<Slot> =
            self.sessions.lock().await.values().cloned().collect();

        let mut details = BTreeMap::new();
        for slot in slots {
            let Some(handle) = slot.lock().await.clone() else {
                continue;
            };
            match handle.get_info().await {
                Ok(info) if !info.user_ids.is_empty() => {
                    details.insert(info.id.clone(), info);
                }
                _ => {}
            }
        }
        details
    }

    /// Stops every session and forgets every user.
    ///
    /// Connections stay open. Their later requests are answered with
    /// [`CoordinatorError::Disconnected`] and their disconnects are no-ops.
    /// Users go first, so a join racing the reset fails its affiliation
    /// and backs out.
    pub async fn reset(&self) {
        let dropped_users = {
            let mut users = self.users.lock().await;
            let count = users.len();
            users.clear();
            count
        };

        let slots: Vec<Slot> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        let dropped_sessions = slots.len();
        for slot in slots {
            if let Some(handle) = slot.lock().await.take() {
                let _ = handle.shutdown().await;
            }
        }

        tracing::warn!(dropped_users, dropped_sessions, "coordinator state reset");
    }

    /// Returns the slot for `session_id`, spawning a new session if there
    /// is none.
    async fn open_slot(&self, session_id: &SessionId) -> Slot {
        let mut sessions = self.sessions.lock().await;
        if let Some(slot) = sessions.get(session_id) {
            return Arc::clone(slot);
        }

        let handle = spawn_session(session_id.clone(), self.config.channel_size);
        let slot: Slot = Arc::new(Mutex::new(Some(handle)));
        sessions.insert(session_id.clone(), Arc::clone(&slot));
        tracing::info!(%session_id, sessions = sessions.len(), "session created");
        slot
    }

    /// Marks a locked slot closed and drops it from the map, unless the map
    /// already holds a newer slot under the same id.
    async fn close_slot(
        &self,
        session_id: &SessionId,
        slot: &Slot,
        current: &mut Option<SessionHandle>,
    ) {
        *current = None;
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(session_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, slot))
        {
            sessions.remove(session_id);
        }
        tracing::info!(%session_id, sessions = sessions.len(), "session deleted");
    }

    /// Removes the user from `session_id` and clears its affiliation.
    ///
    /// A session that is already gone only needs the affiliation cleared.
    async fn leave_session(&self, user_id: &UserId, session_id: &SessionId) {
        let slot = self.sessions.lock().await.get(session_id).cloned();

        if let Some(slot) = slot {
            let mut current = slot.lock().await;
            if let Some(handle) = current.clone() {
                match handle.leave(user_id.clone()).await {
                    Ok(LeaveOutcome::Remaining(_)) => {}
                    Ok(LeaveOutcome::Emptied) => {
                        self.close_slot(session_id, &slot, &mut current).await;
                    }
                    Err(err @ CoordinatorError::Unavailable(_)) => {
                        tracing::warn!(%session_id, %user_id, error = %err, "leave hit a dead session");
                        self.close_slot(session_id, &slot, &mut current).await;
                    }
                    Err(err) => {
                        tracing::warn!(%session_id, %user_id, error = %err, "leave rejected by session");
                    }
                }
            }
        }
        self.users.lock().await.clear_session(user_id);
    }

    /// The id of the session the user occupies.
    async fn session_id_for(
        &self,
        user_id: &UserId,
    ) -> Result<SessionId, CoordinatorError> {
        let users = self.users.lock().await;
        let user = users.get(user_id).ok_or(CoordinatorError::Disconnected)?;
        user.session_id.clone().ok_or(CoordinatorError::NotInSession)
    }

    /// Finds the handle of the user's session without keeping any lock.
    async fn session_handle_for(
        &self,
        user_id: &UserId,
    ) -> Result<SessionHandle, CoordinatorError> {
        let session_id = self.session_id_for(user_id).await?;
        let slot = self
            .sessions
            .lock()
            .await
            .get(&session_id)
            .cloned()
            // The session went away between the two lookups.
            .ok_or(CoordinatorError::NotInSession)?;
        let handle = slot.lock().await.clone();
        handle.ok_or(CoordinatorError::NotInSession)
    }
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}
