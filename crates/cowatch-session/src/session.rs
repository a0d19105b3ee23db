//! Session actor: an isolated Tokio task that owns one viewing session.
//!
//! Each session runs in its own task and talks to the outside world
//! through an mpsc channel. Commands for one session are processed one at
//! a time, so every member observes that session's messages in the same
//! order they were appended to the log. Different sessions never contend.

use cowatch_protocol::{
    ChatMessage, JoinAck, PlaybackState, Presence, ServerEvent, ServerFrame,
    SessionId, UserId,
};
use cowatch_users::UserSender;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::CoordinatorError;

const JOINED: &str = "joined";
const LEFT: &str = "left";

/// Commands sent to a session actor through its channel.
///
/// Variants carrying a `oneshot::Sender` are request/response: the caller
/// waits for the actor to finish the command, broadcasts included.
pub(crate) enum SessionCommand {
    /// Add a member.
    Join {
        user_id: UserId,
        sender: UserSender,
        reply: oneshot::Sender<Result<JoinAck, CoordinatorError>>,
    },

    /// Remove a member.
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<Result<LeaveOutcome, CoordinatorError>>,
    },

    /// Update a member's typing flag.
    Typing {
        user_id: UserId,
        typing: bool,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    /// Append a chat message from a member.
    SendMessage {
        user_id: UserId,
        body: String,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    /// Request a snapshot of the session.
    GetInfo { reply: oneshot::Sender<SessionInfo> },

    /// Stop the actor without notifying members.
    Shutdown,
}

/// What a leave did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The last member left. The actor has stopped.
    Emptied,
    /// Members remain.
    Remaining(usize),
}

/// A snapshot of one session, as served by the diagnostic dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: SessionId,
    pub messages: Vec<ChatMessage>,
    /// The first member to join. Only unset while the creating join is
    /// still in flight.
    pub owner_id: Option<UserId>,
    pub state: PlaybackState,
    /// Members in join order.
    pub user_ids: Vec<UserId>,
}

/// Handle to a running session actor.
///
/// Cheap to clone: it wraps an `mpsc::Sender`. The coordinator keeps one
/// in each session's slot and clones it out for typing and chat.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: SessionId,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Adds a member and returns the join acknowledgement.
    pub async fn join(
        &self,
        user_id: UserId,
        sender: UserSender,
    ) -> Result<JoinAck, CoordinatorError> {
        self.request(|reply| SessionCommand::Join {
            user_id,
            sender,
            reply,
        })
        .await?
    }

    /// Removes a member.
    pub async fn leave(
        &self,
        user_id: UserId,
    ) -> Result<LeaveOutcome, CoordinatorError> {
        self.request(|reply| SessionCommand::Leave { user_id, reply })
            .await?
    }

    /// Sets a member's typing flag.
    pub async fn typing(
        &self,
        user_id: UserId,
        typing: bool,
    ) -> Result<(), CoordinatorError> {
        self.request(|reply| SessionCommand::Typing {
            user_id,
            typing,
            reply,
        })
        .await?
    }

    /// Appends a chat message from a member.
    pub async fn send_message(
        &self,
        user_id: UserId,
        body: String,
    ) -> Result<(), CoordinatorError> {
        self.request(|reply| SessionCommand::SendMessage {
            user_id,
            body,
            reply,
        })
        .await?
    }

    /// Requests a snapshot of the session.
    pub async fn get_info(&self) -> Result<SessionInfo, CoordinatorError> {
        self.request(|reply| SessionCommand::GetInfo { reply }).await
    }

    /// Tells the actor to stop.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.sender
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| self.unavailable())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, CoordinatorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| self.unavailable())?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> CoordinatorError {
        CoordinatorError::Unavailable(self.session_id.clone())
    }
}

/// A member's slot in the session.
struct Member {
    user_id: UserId,
    typing: bool,
    sender: UserSender,
}

/// The internal actor state. Runs inside a Tokio task.
struct SessionActor {
    session_id: SessionId,
    owner_id: Option<UserId>,
    state: PlaybackState,
    /// Join order. Broadcasts iterate in this order.
    members: Vec<Member>,
    messages: Vec<ChatMessage>,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl SessionActor {
    /// Runs the actor loop until shutdown or until the last member leaves.
    async fn run(mut self) {
        tracing::debug!(session_id = %self.session_id, "session actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                SessionCommand::Join {
                    user_id,
                    sender,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(user_id, sender));
                }
                SessionCommand::Leave { user_id, reply } => {
                    let result = self.handle_leave(&user_id);
                    let emptied = matches!(result, Ok(LeaveOutcome::Emptied));
                    let _ = reply.send(result);
                    if emptied {
                        break;
                    }
                }
                SessionCommand::Typing {
                    user_id,
                    typing,
                    reply,
                } => {
                    let _ = reply.send(self.handle_typing(&user_id, typing));
                }
                SessionCommand::SendMessage {
                    user_id,
                    body,
                    reply,
                } => {
                    let _ = reply.send(self.handle_send_message(user_id, body));
                }
                SessionCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                SessionCommand::Shutdown => {
                    tracing::debug!(session_id = %self.session_id, "session shutting down");
                    break;
                }
            }
        }

        tracing::debug!(session_id = %self.session_id, "session actor stopped");
    }

    fn handle_join(
        &mut self,
        user_id: UserId,
        sender: UserSender,
    ) -> Result<JoinAck, CoordinatorError> {
        if self.position(&user_id).is_some() {
            return Err(CoordinatorError::AlreadyInSession);
        }

        // A brand new session answers with the history as it was before
        // the joiner's own notice, which is empty.
        let creating = self.members.is_empty();
        let history_before = self.messages.clone();
        let owner_id = self
            .owner_id
            .get_or_insert_with(|| user_id.clone())
            .clone();

        self.members.push(Member {
            user_id: user_id.clone(),
            typing: false,
            sender,
        });
        tracing::info!(
            session_id = %self.session_id,
            %user_id,
            members = self.members.len(),
            "user joined session"
        );

        self.post(system_message(JOINED, &user_id));

        Ok(JoinAck {
            messages: if creating {
                history_before
            } else {
                self.messages.clone()
            },
            owner_id: Some(owner_id),
            state: self.state,
            session_id: self.session_id.clone(),
        })
    }

    fn handle_leave(
        &mut self,
        user_id: &UserId,
    ) -> Result<LeaveOutcome, CoordinatorError> {
        let index = self
            .position(user_id)
            .ok_or(CoordinatorError::NotInSession)?;

        // The leaver is still a member here, so it sees its own notice.
        self.post(system_message(LEFT, user_id));
        self.members.remove(index);
        tracing::info!(
            session_id = %self.session_id,
            %user_id,
            members = self.members.len(),
            "user left session"
        );

        if self.members.is_empty() {
            return Ok(LeaveOutcome::Emptied);
        }

        self.broadcast_presence(None);
        Ok(LeaveOutcome::Remaining(self.members.len()))
    }

    fn handle_typing(
        &mut self,
        user_id: &UserId,
        typing: bool,
    ) -> Result<(), CoordinatorError> {
        let index = self
            .position(user_id)
            .ok_or(CoordinatorError::NotInSession)?;
        self.members[index].typing = typing;
        tracing::debug!(session_id = %self.session_id, %user_id, typing, "typing updated");

        self.broadcast_presence(Some(user_id));
        Ok(())
    }

    fn handle_send_message(
        &mut self,
        user_id: UserId,
        body: String,
    ) -> Result<(), CoordinatorError> {
        if self.position(&user_id).is_none() {
            return Err(CoordinatorError::NotInSession);
        }
        if body.trim().is_empty() {
            return Err(CoordinatorError::InvalidMessageBody);
        }

        tracing::debug!(session_id = %self.session_id, %user_id, "message sent");
        self.post(ChatMessage {
            body,
            is_system_message: false,
            timestamp: now_millis(),
            user_id,
        });
        Ok(())
    }

    /// Appends to the log, then delivers to every member.
    fn post(&mut self, message: ChatMessage) {
        self.messages.push(message.clone());
        let frame = ServerFrame::Event(ServerEvent::SendMessage(message));
        for member in &self.members {
            // A closed receiver means the connection is going away; its
            // disconnect will arrive through the coordinator.
            let _ = member.sender.send(frame.clone());
        }
    }

    fn broadcast_presence(&self, except: Option<&UserId>) {
        let frame = ServerFrame::Event(ServerEvent::SetPresence(Presence {
            anyone_typing: self.anyone_typing(),
        }));
        for member in &self.members {
            if Some(&member.user_id) == except {
                continue;
            }
            let _ = member.sender.send(frame.clone());
        }
    }

    fn anyone_typing(&self) -> bool {
        self.members.iter().any(|m| m.typing)
    }

    fn position(&self, user_id: &UserId) -> Option<usize> {
        self.members.iter().position(|m| &m.user_id == user_id)
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.session_id.clone(),
            messages: self.messages.clone(),
            owner_id: self.owner_id.clone(),
            state: self.state,
            user_ids: self.members.iter().map(|m| m.user_id.clone()).collect(),
        }
    }
}

fn system_message(body: &str, user_id: &UserId) -> ChatMessage {
    ChatMessage {
        body: body.to_owned(),
        is_system_message: true,
        timestamp: now_millis(),
        user_id: user_id.clone(),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Spawns a new, empty session actor and returns a handle to it.
///
/// Whoever joins first becomes the owner.
pub(crate) fn spawn_session(
    session_id: SessionId,
    channel_size: usize,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let actor = SessionActor {
        session_id: session_id.clone(),
        owner_id: None,
        state: PlaybackState::default(),
        members: Vec::new(),
        messages: Vec::new(),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    SessionHandle {
        session_id,
        sender: tx,
    }
}
