//! Coordinator configuration.

use cowatch_users::DEFAULT_ID_LENGTH;

/// Default command channel size for session actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Settings for a [`SessionCoordinator`](crate::SessionCoordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Length of generated user ids, in hex characters.
    pub id_length: usize,

    /// Capacity of each session actor's command channel. Senders wait
    /// when it is full, which only happens under a burst of requests for
    /// one session.
    pub channel_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            id_length: DEFAULT_ID_LENGTH,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}
