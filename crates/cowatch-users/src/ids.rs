//! User id generation.
//!
//! Ids are short random hex strings. Nothing here guarantees uniqueness:
//! [`UserRegistry::register`](crate::UserRegistry::register) re-rolls
//! until the value is free. The generator is a trait so tests can feed a
//! scripted sequence and force collisions.

use cowatch_protocol::UserId;
use rand::Rng;

/// Default id length: 16 hex characters, 64 bits of entropy.
pub const DEFAULT_ID_LENGTH: usize = 16;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Produces candidate user ids.
///
/// # Example
///
/// ```rust
/// use cowatch_protocol::UserId;
/// use cowatch_users::IdGenerator;
///
/// /// Hands out "user-1", "user-2", ... Handy in demos, not random.
/// struct Counter(std::sync::atomic::AtomicU64);
///
/// impl IdGenerator for Counter {
///     fn generate(&self) -> UserId {
///         let n = self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///         UserId::new(format!("user-{n}"))
///     }
/// }
/// ```
pub trait IdGenerator: Send + Sync + 'static {
    /// Returns a candidate id. May repeat; the caller checks.
    fn generate(&self) -> UserId;
}

/// Random lowercase-hex ids of a fixed length.
#[derive(Debug, Clone, Copy)]
pub struct RandomIdGenerator {
    len: usize,
}

impl RandomIdGenerator {
    /// Creates a generator producing ids of `len` hex characters.
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    /// Length of every id this generator produces.
    pub fn id_length(&self) -> usize {
        self.len
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_LENGTH)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> UserId {
        let mut rng = rand::rng();
        let id: String = (0..self.len)
            .map(|_| HEX_CHARS[rng.random_range(0..HEX_CHARS.len())] as char)
            .collect();
        UserId::new(id)
    }
}
