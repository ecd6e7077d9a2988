//! # Audio Module
//!
//! Per-guild playback: queues, sessions and the voice transport they drive.
//!
//! ## Architecture
//!
//! ### [`queue`] - Guild Queue Store
//! - One FIFO queue of [`Track`](crate::sources::Track)s per guild
//! - Lazily created on first enqueue, removed when the session is destroyed
//!
//! ### [`session`] - Playback Session
//! - One tokio task per guild with active playback
//! - `Connecting → Playing ⇄ Idle → Destroyed`, driven by [`voice::SessionEvent`]s
//! - Idle timeout and reconnect grace live inside the session loop
//!
//! ### [`registry`] - Session Registry
//! - At most one live session per guild
//! - Creation, teardown and shutdown of sessions
//!
//! ### [`voice`] / [`songbird_voice`] - Voice Transport
//! - The trait boundary the sessions talk to, and its songbird implementation
//!
//! ## Lock order
//!
//! Registry entry first, queue store second. No lock is held across an
//! `.await`.

pub mod queue;
pub mod registry;
pub mod session;
pub mod songbird_voice;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use queue::GuildQueueStore;
pub use registry::{SessionRegistry, Submission};
pub use session::{SessionSettings, SessionState};
pub use songbird_voice::SongbirdTransport;
