//! Streaming core for writing chat-completion responses into a live markdown note.
//!
//! The crate turns a server-sent event stream into edits against a host
//! document: frames are parsed, routed to actions, applied at the live cursor
//! as they arrive, and finally replaced in one corrective pass with the
//! accumulated (fence-repaired) text.
//!
//! # Usage
//!
//! ```no_run
//! use chatmd_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let config = StreamConfig::from_env()?;
//! let payload = ChatPayload::new("gpt-4o-mini", vec![ChatMessage::user("Say hello")]);
//! let mut transport = HttpEventSource::chat(&config, &payload)?;
//!
//! let mut note = MemoryDocument::new("# Notes\n\nSay hello");
//! note.set_cursor(note.end());
//!
//! let session = StreamSession::new(SessionConfig::default(), &note);
//! let completion = session.run(&mut transport, &mut note).await?;
//! println!("{}", completion.text);
//! # Ok(())
//! # }
//! ```

/// Runtime configuration for the HTTP transport and sessions.
pub mod config;
/// Insertion bookkeeping against a `TextSurface`.
pub mod cursor;
/// Error types surfaced by sessions and transports.
pub mod errors;
/// Unterminated code fence detection and repair.
pub mod fence;
/// Event frame parsing and chunk splitting.
pub mod frame;
/// Outbound chat request payload.
pub mod payload;
/// Common imports for typical usage.
pub mod prelude;
/// Maps transport events to session actions.
pub mod router;
/// The streaming session state machine and its run loop.
pub mod session;
/// In-memory text surface.
pub mod surface;
/// Transport contract and the reqwest-backed event source.
pub mod transport;

pub use config::{InsertMode, SessionConfig, StreamConfig};
pub use cursor::{CursorTracker, Position, TextSurface};
pub use errors::{ErrorPayload, StreamError};
pub use fence::{has_unfinished_code_block, repair};
pub use frame::{ChunkSplitter, EventFrame, FrameParser, LastWriteWins, NamedEvent, parse_chunk};
pub use payload::{ChatMessage, ChatPayload};
pub use router::{Action, route};
pub use session::{CancelHandle, Completion, Notice, StreamSession, StreamState};
pub use surface::MemoryDocument;
pub use transport::{HttpEventSource, Transport, TransportEvent, TransportRequest};
