//! Common imports for streaming an answer into a document.
//!
//! Covers the session, transport and surface types most callers touch, so a
//! host needs a single `use` line.
pub use crate::{
    CancelHandle, ChatMessage, ChatPayload, Completion, ErrorPayload, HttpEventSource,
    InsertMode, MemoryDocument, Notice, Position, SessionConfig, StreamConfig, StreamError,
    StreamSession, StreamState, TextSurface, Transport, TransportEvent,
};
