use crate::errors::StreamError;
use crate::frame::NamedEvent;

mod http;

pub use http::{HttpEventSource, TransportRequest};

/// Events delivered by a transport, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection was established.
    Open,
    /// A parsed frame (`message`, `error`, or any other event name).
    Event(NamedEvent),
    /// The connection was closed before the stream finished.
    Abort,
}

impl TransportEvent {
    /// Shorthand for a `message` frame.
    pub fn message(data: impl Into<String>) -> Self {
        Self::Event(NamedEvent::message(data))
    }

    /// Shorthand for an `error` frame.
    pub fn error(data: impl Into<String>) -> Self {
        Self::Event(NamedEvent::error(data))
    }
}

/// Source of stream events for a session.
///
/// `close` only requests shutdown: the matching [`TransportEvent::Abort`] is
/// returned by a later `next_event` call.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Begins delivery (sends the request for network transports).
    async fn start(&mut self) -> Result<(), StreamError>;

    /// Waits for the next event. `None` once the transport has nothing more
    /// to deliver.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Requests the connection be closed.
    fn close(&mut self);
}
