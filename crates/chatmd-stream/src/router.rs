use tracing::{debug, warn};

use crate::errors::ErrorPayload;
use crate::transport::TransportEvent;

/// Terminal sentinel carried in the data of a `message` frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a session should do with one transport event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write the header block and anchor the answer after it.
    OpenInsertedHeader,
    /// Append a text fragment.
    AppendDelta(String),
    /// Nothing to do.
    Ignore,
    /// The stream finished normally.
    Terminal,
    /// The stream failed; `None` for an abort nobody asked for.
    TransportError(Option<ErrorPayload>),
    /// The stream was closed on request.
    ManualAbort,
}

impl Action {
    /// Returns `true` for actions that settle a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Terminal | Self::TransportError(_) | Self::ManualAbort
        )
    }
}

/// Maps a transport event to an action. `manual_close` tells a requested
/// abort apart from an unexpected one.
pub fn route(event: &TransportEvent, manual_close: bool) -> Action {
    match event {
        TransportEvent::Open => Action::OpenInsertedHeader,
        TransportEvent::Abort if manual_close => Action::ManualAbort,
        TransportEvent::Abort => {
            warn!("stream aborted without a cancel request");
            Action::TransportError(None)
        }
        TransportEvent::Event(event) => match event.name.as_str() {
            "message" if event.data == DONE_SENTINEL => Action::Terminal,
            "message" => route_delta(&event.data),
            "error" => Action::TransportError(Some(ErrorPayload::from_event(event))),
            other => {
                debug!(event = other, "ignoring unhandled event");
                Action::Ignore
            }
        },
    }
}

fn route_delta(data: &str) -> Action {
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "skipping message with invalid JSON");
            return Action::Ignore;
        }
    };
    match value
        .pointer("/choices/0/delta/content")
        .and_then(|v| v.as_str())
    {
        Some(text) if !text.is_empty() => Action::AppendDelta(text.to_string()),
        _ => Action::Ignore,
    }
}
