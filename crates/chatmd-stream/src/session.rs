use std::fmt;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::cursor::{CursorTracker, Position, TextSurface};
use crate::errors::StreamError;
use crate::fence;
use crate::router::{Action, route};
use crate::transport::{Transport, TransportEvent};

/// Lifecycle of a streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StreamState {
    Idle,
    Open,
    Streaming,
    Closed,
    Errored,
    Aborted,
}

impl StreamState {
    /// `Closed`, `Errored` and `Aborted` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored | Self::Aborted)
    }
}

/// Conditions the caller should show to the user.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Notice {
    /// The stream was stopped on request.
    Cancelled,
    /// Content after the answer was deleted (append mode).
    TrailingContentRemoved { from: Position, chars: usize },
    /// Text written at the cursor could not be cleaned up after (at-cursor mode).
    ArtifactsMayRemain,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("Response streaming stopped."),
            Self::TrailingContentRemoved { from, chars } => write!(
                f,
                "Removed {chars} characters after the response (from line {}, column {}).",
                from.line + 1,
                from.ch + 1
            ),
            Self::ArtifactsMayRemain => f.write_str(
                "Text pasted at cursor may leave artifacts. Please remove them manually.",
            ),
        }
    }
}

/// Successful settlement of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Accumulated answer text (fence-repaired when the stream finished).
    pub text: String,
    /// `Closed` for a finished stream, `Aborted` for a cancelled one.
    pub state: StreamState,
    pub notices: Vec<Notice>,
}

impl Completion {
    pub fn was_cancelled(&self) -> bool {
        self.state == StreamState::Aborted
    }
}

/// Handle used to cancel a running session from elsewhere.
///
/// Cancelling after the session settled does nothing.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation. Settlement happens once the transport delivers
    /// the resulting abort.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Streams one answer into a text surface.
///
/// Drive it either with [`StreamSession::run`], which pulls events from a
/// [`Transport`], or by feeding events to [`StreamSession::handle_event`]
/// from the host's event loop. Either way the session settles exactly once;
/// events arriving afterwards are discarded.
pub struct StreamSession {
    id: uuid::Uuid,
    config: SessionConfig,
    state: StreamState,
    accumulated: String,
    manual_close: bool,
    tracker: CursorTracker,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl StreamSession {
    /// Creates a session anchored at the surface's current cursor.
    pub fn new<S: TextSurface + ?Sized>(config: SessionConfig, surface: &S) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let tracker = CursorTracker::new(surface, config.insert_mode);
        Self {
            id: uuid::Uuid::new_v4(),
            config,
            state: StreamState::Idle,
            accumulated: String::new(),
            manual_close: false,
            tracker,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Text received so far.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Returns a handle that can cancel [`StreamSession::run`] while it waits.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Marks the close as requested and asks the transport to close.
    ///
    /// A no-op once the session has settled.
    pub fn cancel<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        if self.state.is_terminal() || self.manual_close {
            return;
        }
        info!(session_id = %self.id, chars = self.accumulated.len(), "cancelling stream");
        self.manual_close = true;
        transport.close();
    }

    /// Applies one event. Returns the settlement the first time a terminal
    /// event arrives and `None` otherwise.
    pub fn handle_event<S: TextSurface + ?Sized>(
        &mut self,
        event: TransportEvent,
        surface: &mut S,
    ) -> Option<Result<Completion, StreamError>> {
        if self.state.is_terminal() {
            debug!(session_id = %self.id, state = ?self.state, "discarding event after settlement");
            return None;
        }

        match route(&event, self.manual_close) {
            Action::OpenInsertedHeader => {
                if self.state != StreamState::Idle {
                    debug!(session_id = %self.id, "ignoring repeated open");
                    return None;
                }
                debug!(session_id = %self.id, "stream opened");
                self.tracker.on_open(surface, &self.config.header());
                self.state = StreamState::Open;
                None
            }
            Action::AppendDelta(text) => {
                self.tracker.on_delta(surface, &text);
                self.accumulated.push_str(&text);
                self.state = StreamState::Streaming;
                None
            }
            Action::Ignore => None,
            Action::Terminal => Some(Ok(self.finish(surface))),
            Action::ManualAbort => {
                self.state = StreamState::Aborted;
                info!(session_id = %self.id, chars = self.accumulated.len(), "stream cancelled");
                Some(Ok(Completion {
                    text: self.accumulated.clone(),
                    state: StreamState::Aborted,
                    notices: vec![Notice::Cancelled],
                }))
            }
            Action::TransportError(payload) => {
                self.state = StreamState::Errored;
                let err = StreamError::transport(payload);
                warn!(session_id = %self.id, error = %err, "stream failed");
                Some(Err(err))
            }
        }
    }

    fn finish<S: TextSurface + ?Sized>(&mut self, surface: &mut S) -> Completion {
        self.accumulated = fence::repair(&self.accumulated);
        let notices = self
            .tracker
            .on_terminal(surface, &self.accumulated)
            .into_iter()
            .collect();
        self.state = StreamState::Closed;
        info!(session_id = %self.id, chars = self.accumulated.len(), "stream completed");
        Completion {
            text: self.accumulated.clone(),
            state: StreamState::Closed,
            notices,
        }
    }

    /// Starts the transport and applies its events until the session settles.
    ///
    /// Events are handled one at a time on the calling task. A cancel request,
    /// including one made while the transport is still starting, closes the
    /// transport; the abort it produces settles the session with the text
    /// received so far. A transport that runs dry without a terminal event is
    /// treated as an abort.
    pub async fn run<T, S>(
        mut self,
        transport: &mut T,
        surface: &mut S,
    ) -> Result<Completion, StreamError>
    where
        T: Transport + ?Sized,
        S: TextSurface + ?Sized,
    {
        debug!(session_id = %self.id, "starting stream");
        let mut cancel_rx = self.cancel_rx.clone();
        let started = tokio::select! {
            biased;
            () = cancel_requested(&mut cancel_rx) => None,
            result = transport.start() => Some(result),
        };
        match started {
            Some(Ok(())) => {}
            Some(Err(err)) => {
                self.state = StreamState::Errored;
                warn!(session_id = %self.id, error = %err, "stream failed to start");
                return Err(err);
            }
            None => {
                debug!(session_id = %self.id, "cancelled while starting");
                self.cancel(transport);
            }
        }

        loop {
            tokio::select! {
                biased;
                () = cancel_requested(&mut cancel_rx), if !self.manual_close => {
                    self.cancel(transport);
                }
                next = transport.next_event() => {
                    let event = next.unwrap_or_else(|| {
                        debug!(session_id = %self.id, "transport ran dry");
                        TransportEvent::Abort
                    });
                    if let Some(result) = self.handle_event(event, surface) {
                        if self.state != StreamState::Aborted {
                            transport.close();
                        }
                        return result;
                    }
                }
            }
        }
    }
}

/// Resolves once cancellation has been requested.
async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender dropped: no cancel can arrive any more.
        std::future::pending::<()>().await;
    }
}
