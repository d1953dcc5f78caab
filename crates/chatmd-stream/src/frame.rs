const FIELD_SEPARATOR: char = ':';
const DEFAULT_EVENT: &str = "message";

/// One parsed unit of the event protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub id: Option<String>,
    pub retry: Option<String>,
    pub data: String,
    pub event: String,
}

impl Default for EventFrame {
    fn default() -> Self {
        Self {
            id: None,
            retry: None,
            data: String::new(),
            event: DEFAULT_EVENT.to_string(),
        }
    }
}

impl EventFrame {
    /// Packages the frame as a named event. `retry` is not carried over.
    pub fn into_named(self) -> NamedEvent {
        NamedEvent {
            name: self.event,
            data: self.data,
            id: self.id,
        }
    }
}

/// A frame as delivered to the session: the event name plus its payload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NamedEvent {
    pub name: String,
    pub data: String,
    pub id: Option<String>,
}

impl NamedEvent {
    /// Creates a `message` event carrying `data`.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_EVENT.to_string(),
            data: data.into(),
            id: None,
        }
    }

    /// Creates an `error` event carrying `data`.
    pub fn error(data: impl Into<String>) -> Self {
        Self {
            name: "error".to_string(),
            data: data.into(),
            id: None,
        }
    }
}

/// Strategy used by a transport to turn one raw chunk into an event.
///
/// Transports take the parser at construction time, so a caller can swap the
/// framing rules without touching the transport itself.
pub trait FrameParser: Send + Sync {
    /// Parses `raw` as one complete frame. Returns `None` for a blank chunk.
    fn parse_chunk(&self, raw: &str) -> Option<NamedEvent>;
}

/// Default parser: every field line overwrites its slot, so a repeated
/// `data:` line replaces the previous value instead of being joined to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl FrameParser for LastWriteWins {
    fn parse_chunk(&self, raw: &str) -> Option<NamedEvent> {
        parse_chunk(raw)
    }
}

/// Parses one raw chunk with last-write-wins field semantics.
pub fn parse_chunk(raw: &str) -> Option<NamedEvent> {
    parse_frame(raw).map(EventFrame::into_named)
}

/// Parses one raw chunk into an [`EventFrame`] without packaging it.
pub fn parse_frame(raw: &str) -> Option<EventFrame> {
    if raw.trim().is_empty() {
        return None;
    }
    let mut frame = EventFrame::default();
    for line in raw.split(['\n', '\r']) {
        let line = line.trim_end();
        let Some(index) = line.find(FIELD_SEPARATOR) else {
            continue;
        };
        if index == 0 {
            continue;
        }
        let field = &line[..index];
        let value = strip_leading_space(&line[index + FIELD_SEPARATOR.len_utf8()..]);
        match field {
            "id" => frame.id = Some(value.to_string()),
            "retry" => frame.retry = Some(value.to_string()),
            "data" => frame.data = value.to_string(),
            "event" => frame.event = value.to_string(),
            _ => {}
        }
    }
    Some(frame)
}

fn strip_leading_space(value: &str) -> &str {
    value
        .strip_prefix(|c: char| c.is_whitespace())
        .unwrap_or(value)
}

/// Splits a byte stream into blank-line delimited chunks.
///
/// Bytes are buffered until a delimiter (two consecutive line terminators,
/// each one of `\n`, `\r\n` or `\r`) arrives, so network reads that cut a
/// frame or a UTF-8 sequence in half are reassembled before parsing.
#[derive(Default)]
pub struct ChunkSplitter {
    buf: Vec<u8>,
    /// Offset before which the buffer is known to hold no delimiter.
    scanned: usize,
}

impl ChunkSplitter {
    /// Buffers `bytes` and returns every chunk completed by them.
    pub fn push_chunk(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        let mut from = self.scanned;
        while let Some((idx, delim_len)) = find_chunk_delimiter(&self.buf, from) {
            let chunk = String::from_utf8_lossy(&self.buf[..idx]).into_owned();
            self.buf.drain(..idx + delim_len);
            chunks.push(chunk);
            from = 0;
        }
        // A trailing `\r\n` can still open a delimiter once more bytes arrive.
        self.scanned = self.buf.len().saturating_sub(2);
        chunks
    }

    /// Returns whatever is left in the buffer once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        self.scanned = 0;
        Some(rest)
    }
}

fn terminator_len(buf: &[u8], i: usize) -> Option<usize> {
    match buf.get(i)? {
        b'\r' if buf.get(i + 1) == Some(&b'\n') => Some(2),
        b'\r' | b'\n' => Some(1),
        _ => None,
    }
}

fn find_chunk_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buf.len() {
        if let Some(first) = terminator_len(buf, i)
            && let Some(second) = terminator_len(buf, i + first)
        {
            return Some((i, first + second));
        }
        i += 1;
    }
    None
}
