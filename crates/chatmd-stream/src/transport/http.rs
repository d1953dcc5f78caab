use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::errors::StreamError;
use crate::frame::{ChunkSplitter, FrameParser, LastWriteWins, NamedEvent};
use crate::payload::ChatPayload;

use super::{Transport, TransportEvent};

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Everything needed to open the event stream.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<std::time::Duration>,
}

impl TransportRequest {
    /// POST request for a streaming chat completion.
    pub fn chat(config: &StreamConfig, payload: &ChatPayload) -> Result<Self, StreamError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| StreamError::Config(format!("failed to serialize payload: {e}")))?;
        Ok(Self {
            url: config.url.clone(),
            method: reqwest::Method::POST,
            headers: config.headers(),
            body: Some(body),
            timeout: Some(config.timeout),
        })
    }
}

/// Server-sent event source over reqwest.
///
/// Response bytes are cut into chunks at blank lines and each chunk goes
/// through the injected [`FrameParser`]. A non-success status is delivered as
/// an `error` event carrying the response body.
pub struct HttpEventSource {
    client: reqwest::Client,
    request: TransportRequest,
    parser: Box<dyn FrameParser>,
    splitter: ChunkSplitter,
    body: Option<ByteStream>,
    pending: VecDeque<TransportEvent>,
    closed: bool,
}

impl HttpEventSource {
    /// Creates an event source that frames chunks with `parser`.
    pub fn new(
        request: TransportRequest,
        parser: Box<dyn FrameParser>,
    ) -> Result<Self, StreamError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            request,
            parser,
            splitter: ChunkSplitter::default(),
            body: None,
            pending: VecDeque::new(),
            closed: false,
        })
    }

    /// Chat-completions event source using last-write-wins framing.
    pub fn chat(config: &StreamConfig, payload: &ChatPayload) -> Result<Self, StreamError> {
        Self::new(
            TransportRequest::chat(config, payload)?,
            Box::new(LastWriteWins),
        )
    }

    fn dispatch_chunk(&mut self, chunk: &str) {
        if let Some(event) = self.parser.parse_chunk(chunk) {
            self.pending.push_back(TransportEvent::Event(event));
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpEventSource {
    async fn start(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        debug!(url = %self.request.url, method = %self.request.method, "opening event stream");
        let mut http_req = self
            .client
            .request(self.request.method.clone(), &self.request.url);
        for (name, value) in &self.request.headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &self.request.body {
            http_req = http_req.body(body.clone());
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| StreamError::Http(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(status = status.as_u16(), "event stream rejected");
            self.pending.push_back(TransportEvent::Event(NamedEvent::error(body)));
            return Ok(());
        }

        self.pending.push_back(TransportEvent::Open);
        self.body = Some(Box::pin(response.bytes_stream()));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let body = self.body.as_mut()?;
            match body.next().await {
                Some(Ok(bytes)) => {
                    for chunk in self.splitter.push_chunk(&bytes) {
                        self.dispatch_chunk(&chunk);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "event stream read failed");
                    self.body = None;
                    self.pending
                        .push_back(TransportEvent::Event(NamedEvent::error(e.to_string())));
                }
                None => {
                    debug!("event stream ended");
                    self.body = None;
                    if let Some(rest) = self.splitter.finish() {
                        self.dispatch_chunk(&rest);
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.body = None;
        self.pending.clear();
        self.pending.push_back(TransportEvent::Abort);
        debug!("event stream closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::config::SessionConfig;
    use crate::cursor::TextSurface as _;
    use crate::errors::ErrorPayload;
    use crate::payload::ChatMessage;
    use crate::session::StreamSession;
    use crate::surface::MemoryDocument;

    const SSE_HEAD: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
    const BODY_END: &[u8] = b"0\r\n\r\n";

    struct Upper;

    impl FrameParser for Upper {
        fn parse_chunk(&self, raw: &str) -> Option<NamedEvent> {
            Some(NamedEvent::message(raw.to_uppercase()))
        }
    }

    /// Wraps `data` as one HTTP chunk.
    fn http_chunk(data: &str) -> Vec<u8> {
        format!("{:x}\r\n{data}\r\n", data.len()).into_bytes()
    }

    fn delta_frame(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut read = [0u8; 1024];
        loop {
            let n = socket.read(&mut read).await.expect("read request");
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&read[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|len| len.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Serves one request with `head`, then writes `parts` one at a time and
    /// drops the connection.
    async fn serve_once(head: String, parts: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            read_request(&mut socket).await;
            let _ = socket.write_all(head.as_bytes()).await;
            for part in parts {
                let _ = socket.write_all(&part).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn chat_source(url: &str) -> HttpEventSource {
        let config = StreamConfig::new("sk-test").url(url);
        let payload = ChatPayload::new("gpt-4o-mini", vec![ChatMessage::user("hi")]);
        HttpEventSource::chat(&config, &payload).expect("source")
    }

    async fn drain(source: &mut HttpEventSource) -> Vec<TransportEvent> {
        source.start().await.expect("start");
        let mut events = Vec::new();
        while let Some(event) = source.next_event().await {
            events.push(event);
        }
        events
    }

    fn source(parser: Box<dyn FrameParser>) -> HttpEventSource {
        let config = StreamConfig::new("sk-test").url("http://127.0.0.1:9/v1/chat/completions");
        let payload = ChatPayload::new("gpt-4o-mini", vec![ChatMessage::user("hi")]);
        HttpEventSource::new(
            TransportRequest::chat(&config, &payload).expect("request"),
            parser,
        )
        .expect("source")
    }

    #[test]
    fn chat_request_posts_json_with_bearer_auth() {
        let config = StreamConfig::new("sk-test");
        let payload = ChatPayload::new("gpt-4o-mini", vec![ChatMessage::user("hi")]);
        let request = TransportRequest::chat(&config, &payload).expect("request");
        assert_eq!(request.method, reqwest::Method::POST);
        assert!(
            request
                .headers
                .contains(&("Content-Type".to_string(), "application/json".to_string()))
        );
        let body: serde_json::Value =
            serde_json::from_str(request.body.as_deref().expect("body")).expect("json");
        assert_eq!(body.get("stream").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn injected_parser_frames_chunks() {
        let mut source = source(Box::new(Upper));
        source.dispatch_chunk("data: hi");
        assert_eq!(
            source.pending.pop_front(),
            Some(TransportEvent::message("DATA: HI"))
        );
    }

    #[tokio::test]
    async fn close_delivers_a_single_abort() {
        let mut source = source(Box::new(LastWriteWins));
        source.pending.push_back(TransportEvent::Open);
        source.close();
        source.close();
        assert_eq!(source.next_event().await, Some(TransportEvent::Abort));
        assert_eq!(source.next_event().await, None);
    }

    #[tokio::test]
    async fn frames_split_across_writes_stream_into_the_note() {
        let first = delta_frame("Hello");
        let (head, tail) = first.split_at(first.len() - 6);
        let url = serve_once(
            SSE_HEAD.to_string(),
            vec![
                http_chunk(head),
                http_chunk(&format!("{tail}\n\n")),
                http_chunk(&format!("{}\r\n\r\ndata: [DONE]\n\n", delta_frame(" world"))),
                BODY_END.to_vec(),
            ],
        )
        .await;
        let mut transport = chat_source(&url);
        let mut doc = MemoryDocument::new("Say hi");
        doc.set_cursor(doc.end());
        let session = StreamSession::new(SessionConfig::default(), &doc);

        let completion = session
            .run(&mut transport, &mut doc)
            .await
            .expect("completion");

        assert_eq!(completion.text, "Hello world");
        assert!(doc.text().ends_with("role::assistant\n\nHello world"));
    }

    #[tokio::test]
    async fn leftover_frame_is_delivered_when_the_body_ends() {
        let url = serve_once(
            SSE_HEAD.to_string(),
            vec![
                http_chunk(&format!("{}\n\ndata: [DONE]", delta_frame("hi"))),
                BODY_END.to_vec(),
            ],
        )
        .await;
        let mut source = chat_source(&url);

        let events = drain(&mut source).await;

        assert_eq!(
            events,
            vec![
                TransportEvent::Open,
                TransportEvent::message(delta_frame("hi").trim_start_matches("data: ")),
                TransportEvent::message("[DONE]"),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_status_settles_with_the_json_body() {
        let body = r#"{"error":{"message":"rate limited"}}"#;
        let head = format!(
            "HTTP/1.1 429 Too Many Requests\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let url = serve_once(head, vec![]).await;
        let mut transport = chat_source(&url);
        let mut doc = MemoryDocument::new("q");
        doc.set_cursor(doc.end());
        let session = StreamSession::new(SessionConfig::default(), &doc);

        let err = session
            .run(&mut transport, &mut doc)
            .await
            .expect_err("rejected");

        assert_eq!(
            err.payload(),
            Some(&ErrorPayload::Json(
                serde_json::json!({"error": {"message": "rate limited"}})
            ))
        );
        assert_eq!(doc.text(), "q");
    }

    #[tokio::test]
    async fn dropped_connection_becomes_an_error_event() {
        let url = serve_once(
            SSE_HEAD.to_string(),
            vec![
                http_chunk(&format!("{}\n\n", delta_frame("part"))),
                b"40\r\ndata: cut off".to_vec(),
            ],
        )
        .await;
        let mut source = chat_source(&url);

        let events = drain(&mut source).await;

        assert_eq!(events.len(), 3, "{events:?}");
        assert_eq!(events[0], TransportEvent::Open);
        assert_eq!(
            events[1],
            TransportEvent::message(delta_frame("part").trim_start_matches("data: "))
        );
        assert!(
            matches!(&events[2], TransportEvent::Event(event) if event.name == "error"),
            "{events:?}"
        );
    }

    #[tokio::test]
    async fn unreachable_server_fails_to_start() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let mut source = chat_source(&format!("http://{addr}/v1/chat/completions"));

        let err = source.start().await.expect_err("refused");
        assert!(matches!(err, StreamError::Http(_)), "{err:?}");
    }
}
