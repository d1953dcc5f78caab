use std::time::Duration;

use crate::errors::StreamError;

const DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_SEPARATOR: &str = "<hr class=\"__chatgpt_plugin\">";
const ROLE_MARKER: &str = "role::";

/// Configuration for the HTTP event source.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Chat-completions endpoint.
    pub url: String,
    /// HTTP timeout for the whole streamed request.
    pub timeout: Duration,
}

impl StreamConfig {
    /// Creates a config with default endpoint and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: DEFAULT_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Builds a config from `OPENAI_API_KEY` and, if set, `CHATMD_API_URL`.
    pub fn from_env() -> Result<Self, StreamError> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(StreamError::Config("missing OPENAI_API_KEY".into()));
        }
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("CHATMD_API_URL")
            && !url.trim().is_empty()
        {
            config = config.url(url);
        }
        Ok(config)
    }

    /// Overrides the endpoint (for proxies or local servers).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Overrides the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", self.api_key)),
        ]
    }
}

/// Where the streamed answer lands relative to the rest of the note.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// The answer is appended at the end of the note. Anything left after it
    /// once the stream settles is removed.
    #[default]
    Append,
    /// The answer is written at the cursor. Nothing after it is removed, so
    /// streaming artifacts may remain.
    AtCursor,
}

/// Per-session settings for the text written into the note.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    /// Separator line written before the answer.
    pub separator: String,
    /// Prefix for the role line, for example `"### "`.
    pub heading_prefix: String,
    pub insert_mode: InsertMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            heading_prefix: String::new(),
            insert_mode: InsertMode::default(),
        }
    }
}

impl SessionConfig {
    /// Sets the role heading prefix.
    pub fn heading_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.heading_prefix = prefix.into();
        self
    }

    /// Sets the insert mode.
    pub fn insert_mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }

    /// Header block inserted when the stream opens.
    pub fn header(&self) -> String {
        format!(
            "\n\n{}\n\n{}{ROLE_MARKER}assistant\n\n",
            self.separator, self.heading_prefix
        )
    }
}
