//! Stream a chat completion into a markdown note.
//!
//! The note is split into messages at the separator lines written by earlier
//! runs, sent to the API, and the answer is streamed back into the file.
//! Ctrl-C stops the stream and keeps what has arrived so far.

use std::error::Error;
use std::path::{Path, PathBuf};

use chatmd_stream::prelude::*;
use clap::Parser;

mod logging;

#[derive(Parser, Debug)]
#[command(name = "chatmd-demo", about = "Stream a chat completion into a markdown note")]
struct Args {
    /// Markdown note to send and write the answer into.
    note: PathBuf,
    /// Model name passed to the API.
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,
    #[arg(long, default_value_t = 300)]
    max_tokens: u32,
    /// Write the answer at LINE:CH (zero-based) instead of the end of the note.
    #[arg(long, value_parser = parse_position)]
    at: Option<Position>,
    /// Prefix for the role heading written before the answer.
    #[arg(long, default_value = "### ")]
    heading_prefix: String,
    /// Log more (-v info, -vv debug, -vvv trace). Without it `RUST_LOG` applies.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Write JSON-lines logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_position(value: &str) -> Result<Position, String> {
    let (line, ch) = value
        .split_once(':')
        .ok_or_else(|| format!("expected LINE:CH, got {value:?}"))?;
    let line = line.trim().parse().map_err(|e| format!("bad line: {e}"))?;
    let ch = ch.trim().parse().map_err(|e| format!("bad column: {e}"))?;
    Ok(Position::new(line, ch))
}

/// Splits a note into chat messages.
///
/// Sections start after each separator; a `role::NAME` line sets the role of
/// its section, otherwise the section is a user message.
fn build_messages(note: &str, separator: &str) -> Vec<ChatMessage> {
    note.split(separator)
        .filter_map(|section| {
            let section = section.trim();
            if section.is_empty() {
                return None;
            }
            let message = match section.split_once("role::") {
                Some((_, rest)) => {
                    let (role, content) = rest.split_once('\n').unwrap_or((rest, ""));
                    ChatMessage::new(role.trim(), content.trim())
                }
                None => ChatMessage::user(section),
            };
            Some(message)
        })
        .collect()
}

fn save_note(path: &Path, doc: &MemoryDocument) -> std::io::Result<()> {
    std::fs::write(path, doc.text())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = logging::init(&logging::LogSettings {
        verbose: args.verbose,
        json_file: args.log_file.clone(),
    })?;

    let config = StreamConfig::from_env()?;
    let text = std::fs::read_to_string(&args.note)?;
    let mode = if args.at.is_some() {
        InsertMode::AtCursor
    } else {
        InsertMode::Append
    };
    let session_config = SessionConfig::default()
        .heading_prefix(args.heading_prefix.clone())
        .insert_mode(mode);
    let messages = build_messages(&text, &session_config.separator);
    if messages.is_empty() {
        return Err("note is empty, nothing to send".into());
    }
    let payload = ChatPayload::new(&args.model, messages).max_tokens(args.max_tokens);

    let mut doc = MemoryDocument::new(text);
    let start = args.at.unwrap_or_else(|| doc.end());
    doc.set_cursor(start);

    let mut transport = HttpEventSource::chat(&config, &payload)?;
    let session = StreamSession::new(session_config, &doc);
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    tracing::info!(note = %args.note.display(), model = %args.model, "streaming into note");
    let result = session.run(&mut transport, &mut doc).await;
    // Saved regardless of outcome; live inserts are already applied.
    save_note(&args.note, &doc)?;

    let completion = result?;
    for notice in &completion.notices {
        eprintln!("[chatmd] {notice}");
    }
    println!("{}", completion.text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEPARATOR: &str = "<hr class=\"__chatgpt_plugin\">";

    #[test]
    fn plain_note_is_one_user_message() {
        let messages = build_messages("What is Rust?\n", SEPARATOR);
        assert_eq!(messages, vec![ChatMessage::user("What is Rust?")]);
    }

    #[test]
    fn sections_with_role_lines_keep_their_role() {
        let note = format!(
            "hi\n\n{SEPARATOR}\n\n### role::assistant\n\nhello!\n\n{SEPARATOR}\n\nrole::user\n\nmore"
        );
        let messages = build_messages(&note, SEPARATOR);
        assert_eq!(
            messages,
            vec![
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello!"),
                ChatMessage::user("more"),
            ]
        );
    }

    #[test]
    fn parses_line_and_column() {
        assert_eq!(parse_position("3:14"), Ok(Position::new(3, 14)));
        assert!(parse_position("3").is_err());
        assert!(parse_position("a:1").is_err());
    }

    #[test]
    fn saved_note_matches_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("note.md");
        let doc = MemoryDocument::new("# Note\n\nanswer");
        save_note(&path, &doc).expect("save");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "# Note\n\nanswer"
        );
    }
}
