use tracing::debug;

use crate::config::InsertMode;
use crate::session::Notice;

/// A line/column position in a text surface.
///
/// Columns and offsets are counted in `char`s.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

/// Host document the streamed answer is written into.
///
/// The surface is owned by the host and may be edited by others between
/// calls; implementations clamp out-of-range positions.
pub trait TextSurface {
    /// Returns the live cursor.
    fn cursor(&self) -> Position;
    /// Moves the live cursor.
    fn set_cursor(&mut self, pos: Position);
    /// Replaces the text between `from` and `to` with `text`.
    fn replace_range(&mut self, text: &str, from: Position, to: Position);
    /// Converts a position to a char offset.
    fn pos_to_offset(&self, pos: Position) -> usize;
    /// Converts a char offset to a position.
    fn offset_to_pos(&self, offset: usize) -> Position;
    /// Low-level insert used for live typing; does not move the cursor.
    fn insert_at_offset(&mut self, offset: usize, text: &str);
    /// Returns the position after the last character.
    fn end(&self) -> Position;
}

fn advance<S: TextSurface + ?Sized>(surface: &S, from: Position, text: &str) -> Position {
    surface.offset_to_pos(surface.pos_to_offset(from) + text.chars().count())
}

/// Tracks where the answer starts and applies streamed text to the surface.
///
/// Deltas are written at the live cursor as they arrive. The anchor only
/// matters for the final pass, which replaces everything from the anchor to
/// the live cursor with the complete text.
#[derive(Debug, Clone)]
pub struct CursorTracker {
    anchor: Position,
    mode: InsertMode,
}

impl CursorTracker {
    /// Starts tracking at the surface's current cursor.
    pub fn new<S: TextSurface + ?Sized>(surface: &S, mode: InsertMode) -> Self {
        Self {
            anchor: surface.cursor(),
            mode,
        }
    }

    pub fn anchor(&self) -> Position {
        self.anchor
    }

    /// Writes the header block at the live cursor and re-anchors after it.
    pub fn on_open<S: TextSurface + ?Sized>(&mut self, surface: &mut S, header: &str) {
        let cursor = surface.cursor();
        surface.replace_range(header, cursor, cursor);
        let end = advance(surface, cursor, header);
        surface.set_cursor(end);
        self.anchor = end;
        debug!(line = end.line, ch = end.ch, "anchored answer after header");
    }

    /// Inserts `fragment` at the live cursor and moves the cursor past it.
    pub fn on_delta<S: TextSurface + ?Sized>(&mut self, surface: &mut S, fragment: &str) {
        let offset = surface.pos_to_offset(surface.cursor());
        surface.insert_at_offset(offset, fragment);
        let end = surface.offset_to_pos(offset + fragment.chars().count());
        surface.set_cursor(end);
    }

    /// Replaces the streamed region with `text` and settles the trailing
    /// content according to the insert mode.
    pub fn on_terminal<S: TextSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        text: &str,
    ) -> Option<Notice> {
        let live = surface.cursor();
        surface.replace_range(text, self.anchor, live);
        let end = advance(surface, self.anchor, text);
        surface.set_cursor(end);

        match self.mode {
            InsertMode::Append => {
                let doc_end = surface.end();
                if doc_end <= end {
                    return None;
                }
                let removed = surface.pos_to_offset(doc_end) - surface.pos_to_offset(end);
                surface.replace_range("", end, doc_end);
                debug!(chars = removed, "removed trailing content after answer");
                Some(Notice::TrailingContentRemoved { from: end, chars: removed })
            }
            InsertMode::AtCursor => Some(Notice::ArtifactsMayRemain),
        }
    }
}
