use crate::cursor::{Position, TextSurface};

/// A `TextSurface` backed by a `String`.
///
/// Positions past the end of a line or of the document are clamped, the same
/// way editors treat them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryDocument {
    text: String,
    cursor: Position,
}

impl MemoryDocument {
    /// Creates a document with the cursor at the start.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cursor: Position::default(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_index(&self, offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(offset)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len())
    }
}

impl TextSurface for MemoryDocument {
    fn cursor(&self) -> Position {
        self.cursor
    }

    fn set_cursor(&mut self, pos: Position) {
        self.cursor = self.offset_to_pos(self.pos_to_offset(pos));
    }

    fn replace_range(&mut self, text: &str, from: Position, to: Position) {
        let (from, to) = if to < from { (to, from) } else { (from, to) };
        let start = self.byte_index(self.pos_to_offset(from));
        let end = self.byte_index(self.pos_to_offset(to));
        self.text.replace_range(start..end, text);
    }

    fn pos_to_offset(&self, pos: Position) -> usize {
        let mut offset = 0;
        let mut lines = self.text.split('\n').peekable();
        let mut line_no = 0;
        while let Some(line) = lines.next() {
            let len = line.chars().count();
            if line_no == pos.line || lines.peek().is_none() {
                return offset + pos.ch.min(len);
            }
            offset += len + 1;
            line_no += 1;
        }
        offset
    }

    fn offset_to_pos(&self, offset: usize) -> Position {
        let mut pos = Position::default();
        for c in self.text.chars().take(offset) {
            if c == '\n' {
                pos.line += 1;
                pos.ch = 0;
            } else {
                pos.ch += 1;
            }
        }
        pos
    }

    fn insert_at_offset(&mut self, offset: usize, text: &str) {
        let idx = self.byte_index(offset.min(self.char_len()));
        self.text.insert_str(idx, text);
    }

    fn end(&self) -> Position {
        self.offset_to_pos(self.char_len())
    }
}
