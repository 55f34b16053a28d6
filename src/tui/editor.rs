//! Multi-line SQL editor state.
//!
//! Cursor positions are character indices, so multi-byte input edits cleanly.

/// Text buffer with a cursor, one `String` per line.
#[derive(Debug, Clone)]
pub struct Editor {
    lines: Vec<String>,
    row: usize,
    col: usize,
}

impl Default for Editor {
    fn default() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
        }
    }
}

impl Editor {
    /// Creates an empty editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an editor holding `text`, cursor at the end.
    pub fn with_text(text: &str) -> Self {
        let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        let row = lines.len() - 1;
        let col = lines[row].chars().count();
        Self { lines, row, col }
    }

    /// The full text, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Cursor as (row, column).
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// True when the buffer holds only whitespace.
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }

    fn line_len(&self) -> usize {
        self.lines[self.row].chars().count()
    }

    fn byte_index(&self) -> usize {
        let line = &self.lines[self.row];
        line.char_indices()
            .nth(self.col)
            .map(|(i, _)| i)
            .unwrap_or(line.len())
    }

    /// Inserts a character at the cursor.
    pub fn insert(&mut self, c: char) {
        if c == '\n' {
            self.newline();
            return;
        }
        let at = self.byte_index();
        self.lines[self.row].insert(at, c);
        self.col += 1;
    }

    /// Splits the current line at the cursor.
    pub fn newline(&mut self) {
        let at = self.byte_index();
        let rest = self.lines[self.row].split_off(at);
        self.row += 1;
        self.lines.insert(self.row, rest);
        self.col = 0;
    }

    /// Deletes the character before the cursor, joining lines at column 0.
    pub fn backspace(&mut self) {
        if self.col > 0 {
            self.col -= 1;
            let at = self.byte_index();
            self.lines[self.row].remove(at);
        } else if self.row > 0 {
            let line = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_len();
            self.lines[self.row].push_str(&line);
        }
    }

    /// Deletes the character at the cursor, joining lines at the end of a line.
    pub fn delete(&mut self) {
        if self.col < self.line_len() {
            let at = self.byte_index();
            self.lines[self.row].remove(at);
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
        }
    }

    pub fn move_left(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.line_len();
        }
    }

    pub fn move_right(&mut self) {
        if self.col < self.line_len() {
            self.col += 1;
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
        }
    }

    pub fn move_up(&mut self) {
        if self.row > 0 {
            self.row -= 1;
            self.col = self.col.min(self.line_len());
        }
    }

    pub fn move_down(&mut self) {
        if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = self.col.min(self.line_len());
        }
    }

    pub fn move_home(&mut self) {
        self.col = 0;
    }

    pub fn move_end(&mut self) {
        self.col = self.line_len();
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(editor: &mut Editor, text: &str) {
        for c in text.chars() {
            editor.insert(c);
        }
    }

    #[test]
    fn test_insert_and_newline() {
        let mut editor = Editor::new();
        type_text(&mut editor, "SELECT 1\nFROM t");
        assert_eq!(editor.text(), "SELECT 1\nFROM t");
        assert_eq!(editor.cursor(), (1, 6));
    }

    #[test]
    fn test_newline_splits_line() {
        let mut editor = Editor::with_text("SELECT a FROM t");
        editor.move_home();
        for _ in 0..8 {
            editor.move_right();
        }
        editor.newline();
        assert_eq!(editor.lines(), &["SELECT a", " FROM t"]);
        assert_eq!(editor.cursor(), (1, 0));
    }

    #[test]
    fn test_backspace_joins_lines() {
        let mut editor = Editor::with_text("SELECT 1\nFROM t");
        editor.move_home();
        editor.backspace();
        assert_eq!(editor.text(), "SELECT 1FROM t");
        assert_eq!(editor.cursor(), (0, 8));
    }

    #[test]
    fn test_delete_joins_next_line() {
        let mut editor = Editor::with_text("a\nb");
        editor.move_up();
        editor.move_end();
        editor.delete();
        assert_eq!(editor.text(), "ab");
    }

    #[test]
    fn test_vertical_movement_clamps_column() {
        let mut editor = Editor::with_text("SELECT *\nt");
        editor.move_up();
        assert_eq!(editor.cursor(), (0, 1));
        editor.move_end();
        editor.move_down();
        assert_eq!(editor.cursor(), (1, 1));
    }

    #[test]
    fn test_multibyte_characters() {
        let mut editor = Editor::new();
        type_text(&mut editor, "'é'");
        editor.move_left();
        editor.backspace();
        assert_eq!(editor.text(), "''");
    }

    #[test]
    fn test_horizontal_movement_wraps_lines() {
        let mut editor = Editor::with_text("ab\ncd");
        editor.move_home();
        editor.move_left();
        assert_eq!(editor.cursor(), (0, 2));
        editor.move_right();
        assert_eq!(editor.cursor(), (1, 0));
    }

    #[test]
    fn test_blank_and_clear() {
        let mut editor = Editor::with_text("  \n\t");
        assert!(editor.is_blank());
        editor.clear();
        assert_eq!(editor.text(), "");
        assert_eq!(editor.cursor(), (0, 0));
    }
}
