//! Character-cell screen.

use crate::isa::CursorShape;
use crate::text::{Text, FILL};

/// What the interpreter draws on. Calls are fire-and-forget.
pub trait Display {
    fn rows(&self) -> usize;
    fn columns(&self) -> usize;
    fn clear_all(&mut self);
    fn clear_region(&mut self, row: usize, col: usize, len: usize);
    fn draw_text(&mut self, row: usize, col: usize, text: &Text);
    fn set_cursor(&mut self, row: usize, col: usize, shape: CursorShape);
    fn hide_cursor(&mut self);
    fn beep(&mut self) {}
}

/// Cells that changed, as `len` cells of `row` from `col`. A full clear is
/// reported as every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub row: usize,
    pub col: usize,
    pub len: usize,
}

pub type Listener = Box<dyn FnMut(Damage) + Send>;

/// In-memory screen.
pub struct FrameBuffer {
    columns: usize,
    cells: Vec<Vec<u8>>,
    cursor: Option<(usize, usize, CursorShape)>,
    listeners: Vec<Listener>,
    beeps: usize,
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("rows", &self.render())
            .field("cursor", &self.cursor)
            .field("beeps", &self.beeps)
            .finish()
    }
}

impl FrameBuffer {
    pub fn new(rows: usize, columns: usize) -> Self {
        FrameBuffer {
            columns,
            cells: vec![vec![FILL; columns]; rows],
            cursor: None,
            listeners: Vec::new(),
            beeps: 0,
        }
    }

    pub fn listen(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn row_text(&self, row: usize) -> Text {
        self.cells.get(row).map_or_else(Text::empty, |r| Text::new(r.clone()))
    }

    pub fn cursor(&self) -> Option<(usize, usize, CursorShape)> {
        self.cursor
    }

    pub fn beeps(&self) -> usize {
        self.beeps
    }

    /// Every row, one per line.
    pub fn render(&self) -> String {
        self.cells
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn damage(&mut self, d: Damage) {
        for listener in &mut self.listeners {
            listener(d);
        }
    }
}

impl Display for FrameBuffer {
    fn rows(&self) -> usize {
        self.cells.len()
    }

    fn columns(&self) -> usize {
        self.columns
    }

    fn clear_all(&mut self) {
        for row in &mut self.cells {
            row.fill(FILL);
        }
        for row in 0..self.cells.len() {
            self.damage(Damage { row, col: 0, len: self.columns });
        }
    }

    fn clear_region(&mut self, row: usize, col: usize, len: usize) {
        let end = col.saturating_add(len).min(self.columns);
        let Some(cells) = self.cells.get_mut(row) else { return };
        if col >= end {
            return;
        }
        cells[col..end].fill(FILL);
        self.damage(Damage { row, col, len: end - col });
    }

    fn draw_text(&mut self, row: usize, col: usize, text: &Text) {
        let columns = self.columns;
        let Some(cells) = self.cells.get_mut(row) else { return };
        if col >= columns {
            return;
        }
        let bytes = &text.as_bytes()[..text.len().min(columns - col)];
        cells[col..col + bytes.len()].copy_from_slice(bytes);
        let len = bytes.len();
        self.damage(Damage { row, col, len });
    }

    fn set_cursor(&mut self, row: usize, col: usize, shape: CursorShape) {
        self.cursor = (row < self.cells.len() && col < self.columns && shape != CursorShape::None)
            .then_some((row, col, shape));
    }

    fn hide_cursor(&mut self) {
        self.cursor = None;
    }

    fn beep(&mut self) {
        self.beeps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn draw_clips_at_right_edge() {
        let mut fb = FrameBuffer::new(2, 5);
        fb.draw_text(0, 3, &Text::from("abcdef"));
        assert_eq!(fb.row_text(0), Text::from("   ab"));
        fb.draw_text(5, 0, &Text::from("x"));
        fb.draw_text(1, 9, &Text::from("x"));
        assert_eq!(fb.row_text(1), Text::from("     "));
    }

    #[test]
    fn clear_region_clips() {
        let mut fb = FrameBuffer::new(1, 6);
        fb.draw_text(0, 0, &Text::from("abcdef"));
        fb.clear_region(0, 4, 10);
        assert_eq!(fb.row_text(0), Text::from("abcd  "));
        fb.clear_all();
        assert_eq!(fb.render(), "      ");
    }

    #[test]
    fn listeners_receive_damage() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut fb = FrameBuffer::new(2, 4);
        fb.listen(Box::new(move |d| sink.lock().unwrap().push(d)));
        fb.draw_text(1, 1, &Text::from("hello"));
        assert_eq!(*seen.lock().unwrap(), vec![Damage { row: 1, col: 1, len: 3 }]);
    }

    #[test]
    fn cursor_outside_screen_is_hidden() {
        let mut fb = FrameBuffer::new(2, 4);
        fb.set_cursor(1, 3, CursorShape::Block);
        assert_eq!(fb.cursor(), Some((1, 3, CursorShape::Block)));
        fb.set_cursor(1, 4, CursorShape::Block);
        assert_eq!(fb.cursor(), None);
    }
}
