// Protolens Position Mapping
// Converts between byte offsets, tree points and LSP (UTF-16) positions

use tower_lsp::lsp_types::{Position, Range};

use super::symbols::SourceRange;
use tree_sitter::Point;

/// Line start table over one text buffer.
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { text, line_starts }
    }

    fn line(&self, row: usize) -> &'a str {
        let Some(start) = self.line_starts.get(row).copied() else {
            return "";
        };
        let end = self
            .line_starts
            .get(row + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        self.text.get(start..end).unwrap_or("")
    }

    /// Tree point for a byte offset. Offsets past the end clamp to the end.
    pub fn point_at(&self, offset: usize) -> Point {
        let offset = offset.min(self.text.len());
        let row = match self.line_starts.binary_search(&offset) {
            Ok(row) => row,
            Err(next) => next - 1,
        };
        Point::new(row, offset - self.line_starts[row])
    }

    pub fn offset_at(&self, point: Point) -> usize {
        match self.line_starts.get(point.row) {
            Some(start) => (start + point.column.min(self.line(point.row).len())).min(self.text.len()),
            None => self.text.len(),
        }
    }

    pub fn position_at(&self, offset: usize) -> Position {
        self.position_of(self.point_at(offset))
    }

    /// LSP position for a tree point (byte column to UTF-16 column).
    pub fn position_of(&self, point: Point) -> Position {
        let line = self.line(point.row);
        let mut column = point.column.min(line.len());
        while !line.is_char_boundary(column) {
            column -= 1;
        }
        let character: usize = line[..column].chars().map(char::len_utf16).sum();
        Position::new(point.row as u32, character as u32)
    }

    /// Tree point for an LSP position (UTF-16 column to byte column).
    pub fn point_of(&self, position: Position) -> Point {
        let row = position.line as usize;
        if row >= self.line_starts.len() {
            return self.point_at(self.text.len());
        }
        let line = self.line(row);
        let mut units = 0usize;
        let mut column = line.len();
        for (index, c) in line.char_indices() {
            if units >= position.character as usize {
                column = index;
                break;
            }
            units += c.len_utf16();
        }
        Point::new(row, column)
    }

    pub fn offset_of(&self, position: Position) -> usize {
        self.offset_at(self.point_of(position))
    }

    pub fn range_of(&self, range: &SourceRange) -> Range {
        Range::new(self.position_of(range.start), self.position_of(range.end))
    }
}

/// Range conversion without a text buffer; exact for ASCII lines.
pub fn point_range(range: &SourceRange) -> Range {
    Range::new(
        Position::new(range.start.row as u32, range.start.column as u32),
        Position::new(range.end.row as u32, range.end.column as u32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_and_offsets() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.point_at(0), Point::new(0, 0));
        assert_eq!(index.point_at(3), Point::new(1, 0));
        assert_eq!(index.point_at(5), Point::new(1, 2));
        assert_eq!(index.point_at(6), Point::new(2, 0));
        assert_eq!(index.point_at(99), Point::new(2, 0));
        assert_eq!(index.offset_at(Point::new(1, 1)), 4);
        assert_eq!(index.offset_at(Point::new(1, 10)), 5);
    }

    #[test]
    fn test_utf16_columns() {
        // "é" is two bytes / one unit, "𝄞" is four bytes / two units
        let text = "é𝄞x\n";
        let index = LineIndex::new(text);
        let x = text.find('x').unwrap();
        assert_eq!(index.position_at(x), Position::new(0, 3));
        assert_eq!(index.offset_of(Position::new(0, 3)), x);
        assert_eq!(index.offset_of(Position::new(0, 1)), 2);
        assert_eq!(index.offset_of(Position::new(0, 50)), 7);
    }

    #[test]
    fn test_position_past_last_line() {
        let index = LineIndex::new("a\nb");
        assert_eq!(index.offset_of(Position::new(7, 0)), 3);
    }
}
