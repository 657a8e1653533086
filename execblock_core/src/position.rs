use serde::Deserialize;
use serde::Serialize;

/// A single location in a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Point {
	/// 1-indexed line number.
	pub line: usize,
	/// 1-indexed column number.
	pub column: usize,
	/// 0-indexed byte offset.
	pub offset: usize,
}

impl Point {
	pub const fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}
}

impl From<markdown::unist::Point> for Point {
	fn from(point: markdown::unist::Point) -> Self {
		Self::new(point.line, point.column, point.offset)
	}
}

/// The span of a node in a source document. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Position {
	pub start: Point,
	pub end: Point,
}

impl Position {
	pub const fn new(
		start_line: usize,
		start_column: usize,
		start_offset: usize,
		end_line: usize,
		end_column: usize,
		end_offset: usize,
	) -> Self {
		Self {
			start: Point::new(start_line, start_column, start_offset),
			end: Point::new(end_line, end_column, end_offset),
		}
	}

	/// The byte range covered by this position.
	pub fn range(&self) -> std::ops::Range<usize> {
		self.start.offset..self.end.offset
	}
}

impl From<markdown::unist::Position> for Position {
	fn from(position: markdown::unist::Position) -> Self {
		Self {
			start: position.start.into(),
			end: position.end.into(),
		}
	}
}
