use crate::ExecBlockError;
use crate::ExecBlockResult;

/// Drop every leading line that is empty after trimming trailing whitespace
/// and join the remaining lines with `\n`.
pub fn remove_leading_empty_lines<S: AsRef<str>>(lines: &[S]) -> String {
	let offset = lines
		.iter()
		.position(|line| !line.as_ref().trim_end().is_empty())
		.unwrap_or(lines.len());

	lines[offset..]
		.iter()
		.map(AsRef::as_ref)
		.collect::<Vec<_>>()
		.join("\n")
}

/// [`remove_leading_empty_lines`] for a single string split on `\n`.
pub fn remove_leading_empty_lines_str(text: &str) -> String {
	let lines: Vec<&str> = text.split('\n').collect();
	remove_leading_empty_lines(&lines)
}

/// The two views of a block body produced by the hidden line marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSource {
	/// Lines shown in the rendered block. Lines containing the marker are
	/// dropped.
	pub visible: Vec<String>,
	/// The executed source: every line, with the marker removed.
	pub executed: String,
}

/// Separate the lines of a block body into the visible lines and the full
/// executed source.
pub fn split_hidden_lines<S: AsRef<str>>(lines: &[S], marker: &str) -> SplitSource {
	let visible = lines
		.iter()
		.map(AsRef::as_ref)
		.filter(|line| marker.is_empty() || !line.contains(marker))
		.map(str::to_string)
		.collect();

	let executed = lines
		.iter()
		.map(|line| {
			if marker.is_empty() {
				line.as_ref().to_string()
			} else {
				line.as_ref().replace(marker, "")
			}
		})
		.collect::<Vec<_>>()
		.join("\n");

	SplitSource { visible, executed }
}

/// Join header lines and the executed body into the source that is hashed,
/// cached and run.
pub fn assemble_full_source(headers: &[String], body: &str) -> String {
	headers
		.iter()
		.map(String::as_str)
		.chain(std::iter::once(body))
		.collect::<Vec<_>>()
		.join("\n")
}

/// Result of [`dedent_lines`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dedented {
	pub lines: Vec<String>,
	/// True when characters other than whitespace were removed.
	pub over_dedent: bool,
}

/// Remove the first `amount` characters from every line.
pub fn dedent_lines<S: AsRef<str>>(lines: &[S], amount: usize) -> Dedented {
	let mut over_dedent = false;
	let lines = lines
		.iter()
		.map(|line| {
			let line = line.as_ref();
			let split = line
				.char_indices()
				.nth(amount)
				.map_or(line.len(), |(index, _)| index);
			let (removed, kept) = line.split_at(split);
			if !removed.trim().is_empty() {
				over_dedent = true;
			}
			kept.to_string()
		})
		.collect();

	Dedented { lines, over_dedent }
}

/// Remove the longest run of leading whitespace shared by every non-blank
/// line.
pub fn auto_dedent_lines<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
	let common = lines
		.iter()
		.map(AsRef::as_ref)
		.filter(|line| !line.trim().is_empty())
		.map(|line| {
			line.chars()
				.take_while(|c| *c == ' ' || *c == '\t')
				.count()
		})
		.min()
		.unwrap_or(0);

	dedent_lines(lines, common).lines
}

/// Parse an emphasize-lines spec such as `1,3-5,8-` into zero-based line
/// indices. `total` closes open-ended ranges (`8-`), and `-3` means `1-3`.
///
/// Out-of-range entries are kept so callers can report them. A range that
/// runs past `total` stops at its first out-of-range index.
pub fn parse_line_spec(spec: &str, total: usize) -> ExecBlockResult<Vec<usize>> {
	let invalid = || ExecBlockError::InvalidLineSpec(spec.to_string());
	let parse_number = |value: &str| -> ExecBlockResult<usize> {
		match value.trim().parse::<usize>() {
			Ok(0) | Err(_) => Err(invalid()),
			Ok(number) => Ok(number),
		}
	};
	let mut items = Vec::new();

	for part in spec.split(',') {
		let bounds: Vec<&str> = part.trim().split('-').collect();

		match bounds.as_slice() {
			[single] => items.push(parse_number(single)? - 1),
			[start, end] => {
				if start.trim().is_empty() && end.trim().is_empty() {
					return Err(invalid());
				}

				let start = if start.trim().is_empty() {
					1
				} else {
					parse_number(start)?
				};
				let end = if end.trim().is_empty() {
					start.max(total)
				} else {
					parse_number(end)?
				};

				if start > end {
					return Err(invalid());
				}

				let upper = end.min(start.max(total).saturating_add(1));
				items.extend(start - 1..upper);
			}
			_ => return Err(invalid()),
		}
	}

	Ok(items)
}
